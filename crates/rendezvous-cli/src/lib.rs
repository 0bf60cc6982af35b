//! Terminal chat client for Rendezvous
//!
//! A thin shell over [`rendezvous_app::Driver`]: stdin lines in, appended
//! lines out, one WebSocket per connection attempt and reqwest for REST. All
//! orchestration lives in the generic [`rendezvous_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
pub mod commands;
pub mod config;
mod error;
pub mod rest;
pub mod screen;
mod system_env;
pub mod terminal;
pub mod token_store;
pub mod transport;

pub use client::run;
pub use config::{Args, ClientConfig, ConfigError, Target};
pub use error::CliError;
pub use rest::{RestClient, RestError};
pub use system_env::SystemEnv;
pub use terminal::TerminalDriver;
pub use token_store::FileTokenStore;
pub use transport::TransportError;
