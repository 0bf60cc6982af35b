//! Scenario setup and stepping helpers.
//!
//! A [`Scenario`] wires a [`SimEnv`], [`SimServer`], [`SimTokenStore`] and
//! [`SimDriver`] into a ready [`Runtime`]. [`settle`] drains queued driver
//! events without moving the clock; [`run_for`] lets virtual time pass so
//! reconnect and typing timers fire.

use std::time::Duration;

use rendezvous_app::{Runtime, RuntimeConfig, RuntimeError};
use rendezvous_client::ReconcilerConfig;
use rendezvous_core::{AuthToken, ConnectionConfig};

use crate::{SimDriver, SimDriverError, SimEnv, SimServer, SimTokenStore, SocketPolicy};

/// Runtime driven by the simulation.
pub type SimRuntime = Runtime<SimDriver, SimEnv>;

/// Result of a simulation step.
pub type SimResult<T> = Result<T, RuntimeError<SimDriverError>>;

/// Upper bound on steps in one [`settle`], to catch event loops that never
/// go quiet.
pub const MAX_SETTLE_STEPS: usize = 10_000;

/// WebSocket base used by every scenario.
pub const SIM_BASE_URL: &str = "ws://chat.test";

/// Builder for a simulated client.
#[derive(Debug, Clone)]
pub struct Scenario {
    token: Option<AuthToken>,
    self_id: u64,
    next_id: u64,
    policy: SocketPolicy,
    manual_api: bool,
    connection: ConnectionConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            token: Some(AuthToken::new("T")),
            self_id: 1,
            next_id: 1,
            policy: SocketPolicy::Accept,
            manual_api: false,
            connection: ConnectionConfig { base_url: SIM_BASE_URL.to_string(), ..ConnectionConfig::default() },
        }
    }
}

impl Scenario {
    /// Logged-in user 1 with token `T`, sockets that accept, REST answered
    /// automatically.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored token, or `None` for an empty store.
    #[must_use]
    pub fn token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(AuthToken::new);
        self
    }

    /// Id of the local user.
    #[must_use]
    pub fn self_id(mut self, self_id: u64) -> Self {
        self.self_id = self_id;
        self
    }

    /// First server-assigned message id.
    #[must_use]
    pub fn next_message_id(mut self, next_id: u64) -> Self {
        self.next_id = next_id;
        self
    }

    /// How sockets answer open attempts.
    #[must_use]
    pub fn socket_policy(mut self, policy: SocketPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hold REST requests until the test completes them.
    #[must_use]
    pub fn manual_api(mut self) -> Self {
        self.manual_api = true;
        self
    }

    /// Override reconnect settings.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Build the runtime. Nothing has happened yet; call
    /// [`Runtime::login`] to start the session.
    pub fn build(self) -> SimRuntime {
        let env = SimEnv::new();
        let server = SimServer::new(env.clone(), self.self_id).with_next_id(self.next_id);
        let tokens = match self.token {
            Some(token) => SimTokenStore::with_token(token),
            None => SimTokenStore::default(),
        };

        let driver = SimDriver::new(server, tokens);
        driver.set_socket_policy(self.policy);
        driver.set_manual_api(self.manual_api);

        let config = RuntimeConfig {
            connection: self.connection,
            reconciler: ReconcilerConfig { self_id: Some(self.self_id), ..ReconcilerConfig::default() },
            ..RuntimeConfig::default()
        };

        Runtime::new(driver, env, config)
    }
}

/// Step until the driver has nothing queued. Returns the steps taken.
///
/// Time does not move unless a step found nothing to do, which only happens
/// on the final check.
///
/// # Errors
///
/// Returns an error if the driver fails or the runtime keeps producing work
/// past [`MAX_SETTLE_STEPS`].
pub async fn settle(runtime: &mut SimRuntime) -> SimResult<usize> {
    let mut steps = 0;
    while runtime.driver().has_pending() {
        if steps == MAX_SETTLE_STEPS {
            return Err(RuntimeError::driver(SimDriverError("runtime never settled".to_string())));
        }
        runtime.step().await?;
        steps += 1;
    }
    Ok(steps)
}

/// Step until `duration` of virtual time has passed.
///
/// Queued events are handled as they appear; idle steps advance the clock by
/// [`rendezvous_app::IDLE_INTERVAL`].
///
/// # Errors
///
/// Returns an error if the driver fails.
pub async fn run_for(runtime: &mut SimRuntime, duration: Duration) -> SimResult<()> {
    let deadline = runtime.env().elapsed() + duration;
    while runtime.env().elapsed() < deadline {
        runtime.step().await?;
    }
    Ok(())
}
