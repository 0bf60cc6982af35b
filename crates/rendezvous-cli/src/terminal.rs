//! Terminal driver for the CLI.
//!
//! Implements the [`Driver`] trait with stdin lines for input, stdout for
//! output, tokio-tungstenite for the chat socket and reqwest for REST. Every
//! asynchronous outcome (socket events, REST responses, token lookups,
//! typed lines) is funnelled into one channel that
//! [`poll_event`](Driver::poll_event) drains without blocking.

use std::{
    collections::HashMap,
    io::{self, BufRead, Write},
    sync::Arc,
    time::Instant,
};

use rendezvous_app::{Driver, DriverEvent, UserInput, View};
use rendezvous_client::{ApiRequest, MessagingApi, TokenRequest, TokenStore};
use rendezvous_core::{ConnectionAction, SocketId};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::{
    CliError,
    commands::{self, Command},
    screen::Screen,
    transport::{self, SocketHandle},
};

/// Terminal driver implementing the [`Driver`] trait.
pub struct TerminalDriver {
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    sockets: HashMap<SocketId, SocketHandle>,
    api: Arc<dyn MessagingApi>,
    tokens: Arc<dyn TokenStore>,
    screen: Screen,
    stopped: bool,
}

impl TerminalDriver {
    /// Create a driver. Call [`read_stdin`](Self::read_stdin) to accept
    /// typed input.
    pub fn new(api: Arc<dyn MessagingApi>, tokens: Arc<dyn TokenStore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx,
            sockets: HashMap::new(),
            api,
            tokens,
            screen: Screen::new(),
            stopped: false,
        }
    }

    /// Start reading lines from stdin on a detached thread. End of input
    /// quits.
    pub fn read_stdin(&self) {
        let events = self.events_tx.clone();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    },
                };

                let input = match commands::parse_line(&line) {
                    Some(Command::Input(input)) => input,
                    Some(Command::Help) => {
                        let _ = writeln!(io::stdout().lock(), "{}", commands::HELP);
                        continue;
                    },
                    Some(Command::Unknown(name)) => {
                        let _ = writeln!(io::stdout().lock(), "unknown command /{name}, try /help");
                        continue;
                    },
                    None => continue,
                };

                if events.send(DriverEvent::Input(input)).is_err() {
                    return;
                }
            }
            let _ = events.send(DriverEvent::Input(UserInput::Quit));
        });
    }

    /// Drop the handle of a socket the task has finished with.
    fn forget_finished(&mut self, event: &DriverEvent) {
        match event {
            DriverEvent::SocketClosed { socket, .. }
            | DriverEvent::SocketOpenFailed { socket, .. } => {
                self.sockets.remove(socket);
            },
            _ => {},
        }
    }

    fn ensure_running(&self) -> Result<(), CliError> {
        if self.stopped { Err(CliError::Stopped) } else { Ok(()) }
    }
}

impl Driver for TerminalDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        match self.events_rx.try_recv() {
            Ok(event) => {
                self.forget_finished(&event);
                Ok(Some(event))
            },
            // The driver holds a sender, so the channel never disconnects.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    async fn execute(&mut self, action: ConnectionAction) -> Result<(), Self::Error> {
        self.ensure_running()?;

        match action {
            ConnectionAction::Open { socket, url } => {
                tracing::debug!(%socket, url = %url, "opening socket");
                let handle = transport::spawn_socket(socket, url, self.events_tx.clone());
                self.sockets.insert(socket, handle);
            },
            ConnectionAction::Send { socket, text } => match self.sockets.get(&socket) {
                Some(handle) => {
                    if let Err(e) = handle.send(text) {
                        tracing::warn!(%socket, error = %e, "frame not delivered to socket task");
                    }
                },
                None => tracing::warn!(%socket, "send on unknown socket"),
            },
            ConnectionAction::Close { socket } => {
                if let Some(handle) = self.sockets.remove(&socket) {
                    handle.close();
                }
            },
        }
        Ok(())
    }

    fn request_token(&mut self, request: TokenRequest) -> Result<(), Self::Error> {
        self.ensure_running()?;

        let tokens = Arc::clone(&self.tokens);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = tokens.get().await;
            let _ = events.send(DriverEvent::TokenLoaded { request, result });
        });
        Ok(())
    }

    fn submit(&mut self, request: ApiRequest) -> Result<(), Self::Error> {
        self.ensure_running()?;

        tracing::debug!(kind = request.kind(), "REST request");
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let response = request.perform(api.as_ref()).await;
            let _ = events.send(DriverEvent::Api(response));
        });
        Ok(())
    }

    fn render(&mut self, view: &View<'_, Self::Instant>) -> Result<(), Self::Error> {
        let lines = self.screen.update(view);
        if !lines.is_empty() {
            let mut out = io::stdout().lock();
            for line in &lines {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
        }

        let viewed = self.screen.newly_viewed(view);
        if !viewed.is_empty() {
            let _ = self.events_tx.send(DriverEvent::Input(UserInput::Viewed(viewed)));
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for (_, handle) in self.sockets.drain() {
            handle.close();
        }
    }
}

impl Drop for TerminalDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
