//! Generic runtime for application orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`ConnectionManager`]: the socket
//! - [`SessionCoordinator`]: authentication, status and the event log
//! - [`ConversationReconciler`]: the open conversation, if any
//! - [`Driver`]: platform-specific I/O
//!
//! Each cycle handles at most one driver event, then pumps the state
//! machines: reconnect timers, status changes, new log entries and typing
//! timers flow down to the reconciler, and the actions they produce flow out
//! to the driver.

use std::time::Duration;

use rendezvous_client::{
    ConnectionStatus, ConversationReconciler, ReconcilerAction, ReconcilerConfig, ReconcilerEvent,
    SessionAction, SessionConfig, SessionCoordinator,
};
use rendezvous_core::{ConnectionConfig, ConnectionManager, env::Environment};
use rendezvous_proto::{ConversationId, InboundEvent};

use crate::{Driver, DriverEvent, Notice, RuntimeError, UserInput, View};

/// Sleep between cycles when the driver has nothing ready.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for every state machine the runtime owns.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Socket and reconnect settings
    pub connection: ConnectionConfig,
    /// Session settings
    pub session: SessionConfig,
    /// Settings for each opened conversation
    pub reconciler: ReconcilerConfig,
}

/// Generic runtime that orchestrates the state machines and a Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment supplying time
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    env: E,
    connection: ConnectionManager<E::Instant>,
    session: SessionCoordinator,
    conversation: Option<ConversationReconciler<E::Instant>>,
    reconciler_config: ReconcilerConfig,
    cursor: u64,
    notices: Vec<Notice>,
    needs_render: bool,
}

type Step<D> = Result<bool, RuntimeError<<D as Driver>::Error>>;

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a runtime. Nothing connects until [`login`](Self::login).
    pub fn new(driver: D, env: E, config: RuntimeConfig) -> Self {
        let mut connection = ConnectionManager::new(config.connection);
        let mut session = SessionCoordinator::new(config.session);
        session.attach(&mut connection);

        Self {
            driver,
            env,
            connection,
            session,
            conversation: None,
            reconciler_config: config.reconciler,
            cursor: 0,
            notices: Vec::new(),
            needs_render: true,
        }
    }

    /// Run until the user quits.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn run(mut self) -> Result<(), RuntimeError<D::Error>> {
        self.pump().await?;

        loop {
            if self.step().await? {
                break;
            }
        }

        self.shutdown().await
    }

    /// Process one cycle: at most one driver event, then a pump.
    ///
    /// Returns `true` if the user asked to quit. When no event was ready the
    /// runtime sleeps for [`IDLE_INTERVAL`] before pumping, so timers advance.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn step(&mut self) -> Step<D> {
        match self.driver.poll_event().await.map_err(RuntimeError::driver)? {
            Some(event) => {
                if self.handle_event(event)? {
                    return Ok(true);
                }
            },
            None => self.env.sleep(IDLE_INTERVAL).await,
        }

        self.pump().await?;
        Ok(false)
    }

    /// Feed the authentication signal as true.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn login(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.session.set_authenticated(&mut self.connection, true);
        self.pump().await
    }

    /// Feed the authentication signal as false.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn logout(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.session.set_authenticated(&mut self.connection, false);
        self.pump().await
    }

    /// Mount a conversation view, unmounting any current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn open_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<(), RuntimeError<D::Error>> {
        self.unmount_conversation();

        let mut reconciler = ConversationReconciler::new(conversation_id, self.reconciler_config.clone());
        reconciler.handle(ReconcilerEvent::StatusChanged(self.session.status()));
        let actions = reconciler.handle(ReconcilerEvent::Mounted);
        self.conversation = Some(reconciler);
        // Events logged before the view opened belong to no view.
        self.cursor = self.session.log().last_seq();

        self.apply_reconciler_actions(actions);
        self.needs_render = true;
        self.pump().await
    }

    /// Unmount the current conversation view.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    pub async fn close_conversation(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.unmount_conversation();
        self.needs_render = true;
        self.pump().await
    }

    /// Session status.
    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    /// The connection manager.
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    /// The connection manager, mutably, for registering extra handlers.
    pub fn connection_mut(&mut self) -> &mut ConnectionManager<E::Instant> {
        &mut self.connection
    }

    /// The session coordinator.
    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    /// The open conversation.
    pub fn conversation(&self) -> Option<&ConversationReconciler<E::Instant>> {
        self.conversation.as_ref()
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// The environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    fn handle_event(&mut self, event: DriverEvent) -> Step<D> {
        let now = self.env.now();

        match event {
            DriverEvent::SocketOpened(socket) => self.connection.handle_open(socket),
            DriverEvent::SocketOpenFailed { socket, reason } => {
                self.connection.handle_open_failed(socket, &reason, now);
            },
            DriverEvent::SocketText { socket, text } => self.connection.handle_text(socket, &text),
            DriverEvent::SocketError { socket, reason } => self.connection.handle_error(socket, &reason),
            DriverEvent::SocketClosing(socket) => self.connection.handle_closing(socket),
            DriverEvent::SocketClosed { socket, close } => {
                self.connection.handle_closed(socket, &close, now);
            },
            DriverEvent::TokenLoaded { request, result } => {
                self.session.handle_token(&mut self.connection, request, result);
            },
            DriverEvent::Api(response) => self.feed(ReconcilerEvent::from(response)),
            DriverEvent::Input(input) => return Ok(self.handle_input(input, now)),
        }

        Ok(false)
    }

    /// Returns `true` on quit.
    fn handle_input(&mut self, input: UserInput, now: E::Instant) -> bool {
        match input {
            UserInput::Send(content) => {
                let wall_clock_millis = self.env.wall_clock_millis();
                self.feed(ReconcilerEvent::SendRequested { content, wall_clock_millis });
            },
            UserInput::Typed(text) => self.feed(ReconcilerEvent::InputChanged { text, now }),
            UserInput::Viewed(ids) => {
                for id in ids {
                    self.feed(ReconcilerEvent::MessageRendered(id));
                }
            },
            UserInput::Reconnect => {
                self.session.connect();
            },
            UserInput::Disconnect => self.session.disconnect(&mut self.connection),
            UserInput::ClearEvents => {
                self.session.clear_messages();
                self.needs_render = true;
            },
            UserInput::Login => self.session.set_authenticated(&mut self.connection, true),
            UserInput::Logout => self.session.set_authenticated(&mut self.connection, false),
            UserInput::Quit => return true,
        }
        false
    }

    /// Propagate state between the machines and flush their actions.
    async fn pump(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let now = self.env.now();

        self.session.tick(&mut self.connection, now);
        self.session.process_signals();

        for status in self.session.take_status_changes() {
            tracing::debug!(?status, "session status");
            self.needs_render = true;
            self.feed(ReconcilerEvent::StatusChanged(status));
        }

        for event in self.fresh_events() {
            if let InboundEvent::Error { reason } = &event {
                tracing::warn!(%reason, "server reported an error");
                self.notices.push(Notice::ServerError { reason: reason.clone() });
                self.needs_render = true;
            }
            self.feed(ReconcilerEvent::Inbound { event, now });
        }

        self.feed(ReconcilerEvent::Tick(now));
        self.flush().await
    }

    fn fresh_events(&mut self) -> Vec<InboundEvent> {
        let log = self.session.log();
        if let Some(first) = log.first_retained_seq()
            && first > self.cursor + 1
            && self.cursor < log.last_seq()
        {
            tracing::warn!(missed = first - self.cursor - 1, "event log trimmed past cursor");
        }

        let events: Vec<InboundEvent> =
            self.session.events_since(self.cursor).map(|entry| entry.event.clone()).collect();
        self.cursor = self.session.log().last_seq();
        events
    }

    fn feed(&mut self, event: ReconcilerEvent<E::Instant>) {
        let Some(conversation) = self.conversation.as_mut() else {
            return;
        };
        let actions = conversation.handle(event);
        self.apply_reconciler_actions(actions);
    }

    fn apply_reconciler_actions(&mut self, actions: Vec<ReconcilerAction>) {
        for action in actions {
            match action {
                ReconcilerAction::SendFrame(frame) => {
                    self.session.send_message(&mut self.connection, &frame);
                },
                ReconcilerAction::Api(request) => {
                    tracing::debug!(kind = request.kind(), "submitting request");
                    if let Err(error) = self.driver.submit(request) {
                        tracing::warn!(%error, "failed to submit request");
                    }
                },
                ReconcilerAction::ListChanged | ReconcilerAction::TypingChanged(_) => {
                    self.needs_render = true;
                },
                ReconcilerAction::SendFailed { content, reason, .. } => {
                    self.notices.push(Notice::SendFailed { content, reason });
                    self.needs_render = true;
                },
                ReconcilerAction::HistoryFailed { reason } => {
                    self.notices.push(Notice::HistoryFailed { reason });
                    self.needs_render = true;
                },
            }
        }
    }

    /// Execute pending session and connection actions, then render.
    async fn flush(&mut self) -> Result<(), RuntimeError<D::Error>> {
        for action in self.session.take_actions() {
            match action {
                SessionAction::FetchToken(request) => {
                    self.driver.request_token(request).map_err(RuntimeError::driver)?;
                },
            }
        }

        for action in self.connection.take_actions() {
            self.driver.execute(action).await.map_err(RuntimeError::driver)?;
        }

        if self.needs_render {
            self.needs_render = false;
            let view = View {
                status: self.session.status(),
                socket_state: self.connection.socket_state(),
                conversation: self.conversation.as_ref(),
                notices: &self.notices,
            };
            self.driver.render(&view).map_err(RuntimeError::driver)?;
            self.notices.clear();
        }

        Ok(())
    }

    fn unmount_conversation(&mut self) {
        if let Some(mut conversation) = self.conversation.take() {
            let actions = conversation.handle(ReconcilerEvent::Unmounted);
            self.apply_reconciler_actions(actions);
        }
    }

    async fn shutdown(mut self) -> Result<(), RuntimeError<D::Error>> {
        self.unmount_conversation();
        self.session.detach(&mut self.connection);
        self.connection.disconnect();
        self.flush().await?;
        self.driver.stop();
        Ok(())
    }
}
