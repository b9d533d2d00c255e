//! Controller side of the control channel.
//!
//! The connection lifecycle is a pure state machine, [`ConnectionMachine`]:
//! it takes an [`Input`] (a timer fired, the socket connected, a line
//! arrived) and returns the [`Action`]s to perform. [`SocketClient`] runs it
//! on one task that owns the socket and both timers, so there is never more
//! than one reconnect timer and no callback can observe a half-updated
//! state.
//!
//! ```text
//!               start / reconnect tick / send
//! Disconnected ───────────────────────────────> Connecting
//!      ^                                           │    │
//!      │ connect failed                            │    │ connected
//!      └───────────────────────────────────────────┘    v
//!      ^                                             Connected
//!      └──────────────── error / close ──────────────────┘
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::error::ControlResult;
use super::framing::{read_line, write_line};
use super::protocol::{
    decode_server_line, encode_command, encode_get_status, CommandVerb, ServerLine,
    StatusSnapshot,
};
use super::server::DEFAULT_SOCKET_PATH;

/// Default interval between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Default interval between `getStatus` retries after connecting.
pub const DEFAULT_STATUS_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for one connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Socket open.
    Connected,
}

/// Events reported to the owner of a [`SocketClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The socket connected.
    Connected,
    /// A connected socket was lost or closed.
    Disconnected,
    /// A status line arrived.
    Status(StatusSnapshot),
    /// Any other line arrived.
    Reply(String),
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The client was started.
    Start,
    /// The client was stopped.
    Stop,
    /// A connection attempt succeeded.
    ConnectSucceeded,
    /// A connection attempt failed.
    ConnectFailed,
    /// The open socket failed or was closed by the host.
    ConnectionLost,
    /// The reconnect timer fired.
    ReconnectTick,
    /// The status retry timer fired.
    StatusRetryTick,
    /// A status line arrived.
    StatusReceived(StatusSnapshot),
    /// A non-status line arrived.
    ReplyReceived(String),
    /// The owner asked to send a command.
    Send(CommandVerb),
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the socket; report the result as an [`Input`].
    Connect,
    /// Close the socket.
    CloseSocket,
    /// Start the periodic reconnect timer.
    ArmReconnectTimer,
    /// Stop the reconnect timer.
    CancelReconnectTimer,
    /// Start the periodic status retry timer.
    ArmStatusRetry,
    /// Stop the status retry timer.
    CancelStatusRetry,
    /// Write a `getStatus` request.
    SendGetStatus,
    /// Write a command request.
    SendCommand(CommandVerb),
    /// Report an event to the owner.
    Emit(ClientEvent),
}

/// Pure connection lifecycle logic.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    running: bool,
    reconnect_armed: bool,
    status_pending: bool,
}

impl ConnectionMachine {
    /// A stopped, disconnected machine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            running: false,
            reconnect_armed: false,
            status_pending: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the reconnect timer is armed.
    pub fn reconnect_armed(&self) -> bool {
        self.reconnect_armed
    }

    /// Whether the status retry timer is armed.
    pub fn status_pending(&self) -> bool {
        self.status_pending
    }

    /// Apply one input and return the actions to perform, in order.
    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        let mut actions = Vec::new();

        match input {
            Input::Start => {
                self.running = true;
                self.begin_connect(&mut actions);
                self.arm_reconnect(&mut actions);
            }
            Input::Stop => {
                self.running = false;
                self.cancel_reconnect(&mut actions);
                self.cancel_status_retry(&mut actions);
                if self.state == ConnectionState::Connected {
                    actions.push(Action::CloseSocket);
                    actions.push(Action::Emit(ClientEvent::Disconnected));
                }
                self.state = ConnectionState::Disconnected;
            }
            Input::ConnectSucceeded => {
                if !self.running {
                    actions.push(Action::CloseSocket);
                    self.state = ConnectionState::Disconnected;
                    return actions;
                }
                self.state = ConnectionState::Connected;
                self.cancel_reconnect(&mut actions);
                actions.push(Action::Emit(ClientEvent::Connected));
                actions.push(Action::SendGetStatus);
                self.status_pending = true;
                actions.push(Action::ArmStatusRetry);
            }
            Input::ConnectFailed => {
                self.state = ConnectionState::Disconnected;
                if self.running {
                    self.arm_reconnect(&mut actions);
                }
            }
            Input::ConnectionLost => {
                if self.state != ConnectionState::Connected {
                    return actions;
                }
                self.state = ConnectionState::Disconnected;
                actions.push(Action::CloseSocket);
                self.cancel_status_retry(&mut actions);
                actions.push(Action::Emit(ClientEvent::Disconnected));
                if self.running {
                    self.arm_reconnect(&mut actions);
                }
            }
            Input::ReconnectTick => {
                if self.running {
                    self.begin_connect(&mut actions);
                }
            }
            Input::StatusRetryTick => {
                if self.state == ConnectionState::Connected && self.status_pending {
                    actions.push(Action::SendGetStatus);
                }
            }
            Input::StatusReceived(snapshot) => {
                self.cancel_status_retry(&mut actions);
                actions.push(Action::Emit(ClientEvent::Status(snapshot)));
            }
            Input::ReplyReceived(text) => {
                actions.push(Action::Emit(ClientEvent::Reply(text)));
            }
            Input::Send(verb) => match self.state {
                ConnectionState::Connected => actions.push(Action::SendCommand(verb)),
                _ => {
                    // Dropped; the controller re-sends from its own UI.
                    debug!("Not connected, dropping {}", verb);
                    if self.running {
                        self.begin_connect(&mut actions);
                    }
                }
            },
        }

        actions
    }

    fn begin_connect(&mut self, actions: &mut Vec<Action>) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
            actions.push(Action::Connect);
        }
    }

    fn arm_reconnect(&mut self, actions: &mut Vec<Action>) {
        if !self.reconnect_armed && self.state != ConnectionState::Connected {
            self.reconnect_armed = true;
            actions.push(Action::ArmReconnectTimer);
        }
    }

    fn cancel_reconnect(&mut self, actions: &mut Vec<Action>) {
        if self.reconnect_armed {
            self.reconnect_armed = false;
            actions.push(Action::CancelReconnectTimer);
        }
    }

    fn cancel_status_retry(&mut self, actions: &mut Vec<Action>) {
        if self.status_pending {
            self.status_pending = false;
            actions.push(Action::CancelStatusRetry);
        }
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Client timing and target.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Socket to connect to.
    pub socket_path: PathBuf,
    /// Interval between reconnect attempts while disconnected.
    pub reconnect_interval: Duration,
    /// Interval between `getStatus` retries until a status arrives.
    pub status_retry_interval: Duration,
    /// Deadline for one connection attempt.
    pub connect_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            status_retry_interval: DEFAULT_STATUS_RETRY_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

enum ClientCommand {
    Send(CommandVerb),
    Stop,
}

/// A reconnecting connection to the command server.
///
/// Events (connect, disconnect, status, replies) are delivered on the
/// receiver returned by [`SocketClient::start`]. The client never waits for
/// that receiver to be drained: once 64 events are queued, further events are
/// dropped.
pub struct SocketClient {
    cmd_tx: mpsc::Sender<ClientCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SocketClient {
    /// Start connecting. Must be called from within a tokio runtime.
    pub fn start(settings: ClientSettings) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            machine: ConnectionMachine::new(),
            settings,
            conn: None,
            reconnect: None,
            status_retry: None,
            events_tx,
            state_tx,
        };
        let task = tokio::spawn(driver.run(cmd_rx));

        (
            Self {
                cmd_tx,
                state_rx,
                task,
            },
            events_rx,
        )
    }

    /// Send a command if connected; otherwise trigger a connection attempt
    /// and drop the command.
    pub async fn send(&self, verb: CommandVerb) {
        if self.cmd_tx.send(ClientCommand::Send(verb)).await.is_err() {
            warn!("Client task has stopped, dropping {}", verb);
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Disable reconnects, cancel timers and close the socket.
    pub async fn stop(self) {
        let _ = self.cmd_tx.send(ClientCommand::Stop).await;
        if let Err(e) = self.task.await {
            warn!("Client task ended abnormally: {}", e);
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    buf: Vec<u8>,
}

struct Driver {
    machine: ConnectionMachine,
    settings: ClientSettings,
    conn: Option<Connection>,
    reconnect: Option<Interval>,
    status_retry: Option<Interval>,
    events_tx: mpsc::Sender<ClientEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ClientCommand>) {
        self.feed(Input::Start).await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ClientCommand::Send(verb)) => self.feed(Input::Send(verb)).await,
                    Some(ClientCommand::Stop) | None => {
                        self.feed(Input::Stop).await;
                        break;
                    }
                },
                _ = tick(&mut self.reconnect) => self.feed(Input::ReconnectTick).await,
                _ = tick(&mut self.status_retry) => self.feed(Input::StatusRetryTick).await,
                line = next_line(&mut self.conn) => {
                    let input = match line {
                        Ok(line) => match decode_server_line(&line) {
                            Ok(ServerLine::Status(snapshot)) => Input::StatusReceived(snapshot),
                            Ok(ServerLine::Text(text)) => Input::ReplyReceived(text),
                            Err(e) => {
                                warn!("Discarding line from server: {}", e);
                                continue;
                            }
                        },
                        Err(e) => {
                            info!("Connection to {:?} lost: {}", self.settings.socket_path, e);
                            Input::ConnectionLost
                        }
                    };
                    self.feed(input).await;
                }
            }
        }

        debug!("Client task finished");
    }

    /// Run `input` and every input produced by its actions.
    async fn feed(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            trace!("Client input {:?} in {:?}", input, self.machine.state());
            for action in self.machine.handle(input) {
                if let Some(next) = self.perform(action).await {
                    queue.push_back(next);
                }
            }
            self.state_tx.send_replace(self.machine.state());
        }
    }

    async fn perform(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::Connect => Some(self.connect().await),
            Action::CloseSocket => {
                self.conn = None;
                None
            }
            Action::ArmReconnectTimer => {
                self.reconnect = Some(periodic(self.settings.reconnect_interval));
                None
            }
            Action::CancelReconnectTimer => {
                self.reconnect = None;
                None
            }
            Action::ArmStatusRetry => {
                self.status_retry = Some(periodic(self.settings.status_retry_interval));
                None
            }
            Action::CancelStatusRetry => {
                self.status_retry = None;
                None
            }
            Action::SendGetStatus => self.write(&encode_get_status()).await,
            Action::SendCommand(verb) => self.write(&encode_command(verb)).await,
            Action::Emit(event) => {
                self.emit(event);
                None
            }
        }
    }

    /// Deliver an event without waiting on the owner.
    ///
    /// Events that do not fit are dropped; [`SocketClient::state`] stays
    /// accurate regardless.
    fn emit(&self, event: ClientEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping {:?}", event);
            }
            // The owner dropped the receiver.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    async fn connect(&mut self) -> Input {
        let path = &self.settings.socket_path;
        match tokio::time::timeout(self.settings.connect_timeout, UnixStream::connect(path)).await
        {
            Ok(Ok(stream)) => {
                info!("Connected to {:?}", path);
                let (read_half, write_half) = stream.into_split();
                self.conn = Some(Connection {
                    reader: BufReader::new(read_half),
                    writer: write_half,
                    buf: Vec::new(),
                });
                Input::ConnectSucceeded
            }
            Ok(Err(e)) => {
                debug!("Connect to {:?} failed: {}", path, e);
                Input::ConnectFailed
            }
            Err(_) => {
                debug!("Connect to {:?} timed out", path);
                Input::ConnectFailed
            }
        }
    }

    async fn write(&mut self, line: &str) -> Option<Input> {
        let conn = self.conn.as_mut()?;
        match write_line(&mut conn.writer, line).await {
            Ok(()) => None,
            Err(e) => {
                info!("Write to {:?} failed: {}", self.settings.socket_path, e);
                Some(Input::ConnectionLost)
            }
        }
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_line(conn: &mut Option<Connection>) -> ControlResult<Vec<u8>> {
    let Some(conn) = conn else {
        return std::future::pending().await;
    };
    read_line(&mut conn.reader, &mut conn.buf).await?;
    Ok(std::mem::take(&mut conn.buf))
}
