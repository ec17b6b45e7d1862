//! Telnet session management
//!
//! Owns one TCP connection and a dedicated worker thread. All socket reads
//! and writes happen on the worker; the owner talks to it through two
//! channels: outbound byte buffers in, [`SessionEvent`]s out.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::iac::{IacDecoder, NegotiationPolicy};
use super::login::{CredentialResponder, PromptKeywords};
use super::protocol::escape_iac;

pub const DEFAULT_PORT: u16 = 23;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Failed to resolve {0}: {1}")]
    Resolve(String, #[source] io::Error),

    #[error("No address found for {0}")]
    NoAddress(String),

    #[error("Failed to connect to {0}: {1}")]
    Connect(String, #[source] io::Error),

    #[error("Connection error: {0}")]
    Transport(#[source] io::Error),

    #[error("Failed to spawn session worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("Session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Connection parameters, fixed for the life of a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParameters {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SessionParameters {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `host:port` as shown in logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Tunables for a session
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Upper bound on each connection attempt
    pub connect_timeout: Duration,
    /// Socket read timeout, i.e. how often the worker checks for shutdown
    /// and outbound data while the peer is silent
    pub poll_interval: Duration,
    pub policy: NegotiationPolicy,
    pub prompts: PromptKeywords,
    /// Appended to each submitted credential
    pub line_ending: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            policy: NegotiationPolicy::default(),
            prompts: PromptKeywords::default(),
            line_ending: "\r\n".to_string(),
        }
    }
}

/// Connection lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    /// Socket is up, the peer's opening negotiation has not been read yet
    Negotiating = 2,
    Connected = 3,
    Closing = 4,
    Errored = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Negotiating,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Closing,
            5 => ConnectionState::Errored,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Events delivered to the owner, in order: `Established`, any number of
/// `Data`, then exactly one of `Closed` or `Error`. A failed connection
/// attempt delivers only `Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    /// Data bytes with Telnet commands removed
    Data(Vec<u8>),
    Error(String),
    Closed,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Error(_) | SessionEvent::Closed)
    }
}

/// State shared between the owner and the worker
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    shutdown: AtomicBool,
    /// Clone of the worker's socket so `disconnect` can unblock a read
    socket: Mutex<Option<TcpStream>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn close_socket(&self) {
        if let Ok(guard) = self.socket.lock() {
            if let Some(socket) = guard.as_ref() {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }
    }
}

/// Cloneable handle for queueing outbound data from any thread
#[derive(Clone, Debug)]
pub struct OutboundSender {
    tx: Sender<Vec<u8>>,
}

impl OutboundSender {
    /// Queue bytes for transmission. Never blocks. IAC bytes are escaped.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx.send(escape_iac(bytes)).map_err(|_| SessionError::Closed)
    }
}

/// A single-use Telnet connection
#[derive(Debug)]
pub struct TelnetSession {
    params: SessionParameters,
    options: SessionOptions,
    shared: Arc<Shared>,
    started: bool,
    outbound_tx: Sender<Vec<u8>>,
    /// Moved to the worker on connect
    outbound_rx: Option<Receiver<Vec<u8>>>,
    event_tx: Option<Sender<SessionEvent>>,
    event_rx: Receiver<SessionEvent>,
    /// Disconnects when the worker has exited
    done_rx: Option<Receiver<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TelnetSession {
    pub fn new(params: SessionParameters) -> Self {
        Self::with_options(params, SessionOptions::default())
    }

    pub fn with_options(params: SessionParameters, options: SessionOptions) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        Self {
            params,
            options,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                shutdown: AtomicBool::new(false),
                socket: Mutex::new(None),
            }),
            started: false,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            event_tx: Some(event_tx),
            event_rx,
            done_rx: None,
            worker: None,
        }
    }

    pub fn parameters(&self) -> &SessionParameters {
        &self.params
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Start the worker. A session can be connected once; later calls fail
    /// with [`SessionError::AlreadyStarted`].
    pub fn connect(&mut self) -> Result<()> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }

        let (Some(outbound_rx), Some(events)) = (self.outbound_rx.take(), self.event_tx.take()) else {
            return Err(SessionError::AlreadyStarted);
        };
        self.started = true;

        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker {
            params: self.params.clone(),
            options: self.options.clone(),
            shared: self.shared.clone(),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx,
            events,
            _done: done_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("telnet-{}", self.params.address()))
            .spawn(move || worker.run())
            .map_err(SessionError::Spawn)?;

        self.done_rx = Some(done_rx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Queue bytes for transmission. Bytes sent before `connect` are
    /// transmitted once the connection is up.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        self.sender().send(bytes)
    }

    /// Handle for sending from other threads
    pub fn sender(&self) -> OutboundSender {
        OutboundSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Ask the worker to stop. Closing the socket interrupts a pending read.
    pub fn disconnect(&self) {
        if self.started {
            debug!("Disconnect requested for {}", self.params.address());
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.close_socket();
    }

    /// Wait for the worker to exit. Returns `false` on timeout. Does not
    /// stop the worker; call [`disconnect`](Self::disconnect) first for a
    /// bounded teardown.
    pub fn join(&mut self, timeout: Duration) -> bool {
        if let Some(done_rx) = &self.done_rx {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                return false;
            }
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Session worker for {} panicked", self.params.address());
            }
        }
        true
    }

    /// Event receiver, for callers that want to block or select
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.event_rx
    }

    /// Next event if one is ready
    pub fn try_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn next_event(&self, timeout: Duration) -> Option<SessionEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for TelnetSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.disconnect();
            let _ = self.join(Duration::from_secs(1));
        }
    }
}

/// Everything the worker thread owns
struct Worker {
    params: SessionParameters,
    options: SessionOptions,
    shared: Arc<Shared>,
    /// Negotiation replies share the queue with user data
    outbound_tx: Sender<Vec<u8>>,
    outbound_rx: Receiver<Vec<u8>>,
    events: Sender<SessionEvent>,
    _done: Sender<()>,
}

impl Worker {
    fn run(self) {
        let address = self.params.address();
        self.shared.set_state(ConnectionState::Connecting);
        info!("Connecting to {}", address);

        let stream = match self.open() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{}", e);
                self.fail(e);
                return;
            }
        };

        self.shared.set_state(ConnectionState::Negotiating);
        info!("Established connection to {}", address);
        self.emit(SessionEvent::Established);

        let result = self.pump(&stream);

        self.shared.set_state(ConnectionState::Closing);
        if let Ok(mut guard) = self.shared.socket.lock() {
            guard.take();
        }
        let _ = stream.shutdown(Shutdown::Both);

        match result {
            Ok(()) => {
                info!("Connection to {} closed", address);
                self.shared.set_state(ConnectionState::Disconnected);
                self.emit(SessionEvent::Closed);
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", address, e);
                self.fail(e);
            }
        }
    }

    fn fail(&self, error: SessionError) {
        self.shared.set_state(ConnectionState::Errored);
        self.emit(SessionEvent::Error(error.to_string()));
    }

    /// Returns `false` once the owner has gone away
    fn emit(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn open(&self) -> Result<TcpStream> {
        let address = self.params.address();
        let addrs: Vec<SocketAddr> = (self.params.host.as_str(), self.params.port)
            .to_socket_addrs()
            .map_err(|e| SessionError::Resolve(address.clone(), e))?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            debug!("Trying {}", addr);
            match TcpStream::connect_timeout(&addr, self.options.connect_timeout) {
                Ok(stream) => {
                    self.prepare(&stream).map_err(|e| SessionError::Connect(address.clone(), e))?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => SessionError::Connect(address, e),
            None => SessionError::NoAddress(address),
        })
    }

    fn prepare(&self, stream: &TcpStream) -> io::Result<()> {
        let interval = self.options.poll_interval.max(Duration::from_millis(1));
        stream.set_read_timeout(Some(interval))?;
        stream.set_nodelay(true)?;

        let clone = stream.try_clone()?;
        if let Ok(mut guard) = self.shared.socket.lock() {
            *guard = Some(clone);
        }
        Ok(())
    }

    /// Read, de-interleave, forward, then drain the outbound queue, until
    /// shutdown or end of stream.
    fn pump(&self, stream: &TcpStream) -> Result<()> {
        let mut stream = stream;
        let mut iac = IacDecoder::new(self.options.policy.clone());
        let mut login = CredentialResponder::new(
            self.params.username.as_deref(),
            self.params.password.as_deref(),
            &self.options.prompts,
            &self.options.line_ending,
        );
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            if self.shared.shutdown_requested() {
                debug!("Shutdown requested");
                return Ok(());
            }

            match stream.read(&mut buffer) {
                Ok(0) => {
                    if !self.shared.shutdown_requested() {
                        info!("Peer closed the connection");
                    }
                    return Ok(());
                }
                Ok(n) => {
                    self.mark_connected();
                    let out = iac.decode(&buffer[..n]);

                    for reply in out.replies {
                        let _ = self.outbound_tx.send(reply);
                    }

                    if !out.data.is_empty() {
                        let answer = login.observe(&out.data);
                        if !self.emit(SessionEvent::Data(out.data)) {
                            debug!("Session owner dropped, stopping");
                            return Ok(());
                        }
                        if let Some(answer) = answer {
                            let _ = self.outbound_tx.send(escape_iac(&answer));
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) =>
                {
                    self.mark_connected();
                }
                Err(e) => return self.transport_error(e),
            }

            if let Err(e) = self.flush_outbound(&mut stream) {
                return self.transport_error(e);
            }
        }
    }

    fn mark_connected(&self) {
        if self.shared.state() == ConnectionState::Negotiating {
            self.shared.set_state(ConnectionState::Connected);
            debug!("Session connected");
        }
    }

    /// Errors caused by our own `disconnect` closing the socket are a clean
    /// close.
    fn transport_error(&self, error: io::Error) -> Result<()> {
        if self.shared.shutdown_requested() {
            Ok(())
        } else {
            Err(SessionError::Transport(error))
        }
    }

    fn flush_outbound(&self, stream: &mut &TcpStream) -> io::Result<()> {
        let mut wrote = false;
        loop {
            match self.outbound_rx.try_recv() {
                Ok(bytes) => {
                    stream.write_all(&bytes)?;
                    wrote = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if wrote {
            stream.flush()?;
        }
        Ok(())
    }
}
