//! Socket producer.
//!
//! A background thread listens on a TCP port, accepts one peer at a time and
//! reads ASCII command lines from it. The newest complete line of each read
//! is parsed and offered to the [`RecordPublisher`]. Text left without a
//! newline when the peer closes is parsed as a final line.
//!
//! Every receive is bounded by the poll period, so a stop request is seen
//! within one period. Stopping sets the stop flag, wakes the condition
//! variable and shuts the peer socket down to unblock a pending read, then
//! joins the thread. The listener is owned by the thread and closed when it
//! exits.

use super::{ProducerError, RecordPublisher, parse_command_line};
use crate::throttle::LogThrottle;
use relay_common::consts::{DIAGNOSTIC_THROTTLE_MS, SOCKET_IDLE_THROTTLE_MS, SOCKET_READ_BUFFER_BYTES};
use relay_common::relay::config::{SocketConfig, StalenessPolicy};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Totals reported by the receiver thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Peers accepted.
    pub connections: u64,
    /// Command lines parsed and offered.
    pub lines: u64,
    /// Lines that failed to parse.
    pub malformed: u64,
    /// Records discarded for having the wrong length.
    pub rejected: u64,
    /// Sentinel records published on timeout or failure.
    pub sentinels: u64,
}

#[derive(Debug, Default)]
struct StopState {
    stop: bool,
    peer: Option<TcpStream>,
}

#[derive(Debug, Default)]
struct StopSignal {
    state: Mutex<StopState>,
    wake: Condvar,
}

impl StopSignal {
    fn lock(&self) -> MutexGuard<'_, StopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`. Returns `true` once a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |state| !state.stop)
            .unwrap_or_else(PoisonError::into_inner);
        guard.stop
    }

    /// Remember the current peer so `stop()` can unblock its read.
    /// Returns `false` if a stop already happened.
    fn register_peer(&self, peer: TcpStream) -> bool {
        let mut state = self.lock();
        if state.stop {
            return false;
        }
        state.peer = Some(peer);
        true
    }

    fn clear_peer(&self) {
        self.lock().peer = None;
    }
}

/// Settings of one receiver thread.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    /// Receive poll period.
    pub poll_period: Duration,
    /// Behavior on receive timeout or failure.
    pub staleness: StalenessPolicy,
    /// Delay before the first receive.
    pub start_delay: Duration,
}

/// Running socket producer. Stops (and joins) on drop.
#[derive(Debug)]
pub struct SocketProducer {
    component: String,
    local_addr: SocketAddr,
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<ReceiverStats>>,
}

impl SocketProducer {
    /// Bind the listener and start the receiver thread.
    ///
    /// # Errors
    /// - `ProducerError::InvalidAddress` if `bind_address:port` does not parse
    /// - `ProducerError::Bind` if the socket cannot be set up (e.g. port in use)
    /// - `ProducerError::Spawn` if the thread cannot be started
    pub fn start(
        config: &SocketConfig,
        settings: ReceiverSettings,
        publisher: RecordPublisher,
    ) -> Result<Self, ProducerError> {
        let component = publisher.component().to_string();
        let listener = bind_listener(&config.bind_address, config.port)?;
        let local_addr = listener.local_addr().map_err(|source| ProducerError::Bind {
            addr: SocketAddr::from(([0, 0, 0, 0], config.port)),
            source,
        })?;

        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(format!("{component}-rx"))
            .spawn(move || {
                let mut receiver = Receiver::new(listener, thread_signal, settings, publisher);
                receiver.run();
                receiver.stats
            })
            .map_err(ProducerError::Spawn)?;

        info!("{}: listening on {}", component, local_addr);
        Ok(Self {
            component,
            local_addr,
            signal,
            thread: Some(thread),
        })
    }

    /// Address the listener is bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `true` until `stop()` has joined the thread.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop and join the receiver thread. Idempotent.
    ///
    /// Returns the thread's totals on the first call, `None` afterwards or
    /// if the thread panicked.
    pub fn stop(&mut self) -> Option<ReceiverStats> {
        let handle = self.thread.take()?;

        {
            let mut state = self.signal.lock();
            state.stop = true;
            if let Some(peer) = state.peer.take() {
                if let Err(e) = peer.shutdown(Shutdown::Both) {
                    warn!("{}: peer shutdown failed: {}", self.component, e);
                }
            }
        }
        self.signal.wake.notify_all();

        match handle.join() {
            Ok(stats) => {
                info!(
                    "{}: receiver stopped ({} connections, {} lines, {} rejected)",
                    self.component, stats.connections, stats.lines, stats.rejected
                );
                Some(stats)
            }
            Err(_) => {
                warn!("{}: receiver thread panicked", self.component);
                None
            }
        }
    }
}

impl Drop for SocketProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_listener(bind_address: &str, port: u16) -> Result<TcpListener, ProducerError> {
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|_| ProducerError::InvalidAddress(format!("{bind_address}:{port}")))?;
    let bind_err = |source: io::Error| ProducerError::Bind { addr, source };

    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(1).map_err(bind_err)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true).map_err(bind_err)?;
    Ok(listener)
}

enum Receive {
    Data(usize),
    Idle,
    Closed,
    Failed(io::Error),
}

struct Receiver {
    listener: TcpListener,
    signal: Arc<StopSignal>,
    settings: ReceiverSettings,
    publisher: RecordPublisher,
    peer: Option<TcpStream>,
    pending: String,
    idle_throttle: LogThrottle,
    error_throttle: LogThrottle,
    stats: ReceiverStats,
}

impl Receiver {
    fn new(
        listener: TcpListener,
        signal: Arc<StopSignal>,
        settings: ReceiverSettings,
        publisher: RecordPublisher,
    ) -> Self {
        Self {
            listener,
            signal,
            settings,
            publisher,
            peer: None,
            pending: String::new(),
            idle_throttle: LogThrottle::from_millis(SOCKET_IDLE_THROTTLE_MS),
            error_throttle: LogThrottle::from_millis(DIAGNOSTIC_THROTTLE_MS),
            stats: ReceiverStats::default(),
        }
    }

    fn component(&self) -> &str {
        self.publisher.component()
    }

    fn run(&mut self) {
        if !self.settings.start_delay.is_zero() {
            info!(
                "{}: starting receiver in {:.1} s",
                self.component(),
                self.settings.start_delay.as_secs_f64()
            );
            if self.signal.wait(self.settings.start_delay) {
                return;
            }
        }

        info!("{}: receiving data", self.component());
        let mut buffer = [0u8; SOCKET_READ_BUFFER_BYTES];

        while !self.signal.wait(self.settings.poll_period) {
            let outcome = match self.peer.as_mut() {
                Some(peer) => match peer.read(&mut buffer) {
                    Ok(0) => Receive::Closed,
                    Ok(n) => Receive::Data(n),
                    Err(e) if is_timeout(&e) => Receive::Idle,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Receive::Failed(e),
                },
                None => match self.listener.accept() {
                    Ok((peer, addr)) => {
                        if !self.attach_peer(peer, addr) {
                            break;
                        }
                        continue;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Receive::Idle,
                    Err(e) => Receive::Failed(e),
                },
            };

            match outcome {
                Receive::Data(n) => self.handle_data(&buffer[..n]),
                Receive::Idle => {
                    if let Some(suppressed) = self.idle_throttle.ready() {
                        debug!(
                            "{}: data not yet received from socket ({} similar suppressed)",
                            self.component(),
                            suppressed
                        );
                    }
                    self.on_stale();
                }
                Receive::Closed => {
                    info!("{}: peer disconnected", self.component());
                    self.flush_pending();
                    self.detach_peer();
                    self.on_stale();
                }
                Receive::Failed(e) => {
                    if let Some(suppressed) = self.error_throttle.ready() {
                        warn!(
                            "{}: receive failed: {} ({} similar suppressed)",
                            self.component(),
                            e,
                            suppressed
                        );
                    }
                    self.detach_peer();
                    self.on_stale();
                }
            }
        }

        self.stats.rejected = self.publisher.rejected();
    }

    fn attach_peer(&mut self, peer: TcpStream, addr: SocketAddr) -> bool {
        if let Err(e) = configure_peer(&peer, self.settings.poll_period) {
            warn!("{}: rejecting peer {}: {}", self.component(), addr, e);
            return true;
        }
        let Ok(handle) = peer.try_clone() else {
            warn!("{}: rejecting peer {}: cannot clone stream", self.component(), addr);
            return true;
        };
        if !self.signal.register_peer(handle) {
            return false;
        }

        info!("{}: peer {} connected", self.component(), addr);
        self.stats.connections += 1;
        self.pending.clear();
        self.peer = Some(peer);
        true
    }

    fn detach_peer(&mut self) {
        if self.peer.take().is_some() {
            self.signal.clear_peer();
        }
        self.pending.clear();
    }

    fn handle_data(&mut self, bytes: &[u8]) {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        if let Some(line) = take_last_line(&mut self.pending) {
            self.deliver_line(&line);
        }

        if self.pending.len() > SOCKET_READ_BUFFER_BYTES {
            warn!(
                "{}: dropping {} bytes without line terminator",
                self.component(),
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// A peer closing after an unterminated line still delivers it.
    fn flush_pending(&mut self) {
        let line = self.pending.trim().to_string();
        self.pending.clear();
        if !line.is_empty() {
            self.deliver_line(&line);
        }
    }

    fn deliver_line(&mut self, line: &str) {
        match parse_command_line(line) {
            Ok(values) => {
                self.stats.lines += 1;
                self.publisher.offer(&values);
            }
            Err(e) => {
                self.stats.malformed += 1;
                if let Some(suppressed) = self.error_throttle.ready() {
                    warn!(
                        "{}: malformed command {:?}: {} ({} similar suppressed)",
                        self.component(),
                        line,
                        e,
                        suppressed
                    );
                }
            }
        }
    }

    fn on_stale(&mut self) {
        if self.settings.staleness == StalenessPolicy::Reset {
            self.publisher.publish_sentinel();
            self.stats.sentinels += 1;
        }
    }
}

fn configure_peer(peer: &TcpStream, poll_period: Duration) -> io::Result<()> {
    peer.set_nonblocking(false)?;
    peer.set_read_timeout(Some(poll_period))?;
    peer.set_nodelay(true)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Remove every complete line from `pending` and return the newest
/// non-blank one. Text after the last newline stays pending.
fn take_last_line(pending: &mut String) -> Option<String> {
    let end = pending.rfind('\n')?;
    let line = pending[..end]
        .rsplit('\n')
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string);
    pending.drain(..=end);
    line
}
