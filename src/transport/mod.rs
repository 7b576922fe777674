pub mod config;
pub mod protocol;

pub use config::{LinkConfig, LinkMode};

use crate::provider::emulator::SampleBuffer;
use protocol::{decode_payload, FRAME_PREFIX_LEN, MAX_FRAME_LEN};
use statum::{machine, state};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// Granularity of the reconnect-delay sleep; the stop flag is re-checked at
// each slice boundary.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to spawn emulator socket thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Connection status of the emulator link, as observed by the provider.
/// Lives inside the shared sample buffer so that link status and samples are
/// always read in one consistent unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Remaining wait before the next connection attempt may start, given the
/// time elapsed since the start of the previous attempt. The interval is
/// measured from attempt start, so a fast-failing attempt still waits out
/// the remainder instead of hot-looping against an unreachable peer.
pub fn next_attempt_delay(elapsed_since_last_start: Duration, min_interval: Duration) -> Duration {
    min_interval.saturating_sub(elapsed_since_last_start)
}

// Define socket states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum SocketState {
    Initializing,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct EventSocket<S: SocketState> {
    // Connection settings
    link_config: LinkConfig,

    // Shared raw-sample buffer owned by the emulator provider
    buffer: SampleBuffer,

    // Cooperative stop flag, checked at every blocking-read boundary
    stop: Arc<AtomicBool>,

    // Start time of the most recent connection attempt
    last_attempt: Option<Instant>,

    // Rate-limiting for duplicate failure logs
    connect_failure_logged: bool,
    forward_failure_logged: bool,
}

impl EventSocket<Initializing> {
    pub fn create(link_config: LinkConfig, buffer: SampleBuffer, stop: Arc<AtomicBool>) -> Self {
        debug!(
            "Creating emulator event socket for {}:{}",
            link_config.host(),
            link_config.port
        );
        Self::new(link_config, buffer, stop, None, false, false)
    }

    pub fn initialize(self) -> EventSocket<Running> {
        info!(
            "Emulator event socket initialized ({:?} mode), transitioning to Running state",
            self.link_config.mode
        );
        self.transition()
    }
}

impl EventSocket<Running> {
    /// Connection loop: forward, dial, read frames, reconnect. Runs until
    /// the stop flag is observed.
    pub fn run_socket_loop(&mut self) {
        info!("Starting emulator event socket loop");

        while !self.stop.load(Ordering::Relaxed) {
            self.wait_for_retry_window();
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            self.last_attempt = Some(Instant::now());
            self.buffer.set_link_status(LinkStatus::Connecting);

            // Forwarding is re-attempted on every cycle; the device may have
            // been unplugged and reattached since the last attempt.
            if self.link_config.mode == LinkMode::Usb {
                self.setup_port_forwarding();
            }

            match self.connect() {
                Ok(stream) => {
                    info!(
                        "Connected to emulator event stream at {}:{}",
                        self.link_config.host(),
                        self.link_config.port
                    );
                    self.connect_failure_logged = false;
                    self.buffer.set_link_status(LinkStatus::Connected);

                    let frames = self.read_until_disconnect(stream);

                    self.buffer.set_link_status(LinkStatus::Disconnected);
                    info!("Emulator event stream closed after {} frames", frames);
                }
                Err(e) => {
                    self.buffer.set_link_status(LinkStatus::Disconnected);
                    if !self.connect_failure_logged {
                        warn!(
                            "Error connecting to emulator event stream at {}:{}: {}",
                            self.link_config.host(),
                            self.link_config.port,
                            e
                        );
                        self.connect_failure_logged = true;
                    } else {
                        debug!("Connection attempt failed again: {}", e);
                    }
                }
            }
        }

        self.buffer.set_link_status(LinkStatus::Disconnected);
        info!("Emulator event socket loop stopped");
    }

    // Enforce the minimum interval between attempt starts, sleeping in
    // slices so a stop request is observed promptly.
    fn wait_for_retry_window(&self) {
        let Some(last) = self.last_attempt else {
            return;
        };
        let min_interval = self.link_config.min_retry_interval();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            let remaining = next_attempt_delay(last.elapsed(), min_interval);
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(STOP_POLL_INTERVAL));
        }
    }

    // One-shot `adb forward tcp:<port> tcp:<port>` before dialing over USB.
    // A failure here is a configuration problem, not a reason to stop the
    // connection cycle.
    fn setup_port_forwarding(&mut self) {
        let port_arg = format!("tcp:{}", self.link_config.port);
        debug!(
            "Running {} forward {} {}",
            self.link_config.adb_program, port_arg, port_arg
        );

        let result = Command::new(&self.link_config.adb_program)
            .args(["forward", &port_arg, &port_arg])
            .output();

        match result {
            Ok(output) if output.status.success() => {
                if self.forward_failure_logged {
                    info!("Port forwarding restored");
                    self.forward_failure_logged = false;
                }
            }
            Ok(output) => {
                if !self.forward_failure_logged {
                    error!(
                        "Port forwarding command failed (exit status {}). Check that the \
                         Android platform tools are installed and the device is attached.",
                        output.status
                    );
                    self.forward_failure_logged = true;
                }
            }
            Err(e) => {
                if !self.forward_failure_logged {
                    error!(
                        "Could not run '{}': {}. Check that the Android platform tools are \
                         installed and on PATH.",
                        self.link_config.adb_program, e
                    );
                    self.forward_failure_logged = true;
                }
            }
        }
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        let addr = (self.link_config.host(), self.link_config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "emulator host did not resolve to an address",
                )
            })?;
        let stream = TcpStream::connect_timeout(&addr, self.link_config.read_timeout())?;
        stream.set_read_timeout(Some(self.link_config.read_timeout()))?;
        Ok(stream)
    }

    // Framed read loop. Returns the number of complete frames dispatched.
    // Any short read, timeout, or malformed frame drops the connection; no
    // mid-stream resynchronization is ever attempted.
    fn read_until_disconnect(&mut self, mut stream: TcpStream) -> u64 {
        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        let mut payload = Vec::new();
        let mut frames: u64 = 0;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("Stop requested, closing emulator event socket");
                return frames;
            }

            if !read_full(&mut stream, &mut prefix, &self.stop) {
                warn!("Event socket read failed, treating connection as lost");
                return frames;
            }
            let len = u32::from_be_bytes(prefix) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                warn!("Dropping connection after invalid frame length {}", len);
                return frames;
            }

            payload.resize(len, 0);
            if !read_full(&mut stream, &mut payload, &self.stop) {
                warn!("Event socket read failed, treating connection as lost");
                return frames;
            }

            match decode_payload(&payload) {
                Ok(event) => {
                    // The only cross-thread interaction point: one lock
                    // acquisition per decoded frame.
                    self.buffer.apply(&event);
                    frames += 1;
                }
                Err(e) => {
                    warn!("Malformed event frame ({}), reconnecting", e);
                    return frames;
                }
            }
        }
    }
}

// Reads exactly `buf.len()` bytes. Returns false on EOF, timeout, read
// error, or a stop request observed between reads.
fn read_full(stream: &mut TcpStream, buf: &mut [u8], stop: &Arc<AtomicBool>) -> bool {
    let mut filled = 0;
    while filled < buf.len() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return false,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // Timeouts and hard failures both mean connection loss.
            Err(_) => return false,
        }
    }
    true
}

/// Handle to the background socket thread. Stopping is cooperative: the
/// thread observes the flag at the next read boundary or sleep slice and
/// exits; `shutdown` joins it.
pub struct SocketHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SocketHandle {
    pub fn spawn(link_config: LinkConfig, buffer: SampleBuffer) -> Result<Self, TransportError> {
        info!(
            "Spawning emulator socket thread for {}:{}",
            link_config.host(),
            link_config.port
        );

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("emulator-socket".to_string())
            .spawn(move || {
                let socket = EventSocket::create(link_config, buffer, thread_stop);
                let mut running = socket.initialize();
                running.run_socket_loop();
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Signals the socket thread to stop and waits for it to exit.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Emulator socket thread panicked before shutdown");
            }
        }
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
