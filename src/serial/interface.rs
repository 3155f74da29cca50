use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serialport::SerialPort;

use super::{Result, SerialError};

// Inhaler sensor defaults
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const MAX_PARTIAL_BYTES: usize = 8192;
const PARTIAL_KEEP_BYTES: usize = 4096;
const READ_CHUNK_BYTES: usize = 256;

/// Byte-level access to an open serial channel.
///
/// Implemented for `serialport` ports; tests provide scripted fakes.
pub trait SerialPortIO: Send {
    /// Number of bytes waiting in the driver's input buffer. Must not block.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read into `buf`, blocking at most the channel's read timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl SerialPortIO for Box<dyn SerialPort> {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut **self, buf)
    }
}

/// Opens a serial channel by port name.
pub trait PortOpener: Send + Sync {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPortIO>>;
}

/// Opens real ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SystemPortOpener {
    pub read_timeout: Duration,
}

impl Default for SystemPortOpener {
    fn default() -> Self {
        Self { read_timeout: DEFAULT_READ_TIMEOUT }
    }
}

impl PortOpener for SystemPortOpener {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPortIO>> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        Ok(Box::new(port))
    }
}

/// Delay between connection attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts; values below 1 still make one attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Serial channel lifecycle: bounded-retry open, readiness checks, line reads.
pub struct ConnectionManager {
    opener: Arc<dyn PortOpener>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    read_timeout: Duration,
}

impl ConnectionManager {
    /// Manager for real serial ports.
    pub fn new(retry: RetryPolicy, read_timeout: Duration) -> Self {
        Self {
            opener: Arc::new(SystemPortOpener { read_timeout }),
            sleeper: Arc::new(ThreadSleeper),
            retry,
            read_timeout,
        }
    }

    /// Manager with injected port access and delay, used by tests and
    /// alternative transports.
    pub fn with_parts(
        opener: Arc<dyn PortOpener>,
        sleeper: Arc<dyn Sleeper>,
        retry: RetryPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self { opener, sleeper, retry, read_timeout }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Open `port_name`, retrying up to the policy's attempt count.
    pub fn open(&self, port_name: &str, baud_rate: u32) -> Result<ConnectionHandle> {
        let attempts = self.retry.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.opener.open(port_name, baud_rate) {
                Ok(io) => {
                    log::info!("Connected to {} at {} baud", port_name, baud_rate);
                    return Ok(ConnectionHandle::new(port_name, io, self.read_timeout));
                }
                Err(e) => {
                    log::warn!(
                        "Attempt {}/{} to connect to {} failed: {}",
                        attempt, attempts, port_name, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        self.sleeper.sleep(self.retry.retry_delay);
                    }
                }
            }
        }

        log::error!("Giving up on {} after {} attempt(s)", port_name, attempts);
        Err(SerialError::ConnectionUnavailable {
            port: port_name.to_string(),
            attempts,
            last_error,
        })
    }
}

/// Requests that a connection close, from any thread.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    /// Invalidated by a transport fault; a new `open` is required.
    Faulted,
    Closed,
}

/// An open serial channel with its partial-line buffer.
pub struct ConnectionHandle {
    port_name: String,
    io: Option<Box<dyn SerialPortIO>>,
    state: HandleState,
    partial: Vec<u8>,
    pending_fault: Option<io::Error>,
    close_signal: CloseSignal,
    read_timeout: Duration,
    utf8_decode_errors: u64,
    partial_buffer_trims: u64,
}

impl ConnectionHandle {
    pub fn new(port_name: &str, io: Box<dyn SerialPortIO>, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.to_string(),
            io: Some(io),
            state: HandleState::Open,
            partial: Vec::new(),
            pending_fault: None,
            close_signal: CloseSignal::default(),
            read_timeout,
            utf8_decode_errors: 0,
            partial_buffer_trims: 0,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn state(&self) -> HandleState {
        self.sync_close_signal_state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.close_signal.clone()
    }

    pub fn utf8_decode_errors(&self) -> u64 {
        self.utf8_decode_errors
    }

    pub fn partial_buffer_trims(&self) -> u64 {
        self.partial_buffer_trims
    }

    /// Whether a complete line is buffered (or a fault is waiting to be
    /// reported by `read_line`). Only drains bytes the driver already holds.
    pub fn is_readable(&mut self) -> bool {
        if !self.ensure_open() {
            return false;
        }
        if self.pending_fault.is_some() || self.has_buffered_line() {
            return true;
        }

        let Some(io) = self.io.as_mut() else {
            return false;
        };

        let waiting = match io.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                self.pending_fault = Some(e);
                return true;
            }
        };
        if waiting == 0 {
            return false;
        }

        let mut buf = vec![0u8; waiting];
        match io.read(&mut buf) {
            Ok(n) => self.push_bytes(&buf[..n]),
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                self.pending_fault = Some(e);
                return true;
            }
        }

        self.has_buffered_line()
    }

    /// Read one newline-terminated line with trailing whitespace removed.
    ///
    /// `Ok(None)` means the read timed out with no complete line.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if !self.ensure_open() {
            return Err(SerialError::Unavailable);
        }
        if let Some(e) = self.pending_fault.take() {
            return Err(self.fault(e));
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut buf = [0u8; READ_CHUNK_BYTES];

        loop {
            if let Some(line) = self.take_buffered_line() {
                return Ok(Some(line));
            }
            if !self.ensure_open() {
                return Err(SerialError::Unavailable);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }

            let Some(io) = self.io.as_mut() else {
                return Err(SerialError::Unavailable);
            };
            match io.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => self.push_bytes(&buf[..n]),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fault(e)),
            }
        }
    }

    /// Release the port. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.close_signal.close();
        if self.io.take().is_some() {
            log::info!("Serial connection to {} closed", self.port_name);
        }
        if self.state == HandleState::Open {
            self.state = HandleState::Closed;
        }
        self.partial.clear();
        self.pending_fault = None;
    }

    fn sync_close_signal_state(&self) -> HandleState {
        if self.state == HandleState::Open && self.close_signal.is_closed() {
            HandleState::Closed
        } else {
            self.state
        }
    }

    /// Applies a pending close request; false when the handle is unusable.
    fn ensure_open(&mut self) -> bool {
        if self.state == HandleState::Open && self.close_signal.is_closed() {
            self.close();
        }
        self.state == HandleState::Open
    }

    fn fault(&mut self, source: io::Error) -> SerialError {
        log::error!("Transport fault on {}: {}", self.port_name, source);
        self.io = None;
        self.state = HandleState::Faulted;
        self.partial.clear();
        SerialError::TransportFault {
            port: self.port_name.clone(),
            source,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);

        // Complete lines are never dropped; only the unterminated tail is capped.
        let tail_start = self
            .partial
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let tail_len = self.partial.len() - tail_start;
        if tail_len > MAX_PARTIAL_BYTES {
            let cut = tail_len - PARTIAL_KEEP_BYTES;
            self.partial.drain(tail_start..tail_start + cut);
            self.partial_buffer_trims += 1;
            log::warn!(
                "Discarded {} bytes without line terminator from {}",
                cut, self.port_name
            );
        }
    }

    fn has_buffered_line(&self) -> bool {
        self.partial.contains(&b'\n')
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.partial.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.partial.drain(..=pos).collect();
        let text = match String::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => {
                self.utf8_decode_errors += 1;
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Some(text.trim_end().to_string())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}
