#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inhaler_logger_lib::serial::{
    ConnectionHandle, ConnectionManager, PortOpener, RetryPolicy, SerialError, SerialPortIO, Sleeper,
};

pub const SAMPLE_LINE: &str = "2024 12 02 14 30 15 22.5 45.0 1013.0 3.5 2.0";

enum Chunk {
    Data(Vec<u8>),
    Fail(ErrorKind),
}

/// Test-side control of a fake serial port: push bytes or faults, count reads.
#[derive(Clone, Default)]
pub struct PortScript {
    chunks: Arc<Mutex<VecDeque<Chunk>>>,
    reads: Arc<AtomicUsize>,
}

impl PortScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{}\n", line).as_bytes());
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.chunks.lock().unwrap().push_back(Chunk::Data(bytes.to_vec()));
    }

    pub fn push_fault(&self, kind: ErrorKind) {
        self.chunks.lock().unwrap().push_back(Chunk::Fail(kind));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> Box<dyn SerialPortIO> {
        Box::new(ScriptedPort { script: self.clone() })
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new("TEST", self.port(), Duration::from_millis(20))
    }
}

struct ScriptedPort {
    script: PortScript,
}

impl SerialPortIO for ScriptedPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let chunks = self.script.chunks.lock().unwrap();
        Ok(match chunks.front() {
            Some(Chunk::Data(d)) => d.len() as u32,
            Some(Chunk::Fail(_)) => 1,
            None => 0,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.script.reads.fetch_add(1, Ordering::SeqCst);
        let mut chunks = self.script.chunks.lock().unwrap();
        match chunks.pop_front() {
            Some(Chunk::Data(mut d)) => {
                let n = d.len().min(buf.len());
                buf[..n].copy_from_slice(&d[..n]);
                if n < d.len() {
                    chunks.push_front(Chunk::Data(d.split_off(n)));
                }
                Ok(n)
            }
            Some(Chunk::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
        }
    }
}

/// Hands out ports on the given script after a number of failed attempts.
pub struct ScriptOpener {
    script: PortScript,
    failures_left: AtomicU32,
    pub attempts: AtomicU32,
}

impl ScriptOpener {
    pub fn new(script: PortScript, failures: u32) -> Self {
        Self {
            script,
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }
}

impl PortOpener for ScriptOpener {
    fn open(&self, port_name: &str, _baud_rate: u32) -> Result<Box<dyn SerialPortIO>, SerialError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(SerialError::IoError(io::Error::new(
                ErrorKind::NotFound,
                format!("{} not present", port_name),
            )));
        }
        Ok(self.script.port())
    }
}

pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

pub fn scripted_manager(script: PortScript, failures: u32) -> (ConnectionManager, Arc<ScriptOpener>) {
    let opener = Arc::new(ScriptOpener::new(script, failures));
    let manager = ConnectionManager::with_parts(
        opener.clone(),
        Arc::new(NoSleep),
        RetryPolicy { max_retries: 5, retry_delay: Duration::from_secs(2) },
        Duration::from_millis(20),
    );
    (manager, opener)
}
