//! Mock transport shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use luxmeters_core::error::TransportError;
use luxmeters_core::transport::Transport;

/// Mock serial port: every read pops one scripted reply
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: VecDeque<Option<Vec<u8>>>,
    pub sent: Vec<Vec<u8>>,
    pub settles: Vec<Duration>,
    pub timeouts: Vec<Duration>,
    /// `sent.len()` at each buffer reset
    pub resets: Vec<usize>,
    send_limit: Option<usize>,
    pub closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next read returns `bytes`
    pub fn respond(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.replies.push_back(Some(bytes.into()));
        self
    }

    /// Next read times out
    pub fn gap(self) -> Self {
        self.respond(Vec::new())
    }

    /// One read per byte, then a gap
    pub fn trickle(mut self, bytes: &[u8]) -> Self {
        for byte in bytes {
            self = self.respond(vec![*byte]);
        }
        self.gap()
    }

    /// Next read fails as if the cable was pulled
    pub fn unplug(mut self) -> Self {
        self.replies.push_back(None);
        self
    }

    /// Writes fail once `n` frames have gone out
    pub fn cut_after_writes(mut self, n: usize) -> Self {
        self.send_limit = Some(n);
        self
    }

    fn next_reply(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.replies.pop_front() {
            Some(Some(bytes)) => Ok(bytes),
            Some(None) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "cable pulled",
            ))),
            None => Ok(Vec::new()),
        }
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8], settle: Duration) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.send_limit.is_some_and(|n| self.sent.len() >= n) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write to unplugged port",
            )));
        }
        self.sent.push(bytes.to_vec());
        self.settles.push(settle);
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.next_reply()
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut bytes = self.next_reply()?;
        bytes.truncate(n);
        Ok(bytes)
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.resets.push(self.sent.len());
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeouts.push(timeout);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Route driver logs to the test output
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
