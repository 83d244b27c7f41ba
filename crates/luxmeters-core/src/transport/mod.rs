//! Serial transport
//!
//! Both instruments talk over a plain serial line. Drivers only see the
//! [`Transport`] trait so they can run against a real port, a simulated
//! device or a scripted test double.

pub mod serial;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use serial::{find_ports_by_manufacturer, list_ports, PortInfo, SerialTransport};

/// Byte-level access to one instrument.
///
/// Implementations own their handle exclusively. Reads never fail on a plain
/// timeout; they return whatever arrived, possibly nothing.
pub trait Transport: Send {
    /// Write a complete command, then wait `settle` before returning.
    ///
    /// The settle time is part of the instrument protocol: the CL-200A needs a
    /// minimum gap between commands.
    fn write(&mut self, bytes: &[u8], settle: Duration) -> Result<(), TransportError>;

    /// Read up to and including `\n`. Empty when nothing arrived before the timeout.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Read up to `n` bytes; fewer when the timeout expires first.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Discard unread input and unsent output
    fn reset_buffers(&mut self) -> Result<(), TransportError>;

    /// Change the read timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Release the handle. Calling it twice is a no-op.
    fn close(&mut self);

    /// Whether the handle is still open
    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8], settle: Duration) -> Result<(), TransportError> {
        (**self).write(bytes, settle)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).read_line()
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read_bytes(n)
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        (**self).reset_buffers()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_timeout(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteSize {
    Seven,
    Eight,
}

impl From<ByteSize> for serialport::DataBits {
    fn from(size: ByteSize) -> Self {
        match size {
            ByteSize::Seven => serialport::DataBits::Seven,
            ByteSize::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Line settings used to open a [`SerialTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Port name (e.g. "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
    /// Data bits
    pub byte_size: ByteSize,
    /// Read timeout
    pub timeout: Duration,
}

impl TransportConfig {
    /// 8N1 settings on `port`
    pub fn new(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            parity: Parity::None,
            byte_size: ByteSize::Eight,
            timeout,
        }
    }

    /// Override the parity
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Override the byte size
    pub fn byte_size(mut self, byte_size: ByteSize) -> Self {
        self.byte_size = byte_size;
        self
    }
}

/// Shared flag that stops live sample streams between reads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every stream holding a clone of this token to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod script {
    //! Scripted transport for unit tests

    use std::collections::VecDeque;
    use std::time::Duration;

    use super::Transport;
    use crate::error::TransportError;

    /// One scripted reply to a read call
    #[derive(Debug)]
    pub enum Reply {
        Bytes(Vec<u8>),
        Fail,
    }

    /// Buffer resets and writes in the order the driver issued them
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Reset,
        Write(Vec<u8>),
    }

    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        pub replies: VecDeque<Reply>,
        pub written: Vec<(Vec<u8>, Duration)>,
        pub events: Vec<Event>,
        pub timeouts: Vec<Duration>,
        pub fail_writes: bool,
        pub closed: bool,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, bytes: impl Into<Vec<u8>>) -> Self {
            self.replies.push_back(Reply::Bytes(bytes.into()));
            self
        }

        pub fn fail(mut self) -> Self {
            self.replies.push_back(Reply::Fail);
            self
        }

        fn next_reply(&mut self) -> Result<Vec<u8>, TransportError> {
            match self.replies.pop_front() {
                Some(Reply::Bytes(bytes)) => Ok(bytes),
                Some(Reply::Fail) => Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                ))),
                None => Ok(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, bytes: &[u8], settle: Duration) -> Result<(), TransportError> {
            if self.fail_writes {
                return Err(TransportError::Closed);
            }
            self.written.push((bytes.to_vec(), settle));
            self.events.push(Event::Write(bytes.to_vec()));
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
            self.events.push(Event::Reset);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_transport_config_builder() {
        let config = TransportConfig::new("/dev/ttyUSB0", 9600, Duration::from_secs(3))
            .parity(Parity::Even)
            .byte_size(ByteSize::Seven);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.byte_size, ByteSize::Seven);
        assert_eq!(serialport::DataBits::from(config.byte_size), serialport::DataBits::Seven);
    }
}
