//! UT382 driver

use tracing::{debug, info};

use super::lcd::{LcdSummary, LcdTable, PAYLOAD_LEN};
use super::monitor::{Average, Monitor};
use super::stream::{RawStream, SyncStream};
use crate::config::Ut382Config;
use crate::error::{LuxError, TransportError};
use crate::transport::{CancelToken, SerialTransport, Transport};

/// Uni-T UT382 USB luxmeter.
///
/// The meter pushes LCD frames on its own once USB mode is enabled, so there
/// is no handshake. Live streams borrow the driver mutably; only one can run
/// at a time.
pub struct Ut382<T: Transport = SerialTransport> {
    pub(super) transport: T,
    pub(super) config: Ut382Config,
    pub(super) table: LcdTable,
    pub(super) cancel: CancelToken,
    alive: bool,
}

impl Ut382<SerialTransport> {
    /// Open `port` at 19200 8N1
    pub fn open(port: &str, config: Ut382Config) -> Result<Self, LuxError> {
        let transport = SerialTransport::open(&config.transport(port))?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> Ut382<T> {
    /// Wrap an already open transport
    pub fn with_transport(transport: T, config: Ut382Config) -> Result<Self, LuxError> {
        let table = LcdTable::ut382()?;
        info!("UT382 decoder ready, {} Hz nominal", config.sample_rate_hz);
        Ok(Self {
            transport,
            config,
            table,
            cancel: CancelToken::new(),
            alive: true,
        })
    }

    /// False once a transport error has been seen
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Settings in use
    pub fn config(&self) -> &Ut382Config {
        &self.config
    }

    /// Token that stops running streams between reads
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Read up to `n` bytes with the current timeout
    pub fn listen(&mut self, n: usize) -> Result<Vec<u8>, LuxError> {
        self.ensure_alive()?;
        let bytes = self.transport.read_bytes(n);
        self.check(bytes)
    }

    /// Apply the segment table to a decoded payload
    pub fn decode_summary(&self, payload: &[u8; PAYLOAD_LEN]) -> LcdSummary {
        self.table.decode_summary(payload)
    }

    /// Chunks of bytes separated by gaps, plus operator guidance while idle
    pub fn live_raw(&mut self) -> RawStream<'_, T> {
        RawStream::new(self)
    }

    /// Validated payloads, resynchronising on any corrupt frame
    pub fn live_sync(&mut self) -> SyncStream<'_, T> {
        SyncStream::new(self)
    }

    /// Timestamped readings, one per frame
    pub fn live_monitor(&mut self) -> Monitor<'_, T> {
        Monitor::new(self)
    }

    /// One reading per full window of `seconds` worth of frames, carrying the mean
    pub fn live_average(&mut self, seconds: f64) -> Average<'_, T> {
        let window = self.config.window_len(seconds);
        Average::new(self, window)
    }

    /// Release the port; streams and reads fail with [`LuxError::Faulted`] afterwards
    pub fn close(&mut self) {
        self.alive = false;
        self.transport.close();
    }

    /// Give the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(super) fn ensure_alive(&self) -> Result<(), LuxError> {
        if self.alive {
            Ok(())
        } else {
            Err(LuxError::Faulted)
        }
    }

    /// Pass a transport result through, killing the driver on error
    pub(super) fn check<V>(&mut self, result: Result<V, TransportError>) -> Result<V, LuxError> {
        result.map_err(|e| {
            debug!("UT382 transport failed: {}", e);
            self.alive = false;
            self.transport.close();
            LuxError::Transport(e)
        })
    }
}
