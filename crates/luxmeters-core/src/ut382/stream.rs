//! Frame acquisition
//!
//! [`RawStream`] splits the byte stream on read gaps. [`SyncStream`] sits on
//! top of it and hunts for a clean 33-byte frame, then reads whole frames
//! until one fails validation.

use tracing::{debug, info, warn};

use super::driver::Ut382;
use super::frame::{decode_raw, FRAME_LEN};
use super::lcd::PAYLOAD_LEN;
use crate::error::LuxError;
use crate::transport::Transport;

/// How to switch the meter into USB streaming mode
pub const USB_MODE_HINT: &str = "Hold menu, click +, 5x menu";

/// Output of the raw stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// Bytes received between two gaps
    Chunk(Vec<u8>),
    /// Nothing arrived; the counter starts at 1
    Waiting(u32),
    /// Sent once after the waiting notices run out
    UsbModeHint,
}

/// Iterator over [`RawEvent`]s
pub struct RawStream<'a, T: Transport> {
    pub(super) meter: &'a mut Ut382<T>,
    buffer: Vec<u8>,
    waiting: u32,
    hinted: bool,
    armed: bool,
    done: bool,
}

impl<'a, T: Transport> RawStream<'a, T> {
    pub(super) fn new(meter: &'a mut Ut382<T>) -> Self {
        Self {
            meter,
            buffer: Vec::new(),
            waiting: 0,
            hinted: false,
            armed: false,
            done: false,
        }
    }

    /// Report an error once and stop
    pub(super) fn fail(&mut self, e: LuxError) -> Option<Result<RawEvent, LuxError>> {
        self.done = true;
        Some(Err(e))
    }

    /// Drop partial input and go back to the short timeout on the next read
    pub(super) fn rearm(&mut self) {
        self.buffer.clear();
        self.armed = false;
    }

    pub(super) fn is_done(&self) -> bool {
        self.done || self.meter.cancel.is_cancelled()
    }

    pub(super) fn finish(&mut self) {
        self.done = true;
    }
}

impl<T: Transport> Iterator for RawStream<'_, T> {
    type Item = Result<RawEvent, LuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.meter.ensure_alive() {
            return self.fail(e);
        }
        if !self.armed {
            let timeout = self.meter.config.sync_timeout();
            let result = self.meter.transport.set_timeout(timeout);
            if let Err(e) = self.meter.check(result) {
                return self.fail(e);
            }
            self.armed = true;
        }

        loop {
            if self.meter.cancel.is_cancelled() {
                debug!("UT382 stream cancelled");
                self.done = true;
                return None;
            }

            let result = self.meter.transport.read_bytes(1);
            let bytes = match self.meter.check(result) {
                Ok(bytes) => bytes,
                Err(e) => return self.fail(e),
            };
            if !bytes.is_empty() {
                self.buffer.extend_from_slice(&bytes);
                continue;
            }

            if !self.buffer.is_empty() {
                return Some(Ok(RawEvent::Chunk(std::mem::take(&mut self.buffer))));
            }
            if self.waiting < self.meter.config.waiting_notices {
                self.waiting += 1;
                info!("Waiting for device... ({})", self.waiting);
                return Some(Ok(RawEvent::Waiting(self.waiting)));
            }
            if !self.hinted {
                self.hinted = true;
                warn!("No data from UT382. Enable USB mode: {}", USB_MODE_HINT);
                return Some(Ok(RawEvent::UsbModeHint));
            }
        }
    }
}

/// Synchronisation state of a [`SyncStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Hunting for a frame boundary with short byte reads
    Resync,
    /// Reading whole frames
    Locked,
}

/// Iterator over validated payloads
pub struct SyncStream<'a, T: Transport> {
    pub(super) raw: RawStream<'a, T>,
    state: SyncState,
}

impl<'a, T: Transport> SyncStream<'a, T> {
    pub(super) fn new(meter: &'a mut Ut382<T>) -> Self {
        Self {
            raw: RawStream::new(meter),
            state: SyncState::Resync,
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    fn fail(&mut self, e: LuxError) -> Option<Result<[u8; PAYLOAD_LEN], LuxError>> {
        self.raw.finish();
        Some(Err(e))
    }

    fn lock(&mut self) -> Result<(), LuxError> {
        let timeout = self.raw.meter.config.locked_timeout();
        let result = self.raw.meter.transport.set_timeout(timeout);
        self.raw.meter.check(result)?;
        self.state = SyncState::Locked;
        debug!("UT382 frame sync locked");
        Ok(())
    }

    fn lose_sync(&mut self, reason: &str) {
        debug!("UT382 lost frame sync: {}", reason);
        self.raw.rearm();
        self.state = SyncState::Resync;
    }
}

impl<T: Transport> Iterator for SyncStream<'_, T> {
    type Item = Result<[u8; PAYLOAD_LEN], LuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                SyncState::Resync => {
                    let chunk = match self.raw.next()? {
                        Ok(RawEvent::Chunk(chunk)) => chunk,
                        Ok(_) => continue,
                        Err(e) => return Some(Err(e)),
                    };
                    if chunk.len() != FRAME_LEN {
                        debug!("skipping {} byte chunk while resyncing", chunk.len());
                        continue;
                    }
                    let (payload, anomalies) = decode_raw(&chunk);
                    if !anomalies.is_empty() {
                        debug!("skipping malformed chunk: {}", anomalies[0]);
                        continue;
                    }
                    if let Err(e) = self.lock() {
                        return self.fail(e);
                    }
                    return Some(Ok(payload));
                }
                SyncState::Locked => {
                    if self.raw.is_done() {
                        return None;
                    }
                    let result = self.raw.meter.transport.read_bytes(FRAME_LEN);
                    let bytes = match self.raw.meter.check(result) {
                        Ok(bytes) => bytes,
                        Err(e) => return self.fail(e),
                    };
                    if bytes.len() < FRAME_LEN {
                        self.lose_sync(&format!("short read of {} bytes", bytes.len()));
                        continue;
                    }
                    let (payload, anomalies) = decode_raw(&bytes);
                    if let Some(anomaly) = anomalies.first() {
                        self.lose_sync(&anomaly.to_string());
                        continue;
                    }
                    return Some(Ok(payload));
                }
            }
        }
    }
}
