//! Uni-T UT382 USB luxmeter
//!
//! The meter mirrors its LCD over USB: each 33-byte frame says which
//! segments are lit, and the reading is rebuilt from the digit and decimal
//! point segments.

mod driver;
pub mod frame;
pub mod lcd;
mod monitor;
mod stream;

pub use driver::Ut382;
pub use frame::{decode_raw, encode_frame, Anomaly, FRAME_LEN};
pub use lcd::{Field, FieldValue, LcdSummary, LcdTable, Meaning, PAYLOAD_LEN};
pub use monitor::{decode_lux, is_integral, Average, LuxReading, Monitor};
pub use stream::{RawEvent, RawStream, SyncState, SyncStream, USB_MODE_HINT};
