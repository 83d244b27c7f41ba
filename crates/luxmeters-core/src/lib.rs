//! # luxmeters core library
//!
//! Serial drivers for photometric instruments.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Konica Minolta CL-200A chroma meter: PC connection / hold / EXT mode
//!   handshake, illuminance, XYZ, EV/TCP/Δuv and CCT
//! - Uni-T UT382 USB luxmeter: LCD segment decoding, frame resync, live and
//!   moving-average reading streams
//! - Serial port discovery by USB manufacturer
//! - Simulated devices for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use luxmeters_core::prelude::*;
//!
//! let config = LuxConfig::load(None)?;
//! let mut meter = Cl200a::open("/dev/ttyUSB0", config.cl200a)?;
//! if let Some(lux) = meter.lux()? {
//!     println!("{} lx", lux);
//! }
//! ```

pub mod cl200a;
pub mod config;
pub mod demo;
pub mod error;
pub mod sensor;
pub mod transport;
pub mod ut382;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cl200a::{get_cct, CctMethod, Cl200a, EvTcpDeltaUv, HandshakeState, Xyz};
    pub use crate::config::{Cl200aConfig, HandshakePolicy, LuxConfig, Ut382Config};
    pub use crate::error::{DeviceFault, LuxError, RangeWarning, TransportError};
    pub use crate::sensor::{Capability, Sensor, SensorModel};
    pub use crate::transport::{CancelToken, SerialTransport, Transport};
    pub use crate::ut382::{LuxReading, SyncState, Ut382};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
