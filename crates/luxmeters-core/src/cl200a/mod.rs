//! Konica Minolta CL-200A chroma meter
//!
//! ASCII command/response protocol over 9600 baud, 7E1. Frames are
//! `STX body ETX BCC CR LF`; see [`commands`] for the command table and
//! [`frame`] for the response layout.

pub mod color;
pub mod commands;
mod driver;
pub mod frame;

pub use color::{cct_with, get_cct, CctMethod};
pub use commands::CommandId;
pub use driver::{Cl200a, EvTcpDeltaUv, HandshakeState, Xyz};
pub use frame::MeasurementFrame;
