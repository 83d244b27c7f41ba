//! Demo Mode - simulated instruments for running without hardware
//!
//! Both simulators implement [`Transport`], so the real drivers run on top of
//! them unchanged. Readings wander around a nominal illuminance with random
//! jitter.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::cl200a::commands::{frame, unframe};
use crate::cl200a::{get_cct, CommandId};
use crate::error::TransportError;
use crate::transport::Transport;
use crate::ut382::{encode_frame, Field, LcdTable, Meaning};

/// Chromaticity of the simulated light source (warm white, about 4000 K)
const SOURCE_XY: (f64, f64) = (0.38, 0.38);

/// Simulated CL-200A.
///
/// Answers the handshake and EXT mode commands like a healthy meter and
/// returns a fresh measurement after every EXT trigger. Settle times are not
/// simulated.
pub struct SimulatedCl200a {
    nominal_lux: f64,
    jitter: f64,
    battery_low: bool,
    /// Lines waiting to be read
    pending: VecDeque<Vec<u8>>,
    /// Illuminance latched by the last EXT trigger
    latched_lux: Option<f64>,
    open: bool,
    rng: StdRng,
}

impl SimulatedCl200a {
    /// A meter reading around `nominal_lux`
    pub fn new(nominal_lux: f64) -> Self {
        Self::with_rng(nominal_lux, StdRng::from_entropy())
    }

    /// Deterministic variant for tests
    pub fn seeded(nominal_lux: f64, seed: u64) -> Self {
        Self::with_rng(nominal_lux, StdRng::seed_from_u64(seed))
    }

    fn with_rng(nominal_lux: f64, rng: StdRng) -> Self {
        Self {
            nominal_lux,
            jitter: 0.02,
            battery_low: false,
            pending: VecDeque::new(),
            latched_lux: None,
            open: true,
            rng,
        }
    }

    /// Relative jitter, 0.02 means ±2 %
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    /// Raise the battery flag in every measurement
    pub fn battery_low(mut self, low: bool) -> Self {
        self.battery_low = low;
        self
    }

    fn handle(&mut self, command: CommandId) {
        match command {
            CommandId::PcConnect => self.pending.push_back(CommandId::PcConnectAck.frame()),
            CommandId::SetExtMode => self.pending.push_back(frame(b"004010  ")),
            CommandId::Hold | CommandId::PcConnectAck => {}
            CommandId::ExtTrigger => {
                let delta = self.rng.gen_range(-self.jitter..=self.jitter);
                self.latched_lux = Some(self.nominal_lux * (1.0 + delta));
            }
            CommandId::ReadLux | CommandId::ReadXyz | CommandId::ReadEvTcpDeltaUv => {
                let Some(lux) = self.latched_lux.take() else {
                    debug!("demo CL-200A: {} without EXT trigger, no reply", command);
                    return;
                };
                let line = self.measurement(command, lux);
                self.pending.push_back(line);
            }
        }
    }

    fn measurement(&self, command: CommandId, lux: f64) -> Vec<u8> {
        let (x, y) = SOURCE_XY;
        let big_x = lux * x / y;
        let big_z = lux * (1.0 - x - y) / y;
        let data = match command {
            CommandId::ReadXyz => {
                format!("{}{}{}", scaled(big_x), scaled(lux), scaled(big_z))
            }
            CommandId::ReadEvTcpDeltaUv => {
                let cct = get_cct(big_x, lux, big_z);
                format!("{}{}{}", scaled(lux), scaled(cct), scaled(0.0))
            }
            _ => format!("{}{}{}", scaled(lux), scaled(x), scaled(y)),
        };
        let code = &command.body()[2..4];
        let battery = if self.battery_low { '1' } else { '0' };
        let body = format!("00{}1 0{}{}", code, battery, data);
        frame(body.as_bytes())
    }
}

/// `sign, 4-digit mantissa, exponent digit` with value = mantissa * 10^(exp - 4)
fn scaled(value: f64) -> String {
    let sign = if value < 0.0 { '-' } else { '+' };
    let magnitude = value.abs();
    if magnitude == 0.0 {
        return format!("{}00000", sign);
    }

    let mut exponent = (magnitude.log10().floor() as i32 + 1).clamp(0, 9);
    let mut mantissa = (magnitude / 10f64.powi(exponent - 4)).round();
    if mantissa > 9999.0 && exponent < 9 {
        exponent += 1;
        mantissa = (magnitude / 10f64.powi(exponent - 4)).round();
    }
    format!("{}{:04}{}", sign, mantissa.min(9999.0) as u32, exponent)
}

impl Transport for SimulatedCl200a {
    fn write(&mut self, bytes: &[u8], _settle: Duration) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let body = match unframe(bytes) {
            Ok(body) => body,
            Err(e) => {
                warn!("demo CL-200A ignoring frame: {}", e);
                return Ok(());
            }
        };
        match CommandId::ALL.iter().find(|id| id.body().as_bytes() == body) {
            Some(command) => self.handle(*command),
            None => warn!("demo CL-200A: unknown command {:?}", String::from_utf8_lossy(body)),
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        Ok(self.pending.pop_front().unwrap_or_default())
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut line = self.read_line()?;
        if line.len() > n {
            let rest = line.split_off(n);
            self.pending.push_front(rest);
        }
        Ok(line)
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        Ok(())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Nominal gap between UT382 frames (8 Hz)
const FRAME_INTERVAL: Duration = Duration::from_millis(125);

/// Simulated UT382 in USB mode.
///
/// Produces 33-byte frames for a jittered illuminance. Between frames there
/// is a gap that short (resync) reads observe as a timeout.
pub struct SimulatedUt382 {
    nominal_lux: f64,
    jitter: f64,
    paced: bool,
    table: LcdTable,
    buffer: VecDeque<u8>,
    gap_pending: bool,
    timeout: Duration,
    open: bool,
    rng: StdRng,
}

impl SimulatedUt382 {
    /// A meter reading around `nominal_lux`, emitting frames in real time
    pub fn new(nominal_lux: f64) -> Result<Self, crate::error::LuxError> {
        Ok(Self::with_rng(nominal_lux, StdRng::from_entropy(), LcdTable::ut382()?).paced(true))
    }

    /// Deterministic variant for tests; frames are produced without delay
    pub fn seeded(nominal_lux: f64, seed: u64) -> Result<Self, crate::error::LuxError> {
        Ok(Self::with_rng(nominal_lux, StdRng::seed_from_u64(seed), LcdTable::ut382()?))
    }

    fn with_rng(nominal_lux: f64, rng: StdRng, table: LcdTable) -> Self {
        Self {
            nominal_lux,
            jitter: 0.02,
            paced: false,
            table,
            buffer: VecDeque::new(),
            gap_pending: false,
            timeout: Duration::from_millis(200),
            open: true,
            rng,
        }
    }

    /// Sleep one frame interval before each frame
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Relative jitter, 0.02 means ±2 %
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    fn next_frame(&mut self) {
        if self.paced {
            std::thread::sleep(FRAME_INTERVAL);
        }
        let delta = self.rng.gen_range(-self.jitter..=self.jitter);
        let lux = (self.nominal_lux * (1.0 + delta)).max(0.0);
        let payload = self.table.encode(&display(lux));
        self.buffer.extend(encode_frame(&payload));
    }
}

/// Display fields the meter would light for `lux`
fn display(lux: f64) -> Vec<(Field, Meaning)> {
    let mut values = vec![
        (Field::Unit, Meaning::Label("lux")),
        (Field::Usb, Meaning::On),
        (Field::AutoRange, Meaning::On),
    ];
    let (count, point, range) = if lux < 40.0 {
        ((lux * 100.0).round(), Some(Field::Big100ths), "40")
    } else if lux < 400.0 {
        ((lux * 10.0).round(), Some(Field::Big10ths), "400")
    } else if lux < 4000.0 {
        (lux.round(), None, "4000")
    } else {
        values.push((Field::X10, Meaning::On));
        ((lux / 10.0).round(), None, "40000")
    };
    values.push((Field::Range, Meaning::Label(range)));
    if let Some(point) = point {
        values.push((point, Meaning::On));
    }

    let count = count.min(9999.0) as u32;
    let digits = [Field::Big1000, Field::Big100, Field::Big10, Field::Big1];
    for (i, field) in digits.iter().enumerate() {
        let digit = (count / 10u32.pow(3 - i as u32) % 10) as u8;
        // Leading zero is left blank
        if i == 0 && digit == 0 {
            continue;
        }
        values.push((*field, Meaning::Digit(digit)));
    }
    values
}

impl Transport for SimulatedUt382 {
    fn write(&mut self, _bytes: &[u8], _settle: Duration) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_bytes(1)?;
            match byte.first() {
                Some(b) => {
                    line.push(*b);
                    if *b == b'\n' {
                        return Ok(line);
                    }
                }
                None => return Ok(line),
            }
        }
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let mut bytes = Vec::with_capacity(n);
        while bytes.len() < n {
            if self.buffer.is_empty() {
                if self.gap_pending {
                    self.gap_pending = false;
                    // A short timeout expires inside the gap
                    if self.timeout < FRAME_INTERVAL {
                        return Ok(bytes);
                    }
                }
                self.next_frame();
            }
            if let Some(byte) = self.buffer.pop_front() {
                bytes.push(byte);
            }
            if self.buffer.is_empty() {
                self.gap_pending = true;
            }
        }
        Ok(bytes)
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        self.buffer.clear();
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cl200a::Cl200a;
    use crate::config::{Cl200aConfig, Ut382Config};
    use crate::ut382::{SyncState, Ut382};

    #[test]
    fn test_scaled_encoding() {
        assert_eq!(scaled(523.0), "+52303");
        assert_eq!(scaled(52300.0), "+52305");
        assert_eq!(scaled(-12.34), "-12342");
        assert_eq!(scaled(0.0), "+00000");
    }

    #[test]
    fn test_display_digits() {
        let table = LcdTable::ut382().unwrap();
        let summary = table.decode_summary(&table.encode(&display(123.44)));
        let (lux, unit) = crate::ut382::decode_lux(&summary);
        assert!((lux.unwrap() - 123.4).abs() < 1e-9);
        assert_eq!(unit, "lux");

        let summary = table.decode_summary(&table.encode(&display(52345.0)));
        assert_eq!(crate::ut382::decode_lux(&summary).0, Some(52350.0));
    }

    #[test]
    fn test_cl200a_driver_runs_on_simulator() {
        let sim = SimulatedCl200a::seeded(500.0, 7);
        let mut meter = Cl200a::with_transport(sim, Cl200aConfig::default()).unwrap();

        let lux = meter.lux().unwrap().unwrap();
        assert!((490.0..=510.0).contains(&lux), "{}", lux);

        let xyz = meter.xyz().unwrap().unwrap();
        assert!((xyz.y - xyz.x).abs() < 1.0);
        let cct = crate::cl200a::get_cct(xyz.x, xyz.y, xyz.z);
        assert!((3500.0..4500.0).contains(&cct), "{}", cct);
    }

    #[test]
    fn test_simulated_battery_flag() {
        let sim = SimulatedCl200a::seeded(500.0, 7).battery_low(true);
        let mut meter = Cl200a::with_transport(sim, Cl200aConfig::default()).unwrap();
        assert!(matches!(
            meter.lux(),
            Err(crate::error::LuxError::Device(crate::error::DeviceFault::LowBattery))
        ));
    }

    #[test]
    fn test_ut382_driver_locks_on_simulator() {
        let sim = SimulatedUt382::seeded(250.0, 3).unwrap();
        let mut meter = Ut382::with_transport(sim, Ut382Config::default()).unwrap();

        let mut sync = meter.live_sync();
        sync.next().unwrap().unwrap();
        assert_eq!(sync.state(), SyncState::Locked);
        drop(sync);

        let readings: Vec<_> = meter.live_monitor().take(5).map(Result::unwrap).collect();
        for reading in readings {
            let lux = reading.lux.unwrap();
            assert!((244.0..=256.0).contains(&lux), "{}", lux);
            assert!(!reading.integral);
            assert_eq!(reading.unit, "lux");
        }
    }
}
