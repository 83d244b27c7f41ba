//! Readings from the UT382 display

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

use super::driver::Ut382;
use super::lcd::{Field, LcdSummary, Meaning};
use super::stream::SyncStream;
use crate::error::LuxError;
use crate::transport::Transport;

/// One illuminance sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuxReading {
    /// Local wall-clock time the frame was decoded
    pub time: DateTime<Local>,
    /// `None` while the display is blank
    pub lux: Option<f64>,
    /// No decimal point was lit; print as an integer
    pub integral: bool,
    /// "lux" or "fc"
    pub unit: String,
    /// Window mean, only set by the averaging stream
    pub ave_lux: Option<f64>,
}

const BIG_DIGITS: [Field; 4] = [Field::Big1000, Field::Big100, Field::Big10, Field::Big1];

const BLANK_DISPLAY: [Option<Meaning>; 4] = [
    None,
    Some(Meaning::Digit(0)),
    Some(Meaning::Letter('L')),
    None,
];

/// Numeric value of the main display and its unit.
///
/// The blank pattern `" 0L "` the meter shows between readings gives `None`.
/// Digits are positional from the right, so a blank leading digit is skipped
/// without shifting the others.
pub fn decode_lux(summary: &LcdSummary) -> (Option<f64>, &'static str) {
    let unit = summary.unit();
    let digits = BIG_DIGITS.map(|field| summary.scalar(field));
    if digits == BLANK_DISPLAY {
        return (None, unit);
    }

    let mut lux = 0.0;
    for (power, digit) in digits.iter().rev().enumerate() {
        if let Some(Meaning::Digit(d)) = digit {
            lux += f64::from(*d) * 10f64.powi(power as i32);
        }
    }

    if summary.is_lit(Field::Big10ths) {
        lux *= 0.1;
    }
    if summary.is_lit(Field::Big100ths) {
        lux *= 0.01;
    }
    if summary.is_lit(Field::Big1000ths) {
        lux *= 0.001;
    }
    if summary.is_lit(Field::X10) {
        lux *= 10.0;
    }
    if is_integral(summary) {
        lux = lux.trunc();
    }
    (Some(lux), unit)
}

/// True when none of the decimal points is lit
pub fn is_integral(summary: &LcdSummary) -> bool {
    ![Field::Big10ths, Field::Big100ths, Field::Big1000ths]
        .iter()
        .any(|field| summary.is_lit(*field))
}

/// Iterator over [`LuxReading`]s, one per synchronised frame
pub struct Monitor<'a, T: Transport> {
    sync: SyncStream<'a, T>,
    battery_warned: bool,
}

impl<'a, T: Transport> Monitor<'a, T> {
    pub(super) fn new(meter: &'a mut Ut382<T>) -> Self {
        Self {
            sync: SyncStream::new(meter),
            battery_warned: false,
        }
    }

    /// The underlying frame stream
    pub fn sync(&self) -> &SyncStream<'a, T> {
        &self.sync
    }
}

impl<T: Transport> Iterator for Monitor<'_, T> {
    type Item = Result<LuxReading, LuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let payload = match self.sync.next()? {
                Ok(payload) => payload,
                Err(e) => return Some(Err(e)),
            };
            let time = Local::now();
            let summary = self.sync.raw.meter.decode_summary(&payload);

            if summary.is_lit(Field::Batt) && !self.battery_warned {
                warn!("UT382 battery is low");
                self.battery_warned = true;
            }
            if summary.is_lit(Field::Menu) {
                debug!("UT382 menu open, skipping frame");
                continue;
            }

            let (lux, unit) = decode_lux(&summary);
            return Some(Ok(LuxReading {
                time,
                lux,
                integral: is_integral(&summary),
                unit: unit.to_string(),
                ave_lux: None,
            }));
        }
    }
}

/// Iterator emitting one reading per full averaging window
pub struct Average<'a, T: Transport> {
    monitor: Monitor<'a, T>,
    window: usize,
    values: Vec<f64>,
}

impl<'a, T: Transport> Average<'a, T> {
    pub(super) fn new(meter: &'a mut Ut382<T>, window: usize) -> Self {
        Self {
            monitor: Monitor::new(meter),
            window,
            values: Vec::with_capacity(window),
        }
    }

    /// Readings per emitted mean
    pub fn window(&self) -> usize {
        self.window
    }
}

impl<T: Transport> Iterator for Average<'_, T> {
    type Item = Result<LuxReading, LuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut reading = match self.monitor.next()? {
                Ok(reading) => reading,
                Err(e) => return Some(Err(e)),
            };
            let Some(lux) = reading.lux else {
                continue;
            };
            self.values.push(lux);
            if self.values.len() < self.window {
                continue;
            }

            let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
            self.values.clear();
            reading.ave_lux = Some(mean);
            reading.integral = false;
            return Some(Ok(reading));
        }
    }
}
