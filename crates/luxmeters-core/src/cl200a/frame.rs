//! CL-200A measurement responses
//!
//! Responses are fixed-width ASCII lines. Offsets are 0-indexed into the line
//! as received (STX included):
//!
//! | offset | meaning |
//! |---|---|
//! | 6 | error code |
//! | 8 | battery low flag |
//! | 9 | sign of the first value |
//! | 10..14 | mantissa of the first value |
//! | 14 | exponent digit (exponent = digit - 4) |
//! | 16..20 | second value, tenths |
//! | 22..26 | third value, tenths |

use tracing::warn;

use crate::error::{DeviceFault, LuxError, RangeWarning};

const ERROR_OFFSET: usize = 6;
const BATTERY_OFFSET: usize = 8;
const SIGN_OFFSET: usize = 9;
const MANTISSA: std::ops::Range<usize> = 10..14;
const EXPONENT_OFFSET: usize = 14;
const SECOND_FIELD: std::ops::Range<usize> = 16..20;
const THIRD_FIELD: std::ops::Range<usize> = 22..26;

/// A validated measurement response
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementFrame {
    text: String,
    warnings: Vec<RangeWarning>,
}

impl MeasurementFrame {
    /// Validate a raw response line.
    ///
    /// Checks run in a fixed order: power-cycle error codes first (nothing
    /// else is looked at), then the over-range and low-luminance warnings,
    /// then the battery flag.
    pub fn parse(raw: &[u8]) -> Result<Self, LuxError> {
        let text = std::str::from_utf8(raw)
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or_else(|| LuxError::MalformedFrame(format!("non-ASCII response {:02x?}", raw)))?
            .to_string();

        let mut warnings = Vec::new();
        match char_at(&text, ERROR_OFFSET)? {
            code @ ('1' | '2' | '3') => {
                return Err(DeviceFault::PowerCycleRequired { code }.into());
            }
            '5' => warnings.push(RangeWarning::OverRange),
            '6' => warnings.push(RangeWarning::LowLuminance),
            _ => {}
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        if char_at(&text, BATTERY_OFFSET)? == '1' {
            return Err(DeviceFault::LowBattery.into());
        }

        Ok(Self { text, warnings })
    }

    /// The response line as received
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Range warnings raised by the error code
    pub fn warnings(&self) -> &[RangeWarning] {
        &self.warnings
    }

    /// First value with sign and exponent, rounded to 3 decimals
    pub fn scaled_value(&self) -> Result<f64, LuxError> {
        let sign = if char_at(&self.text, SIGN_OFFSET)? == '+' {
            1.0
        } else {
            -1.0
        };
        let mantissa = number(&self.text, MANTISSA)?;
        let exponent = number(&self.text, EXPONENT_OFFSET..EXPONENT_OFFSET + 1)? - 4.0;
        Ok(round3(sign * mantissa * 10f64.powf(exponent)))
    }

    /// First value read as tenths, ignoring sign and exponent
    pub fn first_tenths(&self) -> Result<f64, LuxError> {
        Ok(number(&self.text, MANTISSA)? / 10.0)
    }

    /// Second value, tenths
    pub fn second_tenths(&self) -> Result<f64, LuxError> {
        Ok(number(&self.text, SECOND_FIELD)? / 10.0)
    }

    /// Third value, tenths
    pub fn third_tenths(&self) -> Result<f64, LuxError> {
        Ok(number(&self.text, THIRD_FIELD)? / 10.0)
    }
}

fn char_at(text: &str, offset: usize) -> Result<char, LuxError> {
    text.as_bytes()
        .get(offset)
        .map(|b| *b as char)
        .ok_or_else(|| too_short(text, offset + 1))
}

fn number(text: &str, range: std::ops::Range<usize>) -> Result<f64, LuxError> {
    let end = range.end;
    let field = text.get(range).ok_or_else(|| too_short(text, end))?;
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| LuxError::MalformedFrame(format!("field {:?} is not a number in {:?}", field, text)))
}

fn too_short(text: &str, needed: usize) -> LuxError {
    LuxError::MalformedFrame(format!(
        "response {:?} has {} bytes, at least {} needed",
        text,
        text.len(),
        needed
    ))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Response line with the given error code, battery flag and data fields
    fn response(err: char, battery: char, data: &str) -> Vec<u8> {
        format!("\x0200021{}0{}{}\x0300\r\n", err, battery, data).into_bytes()
    }

    #[test]
    fn test_lux_scenario() {
        let frame = MeasurementFrame::parse(&response(' ', '0', "+05236")).unwrap();
        assert_eq!(frame.scaled_value().unwrap(), 52300.0);
        assert!(frame.warnings().is_empty());
    }

    #[test]
    fn test_negative_and_fractional_values() {
        let frame = MeasurementFrame::parse(&response('0', '0', "-12342")).unwrap();
        assert_eq!(frame.scaled_value().unwrap(), -12.34);

        let frame = MeasurementFrame::parse(&response('0', '0', "+00011")).unwrap();
        assert_eq!(frame.scaled_value().unwrap(), 0.001);
    }

    #[test]
    fn test_scaled_value_matches_formula() {
        for (sign, mantissa, exp) in [('+', 1, 0), ('+', 9999, 9), ('-', 523, 4), ('+', 42, 3)] {
            let data = format!("{}{:04}{}", sign, mantissa, exp);
            let frame = MeasurementFrame::parse(&response('0', '0', &data)).unwrap();
            let s = if sign == '+' { 1.0 } else { -1.0 };
            let expected = s * mantissa as f64 * 10f64.powf(exp as f64 - 4.0);
            let expected = (expected * 1000.0).round() / 1000.0;
            assert_eq!(frame.scaled_value().unwrap(), expected, "{}", data);
        }
    }

    #[test]
    fn test_power_cycle_codes_are_fatal() {
        for code in ['1', '2', '3'] {
            // Battery flag set too: the error code wins, nothing else is parsed
            let err = MeasurementFrame::parse(&response(code, '1', "+05236")).unwrap_err();
            assert!(
                matches!(err, LuxError::Device(DeviceFault::PowerCycleRequired { code: c }) if c == code),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_range_warnings_keep_value() {
        let frame = MeasurementFrame::parse(&response('5', '0', "+99999")).unwrap();
        assert_eq!(frame.warnings(), &[RangeWarning::OverRange]);
        assert_eq!(frame.scaled_value().unwrap(), 999_900_000.0);

        let frame = MeasurementFrame::parse(&response('6', '0', "+00013")).unwrap();
        assert_eq!(frame.warnings(), &[RangeWarning::LowLuminance]);
        assert_eq!(frame.scaled_value().unwrap(), 0.1);
    }

    #[test]
    fn test_low_battery() {
        let err = MeasurementFrame::parse(&response('0', '1', "+05236")).unwrap_err();
        assert!(matches!(err, LuxError::Device(DeviceFault::LowBattery)));
    }

    #[test]
    fn test_short_frames_are_malformed() {
        assert!(matches!(
            MeasurementFrame::parse(b"\x02000"),
            Err(LuxError::MalformedFrame(_))
        ));

        // Long enough for the status checks, too short for the value
        let frame = MeasurementFrame::parse(b"\x0200021 00+05").unwrap();
        assert!(matches!(frame.scaled_value(), Err(LuxError::MalformedFrame(_))));
        assert!(matches!(frame.third_tenths(), Err(LuxError::MalformedFrame(_))));
    }

    #[test]
    fn test_tenths_fields() {
        let frame = MeasurementFrame::parse(&response('0', '0', "+12344+05674+08914")).unwrap();
        assert_eq!(frame.first_tenths().unwrap(), 123.4);
        assert_eq!(frame.second_tenths().unwrap(), 56.7);
        assert_eq!(frame.third_tenths().unwrap(), 89.1);
    }
}
