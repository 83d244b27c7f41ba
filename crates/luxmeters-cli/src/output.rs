//! TSV output

use std::io::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use luxmeters_core::ut382::LuxReading;

/// Timestamp format used when none is given
pub const DEFAULT_STRFTIME: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Reject formats chrono cannot render
pub fn validate_strftime(format: &str) -> Result<(), String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        Err(format!("invalid timestamp format {:?}", format))
    } else {
        Ok(())
    }
}

/// `%i` for integral readings, two decimals otherwise
pub fn format_light(value: f64, integral: bool) -> String {
    if integral {
        format!("{}", value.trunc() as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Writes `time, light, unit` rows, optionally only when the value changes
pub struct TsvWriter<W: Write> {
    out: W,
    strftime: String,
    delta: bool,
    last: Option<String>,
}

impl<W: Write> TsvWriter<W> {
    pub fn new(out: W, strftime: impl Into<String>, delta: bool) -> Self {
        Self {
            out,
            strftime: strftime.into(),
            delta,
            last: None,
        }
    }

    /// Write an arbitrary header line
    pub fn header(&mut self, columns: &[&str]) -> io::Result<()> {
        writeln!(self.out, "{}", columns.join("\t"))?;
        self.out.flush()
    }

    /// Write one timestamped row of already formatted values
    pub fn row(&mut self, time: &DateTime<Local>, values: &[String]) -> io::Result<()> {
        write!(self.out, "{}", time.format(&self.strftime))?;
        for value in values {
            write!(self.out, "\t{}", value)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Write a reading; returns false when nothing was written.
    ///
    /// With `average` set the window mean is printed instead of the sample.
    /// Blank readings and, in delta mode, unchanged values are skipped.
    pub fn reading(&mut self, reading: &LuxReading, average: bool) -> io::Result<bool> {
        let value = if average {
            reading.ave_lux.map(|v| format_light(v, false))
        } else {
            reading.lux.map(|v| format_light(v, reading.integral))
        };
        let Some(light) = value else {
            return Ok(false);
        };

        if self.delta && self.last.as_deref() == Some(light.as_str()) {
            return Ok(false);
        }
        self.row(&reading.time, &[light.clone(), reading.unit.clone()])?;
        self.last = Some(light);
        Ok(true)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn reading(lux: Option<f64>, integral: bool) -> LuxReading {
        LuxReading {
            time: Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            lux,
            integral,
            unit: "lux".to_string(),
            ave_lux: None,
        }
    }

    #[test]
    fn test_format_light() {
        assert_eq!(format_light(523.0, true), "523");
        assert_eq!(format_light(123.4, false), "123.40");
        assert_eq!(format_light(0.456, false), "0.46");
    }

    #[test]
    fn test_rows_and_header() {
        let mut writer = TsvWriter::new(Vec::new(), "%H:%M:%S", false);
        writer.header(&["time", "light", "unit"]).unwrap();
        assert!(writer.reading(&reading(Some(42.0), true), false).unwrap());
        assert!(!writer.reading(&reading(None, true), false).unwrap());
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "time\tlight\tunit\n12:30:05\t42\tlux\n");
    }

    #[test]
    fn test_delta_suppresses_repeats() {
        let mut writer = TsvWriter::new(Vec::new(), "%S", true);
        let written: Vec<bool> = [10.0, 10.0, 11.0, 10.0]
            .iter()
            .map(|v| writer.reading(&reading(Some(*v), true), false).unwrap())
            .collect();
        assert_eq!(written, vec![true, false, true, true]);
    }

    #[test]
    fn test_average_column() {
        let mut writer = TsvWriter::new(Vec::new(), "%S", false);
        let mut sample = reading(Some(11.0), true);
        sample.ave_lux = Some(10.5);
        writer.reading(&sample, true).unwrap();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "05\t10.50\tlux\n");
    }

    #[test]
    fn test_strftime_validation() {
        assert!(validate_strftime(DEFAULT_STRFTIME).is_ok());
        assert!(validate_strftime("%Q").is_err());
    }
}
