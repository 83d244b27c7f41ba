//! CL-200A command table
//!
//! Every command is an 8 character body built from fixed-width fields and
//! framed as `STX body ETX BCC CR LF`. The block check (BCC) is the XOR of the
//! body bytes and ETX, written as two upper-case hex digits.

use std::fmt;
use std::str::FromStr;

use crate::error::LuxError;

/// Start of text
pub const STX: u8 = 0x02;
/// End of text
pub const ETX: u8 = 0x03;
/// Body length shared by all commands
pub const BODY_LEN: usize = 8;

// Receptor head, command number, then command parameters.
const READ_XYZ: &[Field] = &[
    Field::Number(0, 2),
    Field::Text("01", 2),
    Field::Text("1", 1),
    Field::Text("2", 1),
    Field::Text("00", 2),
];
const READ_LUX: &[Field] = &[
    Field::Number(0, 2),
    Field::Text("02", 2),
    Field::Text("1", 1),
    Field::Text("2", 1),
    Field::Text("00", 2),
];
const READ_EV_TCP_DELTA_UV: &[Field] = &[
    Field::Number(0, 2),
    Field::Text("08", 2),
    Field::Text("1", 1),
    Field::Text("2", 1),
    Field::Text("00", 2),
];
const SET_EXT_MODE: &[Field] = &[
    Field::Number(0, 2),
    Field::Text("40", 2),
    Field::Text("1", 1),
    Field::Text("0", 1),
    Field::Text("", 2),
];
// Head 99 addresses every receptor head at once
const EXT_TRIGGER: &[Field] = &[
    Field::Number(99, 2),
    Field::Text("40", 2),
    Field::Text("2", 1),
    Field::Text("1", 1),
    Field::Text("", 2),
];
const PC_CONNECT: &[Field] = &[Field::Number(0, 2), Field::Text("54", 2), Field::Text("1", 1), Field::Text("", 3)];
const PC_CONNECT_ACK: &[Field] = &[Field::Number(0, 2), Field::Text("54", 2), Field::Text("", 4)];
const HOLD: &[Field] = &[
    Field::Number(99, 2),
    Field::Text("55", 2),
    Field::Text("1", 1),
    Field::Text("", 2),
    Field::Text("0", 1),
];

/// Commands used by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// Read measurement data (X, Y, Z)
    ReadXyz,
    /// Read measurement data (EV, x, y); used for illuminance
    ReadLux,
    /// Read measurement data (EV, TCP, Δuv)
    ReadEvTcpDeltaUv,
    /// Set EXT mode
    SetExtMode,
    /// Take a measurement in EXT mode
    ExtTrigger,
    /// Switch to PC connection mode
    PcConnect,
    /// Expected answer to [`CommandId::PcConnect`]
    PcConnectAck,
    /// Set hold status
    Hold,
}

impl CommandId {
    /// Every command in the table
    pub const ALL: [CommandId; 8] = [
        CommandId::ReadXyz,
        CommandId::ReadLux,
        CommandId::ReadEvTcpDeltaUv,
        CommandId::SetExtMode,
        CommandId::ExtTrigger,
        CommandId::PcConnect,
        CommandId::PcConnectAck,
        CommandId::Hold,
    ];

    /// Name used in the instrument documentation ("command_02", ...)
    pub fn name(&self) -> &'static str {
        match self {
            CommandId::ReadXyz => "command_01",
            CommandId::ReadLux => "command_02",
            CommandId::ReadEvTcpDeltaUv => "command_08",
            CommandId::SetExtMode => "command_40",
            CommandId::ExtTrigger => "command_40r",
            CommandId::PcConnect => "command_54",
            CommandId::PcConnectAck => "command_54r",
            CommandId::Hold => "command_55",
        }
    }

    /// Field layout of this command
    pub fn template(&self) -> &'static [Field] {
        match self {
            CommandId::ReadXyz => READ_XYZ,
            CommandId::ReadLux => READ_LUX,
            CommandId::ReadEvTcpDeltaUv => READ_EV_TCP_DELTA_UV,
            CommandId::SetExtMode => SET_EXT_MODE,
            CommandId::ExtTrigger => EXT_TRIGGER,
            CommandId::PcConnect => PC_CONNECT,
            CommandId::PcConnectAck => PC_CONNECT_ACK,
            CommandId::Hold => HOLD,
        }
    }

    /// The 8 character command body
    pub fn body(&self) -> String {
        render_body(self.template())
    }

    /// The complete wire frame
    pub fn frame(&self) -> Vec<u8> {
        frame(self.body().as_bytes())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandId {
    type Err = LuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| LuxError::Config(format!("unknown CL-200A command '{}'", s)))
    }
}

/// One fixed-width field of a command body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Decimal number, zero padded to the width
    Number(u32, usize),
    /// Text, left aligned and space padded to the width
    Text(&'static str, usize),
}

impl Field {
    /// Width in characters
    pub fn width(&self) -> usize {
        match self {
            Field::Number(_, width) | Field::Text(_, width) => *width,
        }
    }
}

/// A field recovered from a rendered body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Number(u32),
    Text(String),
}

impl From<&Field> for FieldValue {
    fn from(field: &Field) -> Self {
        match field {
            Field::Number(value, _) => FieldValue::Number(*value),
            Field::Text(text, _) => FieldValue::Text(text.to_string()),
        }
    }
}

/// Render a template into its body string
pub fn render_body(fields: &[Field]) -> String {
    let mut body = String::with_capacity(BODY_LEN);
    for field in fields {
        match field {
            Field::Number(value, width) => body.push_str(&format!("{:0width$}", value, width = width)),
            Field::Text(text, width) => body.push_str(&format!("{:<width$}", text, width = width)),
        }
    }
    body
}

/// Split a body along a template's widths and read each field back
pub fn parse_body(fields: &[Field], body: &str) -> Result<Vec<FieldValue>, LuxError> {
    let expected: usize = fields.iter().map(Field::width).sum();
    if body.len() != expected || !body.is_ascii() {
        return Err(LuxError::MalformedFrame(format!(
            "command body {:?} does not fit a {} character layout",
            body, expected
        )));
    }

    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 0;
    for field in fields {
        let raw = &body[offset..offset + field.width()];
        offset += field.width();
        let value = match field {
            Field::Number(..) => raw
                .parse::<u32>()
                .map(FieldValue::Number)
                .map_err(|e| LuxError::MalformedFrame(format!("field {:?}: {}", raw, e)))?,
            Field::Text(..) => FieldValue::Text(raw.trim_end().to_string()),
        };
        values.push(value);
    }
    Ok(values)
}

/// Block check: XOR of the body bytes and ETX
pub fn bcc(body: &[u8]) -> u8 {
    body.iter().fold(ETX, |acc, b| acc ^ b)
}

/// Wrap a body into `STX body ETX BCC CR LF`
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(body.len() + 6);
    bytes.push(STX);
    bytes.extend_from_slice(body);
    bytes.push(ETX);
    bytes.extend_from_slice(format!("{:02X}", bcc(body)).as_bytes());
    bytes.extend_from_slice(b"\r\n");
    bytes
}

/// Extract the body of a framed message, checking STX, ETX and the BCC
pub fn unframe(bytes: &[u8]) -> Result<&[u8], LuxError> {
    let trimmed = bytes
        .strip_suffix(b"\r\n")
        .ok_or_else(|| LuxError::MalformedFrame("missing CR LF".to_string()))?;
    if trimmed.len() < 4 || trimmed[0] != STX || trimmed[trimmed.len() - 3] != ETX {
        return Err(LuxError::MalformedFrame("missing STX/ETX".to_string()));
    }
    let body = &trimmed[1..trimmed.len() - 3];
    let received = std::str::from_utf8(&trimmed[trimmed.len() - 2..])
        .ok()
        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        .ok_or_else(|| LuxError::MalformedFrame("unreadable BCC".to_string()))?;
    let expected = bcc(body);
    if received != expected {
        return Err(LuxError::MalformedFrame(format!(
            "BCC mismatch: expected {:02X}, got {:02X}",
            expected, received
        )));
    }
    Ok(body)
}
