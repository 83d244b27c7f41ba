//! UT382 LCD segment table
//!
//! The meter streams the state of its LCD rather than a number. Each of the
//! 15 payload bytes drives a group of segments; [`UT382_SEGMENTS`] maps bits
//! to what they show. Scalar fields take one value out of a masked group of
//! bits (a 7-segment digit, the unit), flag fields collect every lit icon.

use std::collections::BTreeMap;

use crate::error::LuxError;

/// Number of decoded payload bytes per frame
pub const PAYLOAD_LEN: usize = 15;

/// A field shown on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Hold,
    Menu,
    Batt,
    AutoPowerOff,
    Mode,
    Unit,
    X10,
    Usb,
    Rel,
    Peak,
    Big1000,
    Big100,
    Big10,
    Big1,
    Big1000ths,
    Big100ths,
    Big10ths,
    Small1000,
    Small100,
    Small10,
    Small1,
    SmallColon,
    SmallPoint,
    BarLow,
    BarHigh,
    Range,
    AutoRange,
    Clock,
    Memory,
    Setup,
}

/// What a lit segment group means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meaning {
    Digit(u8),
    Letter(char),
    Label(&'static str),
    /// Bar graph segment number
    Bar(u8),
    /// Single icon is lit
    On,
}

/// How a field reads its bits
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    /// `mask & byte` must equal one of the keys
    Scalar(&'static [(u8, Meaning)]),
    /// Every key bit set in `mask & byte` contributes its meaning
    Flags(&'static [(u8, Meaning)]),
}

/// One row of the segment table
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub byte: usize,
    pub field: Field,
    pub mask: u8,
    pub kind: Kind,
}

/// Decoded value of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(Option<Meaning>),
    Flags(Vec<Meaning>),
}

// Segments a..g on bits 0..6
const SEVEN_SEGMENT: &[(u8, Meaning)] = &[
    (0x3F, Meaning::Digit(0)),
    (0x06, Meaning::Digit(1)),
    (0x5B, Meaning::Digit(2)),
    (0x4F, Meaning::Digit(3)),
    (0x66, Meaning::Digit(4)),
    (0x6D, Meaning::Digit(5)),
    (0x7D, Meaning::Digit(6)),
    (0x07, Meaning::Digit(7)),
    (0x7F, Meaning::Digit(8)),
    (0x6F, Meaning::Digit(9)),
    (0x38, Meaning::Letter('L')),
    (0x40, Meaning::Letter('-')),
    (0x79, Meaning::Letter('E')),
];

const ICON: &[(u8, Meaning)] = &[(0x01, Meaning::On)];
const ICON_2: &[(u8, Meaning)] = &[(0x02, Meaning::On)];
const ICON_4: &[(u8, Meaning)] = &[(0x04, Meaning::On)];
const ICON_8: &[(u8, Meaning)] = &[(0x08, Meaning::On)];
const ICON_10: &[(u8, Meaning)] = &[(0x10, Meaning::On)];
const ICON_20: &[(u8, Meaning)] = &[(0x20, Meaning::On)];
const ICON_80: &[(u8, Meaning)] = &[(0x80, Meaning::On)];

const MODE: &[(u8, Meaning)] = &[
    (0x10, Meaning::Label("MAX")),
    (0x20, Meaning::Label("MIN")),
    (0x40, Meaning::Label("AVG")),
    (0x80, Meaning::Label("REC")),
];

const UNIT: &[(u8, Meaning)] = &[(0x01, Meaning::Label("lux")), (0x02, Meaning::Label("fc"))];

const BAR_LOW: &[(u8, Meaning)] = &[
    (0x01, Meaning::Bar(1)),
    (0x02, Meaning::Bar(2)),
    (0x04, Meaning::Bar(3)),
    (0x08, Meaning::Bar(4)),
    (0x10, Meaning::Bar(5)),
    (0x20, Meaning::Bar(6)),
    (0x40, Meaning::Bar(7)),
    (0x80, Meaning::Bar(8)),
];

const BAR_HIGH: &[(u8, Meaning)] = &[
    (0x01, Meaning::Bar(9)),
    (0x02, Meaning::Bar(10)),
    (0x04, Meaning::Bar(11)),
    (0x08, Meaning::Bar(12)),
    (0x10, Meaning::Bar(13)),
    (0x20, Meaning::Bar(14)),
    (0x40, Meaning::Bar(15)),
    (0x80, Meaning::Bar(16)),
];

const RANGE: &[(u8, Meaning)] = &[
    (0x01, Meaning::Label("40")),
    (0x02, Meaning::Label("400")),
    (0x03, Meaning::Label("4000")),
    (0x04, Meaning::Label("40000")),
];

const CLOCK: &[(u8, Meaning)] = &[
    (0x01, Meaning::Label("DATE")),
    (0x02, Meaning::Label("TIME")),
    (0x04, Meaning::Label("AM")),
    (0x08, Meaning::Label("PM")),
];

const MEMORY: &[(u8, Meaning)] = &[
    (0x10, Meaning::Label("MEM")),
    (0x20, Meaning::Label("READ")),
    (0x40, Meaning::Label("FULL")),
    (0x80, Meaning::Label("CLR")),
];

const SETUP: &[(u8, Meaning)] = &[
    (0x01, Meaning::Label("SET")),
    (0x02, Meaning::Label("LOG")),
    (0x04, Meaning::Label("INT")),
    (0x08, Meaning::Label("BEEP")),
];

const fn scalar(byte: usize, field: Field, mask: u8, lut: &'static [(u8, Meaning)]) -> Segment {
    Segment {
        byte,
        field,
        mask,
        kind: Kind::Scalar(lut),
    }
}

const fn flags(byte: usize, field: Field, mask: u8, lut: &'static [(u8, Meaning)]) -> Segment {
    Segment {
        byte,
        field,
        mask,
        kind: Kind::Flags(lut),
    }
}

/// Segment layout of the UT382 display
pub const UT382_SEGMENTS: &[Segment] = &[
    // status icons
    scalar(0, Field::Hold, 0x01, ICON),
    scalar(0, Field::Menu, 0x02, ICON_2),
    scalar(0, Field::Batt, 0x04, ICON_4),
    scalar(0, Field::AutoPowerOff, 0x08, ICON_8),
    flags(0, Field::Mode, 0xF0, MODE),
    scalar(1, Field::Unit, 0x03, UNIT),
    scalar(1, Field::X10, 0x04, ICON_4),
    scalar(1, Field::Usb, 0x08, ICON_8),
    scalar(1, Field::Rel, 0x10, ICON_10),
    scalar(1, Field::Peak, 0x20, ICON_20),
    // main reading, decimal points on bit 7 of the digit right of them
    scalar(2, Field::Big1000, 0x7F, SEVEN_SEGMENT),
    scalar(3, Field::Big100, 0x7F, SEVEN_SEGMENT),
    scalar(3, Field::Big1000ths, 0x80, ICON_80),
    scalar(4, Field::Big10, 0x7F, SEVEN_SEGMENT),
    scalar(4, Field::Big100ths, 0x80, ICON_80),
    scalar(5, Field::Big1, 0x7F, SEVEN_SEGMENT),
    scalar(5, Field::Big10ths, 0x80, ICON_80),
    // secondary display (clock, memory slot)
    scalar(6, Field::Small1000, 0x7F, SEVEN_SEGMENT),
    scalar(7, Field::Small100, 0x7F, SEVEN_SEGMENT),
    scalar(7, Field::SmallColon, 0x80, ICON_80),
    scalar(8, Field::Small10, 0x7F, SEVEN_SEGMENT),
    scalar(8, Field::SmallPoint, 0x80, ICON_80),
    scalar(9, Field::Small1, 0x7F, SEVEN_SEGMENT),
    flags(10, Field::BarLow, 0xFF, BAR_LOW),
    flags(11, Field::BarHigh, 0xFF, BAR_HIGH),
    scalar(12, Field::Range, 0x07, RANGE),
    scalar(12, Field::AutoRange, 0x08, ICON_8),
    flags(13, Field::Clock, 0x0F, CLOCK),
    flags(13, Field::Memory, 0xF0, MEMORY),
    flags(14, Field::Setup, 0x0F, SETUP),
];

/// Validated segment table
#[derive(Debug, Clone)]
pub struct LcdTable {
    segments: &'static [Segment],
}

impl LcdTable {
    /// Check that every payload byte is covered, every field appears once,
    /// masks on one byte do not overlap and lookup keys fit their masks.
    pub fn new(segments: &'static [Segment]) -> Result<Self, LuxError> {
        let mut seen_fields = Vec::new();
        let mut used = [0u8; PAYLOAD_LEN];
        let mut covered = [false; PAYLOAD_LEN];

        for segment in segments {
            if segment.byte >= PAYLOAD_LEN {
                return Err(LuxError::InvalidTable(format!(
                    "{:?} on byte {} beyond the {} byte payload",
                    segment.field, segment.byte, PAYLOAD_LEN
                )));
            }
            if seen_fields.contains(&segment.field) {
                return Err(LuxError::InvalidTable(format!(
                    "{:?} appears twice",
                    segment.field
                )));
            }
            seen_fields.push(segment.field);

            if used[segment.byte] & segment.mask != 0 {
                return Err(LuxError::InvalidTable(format!(
                    "{:?} overlaps another field on byte {}",
                    segment.field, segment.byte
                )));
            }
            used[segment.byte] |= segment.mask;
            covered[segment.byte] = true;

            let lut = match segment.kind {
                Kind::Scalar(lut) | Kind::Flags(lut) => lut,
            };
            if let Some((key, _)) = lut.iter().find(|(key, _)| key & !segment.mask != 0) {
                return Err(LuxError::InvalidTable(format!(
                    "{:?} key {:#04x} outside mask {:#04x}",
                    segment.field, key, segment.mask
                )));
            }
        }

        if let Some(byte) = covered.iter().position(|c| !c) {
            return Err(LuxError::InvalidTable(format!("payload byte {} has no field", byte)));
        }
        Ok(Self { segments })
    }

    /// The UT382 layout
    pub fn ut382() -> Result<Self, LuxError> {
        Self::new(UT382_SEGMENTS)
    }

    /// Decode the fields carried by payload byte `index`
    pub fn decode_byte(&self, index: usize, byte: u8) -> Vec<(Field, FieldValue)> {
        self.segments
            .iter()
            .filter(|s| s.byte == index)
            .map(|s| (s.field, decode_segment(s, byte)))
            .collect()
    }

    /// Merge the fields of every payload byte
    pub fn decode_summary(&self, payload: &[u8]) -> LcdSummary {
        let mut fields = BTreeMap::new();
        for (index, byte) in payload.iter().enumerate() {
            fields.extend(self.decode_byte(index, *byte));
        }
        LcdSummary { fields }
    }

    /// Build the payload that lights the given fields; used by the simulator
    pub fn encode(&self, values: &[(Field, Meaning)]) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        for (field, meaning) in values {
            let Some(segment) = self.segments.iter().find(|s| s.field == *field) else {
                continue;
            };
            let lut = match segment.kind {
                Kind::Scalar(lut) | Kind::Flags(lut) => lut,
            };
            if let Some((key, _)) = lut.iter().find(|(_, m)| m == meaning) {
                payload[segment.byte] |= key;
            }
        }
        payload
    }
}

fn decode_segment(segment: &Segment, byte: u8) -> FieldValue {
    let bits = segment.mask & byte;
    match segment.kind {
        Kind::Scalar(lut) => FieldValue::Scalar(
            lut.iter()
                .find(|(key, _)| *key == bits)
                .map(|(_, meaning)| *meaning),
        ),
        Kind::Flags(lut) => FieldValue::Flags(
            lut.iter()
                .filter(|(key, _)| key & bits != 0)
                .map(|(_, meaning)| *meaning)
                .collect(),
        ),
    }
}

/// Everything the display shows in one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LcdSummary {
    fields: BTreeMap<Field, FieldValue>,
}

impl LcdSummary {
    /// Set a field directly
    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Raw decoded value of a field
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Value of a scalar field; `None` when blank, unknown or absent
    pub fn scalar(&self, field: Field) -> Option<Meaning> {
        match self.fields.get(&field) {
            Some(FieldValue::Scalar(meaning)) => *meaning,
            _ => None,
        }
    }

    /// Whether an icon (or any flag of a flag field) is lit
    pub fn is_lit(&self, field: Field) -> bool {
        match self.fields.get(&field) {
            Some(FieldValue::Scalar(meaning)) => meaning.is_some(),
            Some(FieldValue::Flags(flags)) => !flags.is_empty(),
            None => false,
        }
    }

    /// Lit flags of a flag field
    pub fn flags(&self, field: Field) -> &[Meaning] {
        match self.fields.get(&field) {
            Some(FieldValue::Flags(flags)) => flags,
            _ => &[],
        }
    }

    /// The unit label, empty when none is lit
    pub fn unit(&self) -> &'static str {
        match self.scalar(Field::Unit) {
            Some(Meaning::Label(label)) => label,
            _ => "",
        }
    }
}
