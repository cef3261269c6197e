//! 20-bit device serial numbers

use std::fmt;
use std::num::{IntErrorKind, ParseIntError};

use serde::{Deserialize, Serialize};

/// A device serial number, always held masked to 20 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct SerialNumber(u32);

/// Result of parsing user-supplied serial text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSerial {
    /// The masked serial number
    pub serial: SerialNumber,
    /// The value as typed, without surrounding whitespace
    pub raw: String,
    /// Whether bits above the low 20 were discarded
    pub truncated: bool,
}

impl SerialNumber {
    /// Bit mask of the serial field
    pub const MASK: u32 = 0xF_FFFF;

    /// Create a serial number from the low 20 bits of `value`
    pub const fn new(value: u32) -> Self {
        Self(value & Self::MASK)
    }

    /// Reassemble a serial number from its command payload fields
    pub const fn from_fields(id2: u8, id1: u8, id0: u8) -> Self {
        Self::new((((id2 & 0x0F) as u32) << 16) | ((id1 as u32) << 8) | id0 as u32)
    }

    /// Parse a decimal integer, keeping its low 20 bits
    ///
    /// Out-of-range values are truncated rather than rejected; negative input
    /// is taken in two's complement. Callers should warn when
    /// [`ParsedSerial::truncated`] is set.
    pub fn parse(text: &str) -> Result<ParsedSerial, ParseIntError> {
        let text = text.trim();
        match text.parse::<i64>() {
            Ok(value) => {
                let wide = value as u64;
                let serial = Self::new(wide as u32);
                Ok(ParsedSerial {
                    serial,
                    raw: text.to_string(),
                    truncated: wide != u64::from(serial.value()),
                })
            }
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                // Overflow can be reported before a trailing non-digit is seen.
                let low = Self::fold_digits(text).ok_or(e)?;
                Ok(ParsedSerial {
                    serial: Self::new(low),
                    raw: text.to_string(),
                    truncated: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Low 20 bits of a signed decimal literal of any width
    fn fold_digits(text: &str) -> Option<u32> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        if digits.is_empty() || !digits.bytes().all(|d| d.is_ascii_digit()) {
            return None;
        }
        let low = digits
            .bytes()
            .fold(0u32, |acc, d| (acc * 10 + u32::from(d - b'0')) & Self::MASK);
        Some(if negative { low.wrapping_neg() } else { low })
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// High nibble (bits 16..20)
    pub const fn id2(self) -> u8 {
        ((self.0 >> 16) & 0x0F) as u8
    }

    /// Middle byte (bits 8..16)
    pub const fn id1(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Low byte (bits 0..8)
    pub const fn id0(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// `[id2, id1, id0]` as carried in command payloads
    pub const fn fields(self) -> [u8; 3] {
        [self.id2(), self.id1(), self.id0()]
    }
}

impl From<u32> for SerialNumber {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<SerialNumber> for u32 {
    fn from(serial: SerialNumber) -> Self {
        serial.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:05X})", self.0, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_to_20_bits() {
        for input in [0u32, 75, 0x12345, 0xF_FFFF, 0x10_0000, 0xABC_DEF0, u32::MAX] {
            let serial = SerialNumber::new(input);
            assert_eq!(serial.value(), input & 0xF_FFFF);
            let [id2, id1, id0] = serial.fields();
            let rebuilt = ((id2 as u32) << 16) | ((id1 as u32) << 8) | id0 as u32;
            assert_eq!(rebuilt, serial.value());
            assert_eq!(SerialNumber::from_fields(id2, id1, id0), serial);
        }
    }

    #[test]
    fn test_split_fields() {
        let serial = SerialNumber::new(75);
        assert_eq!(serial.fields(), [0, 0, 75]);

        let serial = SerialNumber::new(0x12345);
        assert_eq!(serial.fields(), [0x01, 0x23, 0x45]);
    }

    #[test]
    fn test_parse_in_range() {
        let parsed = SerialNumber::parse(" 75\n").unwrap();
        assert_eq!(parsed.serial, SerialNumber::new(75));
        assert!(!parsed.truncated);
    }

    #[test]
    fn test_parse_truncates() {
        let parsed = SerialNumber::parse("1048577").unwrap();
        assert_eq!(parsed.serial.value(), 1);
        assert!(parsed.truncated);
    }

    #[test]
    fn test_parse_negative_wraps() {
        let parsed = SerialNumber::parse("-1").unwrap();
        assert_eq!(parsed.serial.value(), 0xF_FFFF);
        assert!(parsed.truncated);
    }

    #[test]
    fn test_parse_wider_than_64_bits() {
        let text = "123456789012345678901234";
        let expected = (text.parse::<u128>().unwrap() & 0xF_FFFF) as u32;

        let parsed = SerialNumber::parse(text).unwrap();
        assert_eq!(parsed.serial.value(), expected);
        assert_eq!(parsed.raw, text);
        assert!(parsed.truncated);

        let parsed = SerialNumber::parse("100000000000000000001").unwrap();
        assert_eq!(parsed.serial.value(), 1);
        assert!(parsed.truncated);
    }

    #[test]
    fn test_parse_negative_wider_than_64_bits() {
        let text = "-123456789012345678901234";
        let expected = (text.parse::<i128>().unwrap() as u128 & 0xF_FFFF) as u32;

        let parsed = SerialNumber::parse(text).unwrap();
        assert_eq!(parsed.serial.value(), expected);
        assert!(parsed.truncated);
    }

    #[test]
    fn test_parse_rejects_text() {
        assert!(SerialNumber::parse("12ab").is_err());
        assert!(SerialNumber::parse("").is_err());
        assert!(SerialNumber::parse("99999999999999999999x").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SerialNumber::new(0x12345).to_string(), "74565 (0x12345)");
    }
}
