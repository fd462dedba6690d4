//! 128-bit interface identifiers
//!
//! [`GUID`] has the native `#[repr(C)]` layout so it can be passed by pointer
//! to `QueryInterface` and friends. Two textual forms are supported:
//!
//! - `Display`: lowercase, hyphenated (`e2fcc7c1-3bfc-5a0b-b2b0-72e769d1cb7e`)
//! - `Debug`: uppercase and braced, as the platform tools print them
//!
//! [`GUID::signature_form`] produces the braced lowercase form used inside
//! parameterized type signatures.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

// =============================================================================
// GUID - Globally Unique Identifier
// =============================================================================

/// 128-bit globally unique identifier (GUID/UUID/IID).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// A string could not be parsed as a GUID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid GUID '{input}': {reason}")]
pub struct GuidParseError {
    pub input: String,
    pub reason: String,
}

impl GUID {
    /// Create a new GUID from components
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// The nil/zero GUID
    pub const ZERO: GUID = GUID::new(0, 0, 0, [0; 8]);

    /// Build a GUID from its big-endian 128-bit value (RFC 4122 byte order).
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// The big-endian 128-bit value of this GUID.
    #[must_use]
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Braced, lowercase, hyphenated form used in type signatures.
    #[must_use]
    pub fn signature_form(&self) -> String {
        format!("{{{self}}}")
    }

    /// Parse `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, optionally wrapped in braces.
    pub fn parse(input: &str) -> Result<Self, GuidParseError> {
        let fail = |reason: &str| GuidParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let s = match trimmed.strip_prefix('{') {
            Some(rest) => rest
                .strip_suffix('}')
                .ok_or_else(|| fail("unbalanced braces"))?,
            None => trimmed,
        };

        let parts: Vec<&str> = s.split('-').collect();
        let [p1, p2, p3, p4, p5] = parts.as_slice() else {
            return Err(fail("expected five hyphen-separated groups"));
        };
        if p1.len() != 8 || p2.len() != 4 || p3.len() != 4 || p4.len() != 4 || p5.len() != 12 {
            return Err(fail("groups must be 8-4-4-4-12 hex digits"));
        }

        let data1 = u32::from_str_radix(p1, 16).map_err(|_| fail("bad data1"))?;
        let data2 = u16::from_str_radix(p2, 16).map_err(|_| fail("bad data2"))?;
        let data3 = u16::from_str_radix(p3, 16).map_err(|_| fail("bad data3"))?;

        let tail = format!("{p4}{p5}");
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            let pair = tail.get(i * 2..i * 2 + 2).ok_or_else(|| fail("bad data4"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| fail("bad data4"))?;
        }

        Ok(Self::new(data1, data2, data3, data4))
    }
}

/// Const constructor used by `#[winrt_interface]` generated code.
#[must_use]
pub const fn make_guid(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> GUID {
    GUID::new(data1, data2, data3, data4)
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl FromStr for GUID {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// serde - catalogs carry identifiers as strings
// =============================================================================

impl Serialize for GUID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GUID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GuidVisitor;

        impl Visitor<'_> for GuidVisitor {
            type Value = GUID;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a GUID string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<GUID, E> {
                GUID::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GuidVisitor)
    }
}

// =============================================================================
// windows-compat
// =============================================================================

#[cfg(feature = "windows-compat")]
impl From<windows_core::GUID> for GUID {
    fn from(value: windows_core::GUID) -> Self {
        Self::new(value.data1, value.data2, value.data3, value.data4)
    }
}

#[cfg(feature = "windows-compat")]
impl From<GUID> for windows_core::GUID {
    fn from(value: GUID) -> Self {
        windows_core::GUID::from_values(value.data1, value.data2, value.data3, value.data4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: GUID = GUID::new(
        0x913337e9,
        0x11a1,
        0x4345,
        [0xa3, 0xa2, 0x4e, 0x7f, 0x95, 0x6e, 0x22, 0x2d],
    );

    #[test]
    fn test_display_and_debug_forms() {
        assert_eq!(SAMPLE.to_string(), "913337e9-11a1-4345-a3a2-4e7f956e222d");
        assert_eq!(
            format!("{SAMPLE:?}"),
            "{913337E9-11A1-4345-A3A2-4E7F956E222D}"
        );
        assert_eq!(
            SAMPLE.signature_form(),
            "{913337e9-11a1-4345-a3a2-4e7f956e222d}"
        );
    }

    #[test]
    fn test_parse_plain_and_braced() {
        assert_eq!(GUID::parse("913337e9-11a1-4345-a3a2-4e7f956e222d"), Ok(SAMPLE));
        assert_eq!(GUID::parse("{913337E9-11A1-4345-A3A2-4E7F956E222D}"), Ok(SAMPLE));
        assert!(GUID::parse("913337e9-11a1-4345-a3a24e7f956e222d").is_err());
        assert!(GUID::parse("{913337e9-11a1-4345-a3a2-4e7f956e222d").is_err());
        assert!(GUID::parse("zz3337e9-11a1-4345-a3a2-4e7f956e222d").is_err());
    }

    #[test]
    fn test_u128_conversion() {
        let value = 0x913337e9_11a1_4345_a3a2_4e7f956e222d_u128;
        assert_eq!(GUID::from_u128(value), SAMPLE);
        assert_eq!(SAMPLE.to_u128(), value);
    }
}
