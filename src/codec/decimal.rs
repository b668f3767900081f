//! Exact fixed-point decimal.
//!
//! A 96-bit unsigned magnitude, a sign, and a base-10 scale of 0..=28. The
//! wire layout is four little-endian 32-bit words:
//! ```text
//! ┌────────┬────────┬────────┬──────────────────────────────┐
//! │ lo     │ mid    │ hi     │ flags                        │
//! │ 4 bytes│ 4 bytes│ 4 bytes│ scale: bits 16-23, sign: 31  │
//! └────────┴────────┴────────┴──────────────────────────────┘
//! ```
//!
//! Values are compared by representation: `1.0` (mantissa 10, scale 1) and
//! `1` (mantissa 1, scale 0) are different decimals. Negative zero survives
//! a round trip.

use std::fmt;

use crate::error::ConversionError;

/// Largest scale a decimal may carry.
pub const MAX_SCALE: u8 = 28;

/// Largest magnitude representable in 96 bits.
pub const MAX_MANTISSA: u128 = (1 << 96) - 1;

const SCALE_SHIFT: u32 = 16;
const SCALE_MASK: u32 = 0x00FF_0000;
const SIGN_MASK: u32 = 0x8000_0000;

/// Exact decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    magnitude: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    /// Build from a signed mantissa and scale, e.g. `(4242, 2)` is `42.42`.
    pub fn new(mantissa: i128, scale: u8) -> Result<Self, ConversionError> {
        let magnitude = mantissa.unsigned_abs();
        Self::from_parts(magnitude, scale, mantissa < 0)
    }

    /// Build from magnitude, scale, and sign.
    pub fn from_parts(magnitude: u128, scale: u8, negative: bool) -> Result<Self, ConversionError> {
        if magnitude > MAX_MANTISSA || scale > MAX_SCALE {
            return Err(ConversionError::OutOfRange("decimal"));
        }
        Ok(Self {
            magnitude,
            scale,
            negative,
        })
    }

    /// Signed mantissa.
    pub fn mantissa(&self) -> i128 {
        // magnitude < 2^96, so the cast cannot overflow.
        let m = self.magnitude as i128;
        if self.negative {
            -m
        } else {
            m
        }
    }

    pub fn magnitude(&self) -> u128 {
        self.magnitude
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn is_sign_negative(&self) -> bool {
        self.negative
    }

    /// Encode as `[lo, mid, hi, flags]`.
    pub fn to_words(&self) -> [u32; 4] {
        let mut flags = (self.scale as u32) << SCALE_SHIFT;
        if self.negative {
            flags |= SIGN_MASK;
        }
        [
            self.magnitude as u32,
            (self.magnitude >> 32) as u32,
            (self.magnitude >> 64) as u32,
            flags,
        ]
    }

    /// Decode `[lo, mid, hi, flags]`.
    ///
    /// Returns `None` when reserved flag bits are set or the scale exceeds
    /// [`MAX_SCALE`].
    pub fn from_words(words: [u32; 4]) -> Option<Self> {
        let [lo, mid, hi, flags] = words;
        if flags & !(SCALE_MASK | SIGN_MASK) != 0 {
            return None;
        }
        let scale = ((flags & SCALE_MASK) >> SCALE_SHIFT) as u8;
        if scale > MAX_SCALE {
            return None;
        }
        Some(Self {
            magnitude: (lo as u128) | ((mid as u128) << 32) | ((hi as u128) << 64),
            scale,
            negative: flags & SIGN_MASK != 0,
        })
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self {
            magnitude: value.unsigned_abs() as u128,
            scale: 0,
            negative: value < 0,
        }
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self {
            magnitude: value as u128,
            scale: 0,
            negative: false,
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.magnitude.to_string();
        let scale = self.scale as usize;
        if self.negative {
            f.write_str("-")?;
        }
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_roundtrip() {
        let d = Decimal::new(-4242, 2).unwrap();
        let words = d.to_words();
        assert_eq!(words[0], 4242);
        assert_eq!(words[3], 0x8002_0000);
        assert_eq!(Decimal::from_words(words), Some(d));
    }

    #[test]
    fn test_max_mantissa_spans_all_words() {
        let d = Decimal::from_parts(MAX_MANTISSA, MAX_SCALE, false).unwrap();
        let words = d.to_words();
        assert_eq!(&words[..3], &[u32::MAX, u32::MAX, u32::MAX]);
        assert_eq!(Decimal::from_words(words), Some(d));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(Decimal::from_parts(MAX_MANTISSA + 1, 0, false).is_err());
        assert!(Decimal::new(1, 29).is_err());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        assert!(Decimal::from_words([1, 0, 0, 0x0000_0001]).is_none());
        assert!(Decimal::from_words([1, 0, 0, 29 << 16]).is_none());
    }

    #[test]
    fn test_negative_zero_preserved() {
        let d = Decimal::from_parts(0, 3, true).unwrap();
        let back = Decimal::from_words(d.to_words()).unwrap();
        assert!(back.is_sign_negative());
        assert_ne!(back, Decimal::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(Decimal::new(4242, 2).unwrap().to_string(), "42.42");
        assert_eq!(Decimal::new(-5, 3).unwrap().to_string(), "-0.005");
        assert_eq!(Decimal::from(17i64).to_string(), "17");
    }
}
