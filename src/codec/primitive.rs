//! Primitive codec: one encode and one decode path per wire type.
//!
//! Fixed-width kinds are written little-endian. Strings carry a 7-bit
//! variable-length byte count (low 7 bits first, high bit set on every byte
//! but the last, at most 5 bytes). Binary blobs carry a 4-byte signed length.
//! Timestamps (since the Unix epoch) and durations are counts of 100 ns ticks.
//!
//! Nullable columns prepend a presence byte:
//! ```text
//! ┌──────────┬──────────────────────┐
//! │ Presence │ Payload              │
//! │ 1 byte   │ only if presence != 0│
//! └──────────┴──────────────────────┘
//! ```

use std::io::{self, Read, Write};

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::{Decimal, Value};
use crate::error::{ConversionError, Result, TableTransferError};
use crate::protocol::{Kind, WireType};

/// Presence byte for an absent nullable value.
pub const ABSENT: u8 = 0;

/// Presence byte written for a present nullable value.
pub const PRESENT: u8 = 1;

/// Default maximum string length accepted by a reader (1 GB).
pub const DEFAULT_MAX_STRING_LEN: u32 = 1_073_741_824;

/// Default maximum blob length accepted by a reader (1 GB).
pub const DEFAULT_MAX_BINARY_LEN: u32 = 1_073_741_824;

/// Maximum bytes in a 7-bit encoded length.
const MAX_7BIT_BYTES: usize = 5;

/// 100 ns ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Reader that tracks the byte position of everything it consumes.
///
/// Positions are relative to where the reader was created, which is the
/// first byte of the table.
#[derive(Debug)]
pub struct WireReader<R> {
    inner: R,
    position: u64,
    max_string_len: u32,
    max_binary_len: u32,
}

impl<R> WireReader<R> {
    /// Wrap a reader with default length limits.
    pub fn new(inner: R) -> Self {
        Self::with_limits(inner, DEFAULT_MAX_STRING_LEN, DEFAULT_MAX_BINARY_LEN)
    }

    /// Wrap a reader with custom length limits.
    pub fn with_limits(inner: R, max_string_len: u32, max_binary_len: u32) -> Self {
        Self {
            inner,
            position: 0,
            max_string_len,
            max_binary_len,
        }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> WireReader<R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(TableTransferError::UnexpectedEof {
                    position: self.position,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read exactly `N` bytes.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Any nonzero byte is `true`.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a 7-bit variable-length count.
    pub fn read_7bit_len(&mut self) -> Result<u32> {
        let start = self.position;
        let mut value: u32 = 0;
        for i in 0..MAX_7BIT_BYTES {
            let byte = self.read_u8()?;
            if i == MAX_7BIT_BYTES - 1 && byte > 0x07 {
                break;
            }
            value |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(TableTransferError::InvalidData {
            position: start,
            reason: "malformed 7-bit encoded length".to_string(),
        })
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.position;
        let len = self.read_7bit_len()?;
        if len > self.max_string_len {
            return Err(TableTransferError::InvalidData {
                position: start,
                reason: format!(
                    "string length {} exceeds maximum {}",
                    len, self.max_string_len
                ),
            });
        }
        let body = self.position;
        let buf = self.read_exact_vec(len)?;
        String::from_utf8(buf).map_err(|e| TableTransferError::InvalidData {
            position: body + e.utf8_error().valid_up_to() as u64,
            reason: "string is not valid UTF-8".to_string(),
        })
    }

    /// Read a length-prefixed binary blob.
    pub fn read_binary(&mut self) -> Result<Bytes> {
        let start = self.position;
        let len = self.read_i32()?;
        let len = u32::try_from(len).map_err(|_| TableTransferError::InvalidData {
            position: start,
            reason: format!("negative blob length {len}"),
        })?;
        if len > self.max_binary_len {
            return Err(TableTransferError::InvalidData {
                position: start,
                reason: format!(
                    "blob length {} exceeds maximum {}",
                    len, self.max_binary_len
                ),
            });
        }
        Ok(Bytes::from(self.read_exact_vec(len)?))
    }

    /// Read `len` bytes without trusting `len` for the up-front allocation.
    fn read_exact_vec(&mut self, len: u32) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let n = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.position += n as u64;
        if n < len as usize {
            return Err(TableTransferError::UnexpectedEof {
                position: self.position,
            });
        }
        Ok(buf)
    }
}

/// Write a 7-bit variable-length count.
pub fn write_7bit_len<W: Write + ?Sized>(w: &mut W, mut value: u32) -> io::Result<()> {
    let mut buf = [0u8; MAX_7BIT_BYTES];
    let mut n = 0;
    while value >= 0x80 {
        buf[n] = (value as u8) | 0x80;
        value >>= 7;
        n += 1;
    }
    buf[n] = value as u8;
    w.write_all(&buf[..=n])
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> Result<()> {
    let len = i32::try_from(s.len()).map_err(|_| ConversionError::OutOfRange("string"))?;
    write_7bit_len(w, len as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Write a length-prefixed binary blob.
pub fn write_binary<W: Write + ?Sized>(w: &mut W, data: &[u8]) -> Result<()> {
    let len = i32::try_from(data.len()).map_err(|_| ConversionError::OutOfRange("binary"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(data)?;
    Ok(())
}

/// Encode one value under `ty`.
///
/// Nullable types write a presence byte first; `Value::Null` writes only
/// that byte. Non-nullable types reject `Value::Null`.
pub fn write_value<W: Write + ?Sized>(w: &mut W, ty: WireType, value: &Value) -> Result<()> {
    if ty.nullable {
        if value.is_null() {
            w.write_all(&[ABSENT])?;
            return Ok(());
        }
        w.write_all(&[PRESENT])?;
    }
    write_payload(w, ty, value)
}

fn write_payload<W: Write + ?Sized>(w: &mut W, ty: WireType, value: &Value) -> Result<()> {
    macro_rules! expect {
        ($variant:ident) => {
            match value {
                Value::$variant(v) => v,
                other => {
                    return Err(ConversionError::KindMismatch {
                        expected: ty,
                        found: other.kind_name(),
                    }
                    .into())
                }
            }
        };
    }

    match ty.kind {
        Kind::Bool => w.write_all(&[*expect!(Bool) as u8])?,
        Kind::UInt8 => w.write_all(&[*expect!(UInt8)])?,
        Kind::UInt16 => w.write_all(&expect!(UInt16).to_le_bytes())?,
        Kind::UInt32 => w.write_all(&expect!(UInt32).to_le_bytes())?,
        Kind::UInt64 => w.write_all(&expect!(UInt64).to_le_bytes())?,
        Kind::Int8 => w.write_all(&expect!(Int8).to_le_bytes())?,
        Kind::Int16 => w.write_all(&expect!(Int16).to_le_bytes())?,
        Kind::Int32 => w.write_all(&expect!(Int32).to_le_bytes())?,
        Kind::Int64 => w.write_all(&expect!(Int64).to_le_bytes())?,
        Kind::Decimal => {
            for word in expect!(Decimal).to_words() {
                w.write_all(&word.to_le_bytes())?;
            }
        }
        Kind::Float32 => w.write_all(&expect!(Float32).to_le_bytes())?,
        Kind::Float64 => w.write_all(&expect!(Float64).to_le_bytes())?,
        Kind::Uuid => w.write_all(&expect!(Uuid).to_bytes_le())?,
        Kind::String => write_string(w, expect!(String))?,
        Kind::Binary => write_binary(w, expect!(Binary))?,
        Kind::Timestamp => {
            let ts = expect!(Timestamp);
            let nanos = ts.timestamp_subsec_nanos() as i64;
            // leap seconds carry nanos >= 1s and have no tick representation
            if nanos >= NANOS_PER_SECOND {
                return Err(ConversionError::OutOfRange("timestamp").into());
            }
            let ticks = to_ticks(ts.timestamp(), nanos, "timestamp")?;
            w.write_all(&ticks.to_le_bytes())?;
        }
        Kind::Duration => {
            let d = expect!(Duration);
            let ticks = to_ticks(d.num_seconds(), d.subsec_nanos() as i64, "duration")?;
            w.write_all(&ticks.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Seconds plus sub-second nanoseconds (same sign) as 100 ns ticks.
fn to_ticks(
    secs: i64,
    nanos: i64,
    what: &'static str,
) -> std::result::Result<i64, ConversionError> {
    let ticks = secs
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(nanos / NANOS_PER_TICK))
        .ok_or(ConversionError::OutOfRange(what))?;
    if nanos % NANOS_PER_TICK != 0 {
        return Err(ConversionError::SubTickPrecision(what));
    }
    Ok(ticks)
}

fn timestamp_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::from_timestamp(secs, nanos as u32)
}

fn duration_from_ticks(ticks: i64) -> Option<TimeDelta> {
    let nanos = (ticks % TICKS_PER_SECOND) * NANOS_PER_TICK;
    TimeDelta::try_seconds(ticks / TICKS_PER_SECOND)?.checked_add(&TimeDelta::nanoseconds(nanos))
}

/// Decode one value under `ty`.
pub fn read_value<R: Read>(r: &mut WireReader<R>, ty: WireType) -> Result<Value> {
    if ty.nullable && r.read_u8()? == ABSENT {
        return Ok(Value::Null);
    }

    Ok(match ty.kind {
        Kind::Bool => Value::Bool(r.read_bool()?),
        Kind::UInt8 => Value::UInt8(r.read_u8()?),
        Kind::UInt16 => Value::UInt16(u16::from_le_bytes(r.read_array()?)),
        Kind::UInt32 => Value::UInt32(r.read_u32()?),
        Kind::UInt64 => Value::UInt64(u64::from_le_bytes(r.read_array()?)),
        Kind::Int8 => Value::Int8(i8::from_le_bytes(r.read_array()?)),
        Kind::Int16 => Value::Int16(i16::from_le_bytes(r.read_array()?)),
        Kind::Int32 => Value::Int32(r.read_i32()?),
        Kind::Int64 => Value::Int64(i64::from_le_bytes(r.read_array()?)),
        Kind::Decimal => {
            let start = r.position();
            let mut words = [0u32; 4];
            for word in &mut words {
                *word = r.read_u32()?;
            }
            let decimal =
                Decimal::from_words(words).ok_or_else(|| TableTransferError::InvalidData {
                    position: start,
                    reason: "decimal has reserved flag bits set or scale above 28".to_string(),
                })?;
            Value::Decimal(decimal)
        }
        Kind::Float32 => Value::Float32(f32::from_le_bytes(r.read_array()?)),
        Kind::Float64 => Value::Float64(f64::from_le_bytes(r.read_array()?)),
        Kind::Uuid => Value::Uuid(Uuid::from_bytes_le(r.read_array()?)),
        Kind::String => Value::String(r.read_string()?),
        Kind::Binary => Value::Binary(r.read_binary()?),
        Kind::Timestamp => {
            let start = r.position();
            let ticks = i64::from_le_bytes(r.read_array()?);
            Value::Timestamp(timestamp_from_ticks(ticks).ok_or_else(|| {
                TableTransferError::InvalidData {
                    position: start,
                    reason: format!("timestamp tick count {ticks} is out of range"),
                }
            })?)
        }
        Kind::Duration => {
            let start = r.position();
            let ticks = i64::from_le_bytes(r.read_array()?);
            Value::Duration(duration_from_ticks(ticks).ok_or_else(|| {
                TableTransferError::InvalidData {
                    position: start,
                    reason: format!("duration tick count {ticks} is out of range"),
                }
            })?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(ty: WireType, value: Value) -> Value {
        let mut buf = Vec::new();
        write_value(&mut buf, ty, &value).unwrap();
        let mut r = WireReader::new(Cursor::new(buf.as_slice()));
        let back = read_value(&mut r, ty).unwrap();
        assert_eq!(r.position(), buf.len() as u64, "{ty} left bytes unread");
        back
    }

    fn samples() -> Vec<Value> {
        vec![
            Value::Bool(true),
            Value::UInt8(39),
            Value::UInt16(394),
            Value::UInt32(3842),
            Value::UInt64(8_321_943),
            Value::Int8(-34),
            Value::Int16(38),
            Value::Int32(0),
            Value::Int64(823_433),
            Value::Decimal(Decimal::new(4242, 2).unwrap()),
            Value::Float32(42.42),
            Value::Float64(42.42),
            Value::Uuid(Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677)),
            Value::String("Hello world".into()),
            Value::Binary(Bytes::from_static(&[0, 1, 1, 0, 1])),
            Value::Timestamp(DateTime::from_timestamp_nanos(1_700_000_000_123_456_700)),
            Value::Duration(TimeDelta::minutes(-1)),
        ]
    }

    #[test]
    fn test_every_kind_roundtrips() {
        for value in samples() {
            let kind = value.kind().unwrap();
            assert_eq!(roundtrip(WireType::new(kind), value.clone()), value);
            assert_eq!(roundtrip(WireType::nullable(kind), value.clone()), value);
        }
    }

    #[test]
    fn test_every_nullable_kind_roundtrips_absent() {
        for kind in Kind::ALL {
            let ty = WireType::nullable(kind);
            let mut buf = Vec::new();
            write_value(&mut buf, ty, &Value::Null).unwrap();
            assert_eq!(buf, [ABSENT]);
            assert_eq!(roundtrip(ty, Value::Null), Value::Null);
        }
    }

    #[test]
    fn test_empty_string_and_blob_are_not_null() {
        let ty = WireType::nullable(Kind::String);
        let mut buf = Vec::new();
        write_value(&mut buf, ty, &Value::String(String::new())).unwrap();
        assert_eq!(buf, [PRESENT, 0]);
        assert_eq!(roundtrip(ty, Value::String(String::new())), Value::String(String::new()));

        let ty = WireType::nullable(Kind::Binary);
        assert_eq!(
            roundtrip(ty, Value::Binary(Bytes::new())),
            Value::Binary(Bytes::new())
        );
    }

    #[test]
    fn test_non_nullable_rejects_null() {
        let mut buf = Vec::new();
        let err = write_value(&mut buf, WireType::new(Kind::String), &Value::Null).unwrap_err();
        assert!(matches!(
            err,
            TableTransferError::ValueConversion(ConversionError::KindMismatch { found: "null", .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut buf = Vec::new();
        let err = write_value(&mut buf, WireType::new(Kind::Int32), &Value::Int64(1)).unwrap_err();
        assert!(err.to_string().contains("expected i32, found i64"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_float_bits_preserved() {
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        let Value::Float64(back) = roundtrip(WireType::new(Kind::Float64), Value::Float64(nan))
        else {
            panic!("wrong kind");
        };
        assert_eq!(back.to_bits(), nan.to_bits());

        let Value::Float32(back) = roundtrip(WireType::new(Kind::Float32), Value::Float32(-0.0))
        else {
            panic!("wrong kind");
        };
        assert_eq!(back.to_bits(), (-0.0f32).to_bits());
    }

    #[test]
    fn test_fixed_widths_on_wire() {
        for value in samples() {
            let kind = value.kind().unwrap();
            if let Some(width) = kind.fixed_width() {
                let mut buf = Vec::new();
                write_value(&mut buf, WireType::new(kind), &value).unwrap();
                assert_eq!(buf.len(), width, "{kind:?}");
            }
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = Vec::new();
        write_value(&mut buf, WireType::new(Kind::Int32), &Value::Int32(0x0102_0304)).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_7bit_len_encoding() {
        let cases: [(u32, &[u8]); 4] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_7bit_len(&mut buf, value).unwrap();
            assert_eq!(buf, expected);
            let mut r = WireReader::new(Cursor::new(buf));
            assert_eq!(r.read_7bit_len().unwrap(), value);
        }
    }

    #[test]
    fn test_7bit_len_too_long() {
        let mut r = WireReader::new(Cursor::new(vec![0xFF; 6]));
        assert!(matches!(
            r.read_7bit_len(),
            Err(TableTransferError::InvalidData { position: 0, .. })
        ));
    }

    #[test]
    fn test_string_limit_enforced() {
        let mut buf = Vec::new();
        write_string(&mut buf, "abcdef").unwrap();
        let mut r = WireReader::with_limits(Cursor::new(buf), 4, 4);
        let err = r.read_string().unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let buf = vec![2, 0x61, 0xFF];
        let mut r = WireReader::new(Cursor::new(buf));
        let err = r.read_string().unwrap_err();
        assert_eq!(err.position(), Some(2));
    }

    #[test]
    fn test_negative_blob_length_rejected() {
        let buf = (-1i32).to_le_bytes().to_vec();
        let mut r = WireReader::new(Cursor::new(buf));
        assert!(r.read_binary().unwrap_err().to_string().contains("negative"));
    }

    #[test]
    fn test_truncated_payload_reports_eof() {
        let mut r = WireReader::new(Cursor::new(vec![1, 2]));
        let err = read_value(&mut r, WireType::new(Kind::Int64)).unwrap_err();
        assert!(matches!(err, TableTransferError::UnexpectedEof { position: 0 }));

        let mut buf = Vec::new();
        write_binary(&mut buf, b"hello").unwrap();
        buf.truncate(7);
        let mut r = WireReader::new(Cursor::new(buf));
        assert!(matches!(
            r.read_binary(),
            Err(TableTransferError::UnexpectedEof { position: 7 })
        ));
    }

    #[test]
    fn test_invalid_decimal_rejected() {
        let mut buf = Vec::new();
        for word in [1u32, 0, 0, 0x0000_00FF] {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        let mut r = WireReader::new(Cursor::new(buf));
        let err = read_value(&mut r, WireType::new(Kind::Decimal)).unwrap_err();
        assert!(matches!(err, TableTransferError::InvalidData { position: 0, .. }));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let far = DateTime::<Utc>::MAX_UTC;
        let mut buf = Vec::new();
        let err = write_value(&mut buf, WireType::new(Kind::Timestamp), &Value::Timestamp(far))
            .unwrap_err();
        assert!(matches!(
            err,
            TableTransferError::ValueConversion(ConversionError::OutOfRange("timestamp"))
        ));
    }

    #[test]
    fn test_timestamp_tick_layout() {
        let ts = DateTime::from_timestamp(1, 200).unwrap();
        let mut buf = Vec::new();
        write_value(&mut buf, WireType::new(Kind::Timestamp), &Value::Timestamp(ts)).unwrap();
        assert_eq!(buf, (TICKS_PER_SECOND + 2).to_le_bytes());

        let mut buf = Vec::new();
        let d = Value::Duration(TimeDelta::minutes(-1));
        write_value(&mut buf, WireType::new(Kind::Duration), &d).unwrap();
        assert_eq!(buf, (-60 * TICKS_PER_SECOND).to_le_bytes());
    }

    #[test]
    fn test_dates_far_from_epoch_roundtrip() {
        let samples = [
            DateTime::parse_from_rfc3339("0001-01-01T00:00:00Z").unwrap(),
            DateTime::parse_from_rfc3339("1600-02-29T12:34:56.1234567Z").unwrap(),
            DateTime::parse_from_rfc3339("1969-12-31T23:59:59.9999999Z").unwrap(),
            DateTime::parse_from_rfc3339("3000-07-04T00:00:00Z").unwrap(),
            DateTime::parse_from_rfc3339("9999-12-31T23:59:59.9999999Z").unwrap(),
        ];
        for ts in samples {
            let value = Value::Timestamp(ts.with_timezone(&Utc));
            assert_eq!(roundtrip(WireType::new(Kind::Timestamp), value.clone()), value);
        }

        for d in [
            TimeDelta::days(365 * 5000),
            TimeDelta::days(-365 * 5000) - TimeDelta::nanoseconds(300),
            TimeDelta::nanoseconds(-100),
        ] {
            let value = Value::Duration(d);
            assert_eq!(roundtrip(WireType::new(Kind::Duration), value.clone()), value);
        }
    }

    #[test]
    fn test_sub_tick_precision_rejected() {
        let ts = DateTime::from_timestamp(0, 150).unwrap();
        let mut buf = Vec::new();
        let err = write_value(&mut buf, WireType::new(Kind::Timestamp), &Value::Timestamp(ts))
            .unwrap_err();
        assert!(matches!(
            err,
            TableTransferError::ValueConversion(ConversionError::SubTickPrecision("timestamp"))
        ));

        let d = Value::Duration(TimeDelta::nanoseconds(-7));
        assert!(write_value(&mut Vec::<u8>::new(), WireType::new(Kind::Duration), &d).is_err());
    }

    #[test]
    fn test_uuid_mixed_endian_layout() {
        let id = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let mut buf = Vec::new();
        write_value(&mut buf, WireType::new(Kind::Uuid), &Value::Uuid(id)).unwrap();
        assert_eq!(&buf[..4], &[0x33, 0x22, 0x11, 0x00]);
        assert_eq!(&buf[8..], &[0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }
}
