//! Scan destinations.
//!
//! [`ScanDest`] is the capability set of the scanner: pointer-to-primitive,
//! nullable wrapper (`Option<_>`), decoded-any sink, raw value sink, and
//! user scanners ([`RawScan`] over the traversal cursor, [`AnyScan`] over
//! decoded values). Every decode assigns the destination only on success;
//! a failed or overflowing decode records the sticky error and leaves the
//! destination untouched.

use crate::scanner::{ItemCursor, ResultSetReader, ScanErrorKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use ydb_proto::{Type, Value};

/// 128-bit decimal as it travels on the wire, plus its type parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    /// Big-endian 128-bit two's-complement payload.
    pub bytes: [u8; 16],
    pub precision: u32,
    pub scale: u32,
}

/// Decoded dynamically-typed cell, the `any` shape of the scanner.
///
/// Optional columns are transparent here: a present `Optional<T>` decodes
/// as the plain `T` variant, an absent one as [`AnyValue::Null`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue {
    Null,
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    Uuid([u8; 16]),
    DateTime(DateTime<Utc>),
    Interval(chrono::Duration),
}

impl Default for AnyValue {
    fn default() -> Self {
        AnyValue::Null
    }
}

/// A destination the scanner can decode into.
pub trait ScanDest {
    /// Decodes the (optional-unwrapped, non-null) cell under the cursor.
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>);

    /// Writes the zero value; `scan_with_defaults` on a NULL cell.
    fn set_default(&mut self, cur: &mut ItemCursor<'_>);

    /// Handles a NULL cell in plain `scan` mode. Destinations that cannot
    /// represent NULL record a type error.
    fn scan_null(&mut self, cur: &mut ItemCursor<'_>) {
        cur.set_error(
            ScanErrorKind::Type,
            "column is NULL; use an Option<_> destination or scan_with_defaults",
        );
    }

    /// Raw sinks receive the pristine cell, before any optional handling.
    fn wants_raw_cell(&self) -> bool {
        false
    }

    /// Null-capable destinations consume the optional layers themselves,
    /// which keeps outer-null and inner-null of nested optionals apart.
    fn handles_null(&self) -> bool {
        false
    }
}

/// Tuple of `&mut` destinations accepted by `scan`/`scan_with_defaults`.
pub trait ScanTuple {
    const ARITY: usize;
    fn scan_into(self, reader: &mut ResultSetReader);
}

macro_rules! impl_scan_tuple {
    ($arity:literal; $($lt:lifetime $T:ident $idx:tt),+) => {
        impl<$($lt,)+ $($T: ScanDest,)+> ScanTuple for ($(&$lt mut $T,)+) {
            const ARITY: usize = $arity;
            fn scan_into(self, reader: &mut ResultSetReader) {
                $(reader.scan_slot($idx, self.$idx);)+
            }
        }
    };
}

impl_scan_tuple!(1; 'a0 T0 0);
impl_scan_tuple!(2; 'a0 T0 0, 'a1 T1 1);
impl_scan_tuple!(3; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2);
impl_scan_tuple!(4; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2, 'a3 T3 3);
impl_scan_tuple!(5; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2, 'a3 T3 3, 'a4 T4 4);
impl_scan_tuple!(6; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2, 'a3 T3 3, 'a4 T4 4, 'a5 T5 5);
impl_scan_tuple!(7; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2, 'a3 T3 3, 'a4 T4 4, 'a5 T5 5, 'a6 T6 6);
impl_scan_tuple!(8; 'a0 T0 0, 'a1 T1 1, 'a2 T2 2, 'a3 T3 3, 'a4 T4 4, 'a5 T5 5, 'a6 T6 6, 'a7 T7 7);

impl ScanDest for bool {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(v) = cur.bool_value() {
            *self = v;
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = false;
    }
}

macro_rules! impl_narrowing_dest {
    ($ty:ty, $wide:ident, $label:literal) => {
        impl ScanDest for $ty {
            fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
                if let Some(wide) = cur.$wide() {
                    match <$ty>::try_from(wide) {
                        Ok(v) => *self = v,
                        Err(_) => cur.overflow_error(wide, $label),
                    }
                }
            }

            fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
                *self = 0;
            }
        }
    };
}

// Narrow integers ride in Int32/Uint32 cells; the range check is ours.
impl_narrowing_dest!(i8, int32_value, "i8");
impl_narrowing_dest!(i16, int32_value, "i16");
impl_narrowing_dest!(u8, uint32_value, "u8");
impl_narrowing_dest!(u16, uint32_value, "u16");

macro_rules! impl_direct_dest {
    ($ty:ty, $getter:ident) => {
        impl ScanDest for $ty {
            fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
                if let Some(v) = cur.$getter() {
                    *self = v;
                }
            }

            fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
                *self = Default::default();
            }
        }
    };
}

impl_direct_dest!(i32, int32_value);
impl_direct_dest!(u32, uint32_value);
impl_direct_dest!(i64, int64_value);
impl_direct_dest!(u64, uint64_value);
impl_direct_dest!(f32, float_value);
impl_direct_dest!(f64, double_value);

impl ScanDest for String {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        let frame = cur.current();
        match frame.ty {
            Type::Utf8 | Type::DyNumber | Type::Yson | Type::Json | Type::JsonDocument => {
                if let Some(text) = cur.text_value() {
                    *self = text.to_owned();
                }
            }
            Type::Bytes => {
                if let Some(bytes) = cur.bytes_value() {
                    match std::str::from_utf8(bytes) {
                        Ok(text) => *self = text.to_owned(),
                        Err(_) => cur.set_error(
                            ScanErrorKind::Value,
                            "Bytes cell is not valid UTF-8",
                        ),
                    }
                }
            }
            Type::Uuid => {
                if let Some(bytes) = cur.uint128_value() {
                    *self = uuid::Uuid::from_bytes(bytes).to_string();
                }
            }
            _ => cur.type_error("a textual type"),
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        self.clear();
    }
}

impl ScanDest for Vec<u8> {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        let frame = cur.current();
        match frame.ty {
            Type::Bytes => {
                if let Some(bytes) = cur.bytes_value() {
                    *self = bytes.to_vec();
                }
            }
            Type::Utf8 | Type::DyNumber | Type::Yson | Type::Json | Type::JsonDocument => {
                if let Some(text) = cur.text_value() {
                    *self = text.as_bytes().to_vec();
                }
            }
            Type::Uuid => {
                if let Some(bytes) = cur.uint128_value() {
                    *self = bytes.to_vec();
                }
            }
            _ => cur.type_error("a bytes-compatible type"),
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        self.clear();
    }
}

impl ScanDest for [u8; 16] {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(bytes) = cur.uint128_value() {
            *self = bytes;
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = [0u8; 16];
    }
}

impl ScanDest for uuid::Uuid {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if !matches!(cur.current().ty, Type::Uuid) {
            cur.type_error("Uuid");
            return;
        }
        if let Some(bytes) = cur.uint128_value() {
            *self = uuid::Uuid::from_bytes(bytes);
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = uuid::Uuid::nil();
    }
}

impl ScanDest for DateTime<Utc> {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(v) = decode_datetime(cur) {
            *self = v;
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = DateTime::UNIX_EPOCH;
    }
}

impl ScanDest for chrono::Duration {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(micros) = cur.int64_value() {
            *self = chrono::Duration::microseconds(micros);
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = chrono::Duration::zero();
    }
}

impl ScanDest for Decimal {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        let frame = cur.current();
        let Type::Decimal { precision, scale } = frame.ty else {
            cur.type_error("Decimal");
            return;
        };
        let (precision, scale) = (*precision, *scale);
        if let Some(bytes) = cur.uint128_value() {
            *self = Decimal {
                bytes,
                precision,
                scale,
            };
        }
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = Decimal::default();
    }
}

impl ScanDest for AnyValue {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(v) = decode_any(cur) {
            *self = v;
        }
    }

    fn scan_null(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = AnyValue::Null;
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = AnyValue::Null;
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// Raw protocol sink: receives the pristine cell, optional wrapper and all.
impl ScanDest for Value {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        *self = cur.current().value.clone();
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = Value::Null;
    }

    fn wants_raw_cell(&self) -> bool {
        true
    }
}

impl<T: ScanDest + Default> ScanDest for Option<T> {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        // Nested optionals shed one layer per Option level.
        if cur.is_optional() {
            if cur.is_null() {
                *self = None;
                return;
            }
            cur.unwrap_optional();
        }
        let had_error = cur.has_error();
        let mut value = T::default();
        value.scan_value(cur);
        if cur.has_error() && !had_error {
            return;
        }
        *self = Some(value);
    }

    fn scan_null(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = None;
    }

    fn set_default(&mut self, _cur: &mut ItemCursor<'_>) {
        *self = None;
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// User scanner over the raw traversal cursor (nested values included).
pub trait RawScan {
    fn scan_raw(&mut self, cur: &mut ItemCursor<'_>) -> Result<(), String>;
}

/// Adapter binding a [`RawScan`] implementor into a scan tuple:
/// `reader.scan((&mut RawDest(&mut my_scanner),))`.
pub struct RawDest<'a, T: RawScan>(pub &'a mut T);

impl<T: RawScan> ScanDest for RawDest<'_, T> {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Err(message) = self.0.scan_raw(cur) {
            cur.set_error(ScanErrorKind::External, message);
        }
    }

    fn set_default(&mut self, cur: &mut ItemCursor<'_>) {
        self.scan_value(cur);
    }

    fn wants_raw_cell(&self) -> bool {
        true
    }
}

/// User scanner over decoded values, the `sql.Scanner` shape: NULL arrives
/// as [`AnyValue::Null`].
pub trait AnyScan {
    fn scan_any(&mut self, value: AnyValue) -> Result<(), String>;
}

/// Adapter binding an [`AnyScan`] implementor into a scan tuple.
pub struct AnyDest<'a, T: AnyScan>(pub &'a mut T);

impl<T: AnyScan> ScanDest for AnyDest<'_, T> {
    fn scan_value(&mut self, cur: &mut ItemCursor<'_>) {
        if let Some(value) = decode_any(cur) {
            if let Err(message) = self.0.scan_any(value) {
                cur.set_error(ScanErrorKind::External, message);
            }
        }
    }

    fn scan_null(&mut self, cur: &mut ItemCursor<'_>) {
        if let Err(message) = self.0.scan_any(AnyValue::Null) {
            cur.set_error(ScanErrorKind::External, message);
        }
    }

    fn set_default(&mut self, cur: &mut ItemCursor<'_>) {
        self.scan_null(cur);
    }

    fn handles_null(&self) -> bool {
        true
    }
}

/// Decodes the cell under the cursor into its dynamically-typed shape.
pub(crate) fn decode_any(cur: &mut ItemCursor<'_>) -> Option<AnyValue> {
    if cur.has_error() {
        return None;
    }
    if cur.is_null() {
        return Some(AnyValue::Null);
    }
    if cur.is_optional() {
        cur.unwrap_optional();
        if cur.is_null() {
            return Some(AnyValue::Null);
        }
    }
    let frame = cur.current();
    match frame.ty {
        Type::Bool => cur.bool_value().map(AnyValue::Bool),
        Type::Int8 => {
            let wide = cur.int32_value()?;
            match i8::try_from(wide) {
                Ok(v) => Some(AnyValue::Int8(v)),
                Err(_) => {
                    cur.overflow_error(wide, "i8");
                    None
                }
            }
        }
        Type::Uint8 => {
            let wide = cur.uint32_value()?;
            match u8::try_from(wide) {
                Ok(v) => Some(AnyValue::Uint8(v)),
                Err(_) => {
                    cur.overflow_error(wide, "u8");
                    None
                }
            }
        }
        Type::Int16 => {
            let wide = cur.int32_value()?;
            match i16::try_from(wide) {
                Ok(v) => Some(AnyValue::Int16(v)),
                Err(_) => {
                    cur.overflow_error(wide, "i16");
                    None
                }
            }
        }
        Type::Uint16 => {
            let wide = cur.uint32_value()?;
            match u16::try_from(wide) {
                Ok(v) => Some(AnyValue::Uint16(v)),
                Err(_) => {
                    cur.overflow_error(wide, "u16");
                    None
                }
            }
        }
        Type::Int32 => cur.int32_value().map(AnyValue::Int32),
        Type::Uint32 => cur.uint32_value().map(AnyValue::Uint32),
        Type::Int64 => cur.int64_value().map(AnyValue::Int64),
        Type::Uint64 => cur.uint64_value().map(AnyValue::Uint64),
        Type::Float => cur.float_value().map(AnyValue::Float),
        Type::Double => cur.double_value().map(AnyValue::Double),
        Type::Bytes => cur.bytes_value().map(|b| AnyValue::Bytes(b.to_vec())),
        Type::Utf8 | Type::DyNumber => cur.text_value().map(|t| AnyValue::Text(t.to_owned())),
        Type::Yson | Type::Json | Type::JsonDocument => cur
            .text_value()
            .map(|t| AnyValue::Bytes(t.as_bytes().to_vec())),
        Type::Uuid => cur.uint128_value().map(AnyValue::Uuid),
        Type::Date | Type::Datetime | Type::Timestamp | Type::TzDate | Type::TzDatetime
        | Type::TzTimestamp => decode_datetime(cur).map(AnyValue::DateTime),
        Type::Interval => cur
            .int64_value()
            .map(|v| AnyValue::Interval(chrono::Duration::microseconds(v))),
        _ => {
            cur.type_error("a primitive type");
            None
        }
    }
}

enum TzKind {
    Date,
    Datetime,
}

/// Decodes the temporal family into the canonical UTC timestamp.
pub(crate) fn decode_datetime(cur: &mut ItemCursor<'_>) -> Option<DateTime<Utc>> {
    let frame = cur.current();
    match frame.ty {
        Type::Date => {
            let days = cur.uint32_value()?;
            timestamp_from(cur, i64::from(days) * 86_400, 0)
        }
        Type::Datetime => {
            let seconds = cur.uint32_value()?;
            timestamp_from(cur, i64::from(seconds), 0)
        }
        Type::Timestamp => {
            let micros = cur.uint64_value()?;
            match i64::try_from(micros).ok().and_then(DateTime::from_timestamp_micros) {
                Some(v) => Some(v),
                None => {
                    cur.set_error(ScanErrorKind::Value, "timestamp out of range");
                    None
                }
            }
        }
        Type::TzDate => {
            let text = cur.text_value()?;
            parse_tz(cur, text, TzKind::Date)
        }
        Type::TzDatetime | Type::TzTimestamp => {
            let text = cur.text_value()?;
            parse_tz(cur, text, TzKind::Datetime)
        }
        _ => {
            cur.type_error("a temporal type");
            None
        }
    }
}

fn timestamp_from(cur: &mut ItemCursor<'_>, secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    match DateTime::from_timestamp(secs, nanos) {
        Some(v) => Some(v),
        None => {
            cur.set_error(ScanErrorKind::Value, "timestamp out of range");
            None
        }
    }
}

/// Parses the textual `value,zone` form of the Tz* types.
fn parse_tz(cur: &mut ItemCursor<'_>, text: &str, kind: TzKind) -> Option<DateTime<Utc>> {
    let Some((value, zone)) = text.split_once(',') else {
        cur.set_error(
            ScanErrorKind::Value,
            format!("malformed timezone value {text:?}"),
        );
        return None;
    };
    let tz: chrono_tz::Tz = match zone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            cur.set_error(ScanErrorKind::Value, format!("unknown timezone {zone:?}"));
            return None;
        }
    };
    let naive: NaiveDateTime = match kind {
        TzKind::Date => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => match date.and_hms_opt(0, 0, 0) {
                Some(naive) => naive,
                None => {
                    cur.set_error(ScanErrorKind::Value, "date out of range");
                    return None;
                }
            },
            Err(e) => {
                cur.set_error(ScanErrorKind::Value, format!("malformed date {value:?}: {e}"));
                return None;
            }
        },
        TzKind::Datetime => {
            match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            {
                Ok(naive) => naive,
                Err(e) => {
                    cur.set_error(
                        ScanErrorKind::Value,
                        format!("malformed datetime {value:?}: {e}"),
                    );
                    return None;
                }
            }
        }
    };
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => Some(local.with_timezone(&Utc)),
        None => {
            cur.set_error(
                ScanErrorKind::Value,
                format!("{value:?} does not exist in {zone:?}"),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ResultSetReader;
    use ydb_proto::{Column, ResultSet, Row, StructMember};

    fn single_cell(ty: Type, value: Value) -> ResultSetReader {
        let mut reader = ResultSetReader::new(ResultSet {
            columns: vec![Column {
                name: "c".into(),
                ty,
            }],
            rows: vec![Row { items: vec![value] }],
            truncated: false,
        });
        assert!(reader.next_row());
        reader
    }

    #[test]
    fn test_primitive_round_trip() {
        let mut b = false;
        single_cell(Type::Bool, Value::Bool(true))
            .scan((&mut b,))
            .unwrap();
        assert!(b);

        let mut small: i8 = 0;
        single_cell(Type::Int8, Value::Int32(-7))
            .scan((&mut small,))
            .unwrap();
        assert_eq!(small, -7);

        let mut wide: u64 = 0;
        single_cell(Type::Uint64, Value::Uint64(u64::MAX))
            .scan((&mut wide,))
            .unwrap();
        assert_eq!(wide, u64::MAX);

        let mut f: f64 = 0.0;
        single_cell(Type::Double, Value::Double(2.5))
            .scan((&mut f,))
            .unwrap();
        assert_eq!(f, 2.5);

        let mut text = String::new();
        single_cell(Type::Utf8, Value::Text("привет".into()))
            .scan((&mut text,))
            .unwrap();
        assert_eq!(text, "привет");

        let mut bytes: Vec<u8> = Vec::new();
        single_cell(Type::Bytes, Value::Bytes(vec![1, 2, 3]))
            .scan((&mut bytes,))
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_leaves_destination_unchanged() {
        let mut dst: i8 = 17;
        let mut reader = single_cell(Type::Int8, Value::Int32(200));
        let err = reader.scan((&mut dst,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Overflow);
        assert_eq!(dst, 17);

        let mut dst: u16 = 3;
        let mut reader = single_cell(Type::Uint16, Value::Uint32(70_000));
        let err = reader.scan((&mut dst,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Overflow);
        assert_eq!(dst, 3);
    }

    #[test]
    fn test_uuid_big_endian_compose() {
        let mut bytes = [0u8; 16];
        single_cell(
            Type::Uuid,
            Value::Uint128 {
                high: 0x0011_2233_4455_6677,
                low: 0x8899_aabb_ccdd_eeff,
            },
        )
        .scan((&mut bytes,))
        .unwrap();
        assert_eq!(
            bytes,
            [
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc,
                0xdd, 0xee, 0xff
            ]
        );

        let mut id = uuid::Uuid::nil();
        single_cell(Type::Uuid, Value::Uint128 { high: 0, low: 1 })
            .scan((&mut id,))
            .unwrap();
        assert_eq!(
            id.as_bytes(),
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_temporal_decode() {
        // 2020-02-01 is 18293 days after the epoch.
        let mut when = DateTime::UNIX_EPOCH;
        single_cell(Type::Date, Value::Uint32(18_293))
            .scan((&mut when,))
            .unwrap();
        assert_eq!(when.to_rfc3339(), "2020-02-01T00:00:00+00:00");

        let mut when = DateTime::UNIX_EPOCH;
        single_cell(Type::Datetime, Value::Uint32(1_580_552_100))
            .scan((&mut when,))
            .unwrap();
        assert_eq!(when.timestamp(), 1_580_552_100);

        let mut when = DateTime::UNIX_EPOCH;
        single_cell(Type::Timestamp, Value::Uint64(1_580_552_100_000_123))
            .scan((&mut when,))
            .unwrap();
        assert_eq!(when.timestamp_micros(), 1_580_552_100_000_123);

        let mut interval = chrono::Duration::zero();
        single_cell(Type::Interval, Value::Int64(-5_000_000))
            .scan((&mut interval,))
            .unwrap();
        assert_eq!(interval, chrono::Duration::microseconds(-5_000_000));
    }

    #[test]
    fn test_tz_decode() {
        let mut when = DateTime::UNIX_EPOCH;
        single_cell(
            Type::TzDatetime,
            Value::Text("2020-06-01T12:00:00,Europe/Moscow".into()),
        )
        .scan((&mut when,))
        .unwrap();
        // Moscow is UTC+3.
        assert_eq!(when.to_rfc3339(), "2020-06-01T09:00:00+00:00");

        let mut when = DateTime::UNIX_EPOCH;
        single_cell(Type::TzDate, Value::Text("2020-06-01,UTC".into()))
            .scan((&mut when,))
            .unwrap();
        assert_eq!(when.to_rfc3339(), "2020-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_tz_rejects_unknown_zone() {
        let mut when = DateTime::UNIX_EPOCH;
        let mut reader = single_cell(
            Type::TzDatetime,
            Value::Text("2020-06-01T12:00:00,Atlantis/Hy-Brasil".into()),
        );
        let err = reader.scan((&mut when,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Value);
    }

    #[test]
    fn test_decimal_decode() {
        let mut dst = Decimal::default();
        single_cell(
            Type::Decimal {
                precision: 22,
                scale: 9,
            },
            Value::Uint128 { high: 0, low: 42 },
        )
        .scan((&mut dst,))
        .unwrap();
        assert_eq!(dst.precision, 22);
        assert_eq!(dst.scale, 9);
        assert_eq!(dst.bytes[15], 42);
    }

    #[test]
    fn test_defaults_table() {
        fn null_cell(ty: Type) -> ResultSetReader {
            single_cell(Type::optional(ty), Value::Null)
        }

        let mut b = true;
        null_cell(Type::Bool).scan_with_defaults((&mut b,)).unwrap();
        assert!(!b);

        let mut n: i64 = 9;
        null_cell(Type::Int64).scan_with_defaults((&mut n,)).unwrap();
        assert_eq!(n, 0);

        let mut text = String::from("x");
        null_cell(Type::Utf8)
            .scan_with_defaults((&mut text,))
            .unwrap();
        assert_eq!(text, "");

        let mut bytes = vec![1u8];
        null_cell(Type::Bytes)
            .scan_with_defaults((&mut bytes,))
            .unwrap();
        assert!(bytes.is_empty());

        let mut when = DateTime::from_timestamp(1, 0).unwrap();
        null_cell(Type::Timestamp)
            .scan_with_defaults((&mut when,))
            .unwrap();
        assert_eq!(when, DateTime::UNIX_EPOCH);

        let mut interval = chrono::Duration::microseconds(5);
        null_cell(Type::Interval)
            .scan_with_defaults((&mut interval,))
            .unwrap();
        assert_eq!(interval, chrono::Duration::zero());

        let mut id = uuid::Uuid::from_u128(7);
        null_cell(Type::Uuid).scan_with_defaults((&mut id,)).unwrap();
        assert!(id.is_nil());

        let mut decimal = Decimal {
            bytes: [1; 16],
            precision: 22,
            scale: 9,
        };
        null_cell(Type::Decimal {
            precision: 22,
            scale: 9,
        })
        .scan_with_defaults((&mut decimal,))
        .unwrap();
        assert_eq!(decimal, Decimal::default());

        let mut any = AnyValue::Bool(true);
        null_cell(Type::Bool).scan_with_defaults((&mut any,)).unwrap();
        assert_eq!(any, AnyValue::Null);
    }

    #[test]
    fn test_any_is_transparent_to_optionals() {
        // Non-null optional: unwrapped silently.
        let mut any = AnyValue::Null;
        single_cell(Type::optional(Type::Uint32), Value::Uint32(5))
            .scan((&mut any,))
            .unwrap();
        assert_eq!(any, AnyValue::Uint32(5));

        // Null optional: Null marker, no error.
        let mut any = AnyValue::Uint32(1);
        single_cell(Type::optional(Type::Uint32), Value::Null)
            .scan((&mut any,))
            .unwrap();
        assert_eq!(any, AnyValue::Null);
    }

    #[test]
    fn test_raw_value_sink_sees_pristine_cell() {
        let mut raw = Value::Bool(false);
        single_cell(Type::optional(Type::Uint32), Value::Null)
            .scan((&mut raw,))
            .unwrap();
        assert_eq!(raw, Value::Null);

        let mut raw = Value::Bool(false);
        single_cell(
            Type::optional(Type::optional(Type::Uint32)),
            Value::Nested(Box::new(Value::Uint32(3))),
        )
        .scan((&mut raw,))
        .unwrap();
        assert_eq!(raw, Value::Nested(Box::new(Value::Uint32(3))));
    }

    #[test]
    fn test_raw_scan_traverses_nested_values() {
        struct PairCollector {
            items: Vec<u32>,
        }

        impl RawScan for PairCollector {
            fn scan_raw(&mut self, cur: &mut ItemCursor<'_>) -> Result<(), String> {
                for i in 0..cur.item_count() {
                    if cur.enter(i) {
                        if let Some(v) = cur.uint32_value() {
                            self.items.push(v);
                        }
                        cur.leave();
                    }
                }
                Ok(())
            }
        }

        let mut collector = PairCollector { items: vec![] };
        single_cell(
            Type::List(Box::new(Type::Uint32)),
            Value::Items(vec![Value::Uint32(1), Value::Uint32(2), Value::Uint32(3)]),
        )
        .scan((&mut RawDest(&mut collector),))
        .unwrap();
        assert_eq!(collector.items, vec![1, 2, 3]);
    }

    #[test]
    fn test_raw_scan_struct_member_path() {
        struct FailOnMember;

        impl RawScan for FailOnMember {
            fn scan_raw(&mut self, cur: &mut ItemCursor<'_>) -> Result<(), String> {
                cur.enter(1);
                Err(format!("bad member at {}", cur.path()))
            }
        }

        let ty = Type::Struct(vec![
            StructMember {
                name: "id".into(),
                ty: Type::Uint32,
            },
            StructMember {
                name: "name".into(),
                ty: Type::Utf8,
            },
        ]);
        let mut reader = single_cell(
            ty,
            Value::Items(vec![Value::Uint32(1), Value::Text("x".into())]),
        );
        let err = reader.scan((&mut RawDest(&mut FailOnMember),)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::External);
        assert!(err.message.contains("c/name"), "{}", err.message);
    }

    #[test]
    fn test_any_scan_receives_decoded_and_null() {
        #[derive(Default)]
        struct Collect {
            seen: Vec<AnyValue>,
        }

        impl AnyScan for Collect {
            fn scan_any(&mut self, value: AnyValue) -> Result<(), String> {
                self.seen.push(value);
                Ok(())
            }
        }

        let mut collect = Collect::default();
        single_cell(Type::optional(Type::Utf8), Value::Text("hello".into()))
            .scan((&mut AnyDest(&mut collect),))
            .unwrap();
        single_cell(Type::optional(Type::Utf8), Value::Null)
            .scan((&mut AnyDest(&mut collect),))
            .unwrap();
        assert_eq!(
            collect.seen,
            vec![AnyValue::Text("hello".into()), AnyValue::Null]
        );
    }

    #[test]
    fn test_type_mismatch_records_value_error() {
        let mut n: u32 = 0;
        let mut reader = single_cell(Type::Utf8, Value::Text("nope".into()));
        let err = reader.scan((&mut n,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Value);
        assert_eq!(err.path, "c");
    }
}
