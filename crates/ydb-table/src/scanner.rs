//! Result set scanner engine.
//!
//! A [`ResultSetReader`] walks a columnar result set row by row and decodes
//! cells into caller-supplied `&mut` destinations. Errors are *sticky*:
//! the first one recorded short-circuits every later `next_row`/`scan` and
//! is the one [`ResultSetReader::err`] reports; decode helpers record and
//! bail instead of panicking or throwing.
//!
//! The cursor keeps a stack of `(name, type, value)` frames so user
//! scanners can traverse nested values (optional unwraps, list elements,
//! struct fields) with full path information in diagnostics.

use crate::dest::{ScanDest, ScanTuple};
use std::fmt;
use ydb_proto::{Column, ResultSet, Type, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Destination/type mismatch.
    Type,
    /// Malformed or unexpected wire value.
    Value,
    /// Named column not present in the result set.
    NoColumn,
    /// Cursor points past the data (no row selected, missing cell).
    NoValue,
    /// Numeric value does not fit the destination.
    Overflow,
    /// A user scanner reported failure.
    External,
}

/// Sticky scanner error: where it happened, what went wrong.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("scan error at {path:?} ({kind:?}): {message}")]
pub struct ScanError {
    pub path: String,
    pub kind: ScanErrorKind,
    pub message: String,
}

/// One level of the traversal stack.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub name: &'a str,
    pub ty: &'a Type,
    pub value: &'a Value,
}

/// Cursor over one cell, handed to [`ScanDest`] implementations.
pub struct ItemCursor<'a> {
    frames: Vec<Frame<'a>>,
    with_defaults: bool,
    err: &'a mut Option<ScanError>,
}

impl<'a> ItemCursor<'a> {
    fn new(
        frame: Frame<'a>,
        with_defaults: bool,
        err: &'a mut Option<ScanError>,
    ) -> ItemCursor<'a> {
        ItemCursor {
            frames: vec![frame],
            with_defaults,
            err,
        }
    }

    /// Whether the surrounding scan runs in `scan_with_defaults` mode.
    pub fn with_defaults(&self) -> bool {
        self.with_defaults
    }

    pub fn current(&self) -> Frame<'a> {
        *self.frames.last().expect("cursor has at least one frame")
    }

    /// Slash-joined names of the frame stack, for diagnostics.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                path.push('/');
            }
            path.push_str(frame.name);
        }
        path
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    pub fn set_error(&mut self, kind: ScanErrorKind, message: impl Into<String>) {
        if self.err.is_none() {
            *self.err = Some(ScanError {
                path: self.path(),
                kind,
                message: message.into(),
            });
        }
    }

    fn value_type_error(&mut self, expected: &str) {
        let got = self.current().value.kind_name();
        let ty = self.current().ty.clone();
        self.set_error(
            ScanErrorKind::Value,
            format!("unexpected value during scan: column is {ty}, got {got}, want {expected}"),
        );
    }

    pub(crate) fn type_error(&mut self, want: impl fmt::Display) {
        let ty = self.current().ty.clone();
        self.set_error(
            ScanErrorKind::Type,
            format!("unexpected type during scan: {ty}; want {want}"),
        );
    }

    pub(crate) fn overflow_error(&mut self, got: impl fmt::Display, target: &str) {
        self.set_error(
            ScanErrorKind::Overflow,
            format!("overflow error: {got} does not fit {target}"),
        );
    }

    pub fn is_null(&self) -> bool {
        self.current().value.is_null()
    }

    pub fn is_optional(&self) -> bool {
        self.current().ty.is_optional()
    }

    /// Strips one `Optional` layer off the current frame. A present value
    /// of a doubly-optional type sheds its `Nested` wrapper so the value
    /// matches the inner type again. No-op on non-optional frames.
    pub fn unwrap_optional(&mut self) {
        if self.has_error() {
            return;
        }
        let frame = self.current();
        let Type::Optional(inner) = frame.ty else {
            return;
        };
        let mut value = frame.value;
        if inner.is_optional() {
            match value {
                Value::Nested(nested) => value = nested,
                Value::Null => {}
                _ => {
                    self.value_type_error("Nested");
                    return;
                }
            }
        }
        let top = self.frames.last_mut().expect("cursor has a frame");
        top.ty = inner;
        top.value = value;
    }

    /// Pushes a frame for element `index` of the current `List`, `Tuple`
    /// or `Struct` value. Returns false (and records an error) when the
    /// current value has no such element.
    pub fn enter(&mut self, index: usize) -> bool {
        if self.has_error() {
            return false;
        }
        let frame = self.current();
        let (element_ty, name): (&'a Type, &'a str) = match frame.ty {
            Type::List(item) => (item, index_name(index)),
            Type::Tuple(items) => match items.get(index) {
                Some(ty) => (ty, index_name(index)),
                None => {
                    self.set_error(ScanErrorKind::NoValue, format!("no tuple element {index}"));
                    return false;
                }
            },
            Type::Struct(members) => match members.get(index) {
                Some(member) => (&member.ty, member.name.as_str()),
                None => {
                    self.set_error(ScanErrorKind::NoValue, format!("no struct member {index}"));
                    return false;
                }
            },
            _ => {
                self.type_error("List, Tuple or Struct");
                return false;
            }
        };
        let Value::Items(items) = frame.value else {
            self.value_type_error("Items");
            return false;
        };
        let Some(value) = items.get(index) else {
            self.set_error(ScanErrorKind::NoValue, format!("no value at element {index}"));
            return false;
        };
        self.frames.push(Frame {
            name,
            ty: element_ty,
            value,
        });
        true
    }

    /// Pops the innermost frame pushed by [`ItemCursor::enter`].
    pub fn leave(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Number of elements of the current `Items` value.
    pub fn item_count(&self) -> usize {
        match self.current().value {
            Value::Items(items) => items.len(),
            _ => 0,
        }
    }

    pub fn bool_value(&mut self) -> Option<bool> {
        match self.current().value {
            Value::Bool(v) => Some(*v),
            _ => {
                self.value_type_error("Bool");
                None
            }
        }
    }

    pub fn int32_value(&mut self) -> Option<i32> {
        match self.current().value {
            Value::Int32(v) => Some(*v),
            _ => {
                self.value_type_error("Int32");
                None
            }
        }
    }

    pub fn uint32_value(&mut self) -> Option<u32> {
        match self.current().value {
            Value::Uint32(v) => Some(*v),
            _ => {
                self.value_type_error("Uint32");
                None
            }
        }
    }

    pub fn int64_value(&mut self) -> Option<i64> {
        match self.current().value {
            Value::Int64(v) => Some(*v),
            _ => {
                self.value_type_error("Int64");
                None
            }
        }
    }

    pub fn uint64_value(&mut self) -> Option<u64> {
        match self.current().value {
            Value::Uint64(v) => Some(*v),
            _ => {
                self.value_type_error("Uint64");
                None
            }
        }
    }

    pub fn float_value(&mut self) -> Option<f32> {
        match self.current().value {
            Value::Float(v) => Some(*v),
            _ => {
                self.value_type_error("Float");
                None
            }
        }
    }

    pub fn double_value(&mut self) -> Option<f64> {
        match self.current().value {
            Value::Double(v) => Some(*v),
            _ => {
                self.value_type_error("Double");
                None
            }
        }
    }

    pub fn bytes_value(&mut self) -> Option<&'a [u8]> {
        match self.current().value {
            Value::Bytes(v) => Some(v.as_slice()),
            _ => {
                self.value_type_error("Bytes");
                None
            }
        }
    }

    pub fn text_value(&mut self) -> Option<&'a str> {
        match self.current().value {
            Value::Text(v) => Some(v.as_str()),
            _ => {
                self.value_type_error("Text");
                None
            }
        }
    }

    /// Big-endian composition of the 128-bit cell: high half first.
    pub fn uint128_value(&mut self) -> Option<[u8; 16]> {
        match self.current().value {
            Value::Uint128 { high, low } => {
                let mut out = [0u8; 16];
                out[..8].copy_from_slice(&high.to_be_bytes());
                out[8..].copy_from_slice(&low.to_be_bytes());
                Some(out)
            }
            _ => {
                self.value_type_error("Uint128");
                None
            }
        }
    }
}

/// Static labels for element frames; the path stays borrowable without an
/// allocation per level. Large indices share a generic label, the column
/// name in the path still identifies the cell.
fn index_name(index: usize) -> &'static str {
    const INDEX_NAMES: [&str; 8] = [
        "[0]", "[1]", "[2]", "[3]", "[4]", "[5]", "[6]", "[7]",
    ];
    INDEX_NAMES.get(index).copied().unwrap_or("[..]")
}

/// Stateful reader over one result set.
pub struct ResultSetReader {
    set: ResultSet,
    row: Option<usize>,
    next_row: usize,
    next_item: usize,
    column_indexes: Option<Vec<usize>>,
    with_defaults: bool,
    err: Option<ScanError>,
}

impl ResultSetReader {
    pub fn new(set: ResultSet) -> ResultSetReader {
        ResultSetReader {
            set,
            row: None,
            next_row: 0,
            next_item: 0,
            column_indexes: None,
            with_defaults: false,
            err: None,
        }
    }

    pub fn column_count(&self) -> usize {
        self.set.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.set.columns
    }

    pub fn row_count(&self) -> usize {
        self.set.rows.len()
    }

    /// Whether the server truncated this result set.
    pub fn truncated(&self) -> bool {
        self.set.truncated
    }

    /// Look-ahead: whether `next_row` would advance.
    pub fn has_next_row(&self) -> bool {
        self.err.is_none() && self.next_row < self.set.rows.len()
    }

    /// Advances to the next row. Returns false at the end of the set or
    /// after an error.
    pub fn next_row(&mut self) -> bool {
        if !self.has_next_row() {
            return false;
        }
        self.row = Some(self.next_row);
        self.next_row += 1;
        self.next_item = 0;
        true
    }

    /// Binds subsequent scans to the named columns instead of positional
    /// order. Unknown names record a `NoColumn` error.
    pub fn set_column_indexes(&mut self, names: &[&str]) {
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            match self.set.column_index(name) {
                Some(index) => indexes.push(index),
                None => {
                    self.record_root(ScanErrorKind::NoColumn, format!("no column {name:?}"));
                    return;
                }
            }
        }
        self.column_indexes = Some(indexes);
    }

    /// The sticky error, if any.
    pub fn err(&self) -> Option<&ScanError> {
        self.err.as_ref()
    }

    /// Decodes the current row into the destinations. NULL cells require a
    /// nullable destination (`Option<_>`).
    pub fn scan<T: ScanTuple>(&mut self, dsts: T) -> Result<(), ScanError> {
        self.with_defaults = false;
        self.scan_impl(dsts)
    }

    /// Like [`ResultSetReader::scan`], but NULL cells write the zero value
    /// of the destination instead of requiring a nullable one.
    pub fn scan_with_defaults<T: ScanTuple>(&mut self, dsts: T) -> Result<(), ScanError> {
        self.with_defaults = true;
        self.scan_impl(dsts)
    }

    fn scan_impl<T: ScanTuple>(&mut self, dsts: T) -> Result<(), ScanError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let n = T::ARITY;
        if let Some(indexes) = &self.column_indexes {
            if indexes.len() != n {
                self.record_root(
                    ScanErrorKind::Value,
                    "count of destinations differs from the bound columns",
                );
            }
        } else if self.set.columns.len() < n {
            self.record_root(ScanErrorKind::Value, "more destinations than columns");
        }
        if self.row.is_none() {
            self.record_root(ScanErrorKind::NoValue, "no row selected");
        }
        if self.next_item != 0 {
            self.record_root(ScanErrorKind::Value, "double scan per row");
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }

        dsts.scan_into(self);
        self.next_item += n;

        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Decodes destination `pos` of the current scan call. Stops recording
    /// after the first error of the row.
    pub(crate) fn scan_slot<D: ScanDest + ?Sized>(&mut self, pos: usize, dst: &mut D) {
        if self.err.is_some() {
            return;
        }
        let column_index = match &self.column_indexes {
            None => pos,
            Some(indexes) => match indexes.get(pos) {
                Some(index) => *index,
                None => {
                    self.record_root(ScanErrorKind::NoValue, format!("no binding for slot {pos}"));
                    return;
                }
            },
        };

        let ResultSetReader {
            set,
            row,
            with_defaults,
            err,
            ..
        } = self;
        let with_defaults = *with_defaults;

        let row_index = row.expect("checked by scan_impl");
        let Some(column) = set.columns.get(column_index) else {
            record(err, String::new(), ScanErrorKind::NoColumn, format!("no column {column_index}"));
            return;
        };
        let Some(value) = set.rows[row_index].items.get(column_index) else {
            record(
                err,
                column.name.clone(),
                ScanErrorKind::NoValue,
                format!("no value for column {:?}", column.name),
            );
            return;
        };

        let frame = Frame {
            name: &column.name,
            ty: &column.ty,
            value,
        };
        let mut cursor = ItemCursor::new(frame, with_defaults, err);

        if dst.wants_raw_cell() {
            dst.scan_value(&mut cursor);
            return;
        }

        if cursor.is_optional() {
            if cursor.is_null() {
                if with_defaults {
                    dst.set_default(&mut cursor);
                } else {
                    dst.scan_null(&mut cursor);
                }
            } else if dst.handles_null() {
                // Null-capable destinations consume the optional layers
                // themselves (nested optionals included).
                dst.scan_value(&mut cursor);
            } else {
                cursor.unwrap_optional();
                dst.scan_value(&mut cursor);
            }
        } else {
            dst.scan_value(&mut cursor);
        }
    }

    fn record_root(&mut self, kind: ScanErrorKind, message: impl Into<String>) {
        record(&mut self.err, String::new(), kind, message.into());
    }
}

fn record(err: &mut Option<ScanError>, path: String, kind: ScanErrorKind, message: String) {
    if err.is_none() {
        *err = Some(ScanError {
            path,
            kind,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ydb_proto::Row;

    fn set_u32(values: &[Option<u32>]) -> ResultSet {
        ResultSet {
            columns: vec![Column {
                name: "value".into(),
                ty: Type::optional(Type::Uint32),
            }],
            rows: values
                .iter()
                .map(|v| Row {
                    items: vec![match v {
                        Some(v) => Value::Uint32(*v),
                        None => Value::Null,
                    }],
                })
                .collect(),
            truncated: false,
        }
    }

    #[test]
    fn test_cursor_navigation() {
        let set = set_u32(&[Some(1), Some(2)]);
        let mut reader = ResultSetReader::new(set);
        assert_eq!(reader.row_count(), 2);
        assert_eq!(reader.column_count(), 1);
        assert!(reader.has_next_row());
        assert!(reader.next_row());
        assert!(reader.next_row());
        assert!(!reader.next_row());
        assert!(!reader.has_next_row());
    }

    #[test]
    fn test_scan_optional_into_option() {
        let set = set_u32(&[Some(5), None, Some(7)]);
        let mut reader = ResultSetReader::new(set);
        let mut seen = Vec::new();
        while reader.next_row() {
            let mut v: Option<u32> = None;
            reader.scan((&mut v,)).unwrap();
            seen.push(v);
        }
        assert!(reader.err().is_none());
        assert_eq!(seen, vec![Some(5), None, Some(7)]);
    }

    #[test]
    fn test_scan_with_defaults_writes_zero_on_null() {
        let set = set_u32(&[Some(5), None, Some(7)]);
        let mut reader = ResultSetReader::new(set);
        let mut seen = Vec::new();
        while reader.next_row() {
            let mut v: u32 = 42;
            reader.scan_with_defaults((&mut v,)).unwrap();
            seen.push(v);
        }
        assert_eq!(seen, vec![5, 0, 7]);
    }

    #[test]
    fn test_scan_null_into_plain_destination_is_an_error() {
        let set = set_u32(&[None]);
        let mut reader = ResultSetReader::new(set);
        assert!(reader.next_row());
        let mut v: u32 = 42;
        let err = reader.scan((&mut v,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Type);
        assert_eq!(v, 42, "destination must stay untouched");
    }

    #[test]
    fn test_sticky_error_short_circuits() {
        let set = set_u32(&[None, Some(1)]);
        let mut reader = ResultSetReader::new(set);
        assert!(reader.next_row());
        let mut v: u32 = 0;
        assert!(reader.scan((&mut v,)).is_err());
        // Once broken, the reader stays broken.
        assert!(!reader.next_row());
        assert!(reader.err().is_some());
        let first = reader.err().unwrap().clone();
        assert!(reader.scan((&mut v,)).is_err());
        assert_eq!(reader.err().unwrap(), &first);
    }

    #[test]
    fn test_double_scan_per_row() {
        let set = set_u32(&[Some(1)]);
        let mut reader = ResultSetReader::new(set);
        assert!(reader.next_row());
        let mut v: Option<u32> = None;
        reader.scan((&mut v,)).unwrap();
        let err = reader.scan((&mut v,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Value);
        assert!(err.message.contains("double scan"));
    }

    #[test]
    fn test_column_index_binding() {
        let set = ResultSet {
            columns: vec![
                Column {
                    name: "a".into(),
                    ty: Type::Uint32,
                },
                Column {
                    name: "b".into(),
                    ty: Type::Uint32,
                },
            ],
            rows: vec![Row {
                items: vec![Value::Uint32(1), Value::Uint32(2)],
            }],
            truncated: false,
        };
        let mut reader = ResultSetReader::new(set);
        reader.set_column_indexes(&["b"]);
        assert!(reader.next_row());
        let mut v: u32 = 0;
        reader.scan((&mut v,)).unwrap();
        assert_eq!(v, 2);
    }

    #[test]
    fn test_unknown_column_name() {
        let set = set_u32(&[Some(1)]);
        let mut reader = ResultSetReader::new(set);
        reader.set_column_indexes(&["missing"]);
        assert_eq!(reader.err().unwrap().kind, ScanErrorKind::NoColumn);
    }

    #[test]
    fn test_more_destinations_than_columns() {
        let set = set_u32(&[Some(1)]);
        let mut reader = ResultSetReader::new(set);
        assert!(reader.next_row());
        let mut a: Option<u32> = None;
        let mut b: Option<u32> = None;
        let err = reader.scan((&mut a, &mut b)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::Value);
    }

    #[test]
    fn test_scan_without_next_row() {
        let set = set_u32(&[Some(1)]);
        let mut reader = ResultSetReader::new(set);
        let mut v: Option<u32> = None;
        let err = reader.scan((&mut v,)).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::NoValue);
    }

    #[test]
    fn test_nested_optional_distinguishes_nulls() {
        let ty = Type::optional(Type::optional(Type::Uint32));
        let set = ResultSet {
            columns: vec![Column {
                name: "v".into(),
                ty,
            }],
            rows: vec![
                Row {
                    items: vec![Value::Null], // outer null
                },
                Row {
                    items: vec![Value::Nested(Box::new(Value::Null))], // inner null
                },
                Row {
                    items: vec![Value::Nested(Box::new(Value::Uint32(9)))],
                },
            ],
            truncated: false,
        };
        let mut reader = ResultSetReader::new(set);
        let mut seen: Vec<Option<Option<u32>>> = Vec::new();
        while reader.next_row() {
            let mut v: Option<Option<u32>> = None;
            reader.scan((&mut v,)).unwrap();
            seen.push(v);
        }
        assert_eq!(seen, vec![None, Some(None), Some(Some(9))]);
    }

    #[test]
    fn test_truncated_flag() {
        let mut set = set_u32(&[Some(1)]);
        set.truncated = true;
        let reader = ResultSetReader::new(set);
        assert!(reader.truncated());
    }
}
