//! Typed values of the result protocol.
//!
//! Columns are described by a [`Type`] and cells travel as [`Value`], a
//! tagged union mirroring the wire encoding. The mapping is deliberately
//! loose on the value side: narrow integers ride in `Int32`/`Uint32`,
//! `Date`/`Datetime` in `Uint32`, `Timestamp` in `Uint64`, `Interval` in
//! `Int64`, the timezone-carrying forms in `Text` as `value,zone`, and
//! `Uuid`/`Decimal` in the 128-bit pair. The scanner owns the re-typing.
//!
//! Optionality is encoded the gRPC way: a present `Optional<T>` cell holds
//! the plain `T` value, an absent one holds [`Value::Null`], and each extra
//! `Optional` layer of a present value adds one [`Value::Nested`] wrapper,
//! so outer-null and inner-null of `Optional<Optional<T>>` stay distinct.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type algebra.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    Bytes,
    Utf8,
    Uuid,
    Date,
    Datetime,
    Timestamp,
    Interval,
    TzDate,
    TzDatetime,
    TzTimestamp,
    Yson,
    Json,
    JsonDocument,
    DyNumber,
    Decimal { precision: u32, scale: u32 },
    Optional(Box<Type>),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Struct(Vec<StructMember>),
    Dict { key: Box<Type>, value: Box<Type> },
}

/// Named field of a `Struct` type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Type {
    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// Inner type of an `Optional`, or the type itself.
    pub fn unwrap_optional(&self) -> &Type {
        match self {
            Type::Optional(inner) => inner,
            other => other,
        }
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    /// True for the scalar leaves of the algebra.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Type::Optional(_)
                | Type::List(_)
                | Type::Tuple(_)
                | Type::Struct(_)
                | Type::Dict { .. }
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Decimal { precision, scale } => write!(f, "Decimal({precision},{scale})"),
            Type::Optional(inner) => write!(f, "Optional<{inner}>"),
            Type::List(item) => write!(f, "List<{item}>"),
            Type::Tuple(items) => {
                f.write_str("Tuple<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(">")
            }
            Type::Struct(members) => {
                f.write_str("Struct<")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", m.name, m.ty)?;
                }
                f.write_str(">")
            }
            Type::Dict { key, value } => write!(f, "Dict<{key},{value}>"),
            simple => write!(f, "{simple:?}"),
        }
    }
}

/// One cell of the result protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    /// 128-bit payload of `Uuid` and `Decimal` cells, big-endian halves.
    Uint128 { high: u64, low: u64 },
    /// Absent `Optional` cell.
    Null,
    /// One present `Optional` layer around a value that is itself optional.
    Nested(Box<Value>),
    /// Elements of `List`/`Tuple`/`Struct` values and of result rows.
    Items(Vec<Value>),
    /// Entries of a `Dict` value.
    Pairs(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short tag used in scanner diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int32(_) => "Int32",
            Value::Uint32(_) => "Uint32",
            Value::Int64(_) => "Int64",
            Value::Uint64(_) => "Uint64",
            Value::Float(_) => "Float",
            Value::Double(_) => "Double",
            Value::Bytes(_) => "Bytes",
            Value::Text(_) => "Text",
            Value::Uint128 { .. } => "Uint128",
            Value::Null => "Null",
            Value::Nested(_) => "Nested",
            Value::Items(_) => "Items",
            Value::Pairs(_) => "Pairs",
        }
    }
}

/// Column descriptor of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// One result row; `items[i]` belongs to `columns[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub items: Vec<Value>,
}

/// A columnar result block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub truncated: bool,
}

impl ResultSet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
