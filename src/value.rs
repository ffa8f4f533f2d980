//! Values bound to statement parameters and their display rendering.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Kind of character or byte stream bound to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Ascii,
    Binary,
    Character,
}

/// Kind of large object bound to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    Blob,
    Clob,
    NClob,
}

/// A value bound to a statement parameter.
///
/// `Stream` and `Lob` are markers: the data itself is handed to the driver as
/// a reader and only its kind is remembered for reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Stream(StreamKind),
    Lob(LobKind),
}

impl BoundValue {
    /// Render the value the way it is reported in span attributes.
    ///
    /// | kind | rendering |
    /// |------|-----------|
    /// | null | `NULL` |
    /// | boolean | `true` / `false` |
    /// | numeric | unquoted decimal |
    /// | text | single-quoted, `'` doubled |
    /// | temporal | single-quoted |
    /// | binary, stream, large object | opaque marker such as `<binary>` |
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Null => f.write_str("NULL"),
            BoundValue::Bool(b) => write!(f, "{b}"),
            BoundValue::Int(i) => write!(f, "{i}"),
            BoundValue::UInt(u) => write!(f, "{u}"),
            BoundValue::Float(x) => write!(f, "{x}"),
            BoundValue::Decimal(d) => write!(f, "{d}"),
            BoundValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            BoundValue::Bytes(_) => f.write_str("<binary>"),
            BoundValue::Date(d) => write!(f, "'{d}'"),
            BoundValue::Time(t) => write!(f, "'{t}'"),
            BoundValue::Timestamp(ts) => write!(f, "'{ts}'"),
            BoundValue::TimestampTz(ts) => write!(f, "'{ts}'"),
            BoundValue::Stream(kind) => f.write_str(match kind {
                StreamKind::Ascii => "<ascii stream>",
                StreamKind::Binary => "<binary stream>",
                StreamKind::Character => "<character stream>",
            }),
            BoundValue::Lob(kind) => f.write_str(match kind {
                LobKind::Blob => "<blob>",
                LobKind::Clob => "<clob>",
                LobKind::NClob => "<nclob>",
            }),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BoundValue {
                fn from(value: $ty) -> Self {
                    BoundValue::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for BoundValue {
    fn from(value: u64) -> Self {
        BoundValue::UInt(value)
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        BoundValue::Bool(value)
    }
}

impl From<f32> for BoundValue {
    fn from(value: f32) -> Self {
        BoundValue::Float(f64::from(value))
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        BoundValue::Float(value)
    }
}

impl From<Decimal> for BoundValue {
    fn from(value: Decimal) -> Self {
        BoundValue::Decimal(value)
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        BoundValue::Text(value.to_owned())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        BoundValue::Text(value)
    }
}

impl From<Vec<u8>> for BoundValue {
    fn from(value: Vec<u8>) -> Self {
        BoundValue::Bytes(value)
    }
}

impl From<&[u8]> for BoundValue {
    fn from(value: &[u8]) -> Self {
        BoundValue::Bytes(value.to_vec())
    }
}

impl From<NaiveDate> for BoundValue {
    fn from(value: NaiveDate) -> Self {
        BoundValue::Date(value)
    }
}

impl From<NaiveTime> for BoundValue {
    fn from(value: NaiveTime) -> Self {
        BoundValue::Time(value)
    }
}

impl From<NaiveDateTime> for BoundValue {
    fn from(value: NaiveDateTime) -> Self {
        BoundValue::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for BoundValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        BoundValue::TimestampTz(value)
    }
}

impl<T: Into<BoundValue>> From<Option<T>> for BoundValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BoundValue::Null, Into::into)
    }
}
