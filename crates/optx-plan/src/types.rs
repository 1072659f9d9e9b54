//! # Result-Type Metadata
//!
//! Every expression node embeds a [`ResultType`] describing the value it
//! computes: the data type, collation level and collation type, accuracy
//! (precision/scale/length), result flags, an optional user-defined type id and,
//! for constants, the constant value itself.
//!
//! The metadata is mutable while an expression is being built and becomes fixed
//! once the expression is formalized (see `expr::ExprArena::formalize`).
//!
//! ## Derived Flags
//!
//! [`ResultType::result_flag`] is not a plain getter: a binary collation
//! (`utf8mb4_bin` or `binary`) implies [`BINARY_FLAG`] even when the flag was
//! never stored. Callers must use the getter rather than reading `flags`.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The value may not be NULL.
pub const NOT_NULL_FLAG: u32 = 1 << 0;
/// Numeric value is unsigned.
pub const UNSIGNED_FLAG: u32 = 1 << 5;
/// Numeric value is zero-filled on display.
pub const ZEROFILL_FLAG: u32 = 1 << 6;
/// Comparisons are byte-wise.
pub const BINARY_FLAG: u32 = 1 << 7;

/// Scalar value for constants and bound parameters.
///
/// Uses `OrderedFloat` for `f64` so that values can be hashed and compared for
/// equality (needed when deduplicating expressions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 64-bit floating point, wrapped in OrderedFloat for Eq/Hash support.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::UInt64(a), Self::UInt64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::UInt64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The natural data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Bool(_) => DataType::TinyInt,
            Self::Int64(_) => DataType::BigInt,
            Self::UInt64(_) => DataType::UnsignedBigInt,
            Self::Float64(_) => DataType::Double,
            Self::Utf8(_) => DataType::Varchar,
            Self::Binary(_) => DataType::Varbinary,
            Self::Date(_) => DataType::Date,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
            Self::Utf8(v) => write!(f, "'{}'", v),
            Self::Binary(v) => {
                write!(f, "X'")?;
                for b in v {
                    write!(f, "{:02X}", b)?;
                }
                write!(f, "'")
            }
            Self::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

/// Data types known to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    TinyInt,
    Int,
    BigInt,
    UnsignedBigInt,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Timestamp,
    Char,
    Varchar,
    Varbinary,
    /// Large character object.
    Text,
    /// Large binary object.
    Blob,
    Json,
    Geometry,
    /// User-defined (extended) type; see [`ResultType::udt_id`].
    UserDefined,
    /// Not yet deduced. New nodes start here.
    Max,
}

/// Coarse classification of data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    Null,
    Int,
    UInt,
    Float,
    Decimal,
    DateTime,
    String,
    Lob,
    Json,
    Geometry,
    UserDefined,
    Unknown,
}

impl DataType {
    pub fn type_class(self) -> TypeClass {
        match self {
            DataType::Null => TypeClass::Null,
            DataType::TinyInt | DataType::Int | DataType::BigInt => TypeClass::Int,
            DataType::UnsignedBigInt => TypeClass::UInt,
            DataType::Float | DataType::Double => TypeClass::Float,
            DataType::Decimal => TypeClass::Decimal,
            DataType::Date | DataType::Time | DataType::DateTime | DataType::Timestamp => {
                TypeClass::DateTime
            }
            DataType::Char | DataType::Varchar | DataType::Varbinary => TypeClass::String,
            DataType::Text | DataType::Blob => TypeClass::Lob,
            DataType::Json => TypeClass::Json,
            DataType::Geometry => TypeClass::Geometry,
            DataType::UserDefined => TypeClass::UserDefined,
            DataType::Max => TypeClass::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self.type_class(),
            TypeClass::Int | TypeClass::UInt | TypeClass::Float | TypeClass::Decimal
        )
    }

    pub fn is_string(self) -> bool {
        self.type_class() == TypeClass::String
    }

    /// Fixed storage width in bytes, `None` for variable-length types.
    pub fn fixed_width(self) -> Option<f64> {
        match self {
            DataType::Null => Some(1.0),
            DataType::TinyInt => Some(1.0),
            DataType::Int | DataType::Float | DataType::Date | DataType::Time => Some(4.0),
            DataType::BigInt
            | DataType::UnsignedBigInt
            | DataType::Double
            | DataType::DateTime
            | DataType::Timestamp => Some(8.0),
            DataType::Decimal => Some(16.0),
            _ => None,
        }
    }
}

/// Collation of a character value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollationType {
    Invalid,
    Binary,
    Utf8mb4GeneralCi,
    Utf8mb4Bin,
    Utf8mb4UnicodeCi,
}

impl CollationType {
    /// Whether comparison under this collation is byte-wise.
    pub fn is_bin(self) -> bool {
        matches!(self, CollationType::Binary | CollationType::Utf8mb4Bin)
    }

    pub fn max_bytes_per_char(self) -> i64 {
        match self {
            CollationType::Invalid | CollationType::Binary => 1,
            CollationType::Utf8mb4GeneralCi
            | CollationType::Utf8mb4Bin
            | CollationType::Utf8mb4UnicodeCi => 4,
        }
    }
}

/// Coercibility of a collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollationLevel {
    Explicit,
    None,
    Implicit,
    SysConst,
    Coercible,
    Numeric,
    Ignorable,
    Invalid,
}

/// Whether a character length counts bytes or characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthSemantics {
    Byte,
    Char,
}

/// Precision, scale and length of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accuracy {
    pub precision: i16,
    pub scale: i16,
    pub length: i64,
    pub length_semantics: LengthSemantics,
}

impl Default for Accuracy {
    fn default() -> Self {
        Self {
            precision: -1,
            scale: -1,
            length: -1,
            length_semantics: LengthSemantics::Char,
        }
    }
}

/// Result-type metadata carried by every expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultType {
    pub data_type: DataType,
    pub collation_level: CollationLevel,
    pub collation_type: CollationType,
    pub accuracy: Accuracy,
    /// Stored flags. Read through [`ResultType::result_flag`].
    pub flags: u32,
    pub udt_id: u64,
    /// Constant value, set for constants and folded parameters.
    pub param: Option<ScalarValue>,
}

impl Default for ResultType {
    fn default() -> Self {
        Self::new(DataType::Max)
    }
}

impl ResultType {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            collation_level: CollationLevel::Invalid,
            collation_type: CollationType::Invalid,
            accuracy: Accuracy::default(),
            flags: 0,
            udt_id: 0,
            param: None,
        }
    }

    /// A character type with the given length and collation.
    pub fn string(data_type: DataType, length: i64, collation: CollationType) -> Self {
        Self {
            collation_level: CollationLevel::Implicit,
            collation_type: collation,
            accuracy: Accuracy {
                length,
                ..Accuracy::default()
            },
            ..Self::new(data_type)
        }
    }

    pub fn type_class(&self) -> TypeClass {
        self.data_type.type_class()
    }

    /// Result flags with the binary-collation rule folded in.
    pub fn result_flag(&self) -> u32 {
        if self.collation_type.is_bin() {
            self.flags | BINARY_FLAG
        } else {
            self.flags
        }
    }

    /// Maximum length of the value in bytes.
    ///
    /// Character lengths with char semantics are scaled by the collation's
    /// maximum bytes per character.
    pub fn length_in_bytes(&self) -> i64 {
        let length = self.accuracy.length;
        if length < 0 {
            return length;
        }
        match (self.data_type.is_string(), self.accuracy.length_semantics) {
            (true, LengthSemantics::Char) => {
                length.saturating_mul(self.collation_type.max_bytes_per_char())
            }
            _ => length,
        }
    }
}
