//! Value slots shared by the interpreter and JIT code.
//!
//! A [`Value`] is a single 64-bit word. Doubles are stored as-is; every other
//! kind lives in the negative quiet-NaN space (`0xFFF8 << 48`) with a 4-bit tag
//! and a 47-bit payload. NaNs are canonicalized on construction so boxed tags
//! can never be mistaken for doubles. Frame header words share the same buffer
//! and are stored as raw bits through [`Value::from_bits`].

use std::fmt;

use crate::realm::ObjectId;

const BOX_PREFIX: u64 = 0xFFF8_0000_0000_0000;
const TAG_SHIFT: u32 = 47;
const TAG_MASK: u64 = 0xF;
const PAYLOAD_MASK: u64 = (1 << TAG_SHIFT) - 1;
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

const TAG_INT32: u64 = 1;
const TAG_UNDEFINED: u64 = 2;
const TAG_NULL: u64 = 3;
const TAG_BOOLEAN: u64 = 4;
const TAG_MAGIC: u64 = 5;
const TAG_OBJECT: u64 = 6;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

const _: () = assert!(std::mem::size_of::<Value>() == 8);

/// Decoded view of a [`Value`], for matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Double(f64),
    Magic(u32),
    Object(ObjectId),
}

impl Value {
    pub const UNDEFINED: Value = Value::boxed(TAG_UNDEFINED, 0);
    pub const NULL: Value = Value::boxed(TAG_NULL, 0);
    pub const TRUE: Value = Value::boxed(TAG_BOOLEAN, 1);
    pub const FALSE: Value = Value::boxed(TAG_BOOLEAN, 0);

    const fn boxed(tag: u64, payload: u64) -> Self {
        Value(BOX_PREFIX | (tag << TAG_SHIFT) | (payload & PAYLOAD_MASK))
    }

    #[inline]
    pub const fn undefined() -> Self {
        Self::UNDEFINED
    }

    #[inline]
    pub const fn null() -> Self {
        Self::NULL
    }

    #[inline]
    pub const fn boolean(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    #[inline]
    pub const fn int32(i: i32) -> Self {
        Self::boxed(TAG_INT32, i as u32 as u64)
    }

    #[inline]
    pub fn double(d: f64) -> Self {
        if d.is_nan() { Value(CANONICAL_NAN) } else { Value(d.to_bits()) }
    }

    #[inline]
    pub const fn object(id: ObjectId) -> Self {
        Self::boxed(TAG_OBJECT, id.raw() as u64)
    }

    /// Sentinel values that are never visible to scripts.
    #[inline]
    pub const fn magic(why: u32) -> Self {
        Self::boxed(TAG_MAGIC, why as u64)
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Value(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    const fn tag(self) -> u64 {
        if self.0 & BOX_PREFIX == BOX_PREFIX {
            (self.0 >> TAG_SHIFT) & TAG_MASK
        } else {
            0
        }
    }

    #[inline]
    const fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    pub fn kind(self) -> ValueKind {
        match self.tag() {
            TAG_INT32 => ValueKind::Int32(self.payload() as u32 as i32),
            TAG_UNDEFINED => ValueKind::Undefined,
            TAG_NULL => ValueKind::Null,
            TAG_BOOLEAN => ValueKind::Boolean(self.payload() != 0),
            TAG_MAGIC => ValueKind::Magic(self.payload() as u32),
            TAG_OBJECT => ValueKind::Object(ObjectId::from_raw(self.payload() as u32)),
            _ => ValueKind::Double(f64::from_bits(self.0)),
        }
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == Self::UNDEFINED.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        self.tag() == TAG_OBJECT
    }

    #[inline]
    pub const fn is_object_or_null(self) -> bool {
        self.is_object() || self.is_null()
    }

    #[inline]
    pub const fn is_int32(self) -> bool {
        self.tag() == TAG_INT32
    }

    #[inline]
    pub const fn is_magic(self) -> bool {
        self.tag() == TAG_MAGIC
    }

    #[inline]
    pub fn to_int32(self) -> Option<i32> {
        match self.kind() {
            ValueKind::Int32(i) => Some(i),
            _ => None,
        }
    }

    #[inline]
    pub fn to_object(self) -> Option<ObjectId> {
        match self.kind() {
            ValueKind::Object(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn to_boolean(self) -> Option<bool> {
        match self.kind() {
            ValueKind::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Numeric value of an int32 or double.
    pub fn to_number(self) -> Option<f64> {
        match self.kind() {
            ValueKind::Int32(i) => Some(i as f64),
            ValueKind::Double(d) => Some(d),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::int32(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::double(d)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::object(id)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Undefined => f.write_str("Undefined"),
            ValueKind::Null => f.write_str("Null"),
            ValueKind::Boolean(b) => write!(f, "Boolean({b})"),
            ValueKind::Int32(i) => write!(f, "Int32({i})"),
            ValueKind::Double(d) => write!(f, "Double({d})"),
            ValueKind::Magic(why) => write!(f, "Magic({why})"),
            ValueKind::Object(id) => write!(f, "Object({})", id.raw()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Undefined => f.write_str("undefined"),
            ValueKind::Null => f.write_str("null"),
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::Int32(i) => write!(f, "{i}"),
            ValueKind::Double(d) => write!(f, "{d}"),
            ValueKind::Magic(why) => write!(f, "<magic {why}>"),
            ValueKind::Object(id) => write!(f, "<object #{}>", id.raw()),
        }
    }
}
