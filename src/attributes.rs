use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing key-value pairs of evaluation inputs.
///
/// Keys are strings naming the input (e.g., `"user_id"`, `"country"`). Key matching during
/// evaluation is case-insensitive: keys are lower-cased before lookup.
///
/// # Examples
/// ```
/// # use decider_core::{Attributes, AttributeValue};
/// let args = [
///     ("user_id".to_owned(), "d3f4-9a1b".into()),
///     ("age".to_owned(), 30.into()),
///     ("is_employee".to_owned(), true.into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Enum representing possible values of an evaluation input.
///
/// The permitted kinds are a closed set: string, bool, and numerics. Integers of any width and
/// floats of any width convert in via `From`; all numerics widen to `f64` for comparison
/// operators, while equality checks compare canonical decimal representations (so `5` equals
/// `5.0`).
///
/// Examples:
/// ```
/// # use decider_core::AttributeValue;
/// let string_attr: AttributeValue = "example".into();
/// let int_attr: AttributeValue = 42.into();
/// let float_attr: AttributeValue = 42.5.into();
/// let bool_attr: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An integer value of any source width.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// Widen any numeric value to `f64`. Returns `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Canonical representation used for equality checks. Numerics collapse to a decimal string
    /// without a trailing fractional part when the value is integral, so `5`, `5u8`, and `5.0`
    /// all canonicalize to `"5"`. Returns `None` for null.
    pub(crate) fn canonical_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Int(i) => Some(i.to_string()),
            AttributeValue::Float(f) => Some(canonical_f64_string(*f)),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::Null => None,
        }
    }

    /// Name of the runtime kind, for error messages.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Boolean(_) => "bool",
            AttributeValue::Null => "null",
        }
    }
}

/// Canonical decimal form of an `f64`: integral values print without a fractional part.
pub(crate) fn canonical_f64_string(f: f64) -> String {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for AttributeValue {
            fn from(value: $t) -> Self {
                Self::Int(value as i64)
            }
        })*
    };
}
impl_from_int!(i8, i16, i32, u8, u16, u32);

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        // u64 values beyond i64 range lose exact integer identity and fall back to float,
        // matching the widen-to-f64 comparison semantics.
        match i64::try_from(value) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Float(value as f64),
        }
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}
