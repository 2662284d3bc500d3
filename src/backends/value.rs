//! Runtime values produced by generated code

use std::fmt;

/// Value handed back from an executed entry function.
///
/// Shaped by the entry's signature: `void` functions yield [`Value::Void`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Void,
    Int(i64),
}

impl Value {
    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Void => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Size of the value in bytes
    pub fn size(&self) -> usize {
        match self {
            Value::Void => 0,
            Value::Int(_) => std::mem::size_of::<i64>(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Void => write!(f, "(void)"),
            Value::Int(n) => write!(f, "(int) {}", n),
        }
    }
}
