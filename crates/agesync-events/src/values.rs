use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed scalar held by a shared variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SdlScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Kind of a scalar, used to check writes against the declared shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
}

impl SdlScalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            SdlScalar::Bool(_) => ScalarKind::Bool,
            SdlScalar::Int(_) => ScalarKind::Int,
            SdlScalar::Float(_) => ScalarKind::Float,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SdlScalar::Bool(b) => Some(*b),
            SdlScalar::Int(i) => Some(*i != 0),
            SdlScalar::Float(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SdlScalar::Int(i) => Some(*i),
            SdlScalar::Bool(b) => Some(*b as i64),
            SdlScalar::Float(_) => None,
        }
    }
}

impl fmt::Display for SdlScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdlScalar::Bool(b) => write!(f, "{}", b),
            SdlScalar::Int(i) => write!(f, "{}", i),
            SdlScalar::Float(x) => write!(f, "{}", x),
        }
    }
}

/// Ordered tuple of scalars. Arity is fixed per variable name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SdlValue(pub Vec<SdlScalar>);

impl SdlValue {
    pub fn bool(value: bool) -> Self {
        Self(vec![SdlScalar::Bool(value)])
    }

    pub fn int(value: i64) -> Self {
        Self(vec![SdlScalar::Int(value)])
    }

    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        Self(values.into_iter().map(SdlScalar::Int).collect())
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&SdlScalar> {
        self.0.first()
    }

    /// First element as bool, the common shape for flags
    pub fn first_bool(&self) -> Option<bool> {
        self.first().and_then(SdlScalar::as_bool)
    }

    pub fn first_int(&self) -> Option<i64> {
        self.first().and_then(SdlScalar::as_int)
    }

    /// Every element as an int, or None if any element is a float
    pub fn to_ints(&self) -> Option<Vec<i64>> {
        self.0.iter().map(SdlScalar::as_int).collect()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ScalarKind> + '_ {
        self.0.iter().map(SdlScalar::kind)
    }
}

impl fmt::Display for SdlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, scalar) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", scalar)?;
        }
        write!(f, ")")
    }
}
