use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Int,     // 4 bytes
    Real,    // 4 bytes
    VarChar, // up to `length` bytes
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Int => "INT",
            AttrType::Real => "REAL",
            AttrType::VarChar => "VARCHAR",
        };
        f.write_str(name)
    }
}

/// Attribute descriptor: the column an index is built over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttrType,
    /// Size in bytes; for VarChar, the maximum string length
    pub length: u32,
}

impl Attribute {
    /// Create a new attribute descriptor
    pub fn new(name: impl Into<String>, attr_type: AttrType, length: u32) -> Self {
        Self {
            name: name.into(),
            attr_type,
            length,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Int, 4)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Real, 4)
    }

    pub fn varchar(name: impl Into<String>, max_len: u32) -> Self {
        Self::new(name, AttrType::VarChar, max_len)
    }
}
