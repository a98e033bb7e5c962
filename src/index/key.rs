//! Typed index keys and the key comparator
//!
//! Inside the engine every key is an [`IndexKey`]; separator keys promoted by a
//! split are cloned values, never re-parsed bytes. The length-prefixed byte
//! form only exists at the client boundary ([`IndexKey::from_client_bytes`]).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{AttrType, Attribute};

use super::error::{IndexError, IndexResult};

/// Width of the length prefix in the client VarChar encoding
const LEN_PREFIX: usize = 4;

/// A key value; the variant always matches the index's attribute type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexKey {
    Int(i32),
    Real(f32),
    VarChar(Vec<u8>),
}

impl IndexKey {
    /// Attribute type this key belongs to
    pub fn attr_type(&self) -> AttrType {
        match self {
            IndexKey::Int(_) => AttrType::Int,
            IndexKey::Real(_) => AttrType::Real,
            IndexKey::VarChar(_) => AttrType::VarChar,
        }
    }

    /// Decode a key from the client byte encoding
    ///
    /// Int and Real are 4 little-endian bytes; VarChar is a 4-byte
    /// little-endian length followed by that many bytes.
    pub fn from_client_bytes(attr: &Attribute, data: &[u8]) -> IndexResult<Self> {
        let key = match attr.attr_type {
            AttrType::Int => IndexKey::Int(i32::from_le_bytes(fixed4(data)?)),
            AttrType::Real => IndexKey::Real(f32::from_le_bytes(fixed4(data)?)),
            AttrType::VarChar => {
                let len = u32::from_le_bytes(fixed4(data)?) as usize;
                let body = data.get(LEN_PREFIX..LEN_PREFIX + len).ok_or_else(|| {
                    IndexError::InvalidKeyEncoding(format!(
                        "length prefix {} exceeds {} available bytes",
                        len,
                        data.len().saturating_sub(LEN_PREFIX)
                    ))
                })?;
                IndexKey::VarChar(body.to_vec())
            }
        };
        key.validate(attr)?;
        Ok(key)
    }

    /// Encode the key in the client byte encoding
    pub fn to_client_bytes(&self) -> Vec<u8> {
        match self {
            IndexKey::Int(v) => v.to_le_bytes().to_vec(),
            IndexKey::Real(v) => v.to_le_bytes().to_vec(),
            IndexKey::VarChar(bytes) => {
                let mut out = Vec::with_capacity(LEN_PREFIX + bytes.len());
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
                out
            }
        }
    }

    /// Parse a key from its textual form, e.g. a command-line argument
    pub fn parse(attr: &Attribute, text: &str) -> IndexResult<Self> {
        let key = match attr.attr_type {
            AttrType::Int => IndexKey::Int(text.trim().parse().map_err(|e| {
                IndexError::InvalidKeyEncoding(format!("'{}' is not an INT: {}", text, e))
            })?),
            AttrType::Real => IndexKey::Real(text.trim().parse().map_err(|e| {
                IndexError::InvalidKeyEncoding(format!("'{}' is not a REAL: {}", text, e))
            })?),
            AttrType::VarChar => IndexKey::VarChar(text.as_bytes().to_vec()),
        };
        key.validate(attr)?;
        Ok(key)
    }

    /// Order this (stored) key against a probe key
    ///
    /// Numeric keys compare numerically; NaN falls back to IEEE total order.
    /// VarChar keys compare bytewise. Keys of different types order by type,
    /// which only happens if a caller bypasses [`IndexKey::validate`].
    pub fn compare(&self, probe: &IndexKey) -> Ordering {
        match (self, probe) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Real(a), IndexKey::Real(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (IndexKey::VarChar(a), IndexKey::VarChar(b)) => a.as_slice().cmp(b.as_slice()),
            _ => type_rank(self.attr_type()).cmp(&type_rank(probe.attr_type())),
        }
    }

    /// Check the key against the attribute the index was declared over
    pub fn validate(&self, attr: &Attribute) -> IndexResult<()> {
        if self.attr_type() != attr.attr_type {
            return Err(IndexError::KeyTypeMismatch {
                expected: attr.attr_type,
                actual: self.attr_type(),
            });
        }
        if let IndexKey::VarChar(bytes) = self {
            if bytes.len() > attr.length as usize {
                return Err(IndexError::KeyTooLong {
                    len: bytes.len(),
                    max: attr.length as usize,
                });
            }
        }
        Ok(())
    }
}

/// Compare a stored key against a probe in client byte encoding
pub fn compare_keys(stored: &IndexKey, probe: &[u8], attr: &Attribute) -> IndexResult<Ordering> {
    let probe = IndexKey::from_client_bytes(attr, probe)?;
    Ok(stored.compare(&probe))
}

fn fixed4(data: &[u8]) -> IndexResult<[u8; 4]> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| IndexError::InvalidKeyEncoding(format!("need 4 bytes, got {}", data.len())))
}

fn type_rank(attr_type: AttrType) -> u8 {
    match attr_type {
        AttrType::Int => 0,
        AttrType::Real => 1,
        AttrType::VarChar => 2,
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(v) => write!(f, "{}", v),
            IndexKey::Real(v) => write!(f, "{}", v),
            IndexKey::VarChar(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<i32> for IndexKey {
    fn from(value: i32) -> Self {
        IndexKey::Int(value)
    }
}

impl From<f32> for IndexKey {
    fn from(value: f32) -> Self {
        IndexKey::Real(value)
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::VarChar(value.as_bytes().to_vec())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::VarChar(value.into_bytes())
    }
}
