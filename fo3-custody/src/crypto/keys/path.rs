//! BIP32 derivation paths

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DerivationError;

/// Offset of hardened child indices
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// A single step of a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildIndex {
    Normal(u32),
    Hardened(u32),
}

impl ChildIndex {
    /// Build a hardened index, rejecting values that overflow into the hardened range
    pub fn hardened(index: u32) -> Result<Self, DerivationError> {
        if index >= HARDENED_OFFSET {
            return Err(DerivationError::InvalidPath(format!("index {} out of range", index)));
        }
        Ok(Self::Hardened(index))
    }

    pub fn normal(index: u32) -> Result<Self, DerivationError> {
        if index >= HARDENED_OFFSET {
            return Err(DerivationError::InvalidPath(format!("index {} out of range", index)));
        }
        Ok(Self::Normal(index))
    }

    pub fn is_hardened(&self) -> bool {
        matches!(self, Self::Hardened(_))
    }

    /// Raw 32-bit child number as used in HMAC input and serialization
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Normal(i) => i,
            Self::Hardened(i) => i + HARDENED_OFFSET,
        }
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(i) => write!(f, "{}", i),
            Self::Hardened(i) => write!(f, "{}'", i),
        }
    }
}

/// A parsed BIP32 derivation path such as `m/44'/0'/0'/0/0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<ChildIndex>);

impl DerivationPath {
    pub fn components(&self) -> &[ChildIndex] {
        &self.0
    }
}

impl From<Vec<ChildIndex>> for DerivationPath {
    fn from(components: Vec<ChildIndex>) -> Self {
        Self(components)
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let mut parts = path.split('/');
        if parts.next() != Some("m") {
            return Err(DerivationError::InvalidPath(path.to_string()));
        }

        let mut components = Vec::new();
        for component in parts {
            let (digits, hardened) = match component.strip_suffix('\'').or_else(|| component.strip_suffix('h')) {
                Some(digits) => (digits, true),
                None => (component, false),
            };
            let index = digits
                .parse::<u32>()
                .map_err(|_| DerivationError::InvalidPath(format!("{}: bad component '{}'", path, component)))?;
            components.push(if hardened {
                ChildIndex::hardened(index)?
            } else {
                ChildIndex::normal(index)?
            });
        }

        Ok(Self(components))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.0 {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
