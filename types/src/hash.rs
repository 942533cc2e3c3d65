//! Commitment and vertex-id digests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Blake2b-256 output. Chains a node's commitments and names its vertices;
/// [`Hash::ZERO`] stands for "no predecessor".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_short("Hash", &self.0, f)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(&self.0, f)
    }
}

/// Lowercase hex of `bytes`, written straight into the formatter.
pub(crate) fn write_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    bytes.iter().try_for_each(|b| write!(f, "{b:02x}"))
}

/// `Name(01020304..)`: the first four bytes, enough to tell ids apart in logs.
pub(crate) fn write_short(name: &str, bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{name}(")?;
    write_hex(&bytes[..bytes.len().min(4)], f)?;
    f.write_str("..)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let hash = Hash::new(bytes);
        assert_eq!(format!("{hash:?}"), "Hash(ab000000..)");
        let shown = hash.to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.starts_with("ab") && shown.ends_with("01"));
    }

    #[test]
    fn zero_is_default() {
        assert!(Hash::default().is_zero());
        assert!(!Hash::new([1; 32]).is_zero());
    }
}
