//! Zeroizing wrapper for in-memory secrets
//!
//! Passwords, PINs, and tokens passing through the vault are held in a
//! [`SecretString`], which zeroes its memory on drop and never exposes its
//! contents through `Debug` or `Display`.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret value that zeroes its backing memory when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    data: String,
}

impl SecretString {
    /// Wrap an owned string.
    pub fn new(data: String) -> Self {
        Self { data }
    }

    /// Borrow the secret.
    ///
    /// The reference points at memory that is zeroed on drop; do not store it
    /// beyond the lifetime of the wrapper.
    pub fn expose(&self) -> &str {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl From<String> for SecretString {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&str> for SecretString {
    fn from(data: &str) -> Self {
        Self::new(data.to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretString")
            .field("len", &self.len())
            .field("data", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[secret: {} bytes]", self.len())
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.data.as_bytes() == other.data.as_bytes()
    }
}

impl Eq for SecretString {}
