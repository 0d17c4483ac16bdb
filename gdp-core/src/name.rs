// SPDX-License-Identifier: MIT OR Apache-2.0

//! 256-bit log names and their printable form.
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

/// Size of a log name in bytes.
pub const NAME_LEN: usize = 32;

/// Length of the printable (URL-safe base64, unpadded) form of a name.
pub const PRINTABLE_NAME_LEN: usize = 43;

/// Binary name of a log.
///
/// Names are derived from the SHA-256 digest of a log's serialized metadata, see
/// [`Metadata::gdp_name`](crate::Metadata::gdp_name).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GdpName([u8; NAME_LEN]);

impl GdpName {
    pub const fn from_bytes(bytes: [u8; NAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    /// Canonical 43-character printable form.
    pub fn to_printable(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode the canonical printable form.
    pub fn from_printable(value: &str) -> Result<Self, NameError> {
        if value.len() != PRINTABLE_NAME_LEN {
            return Err(NameError::InvalidPrintableLength(value.len()));
        }

        let bytes = URL_SAFE_NO_PAD.decode(value)?;
        Self::try_from(bytes.as_slice())
    }

    /// Structural check, says nothing about whether the log exists.
    ///
    /// The all-zero name is reserved to mean "no name".
    pub fn is_valid(&self) -> bool {
        self.0.iter().any(|byte| *byte != 0)
    }
}

impl AsRef<[u8]> for GdpName {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; NAME_LEN]> for GdpName {
    fn from(value: [u8; NAME_LEN]) -> Self {
        Self(value)
    }
}

impl From<GdpName> for [u8; NAME_LEN] {
    fn from(value: GdpName) -> Self {
        value.0
    }
}

impl TryFrom<&[u8]> for GdpName {
    type Error = NameError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; NAME_LEN] = value
            .try_into()
            .map_err(|_| NameError::InvalidLength(value.len(), NAME_LEN))?;
        Ok(Self(bytes))
    }
}

impl FromStr for GdpName {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_printable(value)
    }
}

impl fmt::Display for GdpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_printable())
    }
}

impl fmt::Debug for GdpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GdpName").field(&self.to_printable()).finish()
    }
}

/// Error types for `GdpName`.
#[derive(Error, Debug)]
pub enum NameError {
    /// Name has an invalid number of bytes.
    #[error("invalid name length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Printable name does not have the canonical length.
    #[error("invalid printable name length {0}, expected 43 characters")]
    InvalidPrintableLength(usize),

    /// Printable name contains characters outside of the URL-safe base64 alphabet.
    #[error("invalid base64 encoding in printable name: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}
