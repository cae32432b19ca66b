//! Streaming checksum validation.
//!
//! [`ValidatedReader`] forwards bytes from an inner reader while hashing
//! them. Once the inner reader reports end of stream the digest is compared
//! with the expected checksum; a mismatch replaces the clean EOF with an
//! error, so a caller that simply drains the stream cannot accept corrupt
//! content by accident.

use crate::Checksum;
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use std::io::{self, Read};
use thiserror::Error;

/// Errors raised while validating a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The stream did not hash to the expected checksum.
    #[error("validation error: checksum does not match: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The checksum names an algorithm this crate cannot compute.
    #[error("unsupported algorithm \"{0}\": the following algorithms are supported [sha256, sha512, md5]")]
    UnsupportedAlgorithm(String),
}

/// Whether an I/O error carries a [`ValidationError::ChecksumMismatch`].
#[must_use]
pub fn is_checksum_mismatch(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<ValidationError>())
        .is_some_and(|e| matches!(e, ValidationError::ChecksumMismatch { .. }))
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
}

impl Hasher {
    fn for_algorithm(algorithm: &str) -> Option<Self> {
        match algorithm.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256(Sha256::new())),
            "sha512" => Some(Self::Sha512(Sha512::new())),
            "md5" => Some(Self::Md5(Md5::new())),
            _ => None,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Md5(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

enum State {
    Hashing(Hasher),
    Unsupported,
    Valid,
    Failed(ValidationError),
}

/// A reader that validates its content against a checksum.
pub struct ValidatedReader<R> {
    inner: R,
    checksum: Checksum,
    state: State,
}

impl<R: Read> ValidatedReader<R> {
    /// Wrap `inner`, expecting its full content to hash to `checksum`.
    pub fn new(inner: R, checksum: Checksum) -> Self {
        let state = match Hasher::for_algorithm(checksum.algorithm()) {
            Some(hasher) => State::Hashing(hasher),
            None => State::Unsupported,
        };
        Self {
            inner,
            checksum,
            state,
        }
    }

    /// Drain the reader and report whether the content matched.
    ///
    /// A checksum mismatch yields `Ok(false)`; every other failure is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns read errors from the inner reader and unsupported algorithms.
    pub fn valid(&mut self) -> io::Result<bool> {
        match io::copy(self, &mut io::sink()) {
            Ok(_) => Ok(true),
            Err(err) if is_checksum_mismatch(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn finish(&mut self) -> io::Result<usize> {
        let State::Hashing(hasher) = std::mem::replace(&mut self.state, State::Valid) else {
            return Ok(0);
        };
        let actual = Checksum::new(self.checksum.algorithm(), hasher.finalize_hex());
        if self.checksum.matches(&actual) {
            return Ok(0);
        }
        let err = ValidationError::ChecksumMismatch {
            expected: self.checksum.to_string(),
            actual: actual.to_string(),
        };
        self.state = State::Failed(err.clone());
        Err(io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl<R: Read> Read for ValidatedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.state {
            State::Unsupported => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    ValidationError::UnsupportedAlgorithm(self.checksum.algorithm().to_string()),
                ))
            }
            State::Failed(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err.clone())),
            State::Valid => return Ok(0),
            State::Hashing(_) => {}
        }

        if buf.is_empty() {
            return Ok(0);
        }

        let n = self.inner.read(buf)?;
        if n == 0 {
            return self.finish();
        }
        if let State::Hashing(hasher) = &mut self.state {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
