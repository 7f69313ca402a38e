//! Fixed marker bytes at the start of every frame.

use crate::error::{FrameError, Result};

/// Longest supported signature, in bytes.
pub const MAX_SIGNATURE_LEN: usize = 8;

/// An ordered sequence of 1..=[`MAX_SIGNATURE_LEN`] marker bytes.
///
/// Stored inline, so checkers never allocate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    bytes: [u8; MAX_SIGNATURE_LEN],
    len: u8,
}

impl Signature {
    /// Build a signature from its marker bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_SIGNATURE_LEN {
            return Err(FrameError::InvalidSignature {
                len: bytes.len(),
                max: MAX_SIGNATURE_LEN,
            });
        }
        let mut inline = [0u8; MAX_SIGNATURE_LEN];
        inline[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: inline,
            len: bytes.len() as u8,
        })
    }

    /// The marker bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of marker bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(")?;
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

/// Outcome of feeding one byte to a [`SignatureChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMatch {
    /// The byte extended a partial match.
    Matching,
    /// The byte broke the match; the cursor is back at zero.
    Mismatch,
    /// The full signature has been matched contiguously.
    MatchComplete,
}

/// Positional matcher for a [`Signature`].
#[derive(Debug, Clone)]
pub struct SignatureChecker {
    signature: Signature,
    cursor: usize,
}

impl SignatureChecker {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            cursor: 0,
        }
    }

    /// Compare `byte` against the next expected signature byte.
    ///
    /// On mismatch the cursor returns to zero and the byte is not
    /// reconsidered as the start of a new signature; callers that need
    /// overlap recovery feed it again.
    pub fn feed(&mut self, byte: u8) -> SignatureMatch {
        if self.is_complete() {
            self.cursor = 0;
        }

        if byte != self.signature.as_bytes()[self.cursor] {
            self.cursor = 0;
            return SignatureMatch::Mismatch;
        }

        self.cursor += 1;
        if self.is_complete() {
            SignatureMatch::MatchComplete
        } else {
            SignatureMatch::Matching
        }
    }

    /// Re-examine a byte that just produced [`SignatureMatch::Mismatch`] after
    /// `matched` bytes had matched.
    ///
    /// Moves the cursor to the longest signature prefix that ends with `byte`
    /// inside the bytes seen so far, so overlapping starts such as `AA AA B`
    /// against `AA B` are not lost.
    pub fn recover(&mut self, matched: usize, byte: u8) -> SignatureMatch {
        let sig = self.signature.as_bytes();
        let matched = matched.min(sig.len().saturating_sub(1));
        self.cursor = 0;
        for j in (1..=matched).rev() {
            let start = matched + 1 - j;
            if sig[start..matched] == sig[..j - 1] && sig[j - 1] == byte {
                self.cursor = j;
                return SignatureMatch::Matching;
            }
        }
        SignatureMatch::Mismatch
    }

    /// Forget any partial match.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of signature bytes matched so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once the whole signature has been matched and not yet reset.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.signature.len()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}
