//! # Keyspace and Candidate Encoding
//!
//! A [`Keyspace`] is every string of exactly `length` symbols drawn from an
//! ordered `alphabet` of `R` distinct symbols. There are `N = R^length` of
//! them, and each one is addressed by an index in `[0, N)`.
//!
//! Encoding writes the index in base `R`, most significant symbol first,
//! left-padded with the alphabet's zero symbol (its first symbol). The mapping
//! is a bijection: [`Keyspace::decode`] inverts [`Keyspace::encode`] for every
//! index in range.
//!
//! ```
//! use keysweep::Keyspace;
//!
//! let keyspace = Keyspace::new("0123456789", 2).unwrap();
//! assert_eq!(keyspace.size(), 100);
//! assert_eq!(keyspace.encode(5).unwrap(), "05");
//! assert_eq!(keyspace.decode("99").unwrap(), 99);
//! ```
//!
//! Alphabets are restricted to distinct printable ASCII symbols, which keeps
//! every candidate a valid single-byte-per-symbol string and lets decoding use
//! a flat lookup table.

mod partition;

pub use partition::{Assignment, partition};

use crate::error::{Error, Result};
use core::fmt;

/// The reference alphabet: digits followed by lower-case latin letters.
pub const DEFAULT_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// The reference candidate length.
pub const DEFAULT_LENGTH: usize = 4;

const NO_VALUE: u8 = 255;

/// An immutable, validated description of the candidate space.
#[derive(Clone)]
pub struct Keyspace {
    alphabet: Box<[u8]>,
    length: usize,
    size: u64,
    /// Place values `R^(length-1), ..., R^1, R^0`.
    places: Box<[u64]>,
    /// Symbol byte to digit value, `NO_VALUE` for foreign bytes.
    lookup: [u8; 256],
}

impl Keyspace {
    /// Validates `alphabet` and `length` and builds the keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if:
    /// - the alphabet has fewer than two symbols,
    /// - a symbol is not printable ASCII or appears twice,
    /// - `length` is zero,
    /// - `R^length` does not fit in a `u64`.
    pub fn new(alphabet: &str, length: usize) -> Result<Self> {
        let mut lookup = [NO_VALUE; 256];
        let mut symbols = Vec::with_capacity(alphabet.len());

        for c in alphabet.chars() {
            if !c.is_ascii_graphic() {
                return Err(Error::invalid_config(format!(
                    "alphabet symbol {c:?} is not printable ASCII"
                )));
            }
            let b = c as u8;
            if lookup[b as usize] != NO_VALUE {
                return Err(Error::invalid_config(format!(
                    "alphabet symbol {c:?} appears more than once"
                )));
            }
            // At most 94 printable ASCII symbols, always below NO_VALUE.
            lookup[b as usize] = symbols.len() as u8;
            symbols.push(b);
        }

        if symbols.len() < 2 {
            return Err(Error::invalid_config(format!(
                "alphabet needs at least 2 symbols, got {}",
                symbols.len()
            )));
        }
        if length == 0 {
            return Err(Error::invalid_config("candidate length must be at least 1"));
        }

        let radix = symbols.len() as u64;
        let size = u32::try_from(length)
            .ok()
            .and_then(|exp| radix.checked_pow(exp))
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "keyspace of {radix}^{length} candidates does not fit in 64 bits"
                ))
            })?;

        // Every place value divides `size`, so none of these overflow.
        let mut places = vec![1_u64; length];
        for i in (0..length - 1).rev() {
            places[i] = places[i + 1] * radix;
        }

        Ok(Self {
            alphabet: symbols.into_boxed_slice(),
            length,
            size,
            places: places.into_boxed_slice(),
            lookup,
        })
    }

    /// Total number of candidates, `R^length`.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of symbols in the alphabet.
    pub const fn radix(&self) -> usize {
        self.alphabet.len()
    }

    /// Length of every candidate.
    pub const fn length(&self) -> usize {
        self.length
    }

    /// The alphabet in digit order.
    pub fn alphabet(&self) -> &str {
        // Only ASCII bytes are ever stored.
        core::str::from_utf8(&self.alphabet).unwrap_or_default()
    }

    /// Encodes `index` as a candidate string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= self.size()`.
    pub fn encode(&self, index: u64) -> Result<String> {
        let mut out = String::with_capacity(self.length);
        self.encode_into(index, &mut out)?;
        Ok(out)
    }

    /// Encodes `index` into `out`, replacing its contents.
    ///
    /// Lanes call this with a reused buffer so the hot loop does not allocate
    /// per candidate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= self.size()`; `out` is
    /// left untouched in that case.
    pub fn encode_into(&self, index: u64, out: &mut String) -> Result<()> {
        if index >= self.size {
            return Err(Error::IndexOutOfRange {
                index,
                size: self.size,
            });
        }

        let radix = self.alphabet.len() as u64;
        out.clear();
        for &place in &self.places {
            let digit = (index / place) % radix;
            out.push(char::from(self.alphabet[digit as usize]));
        }
        Ok(())
    }

    /// Decodes a candidate back into its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCandidate`] if the candidate has the wrong
    /// length or contains a symbol outside the alphabet.
    pub fn decode(&self, candidate: &str) -> Result<u64> {
        if candidate.len() != self.length {
            return Err(Error::InvalidCandidate {
                reason: format!(
                    "expected {} symbols, got {}",
                    self.length,
                    candidate.len()
                ),
            });
        }

        let radix = self.alphabet.len() as u64;
        let mut acc = 0_u64;
        for (i, b) in candidate.bytes().enumerate() {
            let val = self.lookup[b as usize];
            if val == NO_VALUE {
                return Err(Error::InvalidCandidate {
                    reason: format!("byte {b:#04x} at position {i} is not in the alphabet"),
                });
            }
            acc = acc * radix + u64::from(val);
        }
        Ok(acc)
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        // The default alphabet and length are statically valid.
        match Self::new(DEFAULT_ALPHABET, DEFAULT_LENGTH) {
            Ok(keyspace) => keyspace,
            Err(e) => unreachable!("default keyspace rejected: {e}"),
        }
    }
}

impl fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("alphabet", &self.alphabet())
            .field("length", &self.length)
            .field("size", &self.size)
            .finish()
    }
}
