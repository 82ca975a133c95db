//! Incremental UTF-8 validation for text messages (RFC 3629 / RFC 6455).
//!
//! Fragmented text arrives in arbitrary chunks, so a multi-byte sequence can
//! straddle fragment boundaries. Instead of buffering partial sequences, the
//! validator keeps the number of continuation bytes still expected plus the
//! admissible range for the next byte, which encodes the overlong and
//! surrogate restrictions of the lead byte.

use crate::error::{Error, Result};

/// Incremental UTF-8 validator.
#[derive(Debug, Clone)]
pub struct Utf8Validator {
    /// Continuation bytes still expected for the current sequence.
    needed: u8,
    /// Inclusive bounds for the next continuation byte. The first
    /// continuation after a lead byte may be narrower than 0x80-0xBF.
    lower: u8,
    upper: u8,
}

impl Default for Utf8Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Validator {
    /// Create a new validator with no pending state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            needed: 0,
            lower: 0x80,
            upper: 0xBF,
        }
    }

    /// Validate a chunk of UTF-8 data.
    ///
    /// With `is_final = false`, a sequence may end mid-chunk and resume in
    /// the next call. With `is_final = true`, every sequence must complete.
    ///
    /// Overlong encodings, surrogates (U+D800..U+DFFF), code points above
    /// U+10FFFF, and the bytes 0xC0, 0xC1, 0xF5..0xFF are all rejected, at
    /// the first offending byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] on any invalid or (when final)
    /// incomplete sequence. The validator resets itself on failure.
    pub fn validate(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        for &byte in data {
            if self.needed > 0 {
                if byte < self.lower || byte > self.upper {
                    self.reset();
                    return Err(Error::InvalidUtf8);
                }
                self.needed -= 1;
                self.lower = 0x80;
                self.upper = 0xBF;
                continue;
            }

            match byte {
                0x00..=0x7F => {}
                0xC2..=0xDF => self.begin(1, 0x80, 0xBF),
                // E0 A0-BF: excludes overlong two-byte forms
                0xE0 => self.begin(2, 0xA0, 0xBF),
                0xE1..=0xEC | 0xEE..=0xEF => self.begin(2, 0x80, 0xBF),
                // ED 80-9F: excludes the surrogate range
                0xED => self.begin(2, 0x80, 0x9F),
                // F0 90-BF: excludes overlong four-byte forms
                0xF0 => self.begin(3, 0x90, 0xBF),
                0xF1..=0xF3 => self.begin(3, 0x80, 0xBF),
                // F4 80-8F: caps code points at U+10FFFF
                0xF4 => self.begin(3, 0x80, 0x8F),
                // 0x80-0xC1 (stray continuation, overlong leads) and 0xF5+
                _ => {
                    self.reset();
                    return Err(Error::InvalidUtf8);
                }
            }
        }

        if is_final && self.needed > 0 {
            self.reset();
            return Err(Error::InvalidUtf8);
        }
        Ok(())
    }

    fn begin(&mut self, needed: u8, lower: u8, upper: u8) {
        self.needed = needed;
        self.lower = lower;
        self.upper = upper;
    }

    /// Reset the validator, discarding any in-progress sequence.
    pub fn reset(&mut self) {
        self.needed = 0;
        self.lower = 0x80;
        self.upper = 0xBF;
    }

    /// Check whether a sequence is waiting for continuation bytes.
    #[must_use]
    pub fn has_incomplete(&self) -> bool {
        self.needed > 0
    }
}
