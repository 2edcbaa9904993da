//! Owner identity contract.
//!
//! A local-first store belongs to an owner whose identity is backed by a
//! mnemonic recovery phrase. The phrase lets the same data be restored on
//! another device; resetting wipes every local row and starts a fresh owner.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Word counts accepted for a recovery phrase.
pub const MNEMONIC_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Why a recovery phrase failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MnemonicError {
    /// Nothing but whitespace was entered
    #[error("Recovery phrase is empty")]
    Empty,

    /// Not one of the supported phrase lengths
    #[error("Recovery phrase has {0} words; expected 12, 15, 18, 21 or 24")]
    WordCount(usize),

    /// A word contains something other than ASCII letters
    #[error("Recovery phrase word {position} (\"{word}\") is not a plain lowercase word")]
    InvalidWord {
        /// 1-based position in the phrase
        position: usize,
        /// Offending word
        word: String,
    },
}

/// A structurally valid recovery phrase.
///
/// Parsing normalizes whitespace and case, so `"  Abandon  ability ..."` and
/// `"abandon ability ..."` produce the same value.
///
/// # Examples
///
/// ```
/// use localfirst_core::owner::Mnemonic;
///
/// let phrase = "one two three four five six seven eight nine ten eleven twelve";
/// let mnemonic: Mnemonic = phrase.parse().unwrap();
/// assert_eq!(mnemonic.word_count(), 12);
///
/// assert!("not enough words".parse::<Mnemonic>().is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mnemonic(String);

impl Mnemonic {
    /// The normalized phrase
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of words in the phrase
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

impl FromStr for Mnemonic {
    type Err = MnemonicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = s.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Err(MnemonicError::Empty);
        }
        if let Some((index, word)) = words
            .iter()
            .enumerate()
            .find(|(_, word)| !word.chars().all(|c| c.is_ascii_lowercase()))
        {
            return Err(MnemonicError::InvalidWord {
                position: index + 1,
                word: word.clone(),
            });
        }
        if !MNEMONIC_WORD_COUNTS.contains(&words.len()) {
            return Err(MnemonicError::WordCount(words.len()));
        }
        Ok(Self(words.join(" ")))
    }
}

impl TryFrom<String> for Mnemonic {
    type Error = MnemonicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mnemonic> for String {
    fn from(mnemonic: Mnemonic) -> Self {
        mnemonic.0
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic(<{} words>)", self.word_count())
    }
}

/// Errors reported by the owner identity capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerError {
    /// The phrase parsed but does not belong to any known owner
    #[error("Recovery phrase was not accepted: {0}")]
    Rejected(String),

    /// Local data could not be wiped or replaced
    #[error("Local data operation failed: {0}")]
    Storage(String),
}

/// The owner identity capability of the sync engine.
pub trait OwnerIdentity: Send + Sync {
    /// Current owner's recovery phrase, if one has been generated
    fn export_secret(&self) -> Option<Mnemonic>;

    /// Replace the local owner with the one derived from `mnemonic`
    fn restore_from_secret(&self, mnemonic: Mnemonic) -> BoxFuture<'static, Result<(), OwnerError>>;

    /// Delete every local row and start over with a new owner
    ///
    /// Destructive: callers must obtain explicit confirmation first.
    fn reset_all_local_data(&self) -> BoxFuture<'static, Result<(), OwnerError>>;
}
