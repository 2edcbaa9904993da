//! Owner panel: recovery phrase display, restore and reset confirmation.
//!
//! Reset is destructive, so it is a two-step flow: `request_reset` arms it and
//! only an armed panel lets `confirm_reset` through.
//!
//! While a restore or reset is running the rows in the store belong to neither
//! owner, so the reducer ignores deliveries until the operation finishes.

use localfirst_core::owner::{Mnemonic, MnemonicError};
use serde::{Deserialize, Serialize};

/// Owner operation in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerOperation {
    /// Switching to another owner
    Restore,
    /// Wiping local data
    Reset,
}

/// UI state for the owner actions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerPanel {
    /// Recovery phrase currently on screen
    pub mnemonic: Option<Mnemonic>,
    /// Error shown under the restore form
    pub restore_error: Option<String>,
    /// Reset requested and waiting for confirmation
    pub reset_pending: bool,
    /// Restore or reset currently running
    pub in_flight: Option<OwnerOperation>,
}

impl OwnerPanel {
    /// Validate a typed phrase, recording the displayed error on failure
    ///
    /// # Errors
    ///
    /// The parse error, also stored in `restore_error`.
    pub fn accept_phrase(&mut self, phrase: &str) -> Result<Mnemonic, MnemonicError> {
        match phrase.parse::<Mnemonic>() {
            Ok(mnemonic) => {
                self.restore_error = None;
                Ok(mnemonic)
            },
            Err(error) => {
                self.restore_error = Some(error.to_string());
                Err(error)
            },
        }
    }

    /// Arm the reset confirmation
    pub const fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    /// Disarm without resetting
    pub const fn cancel_reset(&mut self) {
        self.reset_pending = false;
    }

    /// Consume the confirmation; `true` only if a reset was requested
    pub const fn confirm_reset(&mut self) -> bool {
        let armed = self.reset_pending;
        self.reset_pending = false;
        armed
    }

    /// Mark `operation` as running; `false` if another one already is
    pub const fn begin(&mut self, operation: OwnerOperation) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(operation);
        true
    }

    /// The running operation finished, successfully or not
    pub const fn finish(&mut self) {
        self.in_flight = None;
    }

    /// Whether a restore or reset is running
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}
