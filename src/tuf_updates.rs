//! Applying staged TUF root updates.
//!
//! A root rotation is staged first and applied as a separate step. Applying
//! is not naturally idempotent from the outside: after a 5xx or a dropped
//! connection the update may be half applied, and canceling at that point
//! can leave devices unable to validate the new root. Retrying apply is
//! always safe. Failures are therefore split into three classes, each with
//! its own operator instructions.

use log::{debug, info, warn};

use crate::api::{ApiError, TufUpdatesApi, TufUpdatesState};

/// Statuses for which the server guarantees nothing was changed.
pub const RECOVERABLE_STATUSES: [u16; 5] = [400, 401, 403, 422, 423];

pub const APPLIED_MESSAGE: &str = "\
The staged TUF root updates were applied to your Factory.
Please make sure that the updated TUF keys file(s) are stored in a safe place.";

pub const NOTHING_TO_APPLY_MESSAGE: &str = "There are no TUF root updates in progress; nothing to apply.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 404: either no transaction exists or something is badly wrong; ask
    /// the server which.
    NotFound,
    /// Rejected before any state changed.
    Recoverable,
    /// Anything else, including transport failures. State unknown.
    Ambiguous,
}

pub fn classify(err: &ApiError) -> FailureClass {
    match err.status() {
        Some(404) => FailureClass::NotFound,
        Some(code) if RECOVERABLE_STATUSES.contains(&code) => FailureClass::Recoverable,
        _ => FailureClass::Ambiguous,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    NothingToApply,
}

impl ApplyOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Applied => APPLIED_MESSAGE,
            Self::NothingToApply => NOTHING_TO_APPLY_MESSAGE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(
        "Failed to apply staged TUF root updates:\n{error}\n\
         No changes were made to your Factory.\n\
         There are two options available for you now:\n\
         - fix the errors listed above and retry applying the staged TUF root updates.\n\
         - cancel the staged TUF root updates."
    )]
    Recoverable {
        error: ApiError,
    },

    #[error(
        "Failed to apply staged TUF root updates:\n{error}\n\
         This is a critical error: staged TUF root updates may be only partially applied \
         to your Factory.\n\
         Please retry applying them soon after a short pause.\n\
         If the error persists, please contact customer support."
    )]
    Ambiguous {
        error: ApiError,
    },
}

impl ApplyError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }
}

/// Applies the staged root update `txid` (or the current one when `None`).
pub fn apply_staged<A: TufUpdatesApi + ?Sized>(
    api: &A,
    txid: Option<&str>,
) -> Result<ApplyOutcome, ApplyError> {
    let err = match api.apply_tuf_updates(txid) {
        Ok(()) => {
            info!("Applied staged TUF root updates");
            return Ok(ApplyOutcome::Applied);
        }
        Err(err) => err,
    };

    match classify(&err) {
        FailureClass::Recoverable => Err(ApplyError::Recoverable { error: err }),
        FailureClass::Ambiguous => Err(ApplyError::Ambiguous { error: err }),
        FailureClass::NotFound => match api.tuf_updates() {
            Ok(updates) if updates.status == TufUpdatesState::None => {
                debug!("Apply returned 404 and no TUF root updates are in progress");
                Ok(ApplyOutcome::NothingToApply)
            }
            Ok(updates) => {
                warn!(
                    "Apply returned 404 while TUF root updates are {}",
                    updates.status
                );
                Err(ApplyError::Ambiguous { error: err })
            }
            Err(status_err) => {
                warn!("Cannot query TUF root updates status: {status_err}");
                Err(ApplyError::Ambiguous { error: err })
            }
        },
    }
}
