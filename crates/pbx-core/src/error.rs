//! Error taxonomy shared across the core (spec §4.8).
//!
//! Handlers and dispatcher operations never panic or unwind on expected
//! failure; they return a `CoreError` (or, inside a `Message`, set the
//! `error`/`reason` parameters) and the caller decides how to react.

use thiserror::Error;

/// Stable error domain for `pbx-core`.
///
/// Each variant corresponds to one of the taxonomy entries in spec §4.8.
/// `Fatal` is reserved for invariant violations that the engine's
/// "abort-on-bug" toggle may escalate; everything else is an ordinary,
/// expected failure mode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("congestion: {0}")]
    Congestion(String),

    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("peer gone: {0}")]
    PeerGone(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = core::result::Result<T, CoreError>;

/// Process-wide "abort-on-bug" toggle (spec §4.8, §7).
///
/// Tests and embedders that want panics on invariant violations flip this;
/// production code leaves it off and just logs at the `bug` level.
static ABORT_ON_BUG: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

pub fn set_abort_on_bug(enabled: bool) {
    ABORT_ON_BUG.store(enabled, core::sync::atomic::Ordering::SeqCst);
}

pub fn abort_on_bug() -> bool {
    ABORT_ON_BUG.load(core::sync::atomic::Ordering::SeqCst)
}

/// Reports a runtime invariant violation.
///
/// Logs at the dedicated `bug` target and, if [`set_abort_on_bug`] is on,
/// panics. Never called on ordinary, expected failures — those go through
/// [`CoreError`].
#[track_caller]
pub fn report_bug(detail: impl core::fmt::Display) {
    tracing::error!(target: "pbx_core::bug", "{detail}");
    if abort_on_bug() {
        panic!("bug: {detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_toggle_round_trips() {
        assert!(!abort_on_bug());
        set_abort_on_bug(true);
        assert!(abort_on_bug());
        set_abort_on_bug(false);
    }

    #[test]
    fn display_includes_detail() {
        let err = CoreError::NotFound("chan/1".into());
        assert_eq!(err.to_string(), "not found: chan/1");
    }
}
