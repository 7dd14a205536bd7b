//! Flat error taxonomy shared across the workspace (spec §7).
//!
//! Every crate defines whatever local error enum fits its domain, but at
//! crate boundaries errors collapse into [`OcrError`] so callers (the job
//! state machine, the HTTP surface) only ever need to match on one kind.

use std::fmt;

/// The flat error kind taxonomy from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrErrorKind {
    NotFound,
    AlreadyExists,
    ValidationFailed,
    CryptoFailed,
    Timeout,
    Transport,
    ChainRejected,
    Stopped,
    Internal,
}

impl fmt::Display for OcrErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::ValidationFailed => "validation_failed",
            Self::CryptoFailed => "crypto_failed",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::ChainRejected => "chain_rejected",
            Self::Stopped => "stopped",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A kinded, contextual error. Carries an optional non-zero chain response
/// code for [`OcrErrorKind::ChainRejected`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct OcrError {
    pub kind: OcrErrorKind,
    pub message: String,
    pub chain_code: Option<u32>,
}

impl OcrError {
    pub fn new(kind: OcrErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            chain_code: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::AlreadyExists, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::ValidationFailed, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::CryptoFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::Transport, message)
    }

    pub fn chain_rejected(code: u32, message: impl Into<String>) -> Self {
        Self {
            kind: OcrErrorKind::ChainRejected,
            message: message.into(),
            chain_code: Some(code),
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::Stopped, message)
    }

    /// Programming-error / corruption-fault path. Spec §7: these must not
    /// be swallowed. Callers that can abort the process should do so; this
    /// constructor just tags the error so they can tell.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(OcrErrorKind::Internal, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == OcrErrorKind::NotFound
    }
}
