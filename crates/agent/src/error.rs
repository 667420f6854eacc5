// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of distribution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Network failure, broker unreachable, unexpected controller status.
    Transport,
    /// Payload could not be decoded.
    Malformed,
    /// The executor rejected or never received the configuration.
    Forward,
    /// A strategy could not be built (broker or controller unreachable).
    Construction,
    /// Unknown strategy name.
    Unsupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Malformed => "MALFORMED",
            Self::Forward => "FORWARD",
            Self::Construction => "CONSTRUCTION",
            Self::Unsupported => "UNSUPPORTED",
        }
    }

    /// Whether the failure is expected to clear on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport | Self::Forward)
    }

    pub fn err(self, message: impl Into<String>) -> DistError {
        DistError { code: self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error carried inside `anyhow::Error`.
///
/// Callers recover the code with `err.downcast_ref::<DistError>()`.
#[derive(Debug, Clone)]
pub struct DistError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for DistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for DistError {}

/// Return the [`ErrorCode`] attached to an error chain, if any.
pub fn code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|e| e.downcast_ref::<DistError>()).map(|e| e.code)
}
