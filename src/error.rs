// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-wide error taxonomy. Every fallible operation that crosses a public
//! API boundary resolves to one of these kinds; internal glue code is free to
//! use `anyhow` and convert at the boundary.

use crate::method::MethodStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport collaborator (SecuritySend/SecurityReceive) failed, or
    /// the IF-RECV poll budget was exhausted.
    #[error("device error: {0}")]
    Device(String),

    /// A malformed frame: bad token tag, truncated subpacket, length
    /// mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A decoded Value did not have the shape a caller expected.
    #[error("format error: {0}")]
    Format(String),

    /// A decoded Value had the wrong variant (e.g. integer expected, bytes
    /// found).
    #[error("type error: expected {expected}, found {found}")]
    Type { expected: &'static str, found: &'static str },

    /// The peripheral returned a non-SUCCESS method status.
    #[error("invoking '{method}' failed: {status}")]
    Invocation { method: &'static str, status: MethodStatus },

    /// `Authenticate` returned false for the given credential.
    #[error("invoking '{method}' failed: wrong password")]
    Password { method: &'static str },

    /// API misuse: authenticate without a session, illegal state transition.
    #[error("logic error: {0}")]
    Logic(String),
}

impl Error {
    pub fn device(msg: impl Into<String>) -> Self {
        Error::Device(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// True when the session should be considered unusable and the caller
    /// should call `End()`.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::Device(_)
                | Error::Invocation {
                    status: MethodStatus::SpDisabled
                        | MethodStatus::SpFrozen
                        | MethodStatus::TPerMalfunction,
                    ..
                }
        )
    }
}
