//! Error types returned by [`RouterClient`](crate::RouterClient).
//!
//! Signal field parse failures are deliberately absent: malformed sub-fields
//! default to zero instead of failing the call.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`RouterClient`](crate::RouterClient) methods.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid constructor arguments (empty URL/username/password, bad URL).
    #[error("{0}")]
    Config(String),

    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with something we cannot use: malformed XML,
    /// missing verification token, unexpected status.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The device returned an `<error>` document.
    #[error("Device error {code}{}", describe_suffix(.code, .message))]
    Device { code: i64, message: String },

    /// One of the login handshake steps failed.
    #[error("Login failed during {step}: {source}")]
    Auth {
        step: HandshakeStep,
        #[source]
        source: Box<Error>,
    },

    /// A device operation was attempted before a successful login.
    #[error("Not logged in, call login() first")]
    NotLoggedIn,
}

impl Error {
    /// Returns `true` for protocol errors, including those raised inside the
    /// login handshake.
    pub fn is_protocol(&self) -> bool {
        match self {
            Error::Protocol(_) => true,
            Error::Auth { source, .. } => source.is_protocol(),
            _ => false,
        }
    }

    /// Returns `true` if the device reported an `<error>` document.
    pub fn is_device(&self) -> bool {
        match self {
            Error::Device { .. } => true,
            Error::Auth { source, .. } => source.is_device(),
            _ => false,
        }
    }

    /// The device error code, if any.
    pub fn device_code(&self) -> Option<i64> {
        match self {
            Error::Device { code, .. } => Some(*code),
            Error::Auth { source, .. } => source.device_code(),
            _ => None,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}

/// The login step an [`Error::Auth`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    InitSession,
    FetchToken,
    ChallengeLogin,
    AuthenticationLogin,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStep::InitSession => "init session",
            HandshakeStep::FetchToken => "fetch token",
            HandshakeStep::ChallengeLogin => "challenge login",
            HandshakeStep::AuthenticationLogin => "authentication login",
        };
        f.write_str(name)
    }
}

/// Human-readable meaning of well-known firmware error codes.
pub fn describe_code(code: i64) -> Option<&'static str> {
    Some(match code {
        100002 => "not supported by this firmware",
        100003 => "no rights (not logged in?)",
        100004 => "system busy",
        100005 => "format error",
        108001 => "wrong username",
        108002 => "wrong password",
        108003 => "user already logged in",
        108006 => "wrong username or password",
        108007 => "too many login attempts",
        125001 => "wrong verification token",
        125002 => "invalid session or verification token",
        125003 => "session timed out",
        _ => return None,
    })
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn describe_suffix(code: &i64, message: &str) -> String {
    match (describe_code(*code), message.is_empty()) {
        (Some(desc), true) => format!(" ({desc})"),
        (Some(desc), false) => format!(" ({desc}): {message}"),
        (None, true) => String::new(),
        (None, false) => format!(": {message}"),
    }
}
