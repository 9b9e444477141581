//! Shared error taxonomy.
//!
//! Every decoder has its own status enum with stable negative integer codes;
//! `ErrorKind` groups those statuses into the four classes an embedder acts
//! on.

use serde::Serialize;

/// Class of a decoder status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Not enough input yet; append bytes and call again
    Recoverable,
    /// The message violates its wire format
    Malformed,
    /// A fixed capacity was exceeded
    ResourceLimit,
    /// The bytes belong to some other protocol
    DomainMismatch,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Recoverable => "recoverable",
            ErrorKind::Malformed => "malformed",
            ErrorKind::ResourceLimit => "resource_limit",
            ErrorKind::DomainMismatch => "domain_mismatch",
        }
    }
}

/// Common surface of every decoder status enum
pub trait ParseError: std::error::Error + Copy {
    /// Stable integer status code (always negative; success is 0)
    fn code(&self) -> i32;

    fn kind(&self) -> ErrorKind;

    /// Only `Truncated` may be retried
    fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::Recoverable
    }
}

/// Success status code shared by every decoder
pub const OK: i32 = 0;

/// Status code for a decoder result: `OK` or the error's code
pub fn status_code<T, E: ParseError>(result: &Result<T, E>) -> i32 {
    match result {
        Ok(_) => OK,
        Err(e) => e.code(),
    }
}
