//! Change events decoded from the capture envelope.

use std::fmt;

use crate::document::Document;

/// Row-level operation carried by a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `c`: row inserted.
    Create,
    /// `r`: row emitted by the initial snapshot.
    Read,
    /// `u`: row updated.
    Update,
    /// `d`: row removed.
    Delete,
    /// Any other code, kept verbatim for diagnostics.
    Unknown(String),
}

impl Op {
    /// Parse an operation code. Never fails; unrecognised codes become [`Op::Unknown`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" => Self::Create,
            "r" => Self::Read,
            "u" => Self::Update,
            "d" => Self::Delete,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire code for this operation.
    pub fn code(&self) -> &str {
        match self {
            Self::Create => "c",
            Self::Read => "r",
            Self::Update => "u",
            Self::Delete => "d",
            Self::Unknown(code) => code,
        }
    }

    /// Create, snapshot read and update all carry an after-image and are applied alike.
    pub fn is_upsert(&self) -> bool {
        matches!(self, Self::Create | Self::Read | Self::Update)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One decoded row mutation.
///
/// Lives only while a single log record is being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The operation.
    pub op: Op,
    /// Row image before the change (deletes, and updates when configured upstream).
    pub before: Option<Document>,
    /// Row image after the change (creates, reads, updates).
    pub after: Option<Document>,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(op: Op, before: Option<Document>, after: Option<Document>) -> Self {
        Self { op, before, after }
    }
}
