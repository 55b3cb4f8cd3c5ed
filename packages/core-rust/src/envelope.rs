//! Uniform success/error envelope returned for every dispatched call.

use std::fmt;

/// Error category carried by an `Err` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownOperation,
    InvalidArgument,
    Connection,
    NotFound,
    AlreadyExists,
    Publish,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Tag embedded in the rendered error text.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::UnknownOperation => "UnknownOperationError",
            Self::InvalidArgument => "InvalidArgumentError",
            Self::Connection => "ConnectionError",
            Self::NotFound => "NotFoundError",
            Self::AlreadyExists => "AlreadyExistsError",
            Self::Publish => "PublishError",
            Self::Timeout => "TimeoutError",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of one tool call. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEnvelope {
    Ok {
        payload: String,
        /// Non-fatal remark attached to a success (e.g. topic already existed).
        note: Option<String>,
    },
    Err {
        /// Tool the client asked for, echoed in the rendered text.
        tool: String,
        kind: ErrorKind,
        message: String,
    },
}

impl ResultEnvelope {
    #[must_use]
    pub fn ok(payload: impl Into<String>) -> Self {
        Self::Ok {
            payload: payload.into(),
            note: None,
        }
    }

    #[must_use]
    pub fn ok_with_note(payload: impl Into<String>, note: impl Into<String>) -> Self {
        Self::Ok {
            payload: payload.into(),
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn err(tool: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Err {
            tool: tool.into(),
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err { .. })
    }

    /// Error kind, if this is an `Err` envelope.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { kind, .. } => Some(*kind),
        }
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Ok { note, .. } => note.as_deref(),
            Self::Err { .. } => None,
        }
    }

    /// Renders the envelope as the text payload sent to the client.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Ok {
                payload,
                note: None,
            } => payload.clone(),
            Self::Ok {
                payload,
                note: Some(note),
            } => format!("{payload}\nNote: {note}"),
            Self::Err {
                tool,
                kind,
                message,
            } => format!("Failed to execute tool '{tool}': {kind} - {message}"),
        }
    }
}
