//! HRESULT-shaped error taxonomy.
//!
//! The host expects every failed operation to come back with a 32-bit
//! HRESULT and at least one `ErrorRecord`. [`BridgeError`] is the internal
//! error type: a kind plus the source location it was constructed at, which
//! feeds the record's `FileName`/`Line` fields. [`BridgeError::hresult`] is
//! the total mapping from kinds to codes; anything without a specific code
//! maps to [`Hresult::FAIL`].

use std::io;
use std::panic::Location;

use crate::protocol::{ErrorRecord, MessageResponseBase};

/// A 32-bit HRESULT status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hresult(pub i32);

impl Hresult {
    /// Generic failure (E_FAIL).
    pub const FAIL: Hresult = Hresult(0x8000_4005_u32 as i32);
    /// Operation not implemented (E_NOTIMPL).
    pub const NOT_IMPL: Hresult = Hresult(0x8000_4001_u32 as i32);
    /// Item not found (ERROR_NOT_FOUND as an HRESULT). A host-side code;
    /// the bridge's own mapping never produces it.
    pub const NOT_FOUND: Hresult = Hresult(0x8007_0490_u32 as i32);
    /// An operation exceeded its timeout.
    pub const VMCOMPUTE_TIMEOUT: Hresult = Hresult(0x8007_05B4_u32 as i32);
    /// The host sent a message type this bridge does not handle.
    pub const VMCOMPUTE_UNKNOWN_MESSAGE: Hresult = Hresult(0xC037_010B_u32 as i32);
    /// The host asked for a protocol version outside the supported range.
    pub const VMCOMPUTE_UNSUPPORTED_PROTOCOL_VERSION: Hresult =
        Hresult(0xC037_010C_u32 as i32);
    /// A message payload failed to parse as JSON.
    pub const VMCOMPUTE_INVALID_JSON: Hresult = Hresult(0xC037_010D_u32 as i32);
}

impl std::fmt::Display for Hresult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// What went wrong, without the capture site.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("bridge: failed {context}")]
    Framing {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("bridge: frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("failed to unmarshal JSON in message \"{payload}\"")]
    JsonDecode {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("bridge: failed to marshal JSON for response")]
    JsonEncode {
        #[source]
        source: serde_json::Error,
    },

    #[error("bridge: function not supported, header type: {message_type:#010x}")]
    UnknownMessage { message_type: u32 },

    #[error("bridge: unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("bridge: timed out waiting for process exit")]
    Timeout,

    #[error("{0}")]
    InvalidRequest(String),

    /// Pass-through failure from the container runtime or host state.
    #[error("{0}")]
    Runtime(String),

    #[error("bridge: shutdown requested")]
    Shutdown,
}

/// An error together with the source location it was raised at.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct BridgeError {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl BridgeError {
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    /// Pass-through failure from a collaborator, carrying only a message.
    /// Lookup misses (unknown container or process id) use this too; they
    /// render as the generic failure HRESULT.
    #[track_caller]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime(message.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Total mapping from error kinds to HRESULTs.
    pub fn hresult(&self) -> Hresult {
        match &self.kind {
            ErrorKind::UnknownMessage { .. } => Hresult::VMCOMPUTE_UNKNOWN_MESSAGE,
            ErrorKind::UnsupportedProtocolVersion => {
                Hresult::VMCOMPUTE_UNSUPPORTED_PROTOCOL_VERSION
            }
            ErrorKind::Timeout => Hresult::VMCOMPUTE_TIMEOUT,
            ErrorKind::JsonDecode { .. } => Hresult::VMCOMPUTE_INVALID_JSON,
            _ => Hresult::FAIL,
        }
    }
}

/// Fill `response` with the HRESULT and a single [`ErrorRecord`] describing
/// `err`. The record's stack trace is the rendered cause chain plus the
/// capture site; file and line come from where the error was constructed.
pub fn set_error_for_response_base(response: &mut MessageResponseBase, err: &BridgeError) {
    let hresult = err.hresult();
    let message = err.to_string();

    let mut stack_trace = message.clone();
    let mut source = std::error::Error::source(&err.kind);
    while let Some(cause) = source {
        stack_trace.push_str("\ncaused by: ");
        stack_trace.push_str(&cause.to_string());
        source = cause.source();
    }
    let location = err.location();
    stack_trace.push_str(&format!("\n    at {}:{}", location.file(), location.line()));

    response.result = hresult.0;
    response.error_records.push(ErrorRecord {
        result: hresult.0,
        message,
        stack_trace,
        module_name: "gcs".to_string(),
        file_name: location.file().to_string(),
        line: i32::try_from(location.line()).unwrap_or(-1),
        function_name: String::new(),
    });
}
