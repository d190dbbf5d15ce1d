//! Error types for courier-server.

use courier_types::{CourierError, ErrorCode, WireError};

/// Top-level error for node startup and lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The listening socket could not be acquired.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address we tried to bind.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Node identity could not be loaded or created.
    #[error("identity error: {0}")]
    Identity(#[from] CourierError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure surfaced to the operator-facing error sink.
///
/// Distinct from the [`WireError`] sent to the remote peer: this carries the
/// full cause and is never put on the wire.
#[derive(Debug, thiserror::Error)]
#[error("{location}: {cause}")]
pub struct ServerError {
    /// Where in the server the failure happened.
    pub location: &'static str,
    /// Underlying cause.
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ServerError {
    /// Create a server error for `location`.
    pub fn new(
        location: &'static str,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            location,
            cause: cause.into(),
        }
    }
}

/// Framing errors while reading or writing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Stream I/O failed.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared frame length exceeds the configured maximum.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    TooLarge {
        /// Declared size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Frame contents could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CourierError),

    /// Peer did not complete the operation within the deadline.
    #[error("timed out after {secs}s")]
    Timeout {
        /// Deadline in seconds.
        secs: u64,
    },
}

/// Routing directory failures.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The directory has no record for the key.
    #[error("no route for {0}")]
    NotFound(String),

    /// The directory could not be reached.
    #[error("routing directory unavailable: {0}")]
    Unavailable(String),
}

/// Return-address resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Sender is unreachable and no router is configured.
    #[error("no router configured to resolve an unreachable sender")]
    NoRouter,

    /// Directory lookup failed.
    #[error("return address lookup failed: {0}")]
    Lookup(#[from] RoutingError),

    /// Directory answered with an address for a different identity.
    #[error("directory returned {returned} for sender {sender}")]
    Mismatch {
        /// Fingerprint of the signed sender.
        sender: String,
        /// Fingerprint the directory returned.
        returned: String,
    },

    /// Directory answer carries no network location.
    #[error("directory has no location for {0}")]
    Unreachable(String),
}

/// Delegate (storage) failures.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    /// Backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors a pluggable handler may return alongside its responses.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Body did not decode.
    #[error("invalid message body: {0}")]
    InvalidBody(#[from] CourierError),

    /// Handler-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Terminal failures of one connection.
///
/// Each variant knows where it happened (for the error sink) and what the
/// peer is told (for the wire).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Envelope could not be read off the stream.
    #[error("failed to read envelope: {0}")]
    Decode(#[source] FrameError),

    /// Directed envelope did not open with our key.
    #[error("failed to decrypt envelope: {0}")]
    Decrypt(#[source] CourierError),

    /// Payload signature did not verify.
    #[error("unable to verify signature on message")]
    Signature,

    /// Verified payload did not reconstruct into (body, type, header).
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] CourierError),

    /// Built-in request body did not decode.
    #[error("malformed {request}: {source}")]
    MalformedRequest {
        /// Which built-in request failed.
        request: &'static str,
        /// Decode failure.
        source: CourierError,
    },

    /// The requested item or list does not exist.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Return address could not be resolved.
    #[error(transparent)]
    ReturnAddress(#[from] ResolveError),

    /// Delegate call failed.
    #[error("{operation} failed: {source}")]
    Delegate {
        /// Delegate operation name.
        operation: &'static str,
        /// Delegate failure.
        source: DelegateError,
    },

    /// Response could not be signed or sealed.
    #[error("failed to pack response: {0}")]
    Pack(#[source] CourierError),

    /// Response could not be written.
    #[error("failed to send response: {0}")]
    Respond(#[source] FrameError),

    /// No registered handler claims the type tag.
    #[error("no handler for message type {0:?}")]
    UnhandledType(String),

    /// The claiming handler produced no responses.
    #[error("handler for {0:?} produced no response")]
    NoHandlerResponse(String),
}

impl ConnectionError {
    /// Error-sink location tag.
    pub fn location(&self) -> &'static str {
        match self {
            Self::Decode(_) => "Read Message From Connection",
            Self::Decrypt(_) => "Decrypt Message",
            Self::Signature => "Verify Signature",
            Self::MalformedPayload(_) => "Verifying Message Structure",
            Self::MalformedRequest { .. } => "Unpacking Transfer Request",
            Self::NotFound(_) => "Loading message from Server",
            Self::ReturnAddress(_) => "Looking up Return Address",
            Self::Delegate { operation, .. } => operation,
            Self::Pack(_) | Self::Respond(_) => "Sign and Send Response",
            Self::UnhandledType(_) => "Dispatch Message",
            Self::NoHandlerResponse(_) => "Sub-handler",
        }
    }

    /// Whether this failure is a server-side fault worth reporting.
    ///
    /// Missing items are an expected outcome and only logged.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    /// The error the peer is told about.
    pub fn wire_error(&self) -> WireError {
        match self {
            Self::Decode(_) => {
                WireError::new(ErrorCode::UnexpectedError, "Unable to read message properly.")
            }
            Self::Decrypt(_) => WireError::new(ErrorCode::UnexpectedError, "Unable to decrypt message."),
            Self::Signature => {
                WireError::new(ErrorCode::InvalidSignature, "Message contains invalid signature.")
            }
            Self::MalformedPayload(_) => {
                WireError::new(ErrorCode::UnexpectedError, "Unable to unpack message.")
            }
            Self::MalformedRequest { request, .. } => {
                WireError::new(ErrorCode::UnexpectedError, format!("Unable to unpack {request}."))
            }
            Self::NotFound(description) => WireError::new(ErrorCode::MessageNotFound, *description),
            Self::ReturnAddress(ResolveError::NoRouter) => WireError::new(
                ErrorCode::UnexpectedError,
                "No router to lookup your address. Must provide return information.",
            ),
            Self::ReturnAddress(_) => {
                WireError::new(ErrorCode::UnexpectedError, "Cannot lookup return address.")
            }
            Self::Delegate { .. } => {
                WireError::new(ErrorCode::InternalError, "Unable to retrieve message.")
            }
            Self::Pack(_) | Self::Respond(_) => {
                WireError::new(ErrorCode::InternalError, "Unable to pack return message.")
            }
            Self::UnhandledType(_) => {
                WireError::new(ErrorCode::UnexpectedError, "Unable to handle message type.")
            }
            Self::NoHandlerResponse(_) => {
                WireError::new(ErrorCode::UnexpectedError, "No response from handler.")
            }
        }
    }
}

/// Result type alias for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Result type alias for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Result type alias for framing operations.
pub type FrameResult<T> = std::result::Result<T, FrameError>;
