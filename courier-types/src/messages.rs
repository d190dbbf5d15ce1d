//! Typed message bodies for Courier.
//!
//! These are the bodies carried inside a [`crate::Payload`]. Each one knows
//! its type tag through [`WireMessage::MESSAGE_TYPE`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Address, CourierError};

/// Type tags carried in [`crate::Payload::message_type`].
pub mod message_type {
    /// Request for a single named mail item.
    pub const TRANSFER: &str = "TRA";
    /// Request for all mail newer than a watermark.
    pub const TRANSFER_LIST: &str = "TRL";
    /// Announcement of how many items follow.
    pub const MESSAGE_LIST: &str = "MLI";
    /// Wire-level error.
    pub const ERROR: &str = "ERR";
    /// Mail content.
    pub const MAIL: &str = "MAI";
}

/// A message body with a fixed type tag and MessagePack encoding.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// The type tag this body travels under.
    const MESSAGE_TYPE: &'static str;

    /// Serialize to MessagePack bytes.
    fn to_body(&self) -> Result<Vec<u8>, CourierError> {
        rmp_serde::to_vec(self).map_err(CourierError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    fn from_body(bytes: &[u8]) -> Result<Self, CourierError> {
        rmp_serde::from_slice(bytes).map_err(CourierError::Deserialization)
    }
}

/// Request for a single named mail item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    /// Name of the mail item
    pub name: String,
    /// Author whose mailbox holds the item
    pub author: Address,
    /// Whether the bulk data stream should follow the metadata
    pub data: bool,
}

impl WireMessage for TransferMessage {
    const MESSAGE_TYPE: &'static str = message_type::TRANSFER;
}

/// Request for every item newer than `since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessageList {
    /// Watermark; items at or below it are skipped
    pub since: u64,
    /// Author whose mailbox is listed
    pub author: Address,
}

impl WireMessage for TransferMessageList {
    const MESSAGE_TYPE: &'static str = message_type::TRANSFER_LIST;
}

/// Announces how many mail envelopes follow on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageList {
    /// Number of items that follow
    pub length: u64,
}

impl WireMessage for MessageList {
    const MESSAGE_TYPE: &'static str = message_type::MESSAGE_LIST;
}

/// One typed part of a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailComponent {
    /// Component type (e.g. `subject`, `body`)
    pub kind: String,
    /// Raw component bytes
    pub data: Vec<u8>,
}

/// Mail content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    /// Optional name the server files the mail under
    pub name: Option<String>,
    /// Ordered components
    pub components: Vec<MailComponent>,
}

impl WireMessage for Mail {
    const MESSAGE_TYPE: &'static str = message_type::MAIL;
}

/// Semantic wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Generic failure handling the request
    UnexpectedError = 1,
    /// Payload signature did not verify
    InvalidSignature = 2,
    /// Requested item does not exist
    MessageNotFound = 3,
    /// Server-side failure
    InternalError = 4,
}

impl TryFrom<u32> for ErrorCode {
    type Error = CourierError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorCode::UnexpectedError),
            2 => Ok(ErrorCode::InvalidSignature),
            3 => Ok(ErrorCode::MessageNotFound),
            4 => Ok(ErrorCode::InternalError),
            _ => Err(CourierError::InvalidErrorCode(value)),
        }
    }
}

/// Structured error sent to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Numeric [`ErrorCode`]
    pub code: u32,
    /// Human-readable description
    pub description: String,
}

impl WireError {
    /// Create a wire error.
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code: code as u32,
            description: description.into(),
        }
    }

    /// Get the code as an enum.
    pub fn error_code(&self) -> Result<ErrorCode, CourierError> {
        ErrorCode::try_from(self.code)
    }
}

impl WireMessage for WireError {
    const MESSAGE_TYPE: &'static str = message_type::ERROR;
}
