//! # courier-types
//!
//! Wire format types for the Courier federated mail protocol.
//!
//! This crate provides the foundational types shared by every Courier node:
//! - [`Address`], [`PublicKeys`] - Identity references and key material
//! - [`Envelope`] - Outer wire unit, sealed to one or more recipients
//! - [`SignedPayload`], [`Payload`], [`Header`] - The signed inner layer
//! - [`TransferMessage`], [`TransferMessageList`], [`MessageList`],
//!   [`WireError`], [`Mail`] - Typed message bodies
//! - [`Identity`] - A node's private keys (sign, seal, open)
//! - [`CourierError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod envelope;
mod error;
mod identity;
mod messages;
mod payload;
mod seal;

pub use address::{Address, PublicKeys, FINGERPRINT_LEN};
pub use envelope::{Envelope, SealedKey, ENVELOPE_VERSION};
pub use error::CourierError;
pub use identity::{Identity, SECRET_KEY_LEN};
pub use messages::{
    message_type, ErrorCode, Mail, MailComponent, MessageList, TransferMessage,
    TransferMessageList, WireError, WireMessage,
};
pub use payload::{Header, Payload, SignedPayload};
