//! Storage seam between the protocol engine and the mail store.
//!
//! The server never interprets stored mail. It asks the delegate for opaque
//! envelopes (and optionally a bulk data stream) and forwards them verbatim.

mod memory;

pub use memory::MemoryDelegate;

use crate::error::{DelegateError, ServerError};
use async_trait::async_trait;
use courier_types::{Address, Envelope};
use tokio::io::AsyncRead;

/// Bulk data that follows a mail's metadata on the wire.
pub type DataStream = Box<dyn AsyncRead + Send + Unpin>;

/// A mail item plus the bulk data stream attached to it.
pub struct MailData {
    /// Metadata envelope, sent first.
    pub message: Envelope,
    /// Bulk data, copied raw after the envelope and dropped once drained.
    pub data: Option<DataStream>,
}

impl std::fmt::Debug for MailData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailData")
            .field("message", &self.message)
            .field("data", &self.data.as_ref().map(|_| "DataStream"))
            .finish()
    }
}

/// Trait implemented by the embedding application.
///
/// Retrieval methods return `Ok(None)` when the item does not exist or is not
/// visible to `for_addr`; the server answers that with a not-found error.
/// Implementations must be safe to call from many connections at once.
#[async_trait]
pub trait ServerDelegate: Send + Sync {
    /// Receive a server-side failure.
    fn handle_error(&self, err: &ServerError) {
        tracing::error!(location = err.location, "{}", err.cause);
    }

    /// Receive an informational message.
    fn log_message(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    /// Accept an envelope that was not addressed to this node.
    async fn save_message_description(&self, envelope: Envelope) -> Result<(), DelegateError>;

    /// Fetch a mail item together with its bulk data.
    async fn retrieve_data_for_user(
        &self,
        name: &str,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<MailData>, DelegateError>;

    /// Fetch a mail item's metadata envelope.
    async fn retrieve_message_for_user(
        &self,
        name: &str,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<Envelope>, DelegateError>;

    /// Fetch every item from `author` newer than `since`.
    async fn retrieve_message_list_for_user(
        &self,
        since: u64,
        author: &Address,
        for_addr: &Address,
    ) -> Result<Option<Vec<Envelope>>, DelegateError>;
}
