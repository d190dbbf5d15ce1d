//! Built-in transfer requests.
//!
//! These are answered on the requesting connection itself, so the sender's
//! return address is never resolved.

use super::Connection;
use crate::error::{ConnectionError, ConnectionResult};
use courier_types::{
    Envelope, Header, MessageList, TransferMessage, TransferMessageList, WireMessage,
};
use std::sync::atomic::Ordering;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

const ITEM_NOT_FOUND: &str = "That message doesn't exist.";
const LIST_NOT_FOUND: &str = "Couldn't find any messages for that user.";

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Answer a single-item transfer request.
    ///
    /// The item's metadata envelope is sent as stored. When bulk data was
    /// asked for, the raw stream follows it with no framing.
    pub(super) async fn send_item(&mut self, body: &[u8], header: &Header) -> ConnectionResult<()> {
        let request =
            TransferMessage::from_body(body).map_err(|source| ConnectionError::MalformedRequest {
                request: "transfer message",
                source,
            })?;
        let delegate = self.server.delegate().clone();

        let (message, data) = if request.data {
            let mail = delegate
                .retrieve_data_for_user(&request.name, &request.author, &header.from)
                .await
                .map_err(|source| ConnectionError::Delegate {
                    operation: "Retrieve Data For User",
                    source,
                })?
                .ok_or(ConnectionError::NotFound(ITEM_NOT_FOUND))?;
            (mail.message, mail.data)
        } else {
            let message = delegate
                .retrieve_message_for_user(&request.name, &request.author, &header.from)
                .await
                .map_err(|source| ConnectionError::Delegate {
                    operation: "Retrieve Message For User",
                    source,
                })?
                .ok_or(ConnectionError::NotFound(ITEM_NOT_FOUND))?;
            (message, None)
        };

        self.write_envelope(&message)
            .await
            .map_err(ConnectionError::Respond)?;
        self.server
            .metrics()
            .transfers_served
            .fetch_add(1, Ordering::Relaxed);

        if let Some(mut data) = data {
            // TODO: bound the bulk copy with an idle deadline; today a stalled
            // reader holds the connection until the peer goes away.
            match tokio::io::copy(&mut data, &mut self.stream).await {
                Ok(copied) => {
                    self.server
                        .metrics()
                        .bytes_streamed
                        .fetch_add(copied, Ordering::Relaxed);
                    if let Err(e) = self.stream.flush().await {
                        self.server.report("Streaming Mail Data", e);
                    }
                }
                Err(e) => self.server.report("Streaming Mail Data", e),
            }
        }
        Ok(())
    }

    /// Answer a list request: a sealed count, then every item verbatim.
    pub(super) async fn send_list(&mut self, body: &[u8], header: &Header) -> ConnectionResult<()> {
        let request = TransferMessageList::from_body(body).map_err(|source| {
            ConnectionError::MalformedRequest {
                request: "transfer message list",
                source,
            }
        })?;
        let delegate = self.server.delegate().clone();

        let items: Vec<Envelope> = delegate
            .retrieve_message_list_for_user(request.since, &request.author, &header.from)
            .await
            .map_err(|source| ConnectionError::Delegate {
                operation: "Retrieve Message List For User",
                source,
            })?
            .filter(|items| !items.is_empty())
            .ok_or(ConnectionError::NotFound(LIST_NOT_FOUND))?;

        let announcement = MessageList {
            length: items.len() as u64,
        };
        self.send_message(&header.from, &announcement).await?;

        for item in &items {
            if let Err(e) = self.write_envelope(item).await {
                self.server.report("Sending Listed Message", e);
            }
        }
        self.server
            .metrics()
            .lists_served
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
