//! Per-connection state machine.
//!
//! One connection carries exactly one request envelope:
//!
//! ```text
//! read ─► addressed to us? ─no──► save as description
//!              │yes
//!              ▼
//!         decrypt ─► verify ─► unpack ─► built-in transfer? ─yes─► answer
//!                                              │no
//!                                              ▼
//!                                   resolve return address ─► handler
//! ```
//!
//! Any failure ends the connection with a signed plaintext [`WireError`]
//! and, unless it is an expected outcome, a report to the error sink.

mod transfer;

use crate::dispatch::Outgoing;
use crate::error::{ConnectionError, ConnectionResult, FrameResult};
use crate::frame;
use crate::resolver;
use crate::server::MailServer;
use courier_types::{
    message_type, Address, Envelope, Header, Payload, WireError, WireMessage,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// A single accepted connection.
pub struct Connection<S> {
    server: Arc<MailServer>,
    stream: S,
    peer: String,
    /// Verified sender of the request, once known.
    requester: Option<Address>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an accepted stream.
    pub fn new(server: Arc<MailServer>, stream: S, peer: impl Into<String>) -> Self {
        Self {
            server,
            stream,
            peer: peer.into(),
            requester: None,
        }
    }

    /// Turn the peer away with `error` without reading its request.
    pub async fn refuse(mut self, error: WireError) {
        self.deliver_error(&error).await;
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!("Shutdown of {} failed: {}", self.peer, e);
        }
    }

    /// Serve the connection to completion and close it.
    pub async fn run(mut self) {
        let started = Instant::now();
        let delegate = self.server.delegate().clone();
        delegate.log_message(&format!("Serving {}", self.peer));

        if let Err(err) = self.process().await {
            self.fail(err).await;
        }

        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!("Shutdown of {} failed: {}", self.peer, e);
        }
        delegate.log_message(&format!(
            "Finished with {} in {:?}",
            self.peer,
            started.elapsed()
        ));
    }

    async fn process(&mut self) -> ConnectionResult<()> {
        let limits = &self.server.config().limits;
        let envelope = frame::read_envelope(
            &mut self.stream,
            limits.max_envelope_size,
            limits.read_timeout(),
        )
        .await
        .map_err(ConnectionError::Decode)?;
        self.server
            .metrics()
            .envelopes_received
            .fetch_add(1, Ordering::Relaxed);

        let identity = self.server.identity().clone();
        if !envelope.is_addressed_to(identity.address().fingerprint()) {
            self.save_description(envelope).await;
            return Ok(());
        }

        let signed = identity
            .decrypt(&envelope)
            .map_err(ConnectionError::Decrypt)?;
        if !signed.verify() {
            return Err(ConnectionError::Signature);
        }
        let Payload {
            message_type,
            header,
            body,
        } = signed.unpack().map_err(ConnectionError::MalformedPayload)?;
        self.requester = Some(header.from.clone());
        tracing::debug!(
            "{} from {} via {}",
            message_type,
            header.from,
            self.peer
        );

        match message_type.as_str() {
            message_type::TRANSFER => return self.send_item(&body, &header).await,
            message_type::TRANSFER_LIST => return self.send_list(&body, &header).await,
            _ => {}
        }

        let return_address = resolver::resolve(self.server.router(), &header).await?;
        self.dispatch(&message_type, &body, &header, &return_address)
            .await
    }

    async fn save_description(&mut self, envelope: Envelope) {
        let delegate = self.server.delegate().clone();
        match delegate.save_message_description(envelope).await {
            Ok(()) => {
                self.server
                    .metrics()
                    .descriptions_saved
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.server.report("Save Message Description", e),
        }
    }

    async fn dispatch(
        &mut self,
        message_type: &str,
        body: &[u8],
        header: &Header,
        return_address: &Address,
    ) -> ConnectionResult<()> {
        let handler = self
            .server
            .handlers()
            .find(message_type)
            .ok_or_else(|| ConnectionError::UnhandledType(message_type.to_string()))?;
        self.server
            .metrics()
            .handler_dispatches
            .fetch_add(1, Ordering::Relaxed);

        let output = handler.handle_message(message_type, body, header).await;
        if let Some(err) = output.error {
            self.server.report("Sub-handler", err);
        }
        if output.responses.is_empty() {
            return Err(ConnectionError::NoHandlerResponse(message_type.to_string()));
        }

        for response in &output.responses {
            if let Err(e) = self.send_response(return_address, response).await {
                self.server.report(e.location(), e);
            }
        }
        Ok(())
    }

    /// Report a terminal failure and tell the peer.
    async fn fail(&mut self, err: ConnectionError) {
        let wire = err.wire_error();
        if err.is_fault() {
            let location = err.location();
            self.server.report(location, err);
        } else {
            tracing::debug!("{} for {}", err, self.peer);
        }

        self.deliver_error(&wire).await;
    }

    async fn deliver_error(&mut self, wire: &WireError) {
        match self.send_error(wire).await {
            Ok(()) => {
                self.server
                    .metrics()
                    .wire_errors_sent
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::debug!("Could not deliver error to {}: {}", self.peer, e),
        }
    }

    /// Send a signed plaintext error.
    ///
    /// Errors can happen before the sender is known, so they are not sealed.
    async fn send_error(&mut self, error: &WireError) -> ConnectionResult<()> {
        let identity = self.server.identity().clone();
        let to = self
            .requester
            .clone()
            .unwrap_or_else(|| identity.address().clone());
        let signed = identity
            .sign_message(&to, error)
            .map_err(ConnectionError::Pack)?;
        let envelope = Envelope::plain(&signed).map_err(ConnectionError::Pack)?;
        self.write_envelope(&envelope)
            .await
            .map_err(ConnectionError::Respond)
    }

    /// Sign a typed message and seal it to `to`.
    async fn send_message<M: WireMessage>(&mut self, to: &Address, message: &M) -> ConnectionResult<()> {
        let header = Header::new(self.server.identity().address().clone(), to.clone());
        let payload = Payload::from_message(header, message).map_err(ConnectionError::Pack)?;
        self.send_sealed(to, &payload).await
    }

    async fn send_response(&mut self, to: &Address, response: &Outgoing) -> ConnectionResult<()> {
        let header = Header::new(self.server.identity().address().clone(), to.clone());
        let payload = Payload::new(response.message_type.clone(), header, response.body.clone());
        self.send_sealed(to, &payload).await
    }

    async fn send_sealed(&mut self, to: &Address, payload: &Payload) -> ConnectionResult<()> {
        let identity = self.server.identity().clone();
        let signed = identity.sign(payload).map_err(ConnectionError::Pack)?;
        let envelope =
            Envelope::seal(&signed, std::slice::from_ref(to)).map_err(ConnectionError::Pack)?;
        self.write_envelope(&envelope)
            .await
            .map_err(ConnectionError::Respond)
    }

    async fn write_envelope(&mut self, envelope: &Envelope) -> FrameResult<()> {
        let deadline = self.server.config().limits.write_timeout();
        frame::write_envelope(&mut self.stream, envelope, deadline).await
    }
}
