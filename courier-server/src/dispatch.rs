//! Pluggable handlers for application message types.
//!
//! Built-in transfer requests are answered by the connection itself; every
//! other type tag is routed to the first registered [`Handler`] that claims it.

use crate::error::HandlerError;
use async_trait::async_trait;
use courier_types::{CourierError, Header, WireMessage};
use std::sync::Arc;

/// One response a handler wants sent back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Type tag of the response
    pub message_type: String,
    /// Encoded body
    pub body: Vec<u8>,
}

impl Outgoing {
    /// Create a response from an encoded body.
    pub fn new(message_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_type: message_type.into(),
            body,
        }
    }

    /// Create a response by encoding a typed message.
    pub fn from_message<M: WireMessage>(message: &M) -> Result<Self, CourierError> {
        Ok(Self::new(M::MESSAGE_TYPE, message.to_body()?))
    }
}

/// What a handler produced.
///
/// Responses and an error may both be present; the responses are still sent
/// and the error goes to the delegate's error sink.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    /// Responses to seal and send, in order
    pub responses: Vec<Outgoing>,
    /// Failure to report
    pub error: Option<HandlerError>,
}

impl HandlerOutput {
    /// Output consisting only of responses.
    pub fn respond(responses: Vec<Outgoing>) -> Self {
        Self {
            responses,
            error: None,
        }
    }

    /// Output consisting only of an error.
    pub fn failed(error: HandlerError) -> Self {
        Self {
            responses: Vec::new(),
            error: Some(error),
        }
    }
}

impl From<Result<Vec<Outgoing>, HandlerError>> for HandlerOutput {
    fn from(result: Result<Vec<Outgoing>, HandlerError>) -> Self {
        match result {
            Ok(responses) => Self::respond(responses),
            Err(error) => Self::failed(error),
        }
    }
}

/// Handler for application-defined message types.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Whether this handler claims `message_type`.
    fn handles_type(&self, message_type: &str) -> bool;

    /// Handle a verified request.
    ///
    /// `header.from` is the authenticated sender.
    async fn handle_message(&self, message_type: &str, body: &[u8], header: &Header)
        -> HandlerOutput;
}

/// Ordered handler list. The first handler claiming a tag wins.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Find the handler for `message_type`.
    pub fn find(&self, message_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .iter()
            .find(|h| h.handles_type(message_type))
            .cloned()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::{Address, MessageList};

    struct Tagged(&'static str, u64);

    #[async_trait]
    impl Handler for Tagged {
        fn handles_type(&self, message_type: &str) -> bool {
            message_type == self.0
        }

        async fn handle_message(&self, _: &str, _: &[u8], _: &Header) -> HandlerOutput {
            HandlerOutput::respond(vec![
                Outgoing::from_message(&MessageList { length: self.1 }).unwrap()
            ])
        }
    }

    fn header() -> Header {
        Header::new(Address::from_fingerprint("a"), Address::from_fingerprint("b"))
    }

    #[tokio::test]
    async fn first_claiming_handler_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Tagged("ABC", 1)));
        registry.register(Arc::new(Tagged("ABC", 2)));
        registry.register(Arc::new(Tagged("XYZ", 3)));

        let output = registry
            .find("ABC")
            .unwrap()
            .handle_message("ABC", &[], &header())
            .await;
        let list = MessageList::from_body(&output.responses[0].body).unwrap();
        assert_eq!(list.length, 1);
    }

    #[test]
    fn unclaimed_type_finds_nothing() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Tagged("ABC", 1)));
        assert!(registry.find("NOP").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn output_from_result() {
        let ok: HandlerOutput = Ok(vec![Outgoing::new("ABC", vec![1])]).into();
        assert_eq!(ok.responses.len(), 1);
        assert!(ok.error.is_none());

        let err: HandlerOutput = Err(HandlerError::Failed("boom".into())).into();
        assert!(err.responses.is_empty());
        assert!(err.error.is_some());
    }
}
