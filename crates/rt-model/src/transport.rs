use thiserror::Error;

use crate::protocol::OutboundMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound half of the connection to the server.
///
/// Delivery retries are the transport's business. A failed send makes the
/// model go offline; the message is resent on reconnect.
pub trait Transport: Send {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

/// Discards everything. For models that only ever run offline.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _message: OutboundMessage) -> Result<(), TransportError> {
        Err(TransportError::Disconnected)
    }
}
