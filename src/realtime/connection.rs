use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Client-to-server event name carrying `{token}`
pub const AUTHENTICATE: &str = "authenticate";
pub const NEED_AUTHENTICATION: &str = "needAuthentication";
pub const SUCCEED: &str = "succeed";
pub const UNAUTHORIZED: &str = "unauthorized";
pub const UPDATE: &str = "update";

pub const NOT_AVAILABLE: &str = "not available";
pub const FAILED_TO_AUTHENTICATE: &str = "failed to authenticate";

/// Application-level frame received from a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn authenticate(token: impl Into<String>) -> Self {
        Self::new(AUTHENTICATE, json!({ "token": token.into() }))
    }
}

/// Application-level frame sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(UNAUTHORIZED, Some(json!({ "message": message })))
    }
}

/// What the transport writer receives
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(OutboundEvent),
    Close,
}

/// Cheap, cloneable handle used by handlers and observers to talk to one
/// connection. The transport owns the receiving end.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id: Uuid::new_v4(), tx }
    }

    /// Handle plus the receiver a transport (or a test) drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event. Returns false once the connection is gone.
    pub fn emit(&self, event: impl Into<String>, data: Option<Value>) -> bool {
        self.send(OutboundEvent::new(event, data))
    }

    pub fn send(&self, event: OutboundEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    /// Ask the transport to close the connection
    pub fn disconnect(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the transport has dropped its receiver
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_without_empty_data() {
        let text = serde_json::to_string(&OutboundEvent::new(SUCCEED, None)).unwrap();
        assert_eq!(text, r#"{"event":"succeed"}"#);
    }

    #[test]
    fn inbound_data_defaults_to_null() {
        let event: InboundEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(event.data, Value::Null);
    }

    #[tokio::test]
    async fn emit_fails_after_receiver_drops() {
        let (handle, rx) = ConnectionHandle::channel();
        assert!(handle.emit("hello", None));
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.emit("hello", None));
    }
}
