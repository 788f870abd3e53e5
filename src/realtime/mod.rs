// Real-time path: routing table, per-connection handshake and dispatch

pub mod authenticator;
pub mod connection;
pub mod handler;
pub mod router;

pub use authenticator::{sanitize_query, RealtimeAuthenticator, SessionEnd, DEFAULT_AUTH_TIMEOUT};
pub use connection::{ConnectionHandle, InboundEvent, Outbound, OutboundEvent};
pub use handler::{realtime_fn, RealtimeContext, RealtimeHandler, RealtimeHandlerRef};
pub use router::{RealtimeRoute, RoutingTable};
