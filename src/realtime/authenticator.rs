use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use super::connection::{
    ConnectionHandle, InboundEvent, OutboundEvent, AUTHENTICATE, FAILED_TO_AUTHENTICATE, NEED_AUTHENTICATION,
    NOT_AVAILABLE, SUCCEED,
};
use super::handler::{run_fold, RealtimeContext};
use super::router::RoutingTable;
use crate::auth::{satisfies, AuthContext, TokenVerifier};
use crate::compiler::{AuthEntry, Requirement};
use crate::storage::Storage;

pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_millis(5000);

/// Query keys added by the transport, never seen by handlers
const TRANSPORT_QUERY_KEYS: [&str; 4] = ["EIO", "transport", "t", "token"];

/// How a connection's session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// No route, or the route's real-time entry is `false`
    NotAvailable,
    /// No valid credential before the deadline
    TimedOut,
    /// Client went away during the handshake; nothing was dispatched
    Abandoned,
    /// Normal end of a dispatched session, after disconnect handlers ran
    Disconnected,
}

enum Handshake {
    Authenticated(AuthContext),
    TimedOut,
    Closed,
}

/// Runs the per-connection handshake and dispatches connect, message
/// and disconnect handlers. Knows nothing about the wire format.
pub struct RealtimeAuthenticator {
    table: RoutingTable,
    verifier: Arc<dyn TokenVerifier>,
    storage: Arc<dyn Storage>,
    auth_timeout: Duration,
}

impl RealtimeAuthenticator {
    pub fn new(table: RoutingTable, verifier: Arc<dyn TokenVerifier>, storage: Arc<dyn Storage>) -> Self {
        Self {
            table,
            verifier,
            storage,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    /// Drive one connection to completion. `inbound` closing means the
    /// client disconnected.
    pub async fn serve(
        &self,
        namespace: &str,
        query: HashMap<String, String>,
        connection: ConnectionHandle,
        mut inbound: UnboundedReceiver<InboundEvent>,
    ) -> SessionEnd {
        let Some((route, params)) = self.table.match_path(namespace) else {
            tracing::warn!("No real-time route for namespace '{}'", namespace);
            return refuse(&connection);
        };

        let requirement = match &route.auth {
            AuthEntry::Forbidden => {
                tracing::debug!("Real-time disabled on {}", route.path);
                return refuse(&connection);
            }
            AuthEntry::Required(requirement) => requirement,
        };

        let auth = if requirement.requires_auth {
            connection.emit(NEED_AUTHENTICATION, None);

            match self.handshake(requirement, &mut inbound).await {
                Handshake::Authenticated(auth) => {
                    connection.emit(SUCCEED, None);
                    auth
                }
                Handshake::TimedOut => {
                    tracing::warn!(
                        "Real-time handshake on {} timed out after {:?} ({})",
                        route.path, self.auth_timeout, connection.id()
                    );
                    connection.send(OutboundEvent::unauthorized(FAILED_TO_AUTHENTICATE));
                    connection.disconnect();
                    return SessionEnd::TimedOut;
                }
                Handshake::Closed => {
                    tracing::debug!("Client left {} before authenticating ({})", route.path, connection.id());
                    return SessionEnd::Abandoned;
                }
            }
        } else {
            AuthContext::anonymous()
        };

        let query = sanitize_query(query);
        let mut ctx = RealtimeContext {
            connection,
            path: route.path.clone(),
            params,
            query: query.clone(),
            auth,
            collection: route.collection.clone(),
            storage: self.storage.clone(),
            event: None,
        };

        tracing::debug!("Real-time connection {} dispatched to {}", ctx.connection.id(), ctx.path);
        let query_value = Value::Object(query.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
        run_fold("connect", &route.handlers.connect, query_value, &ctx).await;

        while let Some(event) = inbound.recv().await {
            if event.event == AUTHENTICATE {
                continue;
            }
            ctx.event = Some(event.event);
            run_fold("message", &route.handlers.message, event.data, &ctx).await;
        }

        ctx.event = None;
        run_fold("disconnect", &route.handlers.disconnect, Value::Null, &ctx).await;
        tracing::debug!("Real-time connection {} on {} closed", ctx.connection.id(), ctx.path);
        SessionEnd::Disconnected
    }

    /// Wait for a valid credential. The deadline is polled first, so a
    /// credential racing the timer never wins once it has fired.
    async fn handshake(&self, requirement: &Requirement, inbound: &mut UnboundedReceiver<InboundEvent>) -> Handshake {
        let deadline = tokio::time::sleep(self.auth_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => return Handshake::TimedOut,
                event = inbound.recv() => match event {
                    None => return Handshake::Closed,
                    Some(event) if event.event == AUTHENTICATE => {
                        if let Some(auth) = self.verify(requirement, &event.data) {
                            return Handshake::Authenticated(auth);
                        }
                    }
                    Some(event) => {
                        tracing::debug!("Ignoring '{}' before authentication", event.event);
                    }
                },
            }
        }
    }

    /// Failure here is not terminal; the client may retry until the deadline
    fn verify(&self, requirement: &Requirement, data: &Value) -> Option<AuthContext> {
        let Some(token) = data.get("token").and_then(Value::as_str) else {
            tracing::warn!("Real-time authenticate event without a token");
            return None;
        };

        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(error) => {
                tracing::warn!("Real-time token rejected: {}", error);
                return None;
            }
        };

        // A non-empty role list with a roleless token is a reject
        if !satisfies(requirement.requires_roles.as_deref(), &claims.roles) {
            tracing::warn!("Real-time token lacks required roles {:?}", requirement.requires_roles);
            return None;
        }

        Some(AuthContext::authenticated(token.to_string(), claims))
    }
}

fn refuse(connection: &ConnectionHandle) -> SessionEnd {
    connection.send(OutboundEvent::unauthorized(NOT_AVAILABLE));
    connection.disconnect();
    SessionEnd::NotAvailable
}

pub fn sanitize_query(mut query: HashMap<String, String>) -> HashMap<String, String> {
    for key in TRANSPORT_QUERY_KEYS {
        query.remove(key);
    }
    query
}
