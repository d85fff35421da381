//! # Studio Realtime Client
//!
//! A resilient real-time connection client for the Studio dashboard: one
//! logical WebSocket connection, multiplexed to many independent in-process
//! subscribers.
//!
//! ## What it does
//!
//! - Connection lifecycle with exponential-backoff reconnection and a
//!   connection-epoch guard against stale timers
//! - Heartbeat pings plus an inactivity watchdog that catches zombie
//!   sockets the transport never reports as closed
//! - Bounded outbound queueing with in-order replay after reconnect — no
//!   silently dropped sends while the network flaps
//! - Typed publish/subscribe dispatch keyed by message type and by
//!   correlation id (task, project, content), decoupled from connection
//!   state
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use studio_realtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RealtimeError> {
//!     let tokens = Arc::new(StaticTokenProvider::new("session-token"));
//!     let client = RealtimeClient::with_websocket_transport(
//!         RealtimeConfig::default(),
//!         tokens,
//!     );
//!
//!     // Subscriptions work before the connection opens
//!     let _status = client.subscribe_status(Arc::new(|status| {
//!         println!("connection: {:?}", status);
//!     }));
//!
//!     client.connect().await?;
//!
//!     // Facades translate domain verbs into generic send/subscribe calls
//!     let projects = ProjectCollaboration::new(&client);
//!     let _sub = projects.join("project-1", Arc::new(|event| {
//!         println!("project event: {:?}", event);
//!     }));
//!
//!     Ok(())
//! }
//! ```

// ============================================================================
// MODULES
// ============================================================================

/// Credential collaborator contract and a static implementation.
pub mod auth;

/// Pure exponential backoff policy.
pub mod backoff;

/// The connection client: lifecycle state machine, timers, queue replay.
pub mod client;

/// Client configuration.
pub mod config;

/// Event dispatch registry: type, scoped, wildcard and status handlers.
pub mod dispatch;

/// Error types.
pub mod error;

/// Scoped facades for project collaboration and generation tasks.
pub mod facade;

/// Wire message types: outbound envelope and the inbound event union.
pub mod message;

/// Endpoint constants and URL construction.
pub mod network;

/// Bounded outbound message queue.
pub mod queue;

/// Transport seam and the tokio-tungstenite implementation.
pub mod transport;

// ============================================================================
// PRELUDE
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use studio_realtime::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{StaticTokenProvider, TokenProvider};
    pub use crate::backoff::BackoffPolicy;
    pub use crate::client::{ConnectionState, ConnectionStatus, RealtimeClient};
    pub use crate::config::RealtimeConfig;
    pub use crate::dispatch::{
        DispatchRegistry, EventHandler, StatusHandler, Subscription, WILDCARD,
    };
    pub use crate::error::{RealtimeError, RtResult};
    pub use crate::facade::{GenerationTasks, ProjectCollaboration};
    pub use crate::message::{OutboundMessage, ServerEvent};
    pub use crate::transport::{
        TransportEvent, TransportFactory, TransportHandle, WebSocketTransport,
    };
}
