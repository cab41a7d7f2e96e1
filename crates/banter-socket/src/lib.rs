//! # banter-socket
//!
//! Client side of the banter live socket.
//!
//! - [`ConnectionManager`] owns one connection: connect, answer server pings,
//!   force-close on heartbeat silence, reconnect with backoff, give up
//! - [`EventDispatcher`] fans inbound messages out to subscribers and replays
//!   the latest message to late joiners
//! - [`SocketRegistry`] shares one connection per owner across consumers
//! - [`Connector`] is the transport seam; [`TungsteniteConnector`] is the
//!   production implementation

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod reconnect;
pub mod registry;
pub mod transport;

pub use config::{ConnectionConfig, socket_url};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus};
pub use dispatcher::{EventDispatcher, Subscription};
pub use heartbeat::HeartbeatMonitor;
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use registry::{SocketLease, SocketRegistry};
pub use transport::{Connector, OutboundFrame, SocketChannel, TransportEvent, TungsteniteConnector};
