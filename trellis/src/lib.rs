//! # Trellis
//!
//! ZeroMQ-style messaging patterns on a single-threaded, callback-driven
//! event loop.
//!
//! ## Architecture
//!
//! Trellis is layered:
//!
//! - **`trellis-core`**: socket library and event loop interfaces, the
//!   per-socket [`Connection`](trellis_core::connection::Connection) that
//!   turns readiness into whole messages, and the connection registry
//! - **`trellis`** (this crate): the patterns built on top
//!
//! ## Patterns
//!
//! - [`ReqConnection`] / [`RepConnection`]: many concurrent requests on one
//!   socket, matched to replies by correlation id, with timeouts and
//!   cancellation
//! - [`RouterConnection`] / [`DealerConnection`]: raw identity routing
//! - [`PubConnection`] / [`SubConnection`]: tagged publish/subscribe
//! - [`PushConnection`] / [`PullConnection`]: pipelines
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use std::time::Duration;
//! use trellis::prelude::*;
//!
//! let reactor = Rc::new(Reactor::new());
//! let registry = Registry::new(MemContext::new(), reactor.clone());
//!
//! let _server = RepConnection::open(
//!     &registry,
//!     vec![Endpoint::bind("tcp://127.0.0.1:5555")],
//!     &SocketOptions::default(),
//!     Rc::new(|conn: &RepConnection, id: CorrelationId, _: Vec<Bytes>| {
//!         conn.reply(id, "pong").unwrap();
//!     }),
//! )
//! .unwrap();
//!
//! let client = ReqConnection::open(
//!     &registry,
//!     vec![Endpoint::connect("tcp://127.0.0.1:5555")],
//!     &SocketOptions::default(),
//!     ReqConfig::default().with_default_timeout(Duration::from_secs(1)),
//! )
//! .unwrap();
//!
//! let reply = client.send_request("ping").unwrap();
//! let payload = reactor.run_until(reply, None).unwrap().unwrap();
//! assert_eq!(payload, vec!["pong"]);
//!
//! registry.shutdown().unwrap();
//! ```
//!
//! ## Backends
//!
//! - [`MemContext`](trellis_core::mem::MemContext): in-process sockets, no
//!   native dependency
//! - `ZmqContext` (feature **`libzmq`**): real sockets through libzmq

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;

pub mod dev_tracing;
pub mod id_pool;
pub mod pubsub;
pub mod push_pull;
pub mod req_rep;
pub mod router_dealer;

pub use pubsub::{PubConnection, SubConnection, SubHandler};
pub use push_pull::{PullConnection, PullHandler, PushConnection};
pub use req_rep::{RepConnection, RepHandler, ReplyFuture, ReqConfig, ReqConnection};
pub use router_dealer::{DealerConnection, DealerHandler, RouterConnection, RouterHandler};

/// Convenience prelude for common imports.
///
/// ```rust
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use super::id_pool::{IdGenerator, IdPool};
    pub use super::pubsub::{PubConnection, SubConnection, SubHandler};
    pub use super::push_pull::{PullConnection, PullHandler, PushConnection};
    pub use super::req_rep::{RepConnection, RepHandler, ReplyFuture, ReqConfig, ReqConnection};
    pub use super::router_dealer::{
        DealerConnection, DealerHandler, RouterConnection, RouterHandler,
    };
    pub use bytes::Bytes;
    pub use trellis_core::prelude::*;
}
