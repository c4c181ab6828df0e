//! Trellis Core
//!
//! This crate contains the loop-agnostic building blocks:
//! - Socket library interface (`socket`) and implementations: in-memory
//!   (`mem`) and libzmq (`libzmq`, feature `libzmq`)
//! - Event loop interface (`event_loop`) and a reference driver (`reactor`)
//! - Per-socket connection multiplexer (`connection`)
//! - Connection registry (`registry`)
//! - Messages, endpoints, options and error types

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
pub mod connection;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod event_loop;
pub mod mem;
pub mod message;
pub mod multipart;
pub mod options;
pub mod reactor;
pub mod registry;
pub mod socket;
pub mod socket_type;

#[cfg(feature = "libzmq")]
pub mod libzmq;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::connection::{Connection, ConnectionState, MessageHandler};
    pub use crate::correlation::CorrelationId;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::TrellisError;
    pub use crate::event_loop::{EventLoop, TimerHandle};
    pub use crate::mem::MemContext;
    pub use crate::message::{Frame, Message};
    pub use crate::options::SocketOptions;
    pub use crate::reactor::Reactor;
    pub use crate::registry::{Registry, RegistryConfig};
    pub use crate::socket::SocketContext;
    pub use crate::socket_type::SocketType;

    #[cfg(feature = "libzmq")]
    pub use crate::libzmq::ZmqContext;
}
