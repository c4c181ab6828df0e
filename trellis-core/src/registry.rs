//! Owner of the socket context and every live connection.

use hashbrown::HashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::socket::SocketContext;

/// Default time a closed socket keeps trying to deliver queued messages.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(100);

/// Registry-wide settings applied to every socket.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Linger period set on each socket (ZMQ_LINGER)
    pub linger: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            linger: DEFAULT_LINGER,
        }
    }
}

impl RegistryConfig {
    /// Set the linger period.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }
}

struct RegistryInner {
    context: Box<dyn SocketContext>,
    event_loop: Rc<dyn EventLoop>,
    config: RegistryConfig,
    connections: RefCell<HashMap<u64, Connection>>,
    next_key: Cell<u64>,
    shut_down: Cell<bool>,
}

/// Socket context, event loop and the set of live connections.
///
/// Cloning shares the same registry.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use trellis_core::mem::MemContext;
/// use trellis_core::reactor::Reactor;
/// use trellis_core::registry::Registry;
///
/// let reactor = Rc::new(Reactor::new());
/// let registry = Registry::new(MemContext::new(), reactor.clone());
/// assert_eq!(registry.connection_count(), 0);
/// registry.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    /// Create a registry with default configuration.
    pub fn new(context: impl SocketContext + 'static, event_loop: Rc<dyn EventLoop>) -> Self {
        Self::with_config(context, event_loop, RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    pub fn with_config(
        context: impl SocketContext + 'static,
        event_loop: Rc<dyn EventLoop>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                context: Box::new(context),
                event_loop,
                config,
                connections: RefCell::new(HashMap::new()),
                next_key: Cell::new(0),
                shut_down: Cell::new(false),
            }),
        }
    }

    /// The socket library context.
    pub fn context(&self) -> &dyn SocketContext {
        self.inner.context.as_ref()
    }

    /// The event loop connections register with.
    pub fn event_loop(&self) -> Rc<dyn EventLoop> {
        self.inner.event_loop.clone()
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.borrow().len()
    }

    /// Snapshot of the live connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.connections.borrow().values().cloned().collect()
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.get()
    }

    /// Shut every live connection down, then terminate the context.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`TrellisError::Socket`](crate::error::TrellisError::Socket) if the
    /// context fails to terminate.
    pub fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.replace(true) {
            return Ok(());
        }
        let connections = self.connections();
        debug!(connections = connections.len(), "[REGISTRY] Shutting down");
        for connection in connections {
            if let Err(err) = connection.shutdown() {
                warn!(error = %err, "[REGISTRY] Connection shutdown failed");
            }
        }
        self.inner.connections.borrow_mut().clear();
        self.inner.context.terminate()?;
        Ok(())
    }

    pub(crate) fn next_key(&self) -> u64 {
        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        key
    }

    pub(crate) fn register(&self, key: u64, connection: Connection) {
        self.inner.connections.borrow_mut().insert(key, connection);
    }

    pub(crate) fn deregister(&self, key: u64) {
        self.inner.connections.borrow_mut().remove(&key);
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Rc::downgrade(&self.inner))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("connections", &self.connection_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Non-owning registry handle held by connections.
pub(crate) struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}
