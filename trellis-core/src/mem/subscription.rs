//! Topic prefix filters for SUB sockets.

use bytes::Bytes;

/// A subscription entry with topic prefix
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Topic prefix (empty = subscribe to all)
    pub prefix: Bytes,
    /// Number of times the prefix was subscribed
    refs: usize,
}

impl Subscription {
    /// Create a new subscription for a topic prefix
    #[must_use]
    pub const fn new(prefix: Bytes) -> Self {
        Self { prefix, refs: 1 }
    }

    /// Check if this subscription matches a given topic
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        topic.starts_with(&self.prefix)
    }
}

/// Set of topic prefixes a subscriber accepts.
///
/// Subscriptions are counted: a prefix subscribed twice needs two
/// unsubscribes before it stops matching.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    /// Create a new empty set
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Add a subscription
    pub fn subscribe(&mut self, prefix: Bytes) {
        match self.subscriptions.iter_mut().find(|s| s.prefix == prefix) {
            Some(existing) => existing.refs += 1,
            None => self.subscriptions.push(Subscription::new(prefix)),
        }
    }

    /// Remove one reference to a subscription
    pub fn unsubscribe(&mut self, prefix: &[u8]) {
        if let Some(pos) = self
            .subscriptions
            .iter()
            .position(|s| s.prefix.as_ref() == prefix)
        {
            self.subscriptions[pos].refs -= 1;
            if self.subscriptions[pos].refs == 0 {
                self.subscriptions.remove(pos);
            }
        }
    }

    /// Check if a topic matches any subscription
    ///
    /// No subscriptions means nothing is delivered.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        self.subscriptions.iter().any(|s| s.matches(topic))
    }

    /// Get the number of distinct prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if there are no subscriptions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
