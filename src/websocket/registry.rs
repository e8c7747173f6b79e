use std::collections::HashSet;

/// Set of symbols currently subscribed on the feed
///
/// Pure bookkeeping: the caller pairs each mutation with the matching
/// network send. Updates are optimistic, i.e. applied when the frame is
/// sent and never reconciled against the server's acknowledgment.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    symbols: HashSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(symbol: &str) -> String {
        symbol.to_uppercase()
    }

    /// Insert a symbol, returns `true` if it was not present
    pub fn add(&mut self, symbol: &str) -> bool {
        self.symbols.insert(Self::normalize(symbol))
    }

    /// Remove a symbol, returns `true` if it was present
    pub fn remove(&mut self, symbol: &str) -> bool {
        self.symbols.remove(&Self::normalize(symbol))
    }

    /// Remove everything, returns `true` if anything was present
    pub fn remove_all(&mut self) -> bool {
        let had_any = !self.symbols.is_empty();
        self.symbols.clear();
        had_any
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    /// Copy of the current set, safe to iterate while the registry changes
    pub fn snapshot(&self) -> HashSet<String> {
        self.symbols.clone()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(&Self::normalize(symbol))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// An arbitrary member, if any
    pub fn first(&self) -> Option<String> {
        self.symbols.iter().next().cloned()
    }
}
