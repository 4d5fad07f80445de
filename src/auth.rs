use std::env;
use std::sync::{Arc, RwLock};

/// Capability handed to API-calling collaborators: yields the bearer token
/// to attach to outgoing requests, if one is available. Collaborators never
/// read token state from anywhere else.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Fixed token, for tests and one-off scripts.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads `EDUCOIN_API_TOKEN` on every call so a rotated token is picked up
/// without a restart. An unset or empty variable means no token.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvToken;

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        env::var("EDUCOIN_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
    }
}

/// Shared read/write token slot. This replaces the stored login token the
/// dashboard used to read as ambient global state: a login flow calls `set`,
/// logout calls `clear`, and API clients only see the provider trait.
#[derive(Clone, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: &str) {
        *self.slot.write().unwrap() = Some(token.to_string());
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap() = None;
    }
}

impl TokenProvider for TokenStore {
    fn token(&self) -> Option<String> {
        self.slot.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_always_yields() {
        let provider = StaticToken("abc123".into());
        assert_eq!(provider.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn store_roundtrip_and_clear() {
        let store = TokenStore::new();
        assert!(store.token().is_none());
        store.set("session-token");
        assert_eq!(store.token().as_deref(), Some("session-token"));
        store.clear();
        assert!(store.token().is_none());
    }

    #[test]
    fn store_clones_share_the_slot() {
        let store = TokenStore::new();
        let handle = store.clone();
        store.set("shared");
        assert_eq!(handle.token().as_deref(), Some("shared"));
    }
}
