// Single-owner bearer token cache.
//
// The token is a shared mutable field between the poll cycle (which
// clears it on 401/403) and write actions (which read it per request).
// All updates go through the async Mutex — no lock-free flag, so a
// clear and the subsequent re-login cannot interleave with a reader
// observing a half-updated state.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

/// Shared cache for the vendor session token.
///
/// Cheaply cloneable; all clones observe the same slot. The poll
/// orchestrator clears it on auth failure so the next connect attempt
/// performs a fresh login.
#[derive(Clone, Default)]
pub struct TokenCache {
    slot: Arc<Mutex<Option<SecretString>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token.
    pub async fn set(&self, token: SecretString) {
        *self.slot.lock().await = Some(token);
    }

    /// Invalidate the stored token (forces re-login on next connect).
    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    /// Whether a token is currently cached.
    pub async fn is_set(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// The `Bearer {token}` header value, if a token is cached.
    pub async fn bearer(&self) -> Option<String> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()))
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_clear_roundtrip() {
        let cache = TokenCache::new();
        assert!(!cache.is_set().await);
        assert!(cache.bearer().await.is_none());

        cache.set(SecretString::from("abc123")).await;
        assert!(cache.is_set().await);
        assert_eq!(cache.bearer().await.as_deref(), Some("Bearer abc123"));

        cache.clear().await;
        assert!(!cache.is_set().await);
    }

    #[tokio::test]
    async fn clones_share_the_slot() {
        let cache = TokenCache::new();
        let other = cache.clone();

        cache.set(SecretString::from("tok")).await;
        assert!(other.is_set().await);

        other.clear().await;
        assert!(!cache.is_set().await);
    }
}
