//! Revoked-token registry.
//!
//! Makes logout effective immediately even though the token itself stays
//! cryptographically valid until its expiry. Entries are keyed by the
//! token's unique identifier (`jti` claim), never the raw token.
//!
//! An entry is retained only until the token's own expiry: past that point
//! normal expiry validation already rejects the credential, so keeping the
//! entry is wasted memory. Removal happens three ways, each idempotent:
//! lazily on lookup, by a per-entry timer at the remaining lifetime, and by
//! a periodic sweep as a safety net.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Process-local set of revoked token identifiers.
#[derive(Debug, Default)]
pub struct RevocationRegistry {
    revoked: DashMap<String, u64>, // token id → expiry (seconds since epoch)
}

impl RevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token until its natural expiry.
    ///
    /// Already-expired tokens are ignored; validation rejects them anyway.
    pub fn revoke(self: &Arc<Self>, token_id: &str, expires_at_epoch_secs: u64) {
        let now = now_epoch_secs();
        if expires_at_epoch_secs <= now {
            return;
        }
        self.revoked
            .insert(token_id.to_string(), expires_at_epoch_secs);
        tracing::info!(token_id, expires_at = expires_at_epoch_secs, "token revoked");

        // Scheduled removal at the token's remaining lifetime; the periodic
        // sweep covers entries whose timer never fires.
        let registry = Arc::clone(self);
        let token_id = token_id.to_string();
        let remaining = Duration::from_secs(expires_at_epoch_secs - now);
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            registry
                .revoked
                .remove_if(&token_id, |_, &expiry| expiry <= now_epoch_secs());
        });
    }

    /// True while the token is revoked and not yet naturally expired.
    pub fn is_revoked(&self, token_id: &str) -> bool {
        match self.revoked.get(token_id).map(|e| *e.value()) {
            Some(expiry) if expiry > now_epoch_secs() => true,
            Some(_) => {
                self.revoked.remove(token_id);
                false
            }
            None => false,
        }
    }

    /// Drop every entry past its natural expiry.
    pub fn sweep(&self) {
        let now = now_epoch_secs();
        self.revoked.retain(|_, &mut expiry| expiry > now);
    }

    /// Number of tracked revocations.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revocation_is_immediate() {
        let registry = Arc::new(RevocationRegistry::new());
        assert!(!registry.is_revoked("jti-1"));
        registry.revoke("jti-1", now_epoch_secs() + 3_600);
        assert!(registry.is_revoked("jti-1"));
    }

    #[tokio::test]
    async fn expired_revocation_is_dropped_on_lookup() {
        let registry = Arc::new(RevocationRegistry::new());
        // Insert directly: revoke() refuses already-expired tokens.
        registry.revoked.insert("jti-2".to_string(), now_epoch_secs() - 1);
        assert!(!registry.is_revoked("jti-2"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn revoking_expired_token_is_a_noop() {
        let registry = Arc::new(RevocationRegistry::new());
        registry.revoke("jti-3", now_epoch_secs().saturating_sub(10));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn sweep_purges_expired_entries_only() {
        let registry = Arc::new(RevocationRegistry::new());
        registry.revoked.insert("old".to_string(), now_epoch_secs() - 5);
        registry.revoke("live", now_epoch_secs() + 3_600);
        registry.sweep();
        assert_eq!(registry.len(), 1);
        assert!(registry.is_revoked("live"));
    }

    #[tokio::test]
    async fn scheduled_removal_fires_at_expiry() {
        let registry = Arc::new(RevocationRegistry::new());
        registry.revoke("short", now_epoch_secs() + 1);
        assert!(registry.is_revoked("short"));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(!registry.is_revoked("short"));
        assert!(registry.is_empty());
    }
}
