//! Shared captured auth (spec.md §9 "Shared captured auth"): the
//! summarizer's LLM strategy needs a credential the inbound request
//! carried. This is process-wide state with init-on-first-request,
//! never persisted to disk and never logged in full — deliberately kept
//! in one small struct rather than hidden behind ad hoc globals elsewhere.

use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct CapturedAuth {
    inner: Arc<RwLock<Option<String>>>,
}

impl CapturedAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `header_value` the first time it is seen; subsequent calls
    /// are no-ops so the credential used by the summarizer stays stable
    /// for the lifetime of the process.
    pub async fn capture_if_absent(&self, header_value: &str) {
        let already_set = self.inner.read().await.is_some();
        if already_set {
            return;
        }
        let mut guard = self.inner.write().await;
        if guard.is_none() {
            *guard = Some(header_value.to_string());
        }
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    /// A fixed-width fingerprint safe to log: first 6 characters plus the
    /// total length, never the credential itself.
    pub fn fingerprint(header_value: &str) -> String {
        let prefix: String = header_value.chars().take(6).collect();
        format!("{}...(len={})", prefix, header_value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_capture_wins() {
        let auth = CapturedAuth::new();
        auth.capture_if_absent("Bearer first").await;
        auth.capture_if_absent("Bearer second").await;
        assert_eq!(auth.get().await.as_deref(), Some("Bearer first"));
    }

    #[test]
    fn fingerprint_never_reveals_full_value() {
        let fp = CapturedAuth::fingerprint("Bearer sk-supersecretvalue");
        assert!(!fp.contains("supersecretvalue"));
        assert!(fp.starts_with("Bearer "));
    }
}
