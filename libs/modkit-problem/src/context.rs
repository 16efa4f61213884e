//! Shared construction context: problem IDs and type URIs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::TryRngCore as _;
use rand::rngs::OsRng;

use crate::config::ProblemConfig;

/// Number of random bytes behind every problem ID.
pub const ID_LEN: usize = 6;

/// Type URI used when a problem has no category or no title.
pub const DEFAULT_TYPE: &str = "about:blank";

/// Base for derived type URIs unless configured otherwise.
pub const DEFAULT_TYPE_BASE_URI: &str = "https://example.com/errors";

#[derive(Debug, thiserror::Error)]
pub enum IdSourceError {
    #[error("randomness source unavailable: {0}")]
    Unavailable(String),
}

/// Source of the random bytes behind problem IDs.
///
/// Implementations either fill the whole buffer or fail.
pub trait IdSource: Send + Sync {
    /// # Errors
    /// Returns `IdSourceError` if the source cannot produce bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), IdSourceError>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomIds;

impl IdSource for OsRandomIds {
    fn fill(&self, buf: &mut [u8]) -> Result<(), IdSourceError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| IdSourceError::Unavailable(e.to_string()))
    }
}

/// Deterministic counter-based source for tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn starting_at(value: u64) -> Self {
        Self {
            next: AtomicU64::new(value),
        }
    }
}

impl IdSource for SequentialIds {
    fn fill(&self, buf: &mut [u8]) -> Result<(), IdSourceError> {
        let value = self.next.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        // Right-align the counter so small values differ in the last bytes.
        let n = buf.len().min(value.len());
        let start = buf.len() - n;
        buf[..start].fill(0);
        buf[start..].copy_from_slice(&value[value.len() - n..]);
        Ok(())
    }
}

static SHARED: LazyLock<Arc<ProblemContext>> =
    LazyLock::new(|| Arc::new(ProblemContext::default()));

/// Everything a problem needs beyond its arguments.
#[derive(Clone)]
pub struct ProblemContext {
    type_base_uri: String,
    ids: Arc<dyn IdSource>,
}

impl ProblemContext {
    pub fn new(config: &ProblemConfig, ids: Arc<dyn IdSource>) -> Self {
        Self {
            type_base_uri: config.type_base_uri.clone(),
            ids,
        }
    }

    /// Process-wide context with the default base URI and OS randomness.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    #[must_use]
    pub fn type_base_uri(&self) -> &str {
        &self.type_base_uri
    }

    /// `{base}/{category}/{title}`, or [`DEFAULT_TYPE`] if either part is empty.
    #[must_use]
    pub fn type_uri(&self, category: &str, title: &str) -> String {
        if category.is_empty() || title.is_empty() {
            return DEFAULT_TYPE.to_owned();
        }
        let base = if self.type_base_uri.is_empty() {
            DEFAULT_TYPE_BASE_URI
        } else {
            self.type_base_uri.trim_end_matches('/')
        };
        format!("{base}/{category}/{title}")
    }

    /// Fresh problem ID: [`ID_LEN`] random bytes, standard base64.
    ///
    /// # Panics
    /// Panics if the randomness source fails; there is no meaningful recovery from a broken
    /// source and problems must never be handed out without an ID.
    #[must_use]
    pub fn next_id(&self) -> String {
        let mut buf = [0_u8; ID_LEN];
        if let Err(err) = self.ids.fill(&mut buf) {
            tracing::error!(error = %err, "cannot generate problem id");
            panic!("cannot generate problem id: {err}");
        }
        STANDARD.encode(buf)
    }
}

impl Default for ProblemContext {
    fn default() -> Self {
        Self::new(&ProblemConfig::default(), Arc::new(OsRandomIds))
    }
}

impl fmt::Debug for ProblemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemContext")
            .field("type_base_uri", &self.type_base_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    struct Broken;

    impl IdSource for Broken {
        fn fill(&self, _buf: &mut [u8]) -> Result<(), IdSourceError> {
            Err(IdSourceError::Unavailable("entropy pool closed".to_owned()))
        }
    }

    #[test]
    fn ids_are_eight_base64_chars() {
        let ctx = ProblemContext::default();
        let a = ctx.next_id();
        let b = ctx.next_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_ids_are_deterministic() {
        let ctx = ProblemContext::new(
            &ProblemConfig::default(),
            Arc::new(SequentialIds::starting_at(1)),
        );
        assert_eq!(ctx.next_id(), "AAAAAAAB");
        assert_eq!(ctx.next_id(), "AAAAAAAC");
    }

    #[test]
    fn type_uri_needs_category_and_title() {
        let ctx = ProblemContext::default();
        assert_eq!(
            ctx.type_uri("general", "invalid_range"),
            "https://example.com/errors/general/invalid_range"
        );
        assert_eq!(ctx.type_uri("", "invalid_range"), DEFAULT_TYPE);
        assert_eq!(ctx.type_uri("general", ""), DEFAULT_TYPE);
    }

    #[test]
    fn type_uri_uses_configured_base() {
        let config = ProblemConfig {
            type_base_uri: "https://errors.acme.io/".to_owned(),
            ..ProblemConfig::default()
        };
        let ctx = ProblemContext::new(&config, Arc::new(OsRandomIds));
        assert_eq!(
            ctx.type_uri("auth", "unauthorized"),
            "https://errors.acme.io/auth/unauthorized"
        );
    }

    #[test]
    #[should_panic(expected = "cannot generate problem id")]
    fn broken_source_is_fatal() {
        let ctx = ProblemContext::new(&ProblemConfig::default(), Arc::new(Broken));
        let _ = ctx.next_id();
    }
}
