//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and an HTTP implementation that calls a
//! hosted all-MiniLM-L6-v2 feature-extraction endpoint (384 dimensions). The
//! provider is created via [`create_provider`] from configuration.
//!
//! Embedding is best-effort: [`generate_embedding`] never fails the request, it
//! logs and returns `None`, and the turn proceeds without recalled memories.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// A vector sqlite-vec can score: right size, finite, non-zero norm.
///
/// Cosine distance against a zero vector is NULL, so such vectors are never
/// stored or used as queries.
pub fn is_usable_embedding(embedding: &[f32]) -> bool {
    embedding.len() == EMBEDDING_DIM
        && embedding.iter().all(|x| x.is_finite())
        && embedding.iter().any(|x| *x != 0.0)
}

/// Embed `text`, bounded by `timeout`. Any failure is logged and yields `None`.
pub async fn generate_embedding(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Option<Vec<f32>> {
    let result = tokio::time::timeout(timeout, provider.embed(text)).await;

    match result {
        Ok(Ok(embedding)) if is_usable_embedding(&embedding) => Some(embedding),
        Ok(Ok(embedding)) => {
            tracing::warn!(
                len = embedding.len(),
                expected = EMBEDDING_DIM,
                "embedding is malformed or zero, continuing without memories"
            );
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "embedding failed, continuing without memories");
            None
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "embedding timed out, continuing without memories");
            None
        }
    }
}

/// Create an embedding provider from config.
///
/// Currently only `"http"` is supported.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "http" => {
            let provider = http::HttpEmbeddingProvider::new(config)?;
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: http"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("service unavailable")
        }
    }

    struct Slow;

    #[async_trait]
    impl EmbeddingProvider for Slow {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![0.0; EMBEDDING_DIM])
        }
    }

    #[tokio::test]
    async fn valid_embedding_passes_through() {
        let provider = Fixed(vec![0.1; EMBEDDING_DIM]);
        let out = generate_embedding(&provider, "hi", Duration::from_secs(1)).await;
        assert_eq!(out.map(|v| v.len()), Some(EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn wrong_dimension_is_none() {
        let provider = Fixed(vec![0.1; 12]);
        assert!(generate_embedding(&provider, "hi", Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn zero_vector_is_none() {
        let provider = Fixed(vec![0.0; EMBEDDING_DIM]);
        assert!(generate_embedding(&provider, "hi", Duration::from_secs(1)).await.is_none());
    }

    #[test]
    fn usable_embedding_checks() {
        let mut v = vec![0.0; EMBEDDING_DIM];
        assert!(!is_usable_embedding(&v));
        v[3] = 0.5;
        assert!(is_usable_embedding(&v));
        v[4] = f32::NAN;
        assert!(!is_usable_embedding(&v));
        assert!(!is_usable_embedding(&[1.0; 12]));
    }

    #[tokio::test]
    async fn provider_error_is_none() {
        assert!(generate_embedding(&Broken, "hi", Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn timeout_is_none() {
        assert!(generate_embedding(&Slow, "hi", Duration::from_millis(20)).await.is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = crate::config::EmbeddingConfig {
            provider: "local".into(),
            ..Default::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown embedding provider"));
    }

    #[test]
    fn http_provider_reports_dimensions() {
        let provider = create_provider(&crate::config::EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.dimensions(), EMBEDDING_DIM);
    }
}
