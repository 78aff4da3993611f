//! HTTP embedding provider for hosted feature-extraction endpoints.
//!
//! Sends `{"inputs": text, "options": {"wait_for_model": true}}` and accepts either
//! a flat float array or a single batch-wrapped array (`[[...]]`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build embedding HTTP client")?;

        tracing::info!(url = %config.url, model = %config.model, "embedding provider configured");

        Ok(Self {
            client,
            url: config.url.clone(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "inputs": text,
            "options": { "wait_for_model": true },
        });

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&payload)?);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("embedding request failed")?;
        let status = response.status();
        let body = response.bytes().await.context("failed to read embedding response")?;

        if !status.is_success() {
            let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            bail!("embedding service returned {status}: {snippet}");
        }

        let value: serde_json::Value =
            serde_json::from_slice(&body).context("embedding response is not JSON")?;
        let embedding = parse_embedding(&value)?;

        if embedding.len() != EMBEDDING_DIM {
            bail!(
                "embedding has {} dimensions, expected {EMBEDDING_DIM}",
                embedding.len()
            );
        }
        Ok(embedding)
    }
}

/// Decode a flat float array, un-nesting one level of batch wrapping.
pub fn parse_embedding(value: &serde_json::Value) -> Result<Vec<f32>> {
    let Some(items) = value.as_array() else {
        bail!("embedding response is not an array");
    };

    let flat = match items.first() {
        Some(serde_json::Value::Array(inner)) => inner,
        _ => items,
    };

    flat.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .context("embedding contains a non-numeric value")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_for(url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            url,
            api_token: Some("hf_test".into()),
            timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn vector_body(nested: bool) -> String {
        let v: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32 / 1000.0).collect();
        if nested {
            serde_json::to_string(&vec![v]).unwrap()
        } else {
            serde_json::to_string(&v).unwrap()
        }
    }

    #[test]
    fn parse_flat_and_nested() {
        assert_eq!(parse_embedding(&json!([0.5, 1.0])).unwrap(), vec![0.5, 1.0]);
        assert_eq!(parse_embedding(&json!([[0.25, 0.75]])).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_embedding(&json!({"error": "loading"})).is_err());
        assert!(parse_embedding(&json!(["a", "b"])).is_err());
    }

    #[tokio::test]
    async fn embeds_via_http_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer hf_test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "inputs": "hello",
                "options": {"wait_for_model": true}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(vector_body(true))
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(&config_for(server.url())).unwrap();
        let embedding = provider.embed("hello").await.unwrap();

        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!((embedding[1] - 0.001).abs() < 1e-6);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body(r#"{"error":"Model is currently loading"}"#)
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(&config_for(server.url())).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn wrong_length_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("[0.1, 0.2, 0.3]")
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(&config_for(server.url())).unwrap();
        assert!(provider.embed("hello").await.is_err());
    }
}
