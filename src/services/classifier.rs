//! Classifier seam - turns feature rows into access labels
//!
//! Two implementations:
//! - `LogisticClassifier` - in-process `sigmoid(w·x + b) >= threshold`
//! - `HttpClassifier` - POSTs the matrix as JSON to an external model service

use crate::error::{FusionError, Result};
use crate::infra::config::{ClassifierMode, Config};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Given N feature rows, return N labels in the same order
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, matrix: &[Vec<f64>]) -> Result<Vec<bool>>;
}

/// Build the classifier selected in config
pub fn from_config(config: &Config) -> Result<Arc<dyn Classifier>> {
    match config.classifier_mode() {
        ClassifierMode::Logistic => Ok(Arc::new(LogisticClassifier::new(
            config.classifier_weights(),
            config.classifier_bias(),
            config.classifier_threshold(),
        ))),
        ClassifierMode::Http => Ok(Arc::new(HttpClassifier::new(
            config.classifier_http_url(),
            Duration::from_millis(config.classifier_timeout_ms()),
        )?)),
    }
}

#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    weights: Vec<f64>,
    bias: f64,
    threshold: f64,
}

impl LogisticClassifier {
    pub fn new(weights: Vec<f64>, bias: f64, threshold: f64) -> Self {
        Self { weights, bias, threshold }
    }

    /// Probability that the row belongs to the positive class
    pub fn probability(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.weights.len() {
            return Err(FusionError::ClassifierFailure(format!(
                "row has {} features, model expects {}",
                row.len(),
                self.weights.len()
            )));
        }
        let z: f64 = self.bias + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>();
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

#[async_trait]
impl Classifier for LogisticClassifier {
    async fn classify(&self, matrix: &[Vec<f64>]) -> Result<Vec<bool>> {
        matrix.iter().map(|row| Ok(self.probability(row)? >= self.threshold)).collect()
    }
}

pub struct HttpClassifier {
    url: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        // One client for connection pooling across windows
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .map_err(|e| FusionError::ClassifierFailure(e.to_string()))?;
        Ok(Self { url: url.to_string(), client })
    }
}

/// Decode a `[0, 1, ...]` response body
fn parse_labels(body: &[u8]) -> Result<Vec<bool>> {
    let raw: Vec<u8> = serde_json::from_slice(body)
        .map_err(|e| FusionError::ClassifierFailure(format!("invalid response: {e}")))?;
    raw.into_iter()
        .map(|label| match label {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FusionError::ClassifierFailure(format!("label out of range: {other}"))),
        })
        .collect()
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, matrix: &[Vec<f64>]) -> Result<Vec<bool>> {
        let start = Instant::now();
        let body =
            serde_json::to_vec(matrix).map_err(|e| FusionError::ClassifierFailure(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.url, error = %e, "classifier_http_error");
                FusionError::ClassifierFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FusionError::ClassifierFailure(format!("HTTP {}", status.as_u16())));
        }

        let bytes =
            response.bytes().await.map_err(|e| FusionError::ClassifierFailure(e.to_string()))?;
        let labels = parse_labels(&bytes)?;

        debug!(
            rows = %matrix.len(),
            latency_us = %start.elapsed().as_micros(),
            "classifier_http_ok"
        );
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logistic_threshold() {
        // Only the camera share matters
        let classifier = LogisticClassifier::new(vec![0.0, 0.0, 0.0, 0.0, 10.0], -5.0, 0.5);
        let matrix = vec![vec![0.0, 0.0, 0.0, 0.0, 0.9], vec![0.0, 0.0, 0.0, 0.0, 0.1]];
        let labels = classifier.classify(&matrix).await.unwrap();
        assert_eq!(labels, vec![true, false]);
    }

    #[tokio::test]
    async fn test_logistic_empty_matrix() {
        let classifier = LogisticClassifier::new(vec![1.0; 5], 0.0, 0.5);
        assert!(classifier.classify(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logistic_width_mismatch_is_failure() {
        let classifier = LogisticClassifier::new(vec![1.0; 5], 0.0, 0.5);
        let err = classifier.classify(&[vec![1.0; 7]]).await.unwrap_err();
        assert!(matches!(err, FusionError::ClassifierFailure(_)));
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(parse_labels(b"[0,1,1]").unwrap(), vec![false, true, true]);
        assert!(parse_labels(b"[2]").is_err());
        assert!(parse_labels(b"not json").is_err());
    }

    #[test]
    fn test_from_config_default_is_logistic() {
        let classifier = from_config(&Config::default());
        assert!(classifier.is_ok());
    }

    /// Answer a single HTTP request with `status` and `body`, returning the URL
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            // Headers, then as much body as Content-Length announces
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/classify")
    }

    #[tokio::test]
    async fn test_http_labels_from_model_service() {
        let url = serve_once("200 OK", "[1,0]").await;
        let classifier = HttpClassifier::new(&url, Duration::from_secs(2)).unwrap();
        let labels = classifier.classify(&[vec![0.0; 5], vec![1.0; 5]]).await.unwrap();
        assert_eq!(labels, vec![true, false]);
    }

    #[tokio::test]
    async fn test_http_error_status_is_failure() {
        let url = serve_once("500 Internal Server Error", "{\"error\":\"model crashed\"}").await;
        let classifier = HttpClassifier::new(&url, Duration::from_secs(2)).unwrap();
        let err = classifier.classify(&[vec![0.0; 5]]).await.unwrap_err();
        assert!(matches!(err, FusionError::ClassifierFailure(ref msg) if msg == "HTTP 500"), "{err:?}");
    }

    #[tokio::test]
    async fn test_http_unreachable_service_is_failure() {
        // Bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/classify");
        let classifier = HttpClassifier::new(&url, Duration::from_millis(200)).unwrap();
        let err = classifier.classify(&[vec![0.0; 5]]).await.unwrap_err();
        assert!(matches!(err, FusionError::ClassifierFailure(_)));
    }
}
