//! Single-edge HTTP probe.
//!
//! # Responsibilities
//! - Fetch the test object from one edge with the configured Host header
//! - Retry connection failures up to the configured attempt count
//! - Verify the body against the reference checksum
//! - Classify the result as latency, timeout or failure
//!
//! # Design Decisions
//! - A timeout is a measurement (the sentinel latency), never retried
//! - Any HTTP answer ends the attempt loop, good or bad
//! - The probe never touches health records; the orchestrator does

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::HOST;
use url::Url;

use crate::config::ProbeConfig;
use crate::probe::checksum::content_checksum;
use crate::probe::outcome::{FailKind, ProbeFailure, ProbeOutcome};
use crate::resilience::backoff::retry_delay;

/// User agent sent with every probe.
pub const USER_AGENT: &str = concat!("edgekeeper/", env!("CARGO_PKG_VERSION"), " (edge health probe)");

const MAX_REASON_CHARS: usize = 512;

/// Something that can probe an edge.
///
/// The HTTP implementation is [`HttpProbe`]; tests substitute scripted ones.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, edge: &str) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Probes edges over HTTP(S) and verifies the test object.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    config: ProbeConfig,
    reference_checksum: String,
}

impl HttpProbe {
    /// Build a probe for the configured target; `reference_checksum` is the
    /// checksum of the local copy of the test object.
    pub fn new(config: &ProbeConfig, reference_checksum: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            reference_checksum,
        })
    }

    /// URL of the test object on `edge`.
    pub fn target_url(&self, edge: &str) -> Result<Url, url::ParseError> {
        let host = if edge.contains(':') && !edge.starts_with('[') {
            format!("[{edge}]")
        } else {
            edge.to_string()
        };
        Url::parse(&format!(
            "{}://{}:{}{}",
            self.config.scheme, host, self.config.port, self.config.path
        ))
    }

    fn host_header<'a>(&'a self, edge: &'a str) -> &'a str {
        if self.config.host_header_from_edge {
            edge
        } else {
            &self.config.host
        }
    }

    /// Fetch and verify the test object from `edge`.
    pub async fn fetch(&self, edge: &str) -> ProbeOutcome {
        let url = match self.target_url(edge) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(edge = %edge, error = %e, "Cannot build probe URL");
                return ProbeOutcome::Failed(ProbeFailure {
                    kind: FailKind::FetchFailed,
                    edge: edge.to_string(),
                    reason: format!("invalid URL: {e}"),
                });
            }
        };
        let host = self.host_header(edge);
        let attempts = self.config.fetch_retry.max(1);

        for attempt in 1..=attempts {
            let delay = retry_delay(
                attempt,
                self.config.retry_base_delay_ms,
                self.config.retry_max_delay_ms,
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&url, host).await {
                Ok((status, body, elapsed)) => return self.classify(edge, status, &body, elapsed),
                Err(e) if e.is_timeout() => {
                    tracing::warn!(edge = %edge, "Probe timed out");
                    return ProbeOutcome::TimedOut;
                }
                Err(e) if e.is_connect() => {
                    if attempt == 1 {
                        tracing::error!(edge = %edge, error = %e, "Connection error when fetching from edge");
                    }
                    if attempt < attempts {
                        tracing::warn!(edge = %edge, attempt = attempt + 1, "Retrying connection");
                    }
                }
                Err(e) => {
                    tracing::error!(edge = %edge, error = %e, "Probe request failed");
                    return ProbeOutcome::Failed(ProbeFailure {
                        kind: FailKind::FetchFailed,
                        edge: edge.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::error!(edge = %edge, attempts, "Failed to connect after retrying");
        ProbeOutcome::TimedOut
    }

    async fn attempt(
        &self,
        url: &Url,
        host: &str,
    ) -> Result<(reqwest::StatusCode, Vec<u8>, Duration), reqwest::Error> {
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(HOST, host)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec(), started.elapsed()))
    }

    fn classify(
        &self,
        edge: &str,
        status: reqwest::StatusCode,
        body: &[u8],
        elapsed: Duration,
    ) -> ProbeOutcome {
        if !status.is_success() {
            tracing::error!(edge = %edge, status = %status, "Object fetch failed");
            return ProbeOutcome::Failed(ProbeFailure {
                kind: FailKind::FetchFailed,
                edge: edge.to_string(),
                reason: truncate_reason(&String::from_utf8_lossy(body)),
            });
        }

        let observed = content_checksum(body);
        if observed != self.reference_checksum {
            tracing::error!(
                edge = %edge,
                expected = %self.reference_checksum,
                observed = %observed,
                "Failed to verify test object"
            );
            return ProbeOutcome::Failed(ProbeFailure {
                kind: FailKind::VerifyFailed,
                edge: edge.to_string(),
                reason: observed,
            });
        }

        ProbeOutcome::Latency(elapsed.as_secs_f64())
    }
}

impl Prober for HttpProbe {
    fn probe(&self, edge: &str) -> impl Future<Output = ProbeOutcome> + Send {
        self.fetch(edge)
    }
}

fn truncate_reason(text: &str) -> String {
    match text.char_indices().nth(MAX_REASON_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(config: ProbeConfig) -> HttpProbe {
        HttpProbe::new(&config, content_checksum(b"ok")).unwrap()
    }

    #[test]
    fn test_target_url() {
        let p = probe(ProbeConfig {
            scheme: "http".into(),
            port: 8080,
            path: "/edgetest.txt".into(),
            ..ProbeConfig::default()
        });
        assert_eq!(
            p.target_url("edge1.example.net").unwrap().as_str(),
            "http://edge1.example.net:8080/edgetest.txt"
        );
        assert_eq!(
            p.target_url("2001:db8::1").unwrap().as_str(),
            "http://[2001:db8::1]:8080/edgetest.txt"
        );
    }

    #[test]
    fn test_host_header_source() {
        let fixed = probe(ProbeConfig {
            host: "www.example.org".into(),
            ..ProbeConfig::default()
        });
        assert_eq!(fixed.host_header("10.0.0.1"), "www.example.org");

        let testing = probe(ProbeConfig {
            host_header_from_edge: true,
            ..ProbeConfig::default()
        });
        assert_eq!(testing.host_header("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_classify_statuses() {
        let p = probe(ProbeConfig::default());
        let elapsed = Duration::from_millis(250);

        assert_eq!(
            p.classify("e", reqwest::StatusCode::OK, b"ok", elapsed),
            ProbeOutcome::Latency(0.25)
        );

        match p.classify("e", reqwest::StatusCode::SERVICE_UNAVAILABLE, b"down", elapsed) {
            ProbeOutcome::Failed(f) => {
                assert_eq!(f.kind, FailKind::FetchFailed);
                assert_eq!(f.reason, "down");
            }
            other => panic!("unexpected {other:?}"),
        }

        match p.classify("e", reqwest::StatusCode::OK, b"tampered", elapsed) {
            ProbeOutcome::Failed(f) => {
                assert_eq!(f.kind, FailKind::VerifyFailed);
                assert_eq!(f.reason, content_checksum(b"tampered"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncate_reason() {
        let long = "x".repeat(MAX_REASON_CHARS + 10);
        assert_eq!(truncate_reason(&long).chars().count(), MAX_REASON_CHARS + 1);
        assert_eq!(truncate_reason("short"), "short");
    }
}
