//! Pushes the deployment status to a Prometheus Pushgateway.
//!
//! The gauge `drone_helm3_build_status` carries the unix time of the push,
//! labelled with `success` or the error kind. The grouping key identifies
//! the repository, namespace and release, each in URL-safe base64 so that
//! slashes in the repository name survive the URL.

use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::{LogReporter, StatusReporter};
use crate::helm::HelmError;

const JOB: &str = "drone_helm3";
const METRIC: &str = "drone_helm3_build_status";
const CONTENT_TYPE: &str = "text/plain; version=0.0.4";
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid pushgateway url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to push result to pushgateway: {0}")]
    Request(#[from] reqwest::Error),

    #[error("non [23]xx status code from pushgateway: {status}")]
    Status { status: u16, body: String },
}

/// `success` for a successful run, the error kind otherwise.
pub fn status_label(result: &Result<(), HelmError>) -> &'static str {
    match result {
        Ok(()) => "success",
        Err(e) => e.kind().as_str(),
    }
}

/// Text exposition of the status gauge.
pub fn push_body(label: &str, timestamp: i64) -> String {
    format!("# TYPE {METRIC} gauge\n{METRIC}{{status={label:?}}} {timestamp}\n")
}

pub struct PushgatewayReporter {
    client: Client,
    url: Url,
    repo: String,
    namespace: String,
    release: String,
}

impl PushgatewayReporter {
    pub fn new(
        url: &str,
        repo: impl Into<String>,
        namespace: impl Into<String>,
        release: impl Into<String>,
    ) -> Result<Self, PushError> {
        let parsed = Url::parse(url).map_err(|source| PushError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let client = Client::builder().timeout(PUSH_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: parsed,
            repo: repo.into(),
            namespace: namespace.into(),
            release: release.into(),
        })
    }

    /// Grouping key URL the status is pushed to.
    pub fn push_url(&self) -> String {
        format!(
            "{}/job/{JOB}/repo@base64/{}/namespace@base64/{}/release@base64/{}",
            self.url.as_str().trim_end_matches('/'),
            URL_SAFE.encode(&self.repo),
            URL_SAFE.encode(&self.namespace),
            URL_SAFE.encode(&self.release),
        )
    }

    pub async fn push(&self, label: &str) -> Result<(), PushError> {
        let body = push_body(label, chrono::Utc::now().timestamp());
        let url = self.push_url();
        debug!("pushing status {} to {}", label, url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!("pushed status {} to pushgateway", label);
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for PushgatewayReporter {
    fn fatal(&self, error: &anyhow::Error) -> ExitCode {
        LogReporter.fatal(error)
    }

    async fn status(&self, result: &Result<(), HelmError>, message: &str) -> ExitCode {
        if let Err(e) = self.push(status_label(result)).await {
            warn!("{}", e);
            if let PushError::Status { body, .. } = &e {
                warn!("response: \n{}\n", body);
            }
        }
        LogReporter.status(result, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helm::ErrorKind;
    use crate::subprocess::ProcessError;

    #[test]
    fn test_push_url() {
        let reporter = PushgatewayReporter::new(
            "http://pushgateway:9091/",
            "octocat/hello-world",
            "apps",
            "myapp",
        )
        .unwrap();

        assert_eq!(
            reporter.push_url(),
            "http://pushgateway:9091/job/drone_helm3\
             /repo@base64/b2N0b2NhdC9oZWxsby13b3JsZA==\
             /namespace@base64/YXBwcw==\
             /release@base64/bXlhcHA="
        );
    }

    #[test]
    fn test_grouping_key_never_contains_slashes() {
        // "???" encodes to "Pz8/" in the standard alphabet
        let reporter =
            PushgatewayReporter::new("http://pushgateway:9091", "r", "n", "???").unwrap();

        let url = reporter.push_url();
        assert!(url.ends_with("/release@base64/Pz8_"), "{url}");
        let key = url.split("/release@base64/").nth(1).unwrap();
        assert!(!key.contains('/'));
    }

    #[test]
    fn test_invalid_url() {
        let err = PushgatewayReporter::new("not a url", "r", "n", "rel")
            .err()
            .unwrap();
        assert!(matches!(err, PushError::InvalidUrl { .. }));
    }

    #[test]
    fn test_push_body() {
        assert_eq!(
            push_body("success", 1_700_000_000),
            "# TYPE drone_helm3_build_status gauge\n\
             drone_helm3_build_status{status=\"success\"} 1700000000\n"
        );
    }

    #[test]
    fn test_status_label_per_kind() {
        assert_eq!(status_label(&Ok(())), "success");
        for kind in ErrorKind::ALL {
            let result = Err(HelmError::wrap(ProcessError::ExitCode(1), "ctx", kind));
            assert_eq!(status_label(&result), kind.as_str());
        }
    }
}
