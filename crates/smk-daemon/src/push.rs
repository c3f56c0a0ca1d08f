//! Push delivery transports.
//!
//! The dispatcher only needs "deliver this report to this token" and a way to
//! tell an unregistered token apart from any other failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smk_config::{DaemonConfig, PushKind};
use smk_schemas::SmokeReport;
use tracing::info;

/// How the device should present a push.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushType {
    /// Silent, content-available only.
    Background,
    /// User-visible alert.
    Alert,
}

impl PushType {
    pub fn for_report(report: &SmokeReport) -> Self {
        if report.is_silent() {
            PushType::Background
        } else {
            PushType::Alert
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The push service no longer knows this token. Registration should go.
    #[error("device token is not registered")]
    Unregistered,

    #[error("push rejected: {0}")]
    Rejected(String),

    #[error("push transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn deliver(
        &self,
        token: &str,
        push_type: PushType,
        report: &SmokeReport,
    ) -> Result<(), PushError>;
}

// ---------------------------------------------------------------------------
// LogPush
// ---------------------------------------------------------------------------

/// Logs deliveries instead of sending them. Default for development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPush;

#[async_trait]
impl PushTransport for LogPush {
    async fn deliver(
        &self,
        token: &str,
        push_type: PushType,
        report: &SmokeReport,
    ) -> Result<(), PushError> {
        let payload = serde_json::to_string(report).map_err(|e| PushError::Rejected(e.to_string()))?;
        info!(
            token = %redact_token(token),
            push_type = ?push_type,
            payload = %payload,
            "push (log transport)"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HttpPush
// ---------------------------------------------------------------------------

/// Body POSTed to `<endpoint>/<token>`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    push_type: PushType,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    aps: RelayAps<'a>,
    data: &'a SmokeReport,
}

#[derive(Debug, Serialize)]
struct RelayAps<'a> {
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    content_available: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayErrorBody {
    #[serde(default)]
    reason: Option<String>,
}

const UNREGISTERED_REASONS: [&str; 2] = ["Unregistered", "BadDeviceToken"];

/// Generic HTTP push relay (an APNs/FCM gateway sitting in front of the
/// vendor service).
#[derive(Debug, Clone)]
pub struct HttpPush {
    client: reqwest::Client,
    endpoint: String,
    topic: Option<String>,
}

impl HttpPush {
    pub fn new(endpoint: impl Into<String>, topic: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build push http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            topic,
        })
    }
}

#[async_trait]
impl PushTransport for HttpPush {
    async fn deliver(
        &self,
        token: &str,
        push_type: PushType,
        report: &SmokeReport,
    ) -> Result<(), PushError> {
        let body = RelayRequest {
            push_type,
            topic: self.topic.as_deref(),
            aps: match push_type {
                PushType::Background => RelayAps {
                    content_available: Some(1),
                    alert: None,
                },
                PushType::Alert => RelayAps {
                    content_available: None,
                    alert: report.alert.as_deref(),
                },
            },
            data: report,
        };

        let resp = self
            .client
            .post(format!("{}/{}", self.endpoint, token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::GONE {
            return Err(PushError::Unregistered);
        }

        let reason = resp
            .json::<RelayErrorBody>()
            .await
            .unwrap_or_default()
            .reason;
        match reason {
            Some(r) if UNREGISTERED_REASONS.contains(&r.as_str()) => Err(PushError::Unregistered),
            Some(r) => Err(PushError::Rejected(format!("{status}: {r}"))),
            None => Err(PushError::Rejected(status.to_string())),
        }
    }
}

pub fn transport_from_config(cfg: &DaemonConfig) -> anyhow::Result<Arc<dyn PushTransport>> {
    match cfg.push.kind {
        PushKind::Log => Ok(Arc::new(LogPush)),
        PushKind::Http => {
            let endpoint = cfg
                .push
                .endpoint
                .clone()
                .context("push.endpoint is required when push.kind is http")?;
            Ok(Arc::new(HttpPush::new(endpoint, cfg.push.topic.clone())?))
        }
    }
}

/// First 8 characters only; tokens are credentials of a sort.
pub fn redact_token(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}…")
}
