//! Service configuration.
//!
//! Settings come from an optional YAML file and are then overridden by environment variables, so
//! a deployment can ship one static file and inject the queue URL at runtime.

use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

use crate::{pipeline::QueueTarget, queue::QueueSettings};

/// ElasticMQ endpoint used when running offline.
pub const LOCAL_QUEUE_ENDPOINT: &str = "http://127.0.0.1:9324";

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_message_group_id() -> String {
    "SendGridEvents".to_string()
}

fn default_max_body_bytes() -> usize {
    6 * 1024 * 1024
}

fn default_app_name() -> String {
    "nexus-sendgrid-hook".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnv {
    #[default]
    Local,
    Dev,
    Staging,
    Prod,
    Test,
}

impl FromStr for DeploymentEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => anyhow::bail!("unknown deployment environment: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Top-level service configuration.
pub struct HookConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    /// FIFO queue receiving normalized events. Required.
    pub queue_url: Option<String>,

    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    #[serde(default)]
    pub deployment_env: DeploymentEnv,

    #[serde(default)]
    /// Explicit queue endpoint. Takes precedence over the local ElasticMQ default.
    pub endpoint_url: Option<String>,

    #[serde(default = "default_message_group_id")]
    /// `MessageGroupId` shared by every queued event.
    pub message_group_id: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_app_name")]
    /// Application name reported in the SDK user agent.
    pub app_name: String,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            queue_url: None,
            aws_region: default_aws_region(),
            deployment_env: DeploymentEnv::default(),
            endpoint_url: None,
            message_group_id: default_message_group_id(),
            max_body_bytes: default_max_body_bytes(),
            app_name: default_app_name(),
        }
    }
}

impl HookConfig {
    /// Parse a YAML config from bytes.
    pub fn from_yaml_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env(
        mut self,
        mut lookup: impl FnMut(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(v) = lookup("LISTEN_ADDR") {
            self.listen_addr = v
                .parse()
                .map_err(|err| anyhow::anyhow!("invalid LISTEN_ADDR ({v}): {err}"))?;
        }
        if let Some(v) = lookup("SENDGRID_EVENTS_QUEUE_URL") {
            self.queue_url = Some(v);
        }
        if let Some(v) = lookup("CURRENT_AWS_REGION") {
            self.aws_region = v;
        }
        if let Some(v) = lookup("DEPLOYMENT_ENV") {
            self.deployment_env = v.parse()?;
        }
        if let Some(v) = lookup("SQS_ENDPOINT_URL") {
            self.endpoint_url = Some(v);
        }
        if let Some(v) = lookup("SENDGRID_EVENTS_GROUP_ID") {
            self.message_group_id = v;
        }
        if let Some(v) = lookup("MAX_BODY_BYTES") {
            self.max_body_bytes = v
                .parse()
                .with_context(|| format!("invalid MAX_BODY_BYTES ({v})"))?;
        }
        Ok(self)
    }

    /// Load from an optional YAML file, then apply the process environment.
    pub async fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let base = match path {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("read config {path}"))?;
                Self::from_yaml_bytes(&bytes).with_context(|| format!("parse config {path}"))?
            }
            None => Self::default(),
        };
        let cfg = base.apply_env(|name| std::env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.queue_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {}
            _ => anyhow::bail!("missing queue url (set queue_url or SENDGRID_EVENTS_QUEUE_URL)"),
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than zero");
        }
        if self.message_group_id.is_empty() {
            anyhow::bail!("message_group_id must not be empty");
        }
        Ok(())
    }

    /// Endpoint the queue client should talk to, if not the SDK default.
    pub fn resolved_endpoint_url(&self) -> Option<String> {
        match (&self.endpoint_url, self.deployment_env) {
            (Some(url), _) => Some(url.clone()),
            (None, DeploymentEnv::Local) => Some(LOCAL_QUEUE_ENDPOINT.to_string()),
            (None, _) => None,
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            region: self.aws_region.clone(),
            endpoint_url: self.resolved_endpoint_url(),
            app_name: self.app_name.clone(),
        }
    }

    pub fn queue_target(&self) -> anyhow::Result<QueueTarget> {
        let queue_url = self
            .queue_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .context("missing queue url")?;
        Ok(QueueTarget {
            queue_url,
            group_id: self.message_group_id.clone(),
        })
    }

    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        match self.deployment_env {
            DeploymentEnv::Prod => "info",
            _ => "sendgrid_hook=debug,info",
        }
    }
}
