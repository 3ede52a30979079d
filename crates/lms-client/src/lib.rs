use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use lms_host_traits::session::{
    ConnectorInner, Error, ErrorCode, Namespace, Session, SessionInner,
};

pub const DEFAULT_HOST: &str = "localhost:1234";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MODELS_PATH: &str = "api/v0/models";
const UNLOAD_PATH: &str = "api/v1/models/unload";

pub struct LmStudioConnectorBuilder {
    host: String,
    timeout: Duration,
}

impl Default for LmStudioConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LmStudioConnectorBuilder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `host[:port]` or a full `http(s)://` URL.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<LmStudioConnector> {
        Ok(LmStudioConnector {
            base_url: parse_base_url(&self.host)?,
            timeout: self.timeout,
        })
    }
}

/// Opens sessions against the REST API of a local LM Studio server.
#[derive(Debug, Clone)]
pub struct LmStudioConnector {
    base_url: Url,
    timeout: Duration,
}

impl LmStudioConnector {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl ConnectorInner for LmStudioConnector {
    async fn connect(&self) -> Result<Session, Error> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| Error::new(ErrorCode::RuntimeError, err))?;

        let url = endpoint(&self.base_url, MODELS_PATH)?;
        log::debug!("Connecting to {}", url);

        let response = http.get(url).send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Error::msg(
                ErrorCode::RuntimeError,
                format!(
                    "{} did not answer the model listing: HTTP {}",
                    self.base_url,
                    response.status()
                ),
            ));
        }

        log::info!("Connected to model host at {}", self.base_url);
        let session: Box<dyn SessionInner> = Box::new(LmStudioSession {
            http,
            base_url: self.base_url.clone(),
            closed: AtomicBool::new(false),
        });
        Ok(session.into())
    }
}

struct LmStudioSession {
    http: reqwest::Client,
    base_url: Url,
    closed: AtomicBool,
}

/// Model entry as reported by `GET /api/v0/models/{id}`.
#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(rename = "type")]
    model_type: String,
    #[serde(default)]
    state: String,
}

impl LmStudioSession {
    async fn describe(&self, identifier: &str) -> Result<ModelEntry, Error> {
        let mut url = endpoint(&self.base_url, MODELS_PATH)?;
        url.path_segments_mut()
            .map_err(|_| Error::msg(ErrorCode::InvalidModelName, "host URL cannot take a path"))?
            .pop_if_empty()
            .push(identifier);

        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::msg(
                ErrorCode::ModelNotFound,
                format!("no model '{}' on the host", identifier),
            ));
        }
        if !status.is_success() {
            return Err(Error::msg(
                ErrorCode::RuntimeError,
                format!("looking up '{}' failed: HTTP {}", identifier, status),
            ));
        }

        response
            .json::<ModelEntry>()
            .await
            .map_err(|err| Error::new(ErrorCode::RuntimeError, err))
    }
}

#[async_trait]
impl SessionInner for LmStudioSession {
    async fn unload(&self, namespace: Namespace, identifier: &str) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::msg(ErrorCode::ConnectionFailed, "session is closed"));
        }
        if identifier.trim().is_empty() {
            return Err(Error::msg(
                ErrorCode::InvalidModelName,
                "model identifier is empty",
            ));
        }

        let entry = self.describe(identifier).await?;
        if !namespace.accepts(&entry.model_type) {
            return Err(Error::msg(
                ErrorCode::ModelNotFound,
                format!(
                    "'{}' is a {} model, not visible in the {} namespace",
                    entry.id, entry.model_type, namespace
                ),
            ));
        }
        if entry.state != "loaded" {
            return Err(Error::msg(
                ErrorCode::ModelNotFound,
                format!("'{}' is {}", entry.id, entry.state),
            ));
        }

        let url = endpoint(&self.base_url, UNLOAD_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "instance_id": identifier }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // Someone else unloaded it between the lookup and the request
            return Err(Error::msg(
                ErrorCode::ModelNotFound,
                format!("'{}' was unloaded concurrently", identifier),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::msg(
                ErrorCode::RuntimeError,
                format!("unloading '{}' failed: HTTP {} {}", identifier, status, body),
            ));
        }

        log::debug!("Host unloaded {} model '{}'", namespace, identifier);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Closing session to {}", self.base_url);
        }
    }
}

fn parse_base_url(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(anyhow!("model host is empty"));
    }

    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    let mut url = Url::parse(&raw).map_err(|err| anyhow!("invalid model host '{}': {}", host, err))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("unsupported scheme '{}' for model host", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, Error> {
    base_url
        .join(path)
        .map_err(|err| Error::new(ErrorCode::RuntimeError, err))
}

fn transport_error(err: reqwest::Error) -> Error {
    let code = if err.is_timeout() {
        ErrorCode::Timeout
    } else if err.is_connect() {
        ErrorCode::ConnectionFailed
    } else {
        ErrorCode::RuntimeError
    };
    Error::new(code, err)
}
