// src/remote/client.rs
//
// Stateless request/response wrapper around the remote decompilation
// service. One HTTP exchange per call, no retries: a transport error or a
// non-2xx response surfaces to the orchestrator, which decides whether the
// job aborts.

use std::collections::HashMap;

use reqwest::header::CONTENT_TYPE;
use reqwest::{multipart, Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::RdecError;
use crate::remote::request::JobRequest;

/// Public endpoint of the RetDec decompilation API.
pub const DEFAULT_API_URL: &str = "https://retdec.com/service/api/decompiler/decompilations";

/// Artifact kind carrying the high-level-language output.
pub const HLL_ARTIFACT: &str = "hll";

/// Service-assigned identity of a submitted job. Opaque: the URLs come from
/// the service and are never constructed locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub status_url: String,
    pub outputs_url: String,
}

/// Transient snapshot of a job's remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Finished { succeeded: bool },
}

/// Response body after content negotiation: JSON if the service declared it,
/// raw text otherwise. Callers know which they expect per endpoint.
#[derive(Debug)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct SubmitLinks {
    status: String,
    outputs: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
    links: SubmitLinks,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    finished: bool,
    #[serde(default)]
    succeeded: bool,
}

#[derive(Debug, Deserialize)]
struct OutputsResponse {
    links: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RemoteJobClient {
    http: Client,
    api_url: String,
    api_key: String,
}

impl RemoteJobClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RdecError> {
        let api_url = api_url.into();
        let http = Client::builder().build().map_err(|e| RdecError::Http {
            url: api_url.clone(),
            source: e,
        })?;
        Ok(Self {
            http,
            api_url,
            api_key: api_key.into(),
        })
    }

    /// Submit one job: the configuration fields as multipart text parts plus
    /// the binary `input` file part.
    pub async fn submit(
        &self,
        request: &JobRequest,
        input: Vec<u8>,
    ) -> Result<JobHandle, RdecError> {
        let mut form = multipart::Form::new();
        for (name, value) in request.form_fields() {
            form = form.text(name, value);
        }
        form = form.part(
            "input",
            multipart::Part::bytes(input).file_name(request.input_name.clone()),
        );

        let body = self
            .exchange(Method::POST, &self.api_url, Some(form))
            .await?;
        let resp: SubmitResponse = expect_json(body)?;
        debug!("job '{}' accepted by remote service", resp.id);
        Ok(JobHandle {
            id: resp.id,
            status_url: resp.links.status,
            outputs_url: resp.links.outputs,
        })
    }

    pub async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus, RdecError> {
        let body = self.exchange(Method::GET, &handle.status_url, None).await?;
        let resp: StatusResponse = expect_json(body)?;
        Ok(if resp.finished {
            JobStatus::Finished {
                succeeded: resp.succeeded,
            }
        } else {
            JobStatus::Pending
        })
    }

    /// Mapping of artifact kind to download URL for a finished job.
    pub async fn list_artifacts(
        &self,
        handle: &JobHandle,
    ) -> Result<HashMap<String, String>, RdecError> {
        debug!("downloading output list from '{}'", handle.outputs_url);
        let body = self
            .exchange(Method::GET, &handle.outputs_url, None)
            .await?;
        let resp: OutputsResponse = expect_json(body)?;
        Ok(resp.links)
    }

    /// Fetch one artifact body. The pseudocode artifact is plain text; a
    /// JSON body is rendered back to its source text.
    pub async fn fetch_artifact(&self, url: &str) -> Result<String, RdecError> {
        match self.exchange(Method::GET, url, None).await? {
            ApiBody::Text(t) => Ok(t),
            ApiBody::Json(v) => Ok(v.to_string()),
        }
    }

    async fn exchange(
        &self,
        method: Method,
        url: &str,
        form: Option<multipart::Form>,
    ) -> Result<ApiBody, RdecError> {
        debug!("sending {} request to '{}'", method, url);
        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.api_key, Some(""));
        if let Some(form) = form {
            builder = builder.multipart(form);
        }

        let resp = builder.send().await.map_err(|e| RdecError::Http {
            url: url.to_string(),
            source: e,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .unwrap_or("unknown reason")
                .to_string();
            error!(
                "unexpected HTTP response code: received {}: {}",
                status.as_u16(),
                reason
            );
            debug!("{}", resp.text().await.unwrap_or_default());
            return Err(RdecError::RemoteFailure {
                status: status.as_u16(),
                reason,
            });
        }

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let value = resp.json::<Value>().await.map_err(|e| RdecError::Http {
                url: url.to_string(),
                source: e,
            })?;
            Ok(ApiBody::Json(value))
        } else {
            let text = resp.text().await.map_err(|e| RdecError::Http {
                url: url.to_string(),
                source: e,
            })?;
            Ok(ApiBody::Text(text))
        }
    }
}

fn expect_json<T: DeserializeOwned>(body: ApiBody) -> Result<T, RdecError> {
    match body {
        ApiBody::Json(v) => serde_json::from_value(v).map_err(|e| RdecError::Parse(e.to_string())),
        ApiBody::Text(_) => Err(RdecError::Parse(
            "expected a JSON response body".to_string(),
        )),
    }
}
