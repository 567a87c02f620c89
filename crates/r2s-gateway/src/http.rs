use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use r2s_core::collaborator::{Allocator, InputPreparer, Postprocessor, SolveForm, Validator};
use r2s_core::model::{PostprocessPayload, SolverInput, ValidationRequest};
use r2s_core::CollaboratorError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest error body kept in a [`CollaboratorError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Build the shared client used by every HTTP collaborator.
pub fn build_client(timeout: Duration) -> Result<Client, CollaboratorError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| CollaboratorError::Transport(format!("failed to build HTTP client: {e}")))
}

/// A collaborator reached by POSTing a JSON document to one endpoint.
///
/// Implements every collaborator trait; each configured endpoint gets its own
/// instance.
#[derive(Clone, Debug)]
pub struct HttpCollaborator {
    name: &'static str,
    endpoint: String,
    client: Client,
}

impl HttpCollaborator {
    pub fn new(name: &'static str, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            name,
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip_all, fields(collaborator = self.name))]
    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<Value, CollaboratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "request timed out".to_string() } else { e.to_string() };
                warn!(endpoint = %self.endpoint, error = %reason, "collaborator request failed");
                CollaboratorError::Transport(reason)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = text.len(), "collaborator replied");

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| CollaboratorError::Decode(e.to_string()));
        }

        // A failing status that still carries a reply document is a normal
        // `success: false` reply, not a transport failure.
        match serde_json::from_str::<Value>(&text) {
            Ok(reply) if reply.get("success").is_some() => Ok(reply),
            _ => Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            }),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[async_trait]
impl InputPreparer for HttpCollaborator {
    async fn prepare(&self, form: SolveForm) -> Result<Value, CollaboratorError> {
        self.post(&form).await
    }
}

#[async_trait]
impl Allocator for HttpCollaborator {
    async fn allocate(&self, input: SolverInput) -> Result<Value, CollaboratorError> {
        self.post(&input).await
    }
}

#[async_trait]
impl Postprocessor for HttpCollaborator {
    async fn postprocess(&self, payload: PostprocessPayload) -> Result<Value, CollaboratorError> {
        self.post(&payload).await
    }
}

#[async_trait]
impl Validator for HttpCollaborator {
    async fn validate(&self, request: ValidationRequest) -> Result<Value, CollaboratorError> {
        self.post(&request).await
    }
}

/// Stands in for a collaborator whose endpoint was never configured.
#[derive(Clone, Copy, Debug)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl InputPreparer for Unconfigured {
    async fn prepare(&self, _form: SolveForm) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::Unconfigured(self.0))
    }
}

#[async_trait]
impl Allocator for Unconfigured {
    async fn allocate(&self, _input: SolverInput) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::Unconfigured(self.0))
    }
}

#[async_trait]
impl Postprocessor for Unconfigured {
    async fn postprocess(&self, _payload: PostprocessPayload) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::Unconfigured(self.0))
    }
}

#[async_trait]
impl Validator for Unconfigured {
    async fn validate(&self, _request: ValidationRequest) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::Unconfigured(self.0))
    }
}
