/// Failure talking to an external collaborator (as opposed to the collaborator
/// answering `success: false`, which is a normal reply).
#[derive(Clone, Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} collaborator is not configured")]
    Unconfigured(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("collaborator returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed collaborator reply: {0}")]
    Decode(String),
}

/// Terminal outcome of a solve or save request. The pipeline either completes
/// fully or fails with exactly one of these.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or malformed caller input.
    #[error("{0}")]
    BadRequest(String),
    /// The validator refused the edit; carries its reply verbatim.
    #[error("validation rejected")]
    ValidationRejected(serde_json::Value),
    /// A collaborator failed or reported failure.
    #[error("{0}")]
    Upstream(String),
}

impl PipelineError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::ValidationRejected(_) => "validation_rejected",
            Self::Upstream(_) => "upstream_failure",
        }
    }
}

impl From<CollaboratorError> for PipelineError {
    fn from(e: CollaboratorError) -> Self {
        Self::Upstream(e.to_string())
    }
}
