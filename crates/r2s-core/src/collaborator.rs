//! Seams to the external collaborators.
//!
//! Each collaborator has one operation and answers with a raw reply document
//! of the shape `{success, error?, ...data}`. Interpreting that shape is the
//! job of [`crate::gateway`]; implementations only move documents. Every
//! operation takes its request by value so the collaborator owns what it sees.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CollaboratorError;
use crate::model::{PostprocessPayload, SolverInput, ValidationRequest};

/// Raw solve form: text fields and uploaded files keyed by form field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveForm {
    pub fields: BTreeMap<String, String>,
    pub files: BTreeMap<String, FormFile>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub content: String,
}

impl SolveForm {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// Turns raw form input into a normalised [`SolverInput`] document.
#[async_trait]
pub trait InputPreparer: Send + Sync {
    async fn prepare(&self, form: SolveForm) -> Result<Value, CollaboratorError>;
}

/// Computes posting assignments.
#[async_trait]
pub trait Allocator: Send + Sync {
    async fn allocate(&self, input: SolverInput) -> Result<Value, CollaboratorError>;
}

/// Derives scores and the final result document.
#[async_trait]
pub trait Postprocessor: Send + Sync {
    async fn postprocess(&self, payload: PostprocessPayload) -> Result<Value, CollaboratorError>;
}

/// Checks a proposed manual edit against the domain rules.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, request: ValidationRequest) -> Result<Value, CollaboratorError>;
}
