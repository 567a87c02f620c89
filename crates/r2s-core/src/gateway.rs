//! Gateways normalise collaborator replies into typed documents or a single
//! [`PipelineError`]. None of them retry and none of them return partial data.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::collaborator::{Allocator, InputPreparer, Postprocessor, SolveForm, Validator};
use crate::errors::PipelineError;
use crate::lenient;
use crate::model::{AllocationOutcome, PostprocessPayload, SolverInput, TimetableResult, ValidationRequest};

const PREPARE_FALLBACK: &str = "Failed to process files";
const ALLOCATE_FALLBACK: &str = "Posting allocator service failed unexpectedly.";
const POSTPROCESS_FALLBACK: &str = "Postprocess failed";

fn reported_success(reply: &Value) -> bool {
    reply.get("success").is_some_and(lenient::truthy)
}

/// The collaborator's own error string, if it gave a usable one.
fn reported_error(reply: &Value) -> Option<&str> {
    reply
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Accept a successful reply as `T`, or turn it into an upstream failure.
fn accept<T: DeserializeOwned>(stage: &'static str, reply: Value, fallback: &str) -> Result<T, PipelineError> {
    if !reported_success(&reply) {
        let message = reported_error(&reply).unwrap_or(fallback).to_string();
        warn!(stage, error = %message, "collaborator reported failure");
        return Err(PipelineError::Upstream(message));
    }
    serde_json::from_value(reply).map_err(|e| {
        warn!(stage, error = %e, "collaborator reply did not match contract");
        PipelineError::Upstream(format!("{stage} returned a malformed document: {e}"))
    })
}

#[derive(Clone)]
pub struct PreparationGateway {
    preparer: Arc<dyn InputPreparer>,
}

impl PreparationGateway {
    pub fn new(preparer: Arc<dyn InputPreparer>) -> Self {
        Self { preparer }
    }

    #[instrument(skip_all, fields(fields = form.fields.len(), files = form.files.len()))]
    pub async fn prepare(&self, form: SolveForm) -> Result<SolverInput, PipelineError> {
        let reply = self.preparer.prepare(form).await.map_err(|e| {
            warn!(stage = "preprocess", error = %e, "collaborator call failed");
            PipelineError::from(e)
        })?;
        accept("preprocess", reply, PREPARE_FALLBACK)
    }
}

#[derive(Clone)]
pub struct AllocationGateway {
    allocator: Arc<dyn Allocator>,
}

impl AllocationGateway {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }

    #[instrument(skip_all, fields(residents = input.context.residents.len(), max_time = ?input.max_time_in_minutes))]
    pub async fn allocate(&self, input: SolverInput) -> Result<AllocationOutcome, PipelineError> {
        let reply = self.allocator.allocate(input).await.map_err(|e| {
            warn!(stage = "allocation", error = %e, "collaborator call failed");
            PipelineError::from(e)
        })?;
        accept("allocation", reply, ALLOCATE_FALLBACK)
    }
}

#[derive(Clone)]
pub struct PostprocessGateway {
    postprocessor: Arc<dyn Postprocessor>,
}

impl PostprocessGateway {
    pub fn new(postprocessor: Arc<dyn Postprocessor>) -> Self {
        Self { postprocessor }
    }

    /// The only producer of [`TimetableResult`] documents.
    #[instrument(skip_all, fields(residents = payload.context.residents.len()))]
    pub async fn postprocess(&self, payload: PostprocessPayload) -> Result<TimetableResult, PipelineError> {
        let reply = self.postprocessor.postprocess(payload).await.map_err(|e| {
            warn!(stage = "postprocess", error = %e, "collaborator call failed");
            PipelineError::from(e)
        })?;
        accept("postprocess", reply, POSTPROCESS_FALLBACK)
    }
}

#[derive(Clone)]
pub struct ValidationGateway {
    validator: Arc<dyn Validator>,
}

impl ValidationGateway {
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self { validator }
    }

    /// `Ok(())` when the edit may proceed. A refusal carries the validator's
    /// reply unchanged so the caller sees every detail it reported.
    #[instrument(skip_all, fields(resident_mcr = %request.resident_mcr, slots = request.current_year.len()))]
    pub async fn validate(&self, request: ValidationRequest) -> Result<(), PipelineError> {
        let reply = self.validator.validate(request).await.map_err(|e| {
            warn!(stage = "validation", error = %e, "collaborator call failed");
            PipelineError::from(e)
        })?;
        if reported_success(&reply) {
            Ok(())
        } else {
            info!("manual edit rejected by validator");
            Err(PipelineError::ValidationRejected(reply))
        }
    }
}
