//! Deterministic in-process collaborators for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use r2s_core::collaborator::{Allocator, InputPreparer, Postprocessor, SolveForm, Validator};
use r2s_core::model::{PostprocessPayload, SolverInput, ValidationRequest};
use r2s_core::CollaboratorError;

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, CollaboratorError> {
    serde_json::to_value(value).map_err(|e| CollaboratorError::Decode(e.to_string()))
}

/// Answers every call with the same reply document.
#[derive(Clone, Debug)]
pub struct FixedReply {
    reply: Value,
    calls: Arc<AtomicUsize>,
}

impl FixedReply {
    pub fn new(reply: Value) -> Self {
        Self {
            reply,
            calls: Default::default(),
        }
    }

    /// `{success: false, error}`.
    pub fn failure(error: &str) -> Self {
        Self::new(json!({"success": false, "error": error}))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn answer(&self) -> Result<Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl InputPreparer for FixedReply {
    async fn prepare(&self, _form: SolveForm) -> Result<Value, CollaboratorError> {
        self.answer()
    }
}

#[async_trait]
impl Allocator for FixedReply {
    async fn allocate(&self, _input: SolverInput) -> Result<Value, CollaboratorError> {
        self.answer()
    }
}

#[async_trait]
impl Postprocessor for FixedReply {
    async fn postprocess(&self, _payload: PostprocessPayload) -> Result<Value, CollaboratorError> {
        self.answer()
    }
}

#[async_trait]
impl Validator for FixedReply {
    async fn validate(&self, _request: ValidationRequest) -> Result<Value, CollaboratorError> {
        self.answer()
    }
}

/// Echoes the allocation input back with a fixed `solver_solution`.
#[derive(Debug, Default)]
pub struct EchoAllocator {
    inputs: Mutex<Vec<Value>>,
}

impl EchoAllocator {
    /// Every input received, serialized.
    pub fn inputs(&self) -> Vec<Value> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Allocator for EchoAllocator {
    async fn allocate(&self, input: SolverInput) -> Result<Value, CollaboratorError> {
        let mut reply = encode(&input)?;
        self.inputs.lock().push(reply.clone());
        reply["success"] = json!(true);
        reply["solver_solution"] = json!({"status": "OPTIMAL", "objective": 0});
        Ok(reply)
    }
}

/// Scores resident `i` as `i + 1` and echoes the payload as the result.
#[derive(Debug, Default)]
pub struct ScoringPostprocessor {
    payloads: Mutex<Vec<Value>>,
}

impl ScoringPostprocessor {
    /// Every payload received, serialized.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().clone()
    }
}

#[async_trait]
impl Postprocessor for ScoringPostprocessor {
    async fn postprocess(&self, payload: PostprocessPayload) -> Result<Value, CollaboratorError> {
        let mut reply = encode(&payload)?;
        self.payloads.lock().push(reply.clone());
        let scores: Vec<usize> = (1..=payload.context.residents.len()).collect();
        reply["success"] = json!(true);
        reply["optimisation_scores"] = json!(scores);
        if reply.get("solver_solution").is_none() {
            reply["solver_solution"] = Value::Null;
        }
        Ok(reply)
    }
}

/// Accepts or rejects every edit, recording what it was asked.
#[derive(Debug)]
pub struct StubValidator {
    reply: Value,
    requests: Mutex<Vec<Value>>,
}

impl StubValidator {
    pub fn accepting() -> Self {
        Self::replying(json!({"success": true}))
    }

    /// Reject with `detail` merged into a `{success: false}` reply.
    pub fn rejecting(detail: Value) -> Self {
        let mut reply = json!({"success": false});
        if let (Some(target), Value::Object(extra)) = (reply.as_object_mut(), detail) {
            target.extend(extra);
        }
        Self::replying(reply)
    }

    fn replying(reply: Value) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Validator for StubValidator {
    async fn validate(&self, request: ValidationRequest) -> Result<Value, CollaboratorError> {
        self.requests.lock().push(encode(&request)?);
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_reply_counts_calls() {
        let fixed = FixedReply::failure("boom");
        let reply = Allocator::allocate(&fixed, SolverInput::default()).await.unwrap();
        assert_eq!(reply["error"], "boom");
        let clone = fixed.clone();
        Validator::validate(&clone, ValidationRequest::default()).await.unwrap();
        assert_eq!(fixed.call_count(), 2);
    }

    #[tokio::test]
    async fn echo_allocator_records_inputs() {
        let allocator = EchoAllocator::default();
        let input: SolverInput =
            serde_json::from_value(json!({"residents": [{"mcr": "A"}], "max_time_in_minutes": 2})).unwrap();
        let reply = allocator.allocate(input).await.unwrap();
        assert_eq!(reply["solver_solution"]["status"], "OPTIMAL");
        assert_eq!(reply["residents"], json!([{"mcr": "A"}]));

        let inputs = allocator.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0]["max_time_in_minutes"], 2.0);
    }

    #[tokio::test]
    async fn scoring_postprocessor_scores_by_position() {
        let scorer = ScoringPostprocessor::default();
        let payload: PostprocessPayload =
            serde_json::from_value(json!({"residents": [{"mcr": "A"}, {"mcr": "B"}]})).unwrap();
        let reply = scorer.postprocess(payload).await.unwrap();
        assert_eq!(reply["optimisation_scores"].to_string(), "[1,2]");
        assert_eq!(scorer.payloads().len(), 1);
    }

    #[tokio::test]
    async fn rejecting_validator_merges_detail() {
        let validator = StubValidator::rejecting(json!({"errors": ["too many ED blocks"]}));
        let reply = validator.validate(ValidationRequest::default()).await.unwrap();
        assert_eq!(reply, json!({"success": false, "errors": ["too many ED blocks"]}));
        assert_eq!(validator.requests().len(), 1);
    }
}
