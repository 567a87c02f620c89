use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::collaborator::{Allocator, InputPreparer, Postprocessor, SolveForm, Validator};
use crate::errors::PipelineError;
use crate::gateway::{AllocationGateway, PostprocessGateway, PreparationGateway, ValidationGateway};
use crate::model::{SolverInput, TimetableResult};
use crate::reconcile::{apply_edit, assemble_payload, SaveRequest};

/// The set of external collaborators a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub preparer: Arc<dyn InputPreparer>,
    pub allocator: Arc<dyn Allocator>,
    pub postprocessor: Arc<dyn Postprocessor>,
    pub validator: Arc<dyn Validator>,
}

/// Stateless revision pipeline. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    preparation: PreparationGateway,
    allocation: AllocationGateway,
    postprocess: PostprocessGateway,
    validation: ValidationGateway,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            preparation: PreparationGateway::new(collaborators.preparer),
            allocation: AllocationGateway::new(collaborators.allocator),
            postprocess: PostprocessGateway::new(collaborators.postprocessor),
            validation: ValidationGateway::new(collaborators.validator),
        }
    }

    /// Solve from a raw form: prepare the input, then [`Pipeline::solve`].
    #[instrument(skip_all, fields(files = form.files.len()))]
    pub async fn solve_form(&self, form: SolveForm) -> Result<TimetableResult, PipelineError> {
        let input = self.preparation.prepare(form).await?;
        self.solve(input).await
    }

    /// Allocate, then postprocess the echoed base input with the solution.
    #[instrument(skip_all, fields(residents = input.context.residents.len()))]
    pub async fn solve(&self, input: SolverInput) -> Result<TimetableResult, PipelineError> {
        let outcome = self.allocation.allocate(input).await?;
        let payload = assemble_payload(outcome.context, Some(outcome.solver_solution));
        let result = self.postprocess.postprocess(payload).await?;
        info!(residents = result.context.residents.len(), "solve completed");
        Ok(result)
    }

    /// Validate a manual edit, merge it into the context, and postprocess.
    /// Nothing is merged unless the validator accepts the edit.
    #[instrument(skip_all, fields(resident_mcr = %request.resident_mcr, slots = request.current_year.len()))]
    pub async fn save(&self, request: SaveRequest) -> Result<TimetableResult, PipelineError> {
        self.validation.validate(request.validation_request()).await?;

        let context = apply_edit(&request.context, &request.resident_mcr, &request.current_year);
        let result = self
            .postprocess
            .postprocess(assemble_payload(context, None))
            .await
            .inspect_err(|e| warn!(error_kind = e.error_kind(), "save postprocess failed"))?;
        info!("manual edit applied");
        Ok(result)
    }
}
