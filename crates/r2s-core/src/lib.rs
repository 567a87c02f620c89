pub mod collaborator;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod lenient;
pub mod model;
pub mod pipeline;
pub mod reconcile;

pub use errors::{CollaboratorError, PipelineError};
pub use model::{Context, HistoryEntry, Resident, TimetableResult};
pub use pipeline::{Collaborators, Pipeline};
