//! Transport to the external timetable collaborators.

mod http;
pub mod mock;

pub use http::{build_client, HttpCollaborator, Unconfigured};

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use r2s_core::{CollaboratorError, Collaborators};
use r2s_settings::CollaboratorSettings;

/// Wire every collaborator from settings. Unset endpoints become
/// [`Unconfigured`] collaborators that fail each call.
pub fn build_collaborators(settings: &CollaboratorSettings) -> Result<Collaborators, CollaboratorError> {
    let client = build_client(Duration::from_secs(settings.timeout_secs))?;

    let endpoint = |name: &'static str, url: &Option<String>| -> Option<HttpCollaborator> {
        match url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => {
                let collaborator = HttpCollaborator::new(name, url, client.clone());
                info!(collaborator = collaborator.name(), endpoint = collaborator.endpoint(), "collaborator configured");
                Some(collaborator)
            }
            None => {
                warn!(collaborator = name, "collaborator endpoint not configured");
                None
            }
        }
    };

    Ok(Collaborators {
        preparer: match endpoint("preprocess", &settings.preprocess_url) {
            Some(c) => Arc::new(c),
            None => Arc::new(Unconfigured("preprocess")),
        },
        allocator: match endpoint("allocation", &settings.allocation_url) {
            Some(c) => Arc::new(c),
            None => Arc::new(Unconfigured("allocation")),
        },
        postprocessor: match endpoint("postprocess", &settings.postprocess_url) {
            Some(c) => Arc::new(c),
            None => Arc::new(Unconfigured("postprocess")),
        },
        validator: match endpoint("validation", &settings.validation_url) {
            Some(c) => Arc::new(c),
            None => Arc::new(Unconfigured("validation")),
        },
    })
}
