//! Multipart solve form collection.

use axum::extract::Multipart;

use r2s_core::collaborator::{FormFile, SolveForm};

use crate::error::ApiError;

/// Read every part of a multipart body. Parts with a file name are uploads;
/// the rest are text fields. Unnamed parts are dropped.
pub async fn collect(mut multipart: Multipart) -> Result<SolveForm, ApiError> {
    let mut form = SolveForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_owned);
        let content = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid form field {name}: {}", e.body_text())))?;

        match file_name {
            Some(file_name) => {
                form.files.insert(
                    name,
                    FormFile {
                        file_name: Some(file_name),
                        content,
                    },
                );
            }
            None => {
                form.fields.insert(name, content);
            }
        }
    }
    Ok(form)
}
