use domains::{DomainError, Result, StorageError, StorageResult};
use tracing::error;
use uuid::Uuid;

/// Translates port failures that have no operation-specific meaning.
///
/// A vanished row becomes `NotFound`; anything else is logged and wrapped so
/// driver details never cross the core boundary.
pub(crate) fn storage_failure(context: &'static str, err: StorageError) -> DomainError {
    match err {
        StorageError::NotFound { entity, id } => DomainError::not_found(entity, id),
        other => {
            error!(error = %other, context, "storage failure");
            DomainError::Internal(format!("{context} failed"))
        }
    }
}

pub(crate) trait StorageResultExt<T> {
    fn or_internal(self, context: &'static str) -> Result<T>;
}

impl<T> StorageResultExt<T> for StorageResult<T> {
    fn or_internal(self, context: &'static str) -> Result<T> {
        self.map_err(|e| storage_failure(context, e))
    }
}

pub(crate) fn parse_id(raw: &str, what: &'static str) -> Result<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DomainError::Validation(format!("{what} is required")));
    }
    Uuid::parse_str(raw).map_err(|_| DomainError::Validation(format!("{what} is not a valid identifier: {raw}")))
}

/// Trims and rejects blank text.
pub(crate) fn non_empty(text: &str, what: &'static str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}
