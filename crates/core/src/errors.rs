use thiserror::Error;

use crate::domain::draft::DraftStatus;

/// Violations of the draft lifecycle. Infrastructure failures stay in their
/// own layers (repository, facade, HTTP); this is the only error core
/// itself produces.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid draft transition from {from} to {to}")]
    InvalidDraftTransition { from: DraftStatus, to: DraftStatus },
}
