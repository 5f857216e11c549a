#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Admission control rejected the work (e.g. queue full).
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
