//! Shared response envelope for API handlers.
//!
//! JSON endpoints under `/api/v1` answer with `{ "data": ... }`.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
