//! Request handlers, one module per resource. Route wiring lives in
//! [`crate::routes`].

pub mod images;
pub mod providers;
pub mod tasks;
