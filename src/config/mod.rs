//! Config data model: wire batches, rows, criteria, and provenance.
mod local_values;
mod models;

pub(crate) use local_values::load_local_values;
pub use models::*;
