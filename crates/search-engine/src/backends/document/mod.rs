//! Document-store backend producing Elasticsearch Query DSL.
//!
//! Each resource is indexed as one document:
//!
//! ```text
//! {
//!   "resource_type": "Observation",
//!   "resource_id": "o1",
//!   "search_params": [
//!     { "name": "subject", "reference_type": "Patient", "reference_id": "p1" },
//!     { "name": "code-value-quantity",
//!       "components": [ { "component_index": 0, "token_code": "8480-6" }, ... ] }
//!   ],
//!   "compartments": { "Patient": ["p1"] }
//! }
//! ```
//!
//! `search_params` and `search_params.components` must be mapped as `nested`.
//! The backend has no joins; [`DocumentSearchPlanner`] resolves chains through
//! sub-queries before compiling.

mod compiler;
mod planner;

pub use compiler::{COMPONENTS_PATH, DocumentQueryCompiler, DocumentScope, SEARCH_PARAMS_PATH, field_key};
pub use planner::{DocumentQuery, DocumentSearchPlanner, build_query};
