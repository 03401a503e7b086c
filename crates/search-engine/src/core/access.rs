//! Authorization capability consumed by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Actions the engine asks permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessAction {
    /// Reading individual resources.
    Read,
    /// Searching a resource type, including chained sub-queries.
    Search,
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessAction::Read => f.write_str("read"),
            AccessAction::Search => f.write_str("search"),
        }
    }
}

/// A yes/no authorization decision made outside the engine.
pub trait AccessGuard: Send + Sync {
    /// Returns true if `action` is allowed on `resource_type`.
    fn is_allowed(&self, action: AccessAction, resource_type: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn is_allowed(&self, _action: AccessAction, _resource_type: &str) -> bool {
        true
    }
}
