//! Project and domain identity records

use serde::{Deserialize, Serialize};

/// A domain resolved by name or id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
}

/// Tenant identity as reported by the backend.
///
/// Synthetic sub-projects produced by grouping share the parent's id and
/// domain but carry the grouping tag value as their name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub domain_name: String,
}

impl Project {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        domain_id: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain_id: domain_id.into(),
            domain_name: domain_name.into(),
        }
    }

    /// Derive the synthetic sub-project for one grouping-tag value
    pub fn synthetic(&self, tag_value: &str) -> Project {
        Project {
            id: self.id.clone(),
            name: tag_value.to_string(),
            domain_id: self.domain_id.clone(),
            domain_name: self.domain_name.clone(),
        }
    }
}
