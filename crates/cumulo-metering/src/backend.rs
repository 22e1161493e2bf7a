//! The control-plane query surface consumed by the accountant
//!
//! Both the real client and the simulated cloud implement this trait; the
//! accountant never learns which one it is talking to.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use cumulo_common::{Domain, Project, Result, ServerInfo, ServerUsage};

/// Read-only queries against a cloud control plane.
///
/// The contract is permissive: unknown project ids yield empty results, and
/// `get_domain` answers `None` for unknown domains. Errors are reserved for
/// transport failures and malformed payloads.
#[async_trait]
pub trait UsageBackend: Send + Sync {
    /// Project identity records, optionally filtered by domain id
    async fn list_projects(&self, domain_id: Option<&str>) -> Result<Vec<Project>>;

    /// Resolve a domain by name or id
    async fn get_domain(&self, name_or_id: &str) -> Result<Option<Domain>>;

    /// One usage record per machine of the project, evaluated against "now"
    /// at call time
    async fn tenant_usage(
        &self,
        project_id: &str,
        window_start: NaiveDateTime,
    ) -> Result<Vec<ServerUsage>>;

    /// Instance identity and metadata, independent of existence
    async fn server_inventory(&self, project_id: &str) -> Result<Vec<ServerInfo>>;
}
