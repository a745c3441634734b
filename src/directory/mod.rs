//! Access to the tenant directory: users, groups, the SKU catalog and license removal.
//!
//! - [`graph`]: Microsoft Graph over HTTPS with client-credentials auth.
//! - [`snapshot`]: an in-memory tenant loaded from a JSON file, for offline audits.
//!
//! Every call is awaited on its own; nothing here retries.

use thiserror::Error;

use crate::models::{Group, SkuPlans, User};

pub mod graph;
pub mod snapshot;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Graph API error: {code} - {message}")]
    Graph { code: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory is read-only: {0}")]
    ReadOnly(String),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }
}

/// The directory/licensing service the tools audit.
#[allow(async_fn_in_trait)]
pub trait Directory {
    /// Fetch one user, including per-plan provisioning status.
    async fn get_user(&self, user_principal_name: &str) -> DirectoryResult<User>;

    /// Enumerate every user. Provisioning status may be left empty.
    async fn list_users(&self) -> DirectoryResult<Vec<User>>;

    async fn get_group(&self, group_id: &str) -> DirectoryResult<Group>;

    /// Every SKU the tenant subscribes to, with its full plan list.
    async fn sku_catalog(&self) -> DirectoryResult<Vec<SkuPlans>>;

    async fn remove_license(&self, user: &User, sku: &str) -> DirectoryResult<()>;
}
