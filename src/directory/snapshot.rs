use std::cell::RefCell;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{Directory, DirectoryError, DirectoryResult};
use crate::models::{Group, SkuPlans, User};

/// A captured tenant, as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub skus: Vec<SkuPlans>,
    /// Reject every removal instead of applying it to the in-memory copy.
    #[serde(default)]
    pub read_only: bool,
}

/// In-memory [`Directory`] backed by a [`Snapshot`].
///
/// Removals only change the in-memory copy; the file on disk is never rewritten.
#[derive(Debug)]
pub struct SnapshotDirectory {
    state: RefCell<Snapshot>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: RefCell::new(snapshot),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }
}

impl Directory for SnapshotDirectory {
    async fn get_user(&self, user_principal_name: &str) -> DirectoryResult<User> {
        self.state
            .borrow()
            .users
            .iter()
            .find(|u| u.user_principal_name.eq_ignore_ascii_case(user_principal_name))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("User {}", user_principal_name)))
    }

    async fn list_users(&self) -> DirectoryResult<Vec<User>> {
        Ok(self.state.borrow().users.clone())
    }

    async fn get_group(&self, group_id: &str) -> DirectoryResult<Group> {
        self.state
            .borrow()
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("Group {}", group_id)))
    }

    async fn sku_catalog(&self) -> DirectoryResult<Vec<SkuPlans>> {
        Ok(self.state.borrow().skus.clone())
    }

    async fn remove_license(&self, user: &User, sku: &str) -> DirectoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.read_only {
            return Err(DirectoryError::ReadOnly(format!(
                "cannot remove {} from {}",
                sku, user.user_principal_name
            )));
        }

        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| DirectoryError::NotFound(format!("User {}", user.id)))?;

        let index = stored
            .licenses
            .iter()
            .position(|l| l.sku == sku)
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("License {} on {}", sku, user.user_principal_name))
            })?;

        let license = &mut stored.licenses[index];
        if !license.is_direct(&user.id) {
            return Err(DirectoryError::Graph {
                code: "CannotRemoveInheritedLicense".to_string(),
                message: format!("{} is only assigned through groups", sku),
            });
        }

        license.assigned_by.retain(|id| id != &user.id);
        if license.assigned_by.is_empty() {
            stored.licenses.remove(index);
        }

        Ok(())
    }
}
