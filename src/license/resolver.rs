use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::Serialize;

use crate::directory::Directory;
use crate::license::catalog::SkuCatalog;
use crate::models::User;

/// One licensing group: its display name and, per SKU, the plans it disables.
#[derive(Debug, Clone, Default, PartialEq)]
struct GroupPlans {
    name: String,
    skus: BTreeMap<String, BTreeSet<String>>,
}

/// `GroupId → (name, SkuId → disabled plans)` for every group that licenses a user.
///
/// Display names are not unique in a tenant, so groups are keyed by object id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupPlanTable {
    groups: BTreeMap<String, GroupPlans>,
}

/// A group that could not be read. Its SKUs are treated as not assigned by it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLookupFailure {
    pub group_id: String,
    pub message: String,
}

impl GroupPlanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that group `id` (named `name`) assigns `sku` with `disabled` plans switched off.
    pub fn insert<I, S>(&mut self, id: &str, name: &str, sku: &str, disabled: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = self.groups.entry(id.to_string()).or_default();
        group.name = name.to_string();
        group
            .skus
            .entry(sku.to_string())
            .or_default()
            .extend(disabled.into_iter().map(Into::into));
    }

    /// Output name of a group: its display name, or `Name (id)` when another
    /// group in the table has the same display name.
    fn label(&self, id: &str, group: &GroupPlans) -> String {
        let shared = self
            .groups
            .iter()
            .any(|(other_id, other)| other_id != id && other.name == group.name);
        if shared {
            format!("{} ({})", group.name, id)
        } else {
            group.name.clone()
        }
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(|(id, group)| self.label(id, group))
            .collect()
    }

    /// Groups that assign `sku`, by output name, with the plans each one disables.
    pub fn groups_assigning<'a>(
        &'a self,
        sku: &'a str,
    ) -> impl Iterator<Item = (String, &'a BTreeSet<String>)> + 'a {
        self.groups.iter().filter_map(move |(id, group)| {
            group.skus.get(sku).map(|d| (self.label(id, group), d))
        })
    }

    /// Every SKU assigned by any group in the table.
    pub fn skus(&self) -> BTreeSet<String> {
        self.groups
            .values()
            .flat_map(|group| group.skus.keys().cloned())
            .collect()
    }

    /// Plans group `id` turns on for `sku`: catalog minus the group's disabled set.
    pub fn enabled_plans(&self, id: &str, sku: &str, catalog: &SkuCatalog) -> Vec<String> {
        let Some(disabled) = self.groups.get(id).and_then(|group| group.skus.get(sku)) else {
            return Vec::new();
        };
        catalog
            .plans(sku)
            .iter()
            .filter(|plan| !disabled.contains(*plan))
            .cloned()
            .collect()
    }

    /// Every plan enabled through any group, across all of the user's SKUs.
    pub fn plans_enabled_by_groups(&self, catalog: &SkuCatalog) -> BTreeSet<String> {
        self.groups
            .iter()
            .flat_map(|(id, group)| {
                group
                    .skus
                    .keys()
                    .flat_map(move |sku| self.enabled_plans(id, sku, catalog))
            })
            .collect()
    }
}

/// Read every group that assigns a license to `user` and build its disabled-plan table.
///
/// A failed group lookup is returned in the failure list and the group is left
/// out of the table. Classification then sees its SKUs as not group-assigned.
pub async fn resolve_group_plans<D: Directory>(
    directory: &D,
    user: &User,
) -> (GroupPlanTable, Vec<GroupLookupFailure>) {
    let mut table = GroupPlanTable::new();
    let mut failures = Vec::new();

    for group_id in user.assigning_group_ids() {
        match directory.get_group(&group_id).await {
            Ok(group) => {
                for license in &group.licenses {
                    table.insert(
                        &group.id,
                        &group.display_name,
                        &license.sku,
                        license.disabled_plans.iter().cloned(),
                    );
                }
            }
            Err(e) => {
                warn!("Skipping group {}: {}", group_id, e);
                failures.push(GroupLookupFailure {
                    group_id,
                    message: e.to_string(),
                });
            }
        }
    }

    (table, failures)
}
