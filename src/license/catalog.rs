use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};

use crate::directory::Directory;
use crate::license::resolver::GroupPlanTable;
use crate::models::{SkuPlans, User};

/// `SkuId → plans` for the SKUs a user touches. Plans keep catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkuCatalog {
    skus: BTreeMap<String, Vec<String>>,
    /// Referenced SKUs the tenant catalog does not list.
    pub missing: BTreeSet<String>,
}

impl SkuCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = SkuPlans>) -> Self {
        let mut skus: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in entries {
            let plans = skus.entry(entry.sku).or_default();
            for plan in entry.plans {
                if !plans.contains(&plan) {
                    plans.push(plan);
                }
            }
        }
        Self {
            skus,
            missing: BTreeSet::new(),
        }
    }

    pub fn plans(&self, sku: &str) -> &[String] {
        self.skus.get(sku).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.skus.contains_key(sku)
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

/// Load the catalog entries for every SKU the user or a contributing group references.
pub async fn load_catalog<D: Directory>(
    directory: &D,
    user: &User,
    table: &GroupPlanTable,
) -> Result<SkuCatalog> {
    let mut wanted: BTreeSet<String> = user.licenses.iter().map(|l| l.sku.clone()).collect();
    wanted.extend(table.skus());

    let entries = directory
        .sku_catalog()
        .await
        .context("Failed to load the tenant SKU catalog")?;

    let mut catalog = SkuCatalog::from_entries(
        entries.into_iter().filter(|entry| wanted.contains(&entry.sku)),
    );
    let missing = wanted
        .into_iter()
        .filter(|sku| !catalog.contains(sku))
        .collect();
    catalog.missing = missing;

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::snapshot::fixtures::*;
    use crate::directory::snapshot::SnapshotDirectory;

    #[test]
    fn test_plans_are_ordered_and_distinct() {
        let catalog = SkuCatalog::from_entries(vec![
            SkuPlans {
                sku: "EMS".to_string(),
                plans: vec!["INTUNE_A".to_string(), "AAD_PREMIUM".to_string()],
            },
            SkuPlans {
                sku: "EMS".to_string(),
                plans: vec!["INTUNE_A".to_string(), "RMS_S_PREMIUM".to_string()],
            },
        ]);
        assert_eq!(catalog.plans("EMS"), ["INTUNE_A", "AAD_PREMIUM", "RMS_S_PREMIUM"]);
        assert!(catalog.plans("SPE_E5").is_empty());
    }

    #[tokio::test]
    async fn test_load_catalog_restricts_to_referenced_skus() {
        let mut snapshot = scenario_b();
        snapshot.skus.push(SkuPlans {
            sku: "POWER_BI_PRO".to_string(),
            plans: vec!["BI_AZURE_P2".to_string()],
        });
        snapshot.users[0].licenses.push(license("VISIOCLIENT", &[USER_ID], &["VISIO_CLIENT_SUBSCRIPTION"]));
        let dir = SnapshotDirectory::new(snapshot);
        let user = dir.get_user(UPN).await.unwrap();

        let mut table = GroupPlanTable::new();
        table.insert("g-sales", "Sales", "ENTERPRISEPACK", ["EXCHANGE_S_ENTERPRISE"]);

        let catalog = load_catalog(&dir, &user, &table).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("ENTERPRISEPACK"));
        assert!(!catalog.contains("POWER_BI_PRO"));
        assert!(catalog.missing.contains("VISIOCLIENT"));
    }
}
