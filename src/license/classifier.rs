use std::collections::BTreeSet;

use serde::Serialize;

use crate::license::resolver::GroupPlanTable;
use crate::models::{PlanSource, ProvisioningStatus, ServiceClassification, User};

/// Every (SKU, plan) of one user with its licensing source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClassification {
    pub user_id: String,
    pub user_principal_name: String,
    pub direct_skus: BTreeSet<String>,
    pub services: Vec<ServiceClassification>,
}

impl UserClassification {
    /// SKUs in the order the user's assignments list them.
    pub fn skus(&self) -> Vec<&str> {
        let mut skus: Vec<&str> = Vec::new();
        for service in &self.services {
            if !skus.contains(&service.sku.as_str()) {
                skus.push(&service.sku);
            }
        }
        skus
    }

    pub fn for_sku<'a>(&'a self, sku: &'a str) -> impl Iterator<Item = &'a ServiceClassification> + 'a {
        self.services.iter().filter(move |s| s.sku == sku)
    }
}

/// Classify every plan of every license the user holds.
pub fn classify_user(user: &User, table: &GroupPlanTable) -> UserClassification {
    let direct_skus = user.direct_skus();

    let services = user
        .licenses
        .iter()
        .flat_map(|license| {
            let direct = direct_skus.contains(&license.sku);
            license
                .service_status
                .iter()
                .map(move |s| classify_plan(&license.sku, &s.plan, &s.status, direct, table))
        })
        .collect();

    UserClassification {
        user_id: user.id.clone(),
        user_principal_name: user.user_principal_name.clone(),
        direct_skus,
        services,
    }
}

/// Apply the source rules to one plan. Later rules override earlier ones:
///
/// 1. a group grants it → `Group`
/// 2. groups assign the SKU but all disable it, and it is active on a direct
///    assignment → `ExtraDirect`
/// 3. no group assigns the SKU, direct and active → `Direct`
/// 4. a group grants it, direct and active → `DirectAndGroup`
///
/// Anything else stays `None`.
pub fn classify_plan(
    sku: &str,
    plan: &str,
    status: &ProvisioningStatus,
    direct: bool,
    table: &GroupPlanTable,
) -> ServiceClassification {
    let mut enabling_groups = BTreeSet::new();
    let mut disabling_groups = BTreeSet::new();

    for (group, disabled) in table.groups_assigning(sku) {
        if disabled.contains(plan) {
            disabling_groups.insert(group);
        } else {
            enabling_groups.insert(group);
        }
    }

    let active = status.is_active();
    let mut enabled = false;
    let mut source = PlanSource::None;

    if !enabling_groups.is_empty() {
        source = PlanSource::Group;
        enabled = true;
    } else if !disabling_groups.is_empty() {
        if direct && active {
            source = PlanSource::ExtraDirect;
        }
    } else if direct && active {
        source = PlanSource::Direct;
        enabled = true;
    }

    if direct && !enabling_groups.is_empty() && active {
        source = PlanSource::DirectAndGroup;
    }

    ServiceClassification {
        sku: sku.to_string(),
        plan: plan.to_string(),
        status: status.clone(),
        enabled,
        source,
        enabling_groups,
        disabling_groups,
    }
}
