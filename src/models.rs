use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Provisioning state of one service plan for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisioningStatus {
    Success,
    PendingInput,
    PendingActivation,
    PendingProvisioning,
    Disabled,
    Error,
    Other(String),
}

impl ProvisioningStatus {
    /// True when the plan is actually turned on (or about to be) for the user.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::Success
                | ProvisioningStatus::PendingInput
                | ProvisioningStatus::PendingActivation
                | ProvisioningStatus::PendingProvisioning
        )
    }
}

impl From<String> for ProvisioningStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Success" => ProvisioningStatus::Success,
            "PendingInput" => ProvisioningStatus::PendingInput,
            "PendingActivation" => ProvisioningStatus::PendingActivation,
            "PendingProvisioning" => ProvisioningStatus::PendingProvisioning,
            "Disabled" => ProvisioningStatus::Disabled,
            "Error" => ProvisioningStatus::Error,
            _ => ProvisioningStatus::Other(raw),
        }
    }
}

impl From<ProvisioningStatus> for String {
    fn from(status: ProvisioningStatus) -> Self {
        status.to_string()
    }
}

impl std::fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningStatus::Success => write!(f, "Success"),
            ProvisioningStatus::PendingInput => write!(f, "PendingInput"),
            ProvisioningStatus::PendingActivation => write!(f, "PendingActivation"),
            ProvisioningStatus::PendingProvisioning => write!(f, "PendingProvisioning"),
            ProvisioningStatus::Disabled => write!(f, "Disabled"),
            ProvisioningStatus::Error => write!(f, "Error"),
            ProvisioningStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub plan: String,
    pub status: ProvisioningStatus,
}

/// One SKU on a user, with every object that assigns it.
///
/// `assigned_by` semantics:
/// - empty: legacy direct-only assignment
/// - contains the user's own id: direct
/// - contains any other id: inherited from that group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseAssignment {
    pub sku: String,
    #[serde(default)]
    pub assigned_by: Vec<String>,
    #[serde(default)]
    pub service_status: Vec<ServiceStatus>,
}

impl LicenseAssignment {
    pub fn is_direct(&self, user_id: &str) -> bool {
        self.assigned_by.is_empty() || self.assigned_by.iter().any(|id| id == user_id)
    }

    /// Distinct assigning ids other than the user's own, in first-seen order.
    pub fn group_ids(&self, user_id: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.assigned_by
            .iter()
            .filter(|id| id.as_str() != user_id)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn status_of(&self, plan: &str) -> Option<&ProvisioningStatus> {
        self.service_status
            .iter()
            .find(|s| s.plan == plan)
            .map(|s| &s.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub user_principal_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub licenses: Vec<LicenseAssignment>,
}

impl User {
    pub fn direct_skus(&self) -> BTreeSet<String> {
        self.licenses
            .iter()
            .filter(|l| l.is_direct(&self.id))
            .map(|l| l.sku.clone())
            .collect()
    }

    /// Union of every non-self object id that assigns any license to this user.
    pub fn assigning_group_ids(&self) -> BTreeSet<String> {
        self.licenses
            .iter()
            .flat_map(|l| l.group_ids(&self.id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLicense {
    pub sku: String,
    #[serde(default)]
    pub disabled_plans: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub licenses: Vec<GroupLicense>,
}

/// Every service plan a SKU contains, in tenant catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuPlans {
    pub sku: String,
    #[serde(default)]
    pub plans: Vec<String>,
}

/// Where a service plan's enablement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanSource {
    Direct,
    Group,
    DirectAndGroup,
    ExtraDirect,
    None,
}

impl std::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanSource::Direct => write!(f, "Direct"),
            PlanSource::Group => write!(f, "Group"),
            PlanSource::DirectAndGroup => write!(f, "Direct+Group"),
            PlanSource::ExtraDirect => write!(f, "Extra-Direct"),
            PlanSource::None => write!(f, "None"),
        }
    }
}

/// Derived per (SKU, plan) verdict. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClassification {
    pub sku: String,
    pub plan: String,
    pub status: ProvisioningStatus,
    pub enabled: bool,
    pub source: PlanSource,
    pub enabling_groups: BTreeSet<String>,
    pub disabling_groups: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(assigned_by: &[&str]) -> LicenseAssignment {
        LicenseAssignment {
            sku: "ENTERPRISEPACK".to_string(),
            assigned_by: assigned_by.iter().map(|s| s.to_string()).collect(),
            service_status: Vec::new(),
        }
    }

    #[test]
    fn test_empty_assigners_is_legacy_direct() {
        let a = assignment(&[]);
        assert!(a.is_direct("u1"));
        assert!(a.group_ids("u1").is_empty());
    }

    #[test]
    fn test_mixed_assignment() {
        let a = assignment(&["u1", "g1", "g1", "g2"]);
        assert!(a.is_direct("u1"));
        assert_eq!(a.group_ids("u1"), vec!["g1", "g2"]);
    }

    #[test]
    fn test_group_only_assignment_is_not_direct() {
        let a = assignment(&["g1"]);
        assert!(!a.is_direct("u1"));
    }

    #[test]
    fn test_provisioning_status_parsing() {
        let s: ProvisioningStatus = serde_json::from_str("\"PendingInput\"").unwrap();
        assert_eq!(s, ProvisioningStatus::PendingInput);
        assert!(s.is_active());

        let s: ProvisioningStatus = serde_json::from_str("\"PendingActivationX\"").unwrap();
        assert_eq!(s, ProvisioningStatus::Other("PendingActivationX".to_string()));
        assert!(!s.is_active());
        assert!(!ProvisioningStatus::Disabled.is_active());
    }
}
