//! SKU-level source report for one user or the whole directory.

use std::collections::HashMap;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use serde::Serialize;

use crate::directory::Directory;
use crate::models::User;
use crate::report::ReportSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupAssignment {
    Yes,
    No,
    /// The assignment carries no assigner ids at all (legacy direct assignment).
    Never,
}

impl std::fmt::Display for GroupAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupAssignment::Yes => write!(f, "Yes"),
            GroupAssignment::No => write!(f, "No"),
            GroupAssignment::Never => write!(f, "Never"),
        }
    }
}

/// How one SKU reaches a user.
#[derive(Debug, Clone, PartialEq)]
pub struct SkuSource {
    pub sku: String,
    pub assigned_directly: bool,
    pub assigned_from_group: GroupAssignment,
    pub group_ids: Vec<String>,
}

pub fn sku_sources(user: &User) -> Vec<SkuSource> {
    user.licenses
        .iter()
        .map(|license| {
            if license.assigned_by.is_empty() {
                return SkuSource {
                    sku: license.sku.clone(),
                    assigned_directly: true,
                    assigned_from_group: GroupAssignment::Never,
                    group_ids: Vec::new(),
                };
            }

            let group_ids = license.group_ids(&user.id);
            SkuSource {
                sku: license.sku.clone(),
                assigned_directly: license.is_direct(&user.id),
                assigned_from_group: if group_ids.is_empty() {
                    GroupAssignment::No
                } else {
                    GroupAssignment::Yes
                },
                group_ids,
            }
        })
        .collect()
}

/// One report line: a user's SKU with resolved group names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuSourceRow {
    pub user_principal_name: String,
    pub display_name: Option<String>,
    pub sku: String,
    pub assigned_directly: bool,
    pub assigned_from_group: GroupAssignment,
    pub groups: Vec<String>,
}

/// Group id → display name, memoized for the duration of one run.
#[derive(Debug, Default)]
pub struct GroupNameResolver {
    names: HashMap<String, String>,
}

impl GroupNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a group's display name, or fall back to its raw id.
    pub async fn resolve<D: Directory>(&mut self, directory: &D, group_id: &str) -> String {
        if let Some(name) = self.names.get(group_id) {
            return name.clone();
        }

        let name = match directory.get_group(group_id).await {
            Ok(group) => group.display_name,
            Err(e) => {
                warn!("Could not resolve group {}: {}", group_id, e);
                group_id.to_string()
            }
        };
        self.names.insert(group_id.to_string(), name.clone());
        name
    }
}

pub async fn report_user<D: Directory>(
    directory: &D,
    user: &User,
    resolver: &mut GroupNameResolver,
) -> Vec<SkuSourceRow> {
    let mut rows = Vec::new();
    for source in sku_sources(user) {
        let mut groups = Vec::with_capacity(source.group_ids.len());
        for id in &source.group_ids {
            groups.push(resolver.resolve(directory, id).await);
        }
        rows.push(SkuSourceRow {
            user_principal_name: user.user_principal_name.clone(),
            display_name: user.display_name.clone(),
            sku: source.sku,
            assigned_directly: source.assigned_directly,
            assigned_from_group: source.assigned_from_group,
            groups,
        });
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    All,
    User(String),
}

impl ReportTarget {
    /// `all` (any case) selects every user; anything else is a principal name.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            None
        } else if input.eq_ignore_ascii_case("all") {
            Some(ReportTarget::All)
        } else {
            Some(ReportTarget::User(input.to_string()))
        }
    }
}

/// Report every SKU of the target users to `sink`. Nothing is modified.
pub async fn run_bulk_report<D: Directory>(
    directory: &D,
    target: &ReportTarget,
    sink: &mut dyn ReportSink,
    show_progress: bool,
) -> Result<Vec<SkuSourceRow>> {
    let users = match target {
        ReportTarget::User(upn) => vec![directory.get_user(upn).await?],
        ReportTarget::All => directory
            .list_users()
            .await
            .context("Failed to enumerate users")?,
    };

    let pb = if show_progress {
        let pb = ProgressBar::new(users.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut resolver = GroupNameResolver::new();
    let mut all_rows = Vec::new();

    for user in &users {
        if let Some(pb) = &pb {
            pb.set_message(user.user_principal_name.clone());
        }

        let rows = report_user(directory, user, &mut resolver).await;
        for row in &rows {
            sink.emit_source(row)?;
        }
        all_rows.extend(rows);

        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }

    Ok(all_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::snapshot::fixtures::*;
    use crate::directory::snapshot::SnapshotDirectory;
    use crate::report::NullSink;

    #[test]
    fn test_legacy_assignment_is_never_from_group() {
        let user = user(vec![license("EMS", &[], &[])]);
        let sources = sku_sources(&user);
        assert!(sources[0].assigned_directly);
        assert_eq!(sources[0].assigned_from_group, GroupAssignment::Never);
    }

    #[test]
    fn test_group_only_assignment() {
        let user = user(vec![license("EMS", &["g-it"], &[])]);
        let sources = sku_sources(&user);
        assert!(!sources[0].assigned_directly);
        assert_eq!(sources[0].assigned_from_group, GroupAssignment::Yes);
        assert_eq!(sources[0].group_ids, vec!["g-it"]);
    }

    #[test]
    fn test_explicit_direct_only_is_no_group() {
        let user = user(vec![license("EMS", &[USER_ID], &[])]);
        let sources = sku_sources(&user);
        assert!(sources[0].assigned_directly);
        assert_eq!(sources[0].assigned_from_group, GroupAssignment::No);
    }

    #[tokio::test]
    async fn test_group_names_resolved_with_raw_id_fallback() {
        let mut snapshot = scenario_c();
        snapshot.groups.retain(|g| g.id != "g-hr");
        let dir = SnapshotDirectory::new(snapshot);
        let user = dir.get_user(UPN).await.unwrap();

        let rows = report_user(&dir, &user, &mut GroupNameResolver::new()).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].assigned_directly);
        assert_eq!(rows[0].assigned_from_group, GroupAssignment::Yes);
        assert_eq!(rows[0].groups, vec!["Sales", "g-hr"]);
    }

    #[tokio::test]
    async fn test_bulk_report_covers_every_user() {
        let mut snapshot = scenario_a();
        let mut bob = snapshot.users[0].clone();
        bob.id = "u-bob".to_string();
        bob.user_principal_name = "bob@contoso.com".to_string();
        bob.licenses = vec![license("ENTERPRISEPACK", &["g-marketing"], &[])];
        snapshot.users.push(bob);
        let dir = SnapshotDirectory::new(snapshot);

        let rows = run_bulk_report(&dir, &ReportTarget::All, &mut NullSink, false)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let bob_row = rows.iter().find(|r| r.user_principal_name == "bob@contoso.com").unwrap();
        assert!(!bob_row.assigned_directly);
        assert_eq!(bob_row.groups, vec!["Marketing"]);
    }

    #[tokio::test]
    async fn test_bulk_report_unknown_user_fails() {
        let dir = SnapshotDirectory::new(scenario_a());
        let target = ReportTarget::User("nobody@contoso.com".to_string());
        assert!(run_bulk_report(&dir, &target, &mut NullSink, false).await.is_err());
    }

    #[test]
    fn test_report_target_parsing() {
        assert_eq!(ReportTarget::parse(" ALL "), Some(ReportTarget::All));
        assert_eq!(
            ReportTarget::parse("alice@contoso.com"),
            Some(ReportTarget::User("alice@contoso.com".to_string()))
        );
        assert_eq!(ReportTarget::parse(""), None);
    }
}
