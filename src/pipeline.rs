//! The classifier run: resolve, load, classify and assess one user.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;

use crate::directory::{Directory, DirectoryError};
use crate::license::advisor::{assess, group_enabled_plans, CriticalServices, SkuAssessment, SkuOutcome};
use crate::license::catalog::{load_catalog, SkuCatalog};
use crate::license::classifier::{classify_user, UserClassification};
use crate::license::resolver::{resolve_group_plans, GroupLookupFailure, GroupPlanTable};
use crate::models::User;
use crate::report::ReportSink;

/// Everything one classifier run knows about a user before the removal dialog.
#[derive(Debug, Clone)]
pub struct ClassifierRun {
    pub user: User,
    pub table: GroupPlanTable,
    pub failures: Vec<GroupLookupFailure>,
    pub catalog: SkuCatalog,
    pub classification: UserClassification,
    pub assessments: Vec<SkuAssessment>,
}

pub async fn classify<D: Directory>(
    directory: &D,
    user_principal_name: &str,
    critical: &CriticalServices,
) -> Result<ClassifierRun> {
    let user = directory
        .get_user(user_principal_name)
        .await
        .with_context(|| format!("Failed to read user {}", user_principal_name))?;
    debug!("{} holds {} license(s)", user.user_principal_name, user.licenses.len());

    let (table, failures) = resolve_group_plans(directory, &user).await;
    let catalog = load_catalog(directory, &user, &table).await?;
    let classification = classify_user(&user, &table);
    let group_enabled = group_enabled_plans(&table, &catalog, &classification);
    let assessments = assess(&classification, &group_enabled, critical);

    Ok(ClassifierRun {
        user,
        table,
        failures,
        catalog,
        classification,
        assessments,
    })
}

/// Send every classified plan to `sink`, followed by the accuracy gaps of this run.
pub fn emit_classification(run: &ClassifierRun, sink: &mut dyn ReportSink) -> Result<()> {
    let upn = &run.user.user_principal_name;
    for row in &run.classification.services {
        sink.emit_service(upn, row)?;
    }
    for failure in &run.failures {
        sink.note(&format!(
            "Group {} could not be read ({}); its plans are not attributed",
            failure.group_id, failure.message
        ))?;
    }
    for sku in &run.catalog.missing {
        sink.note(&format!("SKU {} is not in the tenant catalog", sku))?;
    }
    Ok(())
}

/// Document printed by `--report json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport<'a> {
    pub classification: &'a UserClassification,
    pub assessments: &'a [SkuAssessment],
    pub outcomes: &'a [SkuOutcome],
    pub group_lookup_failures: &'a [GroupLookupFailure],
    pub missing_skus: &'a BTreeSet<String>,
}

impl<'a> JsonReport<'a> {
    pub fn new(run: &'a ClassifierRun, outcomes: &'a [SkuOutcome]) -> Self {
        Self {
            classification: &run.classification,
            assessments: &run.assessments,
            outcomes,
            group_lookup_failures: &run.failures,
            missing_skus: &run.catalog.missing,
        }
    }
}

/// True when the error chain ends in a directory `NotFound`.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DirectoryError>())
        .any(DirectoryError::is_not_found)
}
