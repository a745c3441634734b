//! Decide whether a direct SKU assignment can go, and ask before removing it.

use std::collections::BTreeSet;

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::config::DEFAULT_CRITICAL_SERVICES;
use crate::directory::Directory;
use crate::license::catalog::SkuCatalog;
use crate::license::classifier::UserClassification;
use crate::license::resolver::GroupPlanTable;
use crate::models::{PlanSource, User};
use crate::prompt::Prompter;
use crate::report::audit::{SkipLog, SkipRecord};
use crate::report::ReportSink;

/// Plans whose total loss is unacceptable. Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalServices(BTreeSet<String>);

impl CriticalServices {
    pub fn new<I, S>(plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(plans.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, plan: &str) -> bool {
        self.0.contains(plan)
    }
}

impl Default for CriticalServices {
    fn default() -> Self {
        Self::new(DEFAULT_CRITICAL_SERVICES.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssessmentKind {
    /// The SKU has `Direct` or `ExtraDirect` plans; each is weighed on its own.
    PerPlan,
    /// Every directly granted plan is also granted by a group.
    FullyRedundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    Remove,
    Keep,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Remove => write!(f, "safe to remove"),
            Recommendation::Keep => write!(f, "do not remove"),
        }
    }
}

/// Removal analysis of one directly assigned SKU.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuAssessment {
    pub sku: String,
    pub kind: AssessmentKind,
    /// `Direct` / `ExtraDirect` plans the direct assignment keeps alive.
    pub retained: Vec<String>,
    pub critical_blocking: Vec<String>,
    pub critical_redundant: Vec<String>,
    pub non_critical: Vec<String>,
    pub non_critical_redundant: Vec<String>,
    /// Groups that grant plans of this SKU.
    pub enabling_groups: BTreeSet<String>,
    pub recommendation: Recommendation,
}

/// Plans some group supplies to the user: catalog minus each group's disabled
/// set, plus anything the classification already saw a group enable.
pub fn group_enabled_plans(
    table: &GroupPlanTable,
    catalog: &SkuCatalog,
    classification: &UserClassification,
) -> BTreeSet<String> {
    let mut plans = table.plans_enabled_by_groups(catalog);
    plans.extend(
        classification
            .services
            .iter()
            .filter(|s| !s.enabling_groups.is_empty())
            .map(|s| s.plan.clone()),
    );
    plans
}

/// Assess every SKU whose direct assignment could be removed.
///
/// SKUs without any direct contribution are not assessed.
pub fn assess(
    classification: &UserClassification,
    group_enabled: &BTreeSet<String>,
    critical: &CriticalServices,
) -> Vec<SkuAssessment> {
    let mut assessments = Vec::new();

    for sku in classification.skus() {
        let services: Vec<_> = classification.for_sku(sku).collect();

        let retained: Vec<String> = services
            .iter()
            .filter(|s| matches!(s.source, PlanSource::Direct | PlanSource::ExtraDirect))
            .map(|s| s.plan.clone())
            .collect();
        let shared: Vec<String> = services
            .iter()
            .filter(|s| s.source == PlanSource::DirectAndGroup)
            .map(|s| s.plan.clone())
            .collect();

        let (kind, candidates) = if !retained.is_empty() {
            (AssessmentKind::PerPlan, retained.clone())
        } else if !shared.is_empty() {
            (AssessmentKind::FullyRedundant, shared)
        } else {
            continue;
        };

        // Direct+Group plans are granted by a group on this very SKU.
        let is_redundant =
            |plan: &str| kind == AssessmentKind::FullyRedundant || group_enabled.contains(plan);

        let mut assessment = SkuAssessment {
            sku: sku.to_string(),
            kind,
            retained,
            critical_blocking: Vec::new(),
            critical_redundant: Vec::new(),
            non_critical: Vec::new(),
            non_critical_redundant: Vec::new(),
            enabling_groups: services
                .iter()
                .flat_map(|s| s.enabling_groups.iter().cloned())
                .collect(),
            recommendation: Recommendation::Remove,
        };

        for plan in candidates {
            match (critical.contains(&plan), is_redundant(&plan)) {
                (true, true) => assessment.critical_redundant.push(plan),
                (true, false) => assessment.critical_blocking.push(plan),
                (false, true) => {
                    assessment.non_critical_redundant.push(plan.clone());
                    assessment.non_critical.push(plan);
                }
                (false, false) => assessment.non_critical.push(plan),
            }
        }

        if !assessment.critical_blocking.is_empty() {
            assessment.recommendation = Recommendation::Keep;
        }

        assessments.push(assessment);
    }

    assessments
}

/// States of the removal dialog.
///
/// ```text
/// Proposed ─(Remove: y)→ Confirmed
///          ─(Remove: n)→ Declined
///          ─(Keep)─────→ Declined ─→ OverrideProposed ─(y)→ OverrideConfirmed
///                                                      ─(n)→ OverrideDeclined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalState {
    Proposed,
    Confirmed,
    Declined,
    OverrideProposed,
    OverrideConfirmed,
    OverrideDeclined,
}

impl RemovalState {
    pub fn removes(self) -> bool {
        matches!(self, RemovalState::Confirmed | RemovalState::OverrideConfirmed)
    }

    /// Advance one step. `answer` is only consulted in states that ask a question.
    pub fn next(self, recommendation: Recommendation, answer: impl FnOnce() -> Result<bool>) -> Result<Option<Self>> {
        let next = match (self, recommendation) {
            (RemovalState::Proposed, Recommendation::Remove) => {
                if answer()? {
                    RemovalState::Confirmed
                } else {
                    RemovalState::Declined
                }
            }
            (RemovalState::Proposed, Recommendation::Keep) => RemovalState::Declined,
            (RemovalState::Declined, Recommendation::Keep) => RemovalState::OverrideProposed,
            (RemovalState::OverrideProposed, _) => {
                if answer()? {
                    RemovalState::OverrideConfirmed
                } else {
                    RemovalState::OverrideDeclined
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(next))
    }
}

fn question(assessment: &SkuAssessment, state: RemovalState) -> String {
    match (state, assessment.kind) {
        (RemovalState::OverrideProposed, _) => format!(
            "{} keeps critical services no group supplies ({}). Remove the direct assignment anyway?",
            assessment.sku,
            assessment.critical_blocking.join(", ")
        ),
        (_, AssessmentKind::FullyRedundant) => format!(
            "{} is also assigned by {}. Remove the redundant direct assignment?",
            assessment.sku,
            join_set(&assessment.enabling_groups)
        ),
        _ => format!("Remove the direct assignment of {}?", assessment.sku),
    }
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Walk the dialog for one SKU to a terminal state.
pub fn run_removal_dialog<P: Prompter + ?Sized>(
    assessment: &SkuAssessment,
    prompter: &mut P,
) -> Result<RemovalState> {
    let mut state = RemovalState::Proposed;
    loop {
        let text = question(assessment, state);
        match state.next(assessment.recommendation, || prompter.confirm(&text))? {
            Some(next) => state = next,
            None => return Ok(state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "message")]
pub enum RemovalResult {
    Removed,
    Kept,
    Failed(String),
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuOutcome {
    pub sku: String,
    pub recommendation: Recommendation,
    pub state: Option<RemovalState>,
    pub result: RemovalResult,
}

impl SkuOutcome {
    pub fn removed(&self) -> bool {
        self.result == RemovalResult::Removed
    }
}

/// Run every assessment through the dialog and remove what the operator confirms.
///
/// Removal failures are reported and the loop moves on; nothing is retried.
/// Every SKU that stays assigned gets a skip record.
pub async fn advise_and_trim<D, P>(
    directory: &D,
    user: &User,
    assessments: &[SkuAssessment],
    prompter: &mut P,
    sink: &mut dyn ReportSink,
    skip_log: &SkipLog,
    dry_run: bool,
) -> Result<Vec<SkuOutcome>>
where
    D: Directory,
    P: Prompter + ?Sized,
{
    let mut outcomes = Vec::with_capacity(assessments.len());

    for assessment in assessments {
        sink.emit_assessment(&user.user_principal_name, assessment)?;

        let (state, result) = if dry_run {
            (None, RemovalResult::DryRun)
        } else {
            let state = run_removal_dialog(assessment, prompter)?;
            let result = if state.removes() {
                match directory.remove_license(user, &assessment.sku).await {
                    Ok(()) => {
                        info!("Removed {} from {}", assessment.sku, user.user_principal_name);
                        RemovalResult::Removed
                    }
                    Err(e) => {
                        warn!(
                            "Removing {} from {} failed: {}",
                            assessment.sku, user.user_principal_name, e
                        );
                        RemovalResult::Failed(e.to_string())
                    }
                }
            } else {
                RemovalResult::Kept
            };
            (Some(state), result)
        };

        let outcome = SkuOutcome {
            sku: assessment.sku.clone(),
            recommendation: assessment.recommendation,
            state,
            result,
        };
        sink.emit_outcome(&user.user_principal_name, &outcome)?;

        if !outcome.removed() {
            skip_log.append(&SkipRecord::new(&user.user_principal_name, assessment))?;
        }
        outcomes.push(outcome);
    }

    Ok(outcomes)
}
