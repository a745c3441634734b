//! File records. Every write opens the file in append mode; one process writes at a time.
//! Fields are `;`-delimited CSV. List fields hold a nested `,`-delimited CSV record.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use csv::WriterBuilder;

use super::ReportSink;
use crate::license::advisor::{SkuAssessment, SkuOutcome};
use crate::license::bulk::SkuSourceRow;
use crate::models::ServiceClassification;

const SKIP_HEADER: &[&str] = &[
    "User",
    "Sku",
    "Assignment",
    "Retained",
    "CriticalBlocking",
    "CriticalRedundant",
    "NonCritical",
    "NonCriticalRedundant",
];

/// A list packed into one field as a `,`-delimited CSV record.
fn list<'a, I>(values: I) -> Result<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let values: Vec<&String> = values.into_iter().collect();
    if values.is_empty() {
        return Ok(String::new());
    }
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(&values)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to encode list field: {}", e))?;
    let text = String::from_utf8(bytes)?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Append `;`-delimited records, quoting any field that holds `;`, `"` or a line break.
fn append_records<R, F>(path: &Path, records: &[R]) -> Result<()>
where
    R: AsRef<[F]>,
    F: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(open_append(path)?);
    for record in records {
        writer
            .write_record(record.as_ref())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Timestamped log of one run: `<dir>/<tool>_<YYYYMMDD_HHMMSS>.log`.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn create(dir: &Path, tool: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Ok(Self::at(dir.join(format!("{}_{}.log", tool, stamp))))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, kind: &str, fields: Vec<String>) -> Result<()> {
        let mut record = vec![
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            kind.to_string(),
        ];
        record.extend(fields);
        append_records(&self.path, &[record])
    }
}

impl ReportSink for RunLog {
    fn emit_service(&mut self, user: &str, row: &ServiceClassification) -> Result<()> {
        self.record(
            "SERVICE",
            vec![
                user.to_string(),
                row.sku.clone(),
                row.plan.clone(),
                row.status.to_string(),
                row.source.to_string(),
                row.enabled.to_string(),
                list(&row.enabling_groups)?,
                list(&row.disabling_groups)?,
            ],
        )
    }

    fn emit_assessment(&mut self, user: &str, a: &SkuAssessment) -> Result<()> {
        self.record(
            "ASSESSMENT",
            vec![
                user.to_string(),
                a.sku.clone(),
                format!("{:?}", a.kind),
                a.recommendation.to_string(),
                list(&a.retained)?,
                list(&a.critical_blocking)?,
                list(&a.critical_redundant)?,
                list(&a.non_critical)?,
                list(&a.non_critical_redundant)?,
            ],
        )
    }

    fn emit_outcome(&mut self, user: &str, outcome: &SkuOutcome) -> Result<()> {
        let state = outcome
            .state
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| "NotAsked".to_string());
        self.record(
            "OUTCOME",
            vec![
                user.to_string(),
                outcome.sku.clone(),
                state,
                format!("{:?}", outcome.result),
            ],
        )
    }

    fn emit_source(&mut self, row: &SkuSourceRow) -> Result<()> {
        self.record(
            "SOURCE",
            vec![
                row.user_principal_name.clone(),
                row.display_name.clone().unwrap_or_default(),
                row.sku.clone(),
                yes_no(row.assigned_directly).to_string(),
                row.assigned_from_group.to_string(),
                list(&row.groups)?,
            ],
        )
    }

    fn note(&mut self, message: &str) -> Result<()> {
        self.record("NOTE", vec![message.to_string()])
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// One SKU that stayed directly assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipRecord {
    pub user: String,
    pub sku: String,
    pub retained: Vec<String>,
    pub critical_blocking: Vec<String>,
    pub critical_redundant: Vec<String>,
    pub non_critical: Vec<String>,
    pub non_critical_redundant: Vec<String>,
}

impl SkipRecord {
    pub fn new(user: &str, assessment: &SkuAssessment) -> Self {
        Self {
            user: user.to_string(),
            sku: assessment.sku.clone(),
            retained: assessment.retained.clone(),
            critical_blocking: assessment.critical_blocking.clone(),
            critical_redundant: assessment.critical_redundant.clone(),
            non_critical: assessment.non_critical.clone(),
            non_critical_redundant: assessment.non_critical_redundant.clone(),
        }
    }

    fn to_record(&self) -> Result<Vec<String>> {
        Ok(vec![
            self.user.clone(),
            self.sku.clone(),
            "Direct".to_string(),
            list(&self.retained)?,
            list(&self.critical_blocking)?,
            list(&self.critical_redundant)?,
            list(&self.non_critical)?,
            list(&self.non_critical_redundant)?,
        ])
    }
}

/// Cumulative, `;`-delimited file of every SKU the advisor left in place.
#[derive(Debug, Clone)]
pub struct SkipLog {
    path: PathBuf,
}

impl SkipLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SkipRecord) -> Result<()> {
        let record = record.to_record()?;
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            let header: Vec<String> = SKIP_HEADER.iter().map(|h| h.to_string()).collect();
            append_records(&self.path, &[header, record])
        } else {
            append_records(&self.path, &[record])
        }
    }
}
