use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use super::audit::yes_no;
use super::ReportSink;
use crate::license::advisor::{AssessmentKind, Recommendation, RemovalResult, SkuAssessment, SkuOutcome};
use crate::license::bulk::{GroupAssignment, SkuSourceRow};
use crate::license::classifier::UserClassification;
use crate::models::{PlanSource, ServiceClassification};

/// Colored console output. Service rows use fixed-width columns so they can stream.
pub struct ConsoleRenderer {
    verbose: bool,
    quiet: bool,
    current_sku: Option<String>,
}

impl ConsoleRenderer {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            current_sku: None,
        }
    }

    pub fn header(&self, tool: &str, subject: &str) {
        if self.quiet {
            return;
        }
        println!("\n {} v{}", tool.bold(), env!("CARGO_PKG_VERSION"));
        println!(" Auditing: {}\n", subject);
    }

    /// Counts per source, one line in quiet mode or a box otherwise.
    pub fn summary(&self, classification: &UserClassification) {
        let count = |source: PlanSource| {
            classification
                .services
                .iter()
                .filter(|s| s.source == source)
                .count()
        };
        let direct = count(PlanSource::Direct);
        let group = count(PlanSource::Group);
        let both = count(PlanSource::DirectAndGroup);
        let extra = count(PlanSource::ExtraDirect);
        let none = count(PlanSource::None);

        if self.quiet {
            println!(
                "Plans: {}  Direct: {}  Group: {}  Direct+Group: {}  Extra-Direct: {}  None: {}",
                classification.services.len(),
                direct.to_string().green(),
                group.to_string().cyan(),
                both.to_string().yellow(),
                extra.to_string().red(),
                none,
            );
            return;
        }

        println!();
        println!(" ┌────────────────────────────────────────────────────┐");
        println!(" │  {:<48} │", "SUMMARY".bold());
        println!(" │  {:<48} │", format!("User              : {}", classification.user_principal_name));
        println!(" │  {:<48} │", format!("Service plans     : {}", classification.services.len()));
        println!(" │  {:<48} │", format!("Direct            : {:>4}", direct));
        println!(" │  {:<48} │", format!("Group             : {:>4}", group));
        println!(" │  {:<48} │", format!("Direct+Group      : {:>4}", both));
        println!(" │  {:<48} │", format!("Extra-Direct      : {:>4}", extra));
        println!(" │  {:<48} │", format!("Not attributable  : {:>4}", none));
        println!(" └────────────────────────────────────────────────────┘\n");
    }
}

fn colored_source(source: PlanSource) -> ColoredString {
    let label = format!("{:<14}", source.to_string());
    match source {
        PlanSource::Direct => label.green(),
        PlanSource::Group => label.cyan(),
        PlanSource::DirectAndGroup => label.yellow(),
        PlanSource::ExtraDirect => label.red().bold(),
        PlanSource::None => label.dimmed(),
    }
}

/// `+Enabling -Disabling` group names of one row.
fn group_label(row: &ServiceClassification) -> String {
    row.enabling_groups
        .iter()
        .map(|g| format!("+{}", g))
        .chain(row.disabling_groups.iter().map(|g| format!("-{}", g)))
        .collect::<Vec<_>>()
        .join(" ")
}

impl ReportSink for ConsoleRenderer {
    fn emit_service(&mut self, _user: &str, row: &ServiceClassification) -> Result<()> {
        if self.quiet || (row.source == PlanSource::None && !self.verbose) {
            return Ok(());
        }

        if self.current_sku.as_deref() != Some(row.sku.as_str()) {
            println!(" {} {}", "SKU".bold(), row.sku.bold());
            println!(
                "   {:<34} {:<20} {:<14} {}",
                "Plan".dimmed(),
                "Status".dimmed(),
                "Source".dimmed(),
                "Groups (+enabling -disabling)".dimmed()
            );
            self.current_sku = Some(row.sku.clone());
        }

        println!(
            "   {:<34} {:<20} {} {}",
            row.plan,
            row.status.to_string(),
            colored_source(row.source),
            group_label(row)
        );
        Ok(())
    }

    fn emit_assessment(&mut self, _user: &str, a: &SkuAssessment) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        let verdict = match a.recommendation {
            Recommendation::Remove => a.recommendation.to_string().green().bold(),
            Recommendation::Keep => a.recommendation.to_string().red().bold(),
        };
        println!("\n {} {}: {}", "[DIRECT]".yellow().bold(), a.sku.bold(), verdict);

        if a.kind == AssessmentKind::FullyRedundant {
            println!("   Every directly granted plan is also granted by a group.\n");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Plan").add_attribute(Attribute::Bold),
                Cell::new("Critical").add_attribute(Attribute::Bold),
                Cell::new("Redundant").add_attribute(Attribute::Bold),
            ]);

        for plan in &a.retained {
            let critical = a.critical_blocking.contains(plan) || a.critical_redundant.contains(plan);
            let redundant = a.critical_redundant.contains(plan) || a.non_critical_redundant.contains(plan);
            let (label, color) = match (critical, redundant) {
                (true, false) => ("Is NOT redundant", Color::Red),
                (_, true) => ("Is redundant", Color::Green),
                (false, false) => ("Is NOT redundant", Color::Yellow),
            };
            table.add_row(vec![
                Cell::new(plan),
                Cell::new(yes_no(critical)),
                Cell::new(label).fg(color),
            ]);
        }

        println!("{}", table);
        Ok(())
    }

    fn emit_outcome(&mut self, _user: &str, outcome: &SkuOutcome) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        match &outcome.result {
            RemovalResult::Removed => println!("   {} Removed direct assignment of {}", "✓".green(), outcome.sku),
            RemovalResult::Kept => println!("   {} Kept {}", "→".cyan(), outcome.sku),
            RemovalResult::DryRun => println!("   {} Dry run, {} left untouched", "→".cyan(), outcome.sku),
            RemovalResult::Failed(message) => {
                eprintln!("   {} Removing {} failed: {}", "✗".red(), outcome.sku, message)
            }
        }
        Ok(())
    }

    fn emit_source(&mut self, row: &SkuSourceRow) -> Result<()> {
        if !self.verbose || self.quiet {
            return Ok(());
        }
        println!(
            "   {:<40} {:<28} {}",
            row.user_principal_name,
            row.sku,
            yes_no(row.assigned_directly)
        );
        Ok(())
    }

    /// Notes are accuracy gaps, so they show even in quiet mode.
    fn note(&mut self, message: &str) -> Result<()> {
        eprintln!(" {} {}", "⚠".yellow(), message);
        Ok(())
    }
}

/// Render the bulk report as a table.
pub fn render_sources(rows: &[SkuSourceRow], quiet: bool) {
    let direct = rows.iter().filter(|r| r.assigned_directly).count();
    let from_group = rows
        .iter()
        .filter(|r| r.assigned_from_group == GroupAssignment::Yes)
        .count();

    if quiet {
        println!(
            "Assignments: {}  Direct: {}  From group: {}",
            rows.len(),
            direct.to_string().green(),
            from_group.to_string().cyan()
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("User").add_attribute(Attribute::Bold),
            Cell::new("Display name").add_attribute(Attribute::Bold),
            Cell::new("SKU").add_attribute(Attribute::Bold),
            Cell::new("AssignedDirectly").add_attribute(Attribute::Bold),
            Cell::new("AssignedFromGroup").add_attribute(Attribute::Bold),
            Cell::new("Groups").add_attribute(Attribute::Bold),
        ]);

    for row in rows {
        let group_color = match row.assigned_from_group {
            GroupAssignment::Yes => Color::Cyan,
            GroupAssignment::No => Color::Reset,
            GroupAssignment::Never => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&row.user_principal_name),
            Cell::new(row.display_name.as_deref().unwrap_or("")),
            Cell::new(&row.sku),
            Cell::new(yes_no(row.assigned_directly)).fg(if row.assigned_directly {
                Color::Green
            } else {
                Color::Reset
            }),
            Cell::new(row.assigned_from_group.to_string()).fg(group_color),
            Cell::new(row.groups.join(", ")),
        ]);
    }

    println!("{}", table);
    println!(
        "\n {} assignments, {} direct, {} from groups\n",
        rows.len(),
        direct,
        from_group
    );
}
