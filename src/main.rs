//! `license-source`: classify one user's service plans by source and offer to
//! remove redundant direct assignments.
//!
//! Exits `1` when the user does not exist or Graph credentials are missing.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use license_source::cli::{exit_with, ClassifyCli, ReportFormat};
use license_source::config::{load_config, Config};
use license_source::directory::graph::GraphDirectory;
use license_source::directory::snapshot::SnapshotDirectory;
use license_source::directory::Directory;
use license_source::license::advisor::{advise_and_trim, CriticalServices};
use license_source::pipeline::{classify, emit_classification, is_not_found, JsonReport};
use license_source::prompt::ConsolePrompter;
use license_source::report::audit::{RunLog, SkipLog};
use license_source::report::terminal::ConsoleRenderer;
use license_source::report::{Fanout, ReportSink};

const TOOL: &str = "license-source";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = ClassifyCli::parse();
    let config = load_config(cli.config.as_deref())?;

    match &cli.snapshot {
        Some(path) => {
            let directory = SnapshotDirectory::load(path)?;
            run(&directory, &cli, &config).await
        }
        None => {
            let directory = GraphDirectory::new(config.graph.clone())
                .unwrap_or_else(|e| exit_with(&e.to_string()));
            if let Err(e) = directory.connect().await {
                exit_with(&e.to_string());
            }
            run(&directory, &cli, &config).await
        }
    }
}

async fn run<D: Directory>(directory: &D, cli: &ClassifyCli, config: &Config) -> Result<()> {
    let mut log = RunLog::create(&config.audit.log_dir, TOOL)?;
    let critical = CriticalServices::new(config.advisor.critical_services.iter().cloned());
    let classifier_run = match classify(directory, &cli.upn, &critical).await {
        Ok(run) => run,
        Err(e) if is_not_found(&e) => exit_with(&format!("User {} not found", cli.upn)),
        Err(e) => return Err(e),
    };

    let skip_log = SkipLog::new(config.audit.skip_path());
    let user = &classifier_run.user;

    if cli.report == ReportFormat::Json {
        emit_classification(&classifier_run, &mut log)?;
        let outcomes = advise_and_trim(
            directory,
            user,
            &classifier_run.assessments,
            &mut ConsolePrompter,
            &mut log,
            &skip_log,
            true,
        )
        .await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonReport::new(&classifier_run, &outcomes))?
        );
        return Ok(());
    }

    let mut console = ConsoleRenderer::new(cli.verbose, cli.quiet);
    console.header(TOOL, &user.user_principal_name);
    {
        let mut sink = Fanout::new(vec![
            &mut console as &mut dyn ReportSink,
            &mut log as &mut dyn ReportSink,
        ]);
        emit_classification(&classifier_run, &mut sink)?;
        advise_and_trim(
            directory,
            user,
            &classifier_run.assessments,
            &mut ConsolePrompter,
            &mut sink,
            &skip_log,
            cli.dry_run,
        )
        .await?;
    }

    console.summary(&classifier_run.classification);
    if !cli.quiet {
        println!(" Run log: {}", log.path().display());
    }

    Ok(())
}
