//! `license-source-report`: list, for one user or every user, whether each SKU
//! is assigned directly, by groups, or both. Read-only.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use license_source::cli::{exit_with, ReportCli};
use license_source::config::{load_config, Config};
use license_source::directory::graph::GraphDirectory;
use license_source::directory::snapshot::SnapshotDirectory;
use license_source::directory::Directory;
use license_source::license::bulk::{run_bulk_report, ReportTarget};
use license_source::pipeline::is_not_found;
use license_source::prompt::{ConsolePrompter, Prompter};
use license_source::report::audit::RunLog;
use license_source::report::terminal::{render_sources, ConsoleRenderer};
use license_source::report::{Fanout, ReportSink};

const TOOL: &str = "license-source-report";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = ReportCli::parse();
    let config = load_config(cli.config.as_deref())?;

    let answer = match &cli.user {
        Some(user) => user.clone(),
        None => ConsolePrompter.ask("User principal name, or 'all' for every user:")?,
    };
    let target = ReportTarget::parse(&answer).unwrap_or_else(|| exit_with("No user given"));

    match &cli.snapshot {
        Some(path) => {
            let directory = SnapshotDirectory::load(path)?;
            run(&directory, &target, &cli, &config).await
        }
        None => {
            let directory = GraphDirectory::new(config.graph.clone())
                .unwrap_or_else(|e| exit_with(&e.to_string()));
            if let Err(e) = directory.connect().await {
                exit_with(&e.to_string());
            }
            run(&directory, &target, &cli, &config).await
        }
    }
}

async fn run<D: Directory>(
    directory: &D,
    target: &ReportTarget,
    cli: &ReportCli,
    config: &Config,
) -> Result<()> {
    let mut console = ConsoleRenderer::new(cli.verbose, cli.quiet);
    let mut log = RunLog::create(&config.audit.log_dir, TOOL)?;

    let subject = match target {
        ReportTarget::All => "all users".to_string(),
        ReportTarget::User(upn) => upn.clone(),
    };
    console.header(TOOL, &subject);

    let rows = {
        let mut sink = Fanout::new(vec![
            &mut console as &mut dyn ReportSink,
            &mut log as &mut dyn ReportSink,
        ]);
        match run_bulk_report(directory, target, &mut sink, !cli.quiet).await {
            Ok(rows) => rows,
            Err(e) if is_not_found(&e) => exit_with(&format!("User {} not found", subject)),
            Err(e) => return Err(e),
        }
    };

    render_sources(&rows, cli.quiet);
    if !cli.quiet {
        println!(" Run log: {}", log.path().display());
    }

    Ok(())
}
