use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug)]
#[command(
    name = "license-source",
    about = "Show where each of a user's M365 service plans comes from and trim redundant direct licenses",
    version
)]
pub struct ClassifyCli {
    /// User principal name to audit
    pub upn: String,

    /// Config file [default: ./.license-source/config.toml, fallback ~/.config/license-source/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read the tenant from a JSON snapshot instead of Microsoft Graph
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Report format; json never prompts
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Assess only: no prompts, no removals
    #[arg(long)]
    pub dry_run: bool,

    /// Also show plans with no attributable source
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "license-source-report",
    about = "Report whether each user's SKUs are assigned directly, by groups, or both",
    version
)]
pub struct ReportCli {
    /// User principal name, or `all` for every user; prompted for when omitted
    #[arg(long, value_name = "UPN|all")]
    pub user: Option<String>,

    /// Config file [default: ./.license-source/config.toml, fallback ~/.config/license-source/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read the tenant from a JSON snapshot instead of Microsoft Graph
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Print each user/SKU row as it is processed
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

/// Print a precondition failure and exit with status 1.
pub fn exit_with(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_args() {
        let cli = ClassifyCli::try_parse_from([
            "license-source",
            "alice@contoso.com",
            "--report",
            "json",
            "--snapshot",
            "tenant.json",
        ])
        .unwrap();
        assert_eq!(cli.upn, "alice@contoso.com");
        assert_eq!(cli.report, ReportFormat::Json);
        assert_eq!(cli.snapshot, Some(PathBuf::from("tenant.json")));
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_classify_requires_upn() {
        assert!(ClassifyCli::try_parse_from(["license-source"]).is_err());
    }

    #[test]
    fn test_report_user_is_optional() {
        let cli = ReportCli::try_parse_from(["license-source-report", "-q"]).unwrap();
        assert!(cli.user.is_none());
        assert!(cli.quiet);

        let cli = ReportCli::try_parse_from(["license-source-report", "--user", "all"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("all"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_report_verbose_flag() {
        let cli = ReportCli::try_parse_from(["license-source-report", "-v", "--user", "all"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);

        let cli = ReportCli::try_parse_from(["license-source-report", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
