//! Hoist - pre-release to release promotion
//!
//! Usage:
//!   hoist classify <tag>          # Show how a tag is classified
//!   hoist promote <tag>           # Promote the latest pre-release to <tag>
//!   hoist promote --from-env      # Same, reading the tag from CI variables
//!   hoist audit <tag>             # Check a release against the artifact matrix
//!   hoist matrix <tag>            # List the asset names <tag> must carry

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hoist_core::commands::{
    AuditCommand, AuditReport, ClassifyCommand, ClassifyReport, CommandContext, MatrixCommand,
    MatrixReport, Overrides, PromoteCommand, PromoteOptions,
};
use hoist_core::job::JobOutcome;
use hoist_core::matrix::ArchiveFormat;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "Promote a validated pre-release to a versioned release", long_about = None)]
struct Cli {
    /// Path to hoist.toml (default: ./hoist.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository as owner/name, overriding hoist.toml
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Artifact archive format (tar.gz or zip), overriding hoist.toml
    #[arg(long, global = true)]
    archive: Option<ArchiveFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a tag is classified
    Classify {
        tag: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Promote the most recent pre-release to a draft release
    Promote {
        /// Tag to promote
        #[arg(required_unless_present = "from_env")]
        tag: Option<String>,

        /// Read the tag from GITHUB_REF_NAME / GITHUB_REF
        #[arg(long, conflicts_with = "tag")]
        from_env: bool,

        /// Commit the tag points at (defaults to GITHUB_SHA with --from-env)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Compare a published release with the artifact matrix
    Audit {
        tag: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List the asset names a release must carry
    Matrix {
        tag: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hoist=info,hoist_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        repo: cli.repo.clone(),
        format: cli.archive,
    };
    let ctx = CommandContext::load(cli.config.as_deref(), &overrides)?;

    let exit_code = run_cli(cli.command, ctx)?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn run_cli(command: Commands, ctx: CommandContext) -> Result<i32> {
    match command {
        Commands::Classify { tag, format } => {
            let rules = ctx.config().tag_rules()?;
            let report = ClassifyCommand::new(rules).execute(&tag);
            print_classify(&report, format)?;
            Ok(0)
        }
        Commands::Promote {
            tag,
            from_env,
            reference,
            format,
        } => {
            let mut options = match tag {
                Some(tag) => PromoteOptions::tag(tag),
                None => PromoteOptions::default(),
            };
            options.from_env = from_env;
            if let Some(reference) = reference {
                options = options.with_reference(reference);
            }

            let outcome = PromoteCommand::new(ctx).execute(&options)?;
            print_outcome(&outcome, format)?;
            Ok(if outcome.is_failure() { 1 } else { 0 })
        }
        Commands::Audit { tag, format } => {
            let report = AuditCommand::new(ctx).execute(&tag)?;
            print_audit(&report, format)?;
            Ok(if report.complete { 0 } else { 1 })
        }
        Commands::Matrix { tag, format } => {
            let report = MatrixCommand::new(ctx.config().artifacts.format).execute(&tag);
            print_matrix(&report, format)?;
            Ok(0)
        }
    }
}

fn print_classify(report: &ClassifyReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let verdict = if report.should_promote {
                "promote"
            } else {
                "skip"
            };
            println!("{}: {}", report.tag, verdict);
            println!(
                "  version:      {}",
                report.version.as_deref().unwrap_or("-")
            );
            println!("  release tag:  {}", yes_no(report.matches_release));
            println!("  pre-release:  {}", yes_no(report.is_pre_release));
            println!("  forced:       {}", yes_no(report.is_forced));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn print_outcome(outcome: &JobOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => match outcome {
            JobOutcome::Skipped { tag, reason } => {
                println!("• Skipped '{}': {}", tag, reason);
            }
            JobOutcome::Succeeded { source, release } => {
                if release.already_published {
                    println!("• '{}' is already published", release.tag);
                } else {
                    println!("✓ Promoted '{}' to '{}'", source, release.tag);
                }
                println!(
                    "  draft: {}, prerelease: {}",
                    yes_no(release.draft),
                    yes_no(release.prerelease)
                );
                for asset in &release.assets {
                    let marker = if release.uploaded.contains(asset) {
                        "+"
                    } else {
                        "="
                    };
                    println!("  {} {}", marker, asset);
                }
            }
            JobOutcome::Failed {
                state,
                reason,
                partial_publish,
            } => {
                eprintln!("✗ Promotion failed after {:?}: {}", state, reason);
                if *partial_publish {
                    eprintln!(
                        "  ⚠ The release may be partially published. Re-run to resume, or check it with 'hoist audit'."
                    );
                }
            }
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
    }
    Ok(())
}

fn print_audit(report: &AuditReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.complete {
                println!("✓ '{}' holds exactly the expected assets", report.tag);
            } else {
                println!("✗ '{}' does not match the artifact matrix", report.tag);
            }
            for name in &report.missing {
                println!("  missing:    {}", name);
            }
            for name in &report.unexpected {
                println!("  unexpected: {}", name);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn print_matrix(report: &MatrixReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{:<12} {:<8} NAME", "PLATFORM", "NETWORK");
            for asset in &report.assets {
                println!("{:<12} {:<8} {}", asset.platform, asset.network, asset.name);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
