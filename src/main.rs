//! Agentcycle: autonomous agent cycle scheduler.
//!
//! Usage:
//!   agentcycle init          Write a default config and agents file
//!   agentcycle agents        Show configured agents and their intervals
//!   agentcycle analyze       One-shot analysis of the target repository
//!   agentcycle run           Run the scheduler until Ctrl+C

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use agentcycle::analysis::CodeAnalyzer;
use agentcycle::config::{self, CyclerConfig, CONFIG_FILE};
use agentcycle::github::GitHubProvider;
use agentcycle::pipeline::EnhancementPipeline;
use agentcycle::scheduler::{CycleScheduler, IntervalTable};
use agentcycle::types::*;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agentcycle")]
#[command(version = "0.1.0")]
#[command(about = "Autonomous agent cycle scheduler with a self-improvement pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the agentcycle home directory (default ~/.agentcycle).
    #[arg(long)]
    home: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides the config.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config and agents file.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Show configured agents and their tick intervals.
    Agents,

    /// Analyze the target repository once and print the proposals.
    Analyze {
        /// Apply every proposal on its own branch.
        #[arg(long)]
        apply: bool,

        /// Finalize applied branches with a summary commit.
        #[arg(long)]
        auto_commit: bool,
    },

    /// Run the scheduler until Ctrl+C.
    Run {
        /// Stop on its own after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = match &cli.home {
        Some(home) => PathBuf::from(shellexpand::tilde(home).into_owned()),
        None => config::default_home_dir(),
    };
    let config_path = home_dir.join(CONFIG_FILE);
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&home_dir, force),
        Commands::Agents => cmd_agents(&cfg),
        Commands::Analyze { apply, auto_commit } => cmd_analyze(&cfg, apply, auto_commit).await,
        Commands::Run { duration_secs } => cmd_run(&cfg, duration_secs).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path, force: bool) -> Result<()> {
    let config_path = home_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        bail!(
            "Config already exists at {}; pass --force to overwrite",
            config_path.display()
        );
    }

    let mut cfg = CyclerConfig::default();
    cfg.agents_config_path = home_dir.join("agents.yml").display().to_string();
    config::save_config(&cfg, &config_path)?;

    let agents_path = PathBuf::from(cfg.resolved_agents_path());
    if !agents_path.exists() || force {
        config::save_agents(&config::default_agent_seeds(), &agents_path)?;
    }

    println!("{} Wrote {}", ">>>".green().bold(), config_path.display());
    println!("{} Wrote {}", ">>>".green().bold(), agents_path.display());
    println!("    Set `repository` and GITHUB_TOKEN to enable self-improvement.");
    Ok(())
}

fn cmd_agents(cfg: &CyclerConfig) -> Result<()> {
    let seeds = load_seeds(cfg)?;
    let intervals = IntervalTable::from_config(cfg);

    println!();
    println!("{}", "=== Agents ===".bold());
    println!();
    for seed in &seeds {
        let id = seed.id.as_deref().unwrap_or("(generated)");
        let credential = seed.credential.as_deref().unwrap_or("default");
        println!(
            "  {:<16} {:<14} {:<10} every {:>4}s  credential: {}",
            id.bold(),
            seed.name,
            seed.role.cyan(),
            intervals.interval_for(&seed.role).as_secs(),
            credential
        );
    }
    println!(
        "  {:<16} {:<14} {:<10} every {:>4}s",
        "(other roles)".dimmed(),
        "",
        "",
        intervals.fallback().as_secs()
    );
    println!();
    println!(
        "  {}: {}",
        "Repository".bold(),
        if cfg.repository.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            cfg.repository.clone()
        }
    );
    println!();
    Ok(())
}

async fn cmd_analyze(cfg: &CyclerConfig, apply: bool, auto_commit: bool) -> Result<()> {
    cfg.validate()?;

    let provider = Arc::new(GitHubProvider::new(
        &cfg.github_api_url,
        cfg.request_timeout(),
    )?);
    let mut options = cfg.analyzer_options();
    options.token = cfg.effective_token();

    let mut analyzer = CodeAnalyzer::with_default_detectors(provider);
    analyzer.initialize(&cfg.repository, options).await?;
    let proposals = analyzer.analyze_codebase().await?;

    println!();
    println!(
        "{} {} proposal(s) for {}",
        ">>>".green().bold(),
        proposals.len(),
        cfg.repository
    );
    for p in &proposals {
        println!();
        println!(
            "  {} [{} / {}]",
            p.title.bold(),
            colorize_category(p.category),
            colorize_impact(p.estimated_impact)
        );
        println!("    {}", p.description);
        for f in &p.files {
            println!("    {} {}", f.operation.to_string().dimmed(), f.path);
        }
    }
    println!();

    if !apply || proposals.is_empty() {
        return Ok(());
    }

    let (Some(host), Some(repo), Some(base)) = (
        analyzer.host(),
        analyzer.repository().cloned(),
        analyzer.base_branch().map(str::to_string),
    ) else {
        bail!("Analyzer lost its session after initialize");
    };
    let pipeline =
        EnhancementPipeline::new(host, repo, &base).with_branch_prefix(&cfg.branch_prefix);

    for p in &proposals {
        match pipeline.apply(p, auto_commit).await {
            Ok(outcome) => {
                println!("  {} {}", "branch".green(), outcome.branch);
                for change in &outcome.applied {
                    println!("    {} {} ({})", change.operation, change.path, change.summary);
                }
                for failure in &outcome.failures {
                    println!("    {} {}", "failed".red(), failure);
                }
                if let Some(sha) = &outcome.finalized {
                    println!("    finalized at {}", sha);
                }
            }
            Err(e) => println!("  {} {}: {}", "error".red().bold(), p.title, e),
        }
    }
    Ok(())
}

async fn cmd_run(cfg: &CyclerConfig, duration_secs: Option<u64>) -> Result<()> {
    let scheduler = CycleScheduler::from_config(cfg)?;
    let seeds = load_seeds(cfg)?;
    let added = scheduler.seed(seeds).await;
    if added == 0 {
        bail!("No agents configured in {}", cfg.resolved_agents_path());
    }

    println!(
        "{} Starting {} agent(s){}",
        ">>>".green().bold(),
        added,
        if cfg.repository.is_empty() {
            String::new()
        } else {
            format!(" against {}", cfg.repository)
        }
    );
    scheduler.start().await;

    // Wait for shutdown signal or the optional deadline
    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?,
    }

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    scheduler.stop().await;

    // Give in-flight cycles a bounded window to land their reports
    let grace = Duration::from_secs(10);
    let drained = tokio::time::timeout(grace, async {
        while scheduler.in_flight().await > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Cycles still in flight after {:?}; exiting anyway", grace);
    }

    print_summary(&scheduler).await;
    info!("Scheduler shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_seeds(cfg: &CyclerConfig) -> Result<Vec<AgentSeed>> {
    let path = PathBuf::from(cfg.resolved_agents_path());
    config::load_agents(&path)
        .with_context(|| format!("Failed to load agents from {}", path.display()))
}

async fn print_summary(scheduler: &CycleScheduler) {
    println!();
    println!("{}", "=== Summary ===".bold());
    println!();
    for agent in scheduler.list_agents().await {
        let failed = scheduler
            .get_agent_reports(&agent.id, usize::MAX)
            .await
            .iter()
            .filter(|r| r.status == ReportStatus::Failed)
            .count();
        println!(
            "  {:<16} cycle {:>3}  {} failed  avg {:.0} ms  {}",
            agent.id.bold(),
            agent.current_cycle,
            failed,
            agent.cycle_stats.avg_cycle_ms,
            colorize_status(agent.status)
        );
    }

    let recent = scheduler.get_recent_reports(5).await;
    if !recent.is_empty() {
        println!();
        println!("  {}:", "Recent reports".bold());
        for r in recent {
            println!(
                "    {} {} #{} {} ({})",
                r.timestamp.format("%H:%M:%S"),
                r.agent_id,
                r.cycle_number,
                r.cycle_type,
                colorize_report(r.status)
            );
        }
    }
    println!();
}

fn colorize_status(status: AgentStatus) -> String {
    match status {
        AgentStatus::Active => "active".green().to_string(),
        AgentStatus::Cycling | AgentStatus::Analyzing => status.to_string().yellow().to_string(),
        AgentStatus::Error => "error".red().to_string(),
        AgentStatus::Idle => "idle".dimmed().to_string(),
    }
}

fn colorize_report(status: ReportStatus) -> String {
    match status {
        ReportStatus::Completed => "completed".green().to_string(),
        ReportStatus::Failed => "failed".red().to_string(),
        ReportStatus::InProgress => "in-progress".yellow().to_string(),
    }
}

fn colorize_category(category: Category) -> String {
    match category {
        Category::Security => "security".red().bold().to_string(),
        Category::BugFix => "bug-fix".red().to_string(),
        Category::Performance => "performance".yellow().to_string(),
        Category::Feature => "feature".cyan().to_string(),
        Category::Refactor => "refactor".blue().to_string(),
    }
}

fn colorize_impact(impact: Impact) -> String {
    match impact {
        Impact::High => "high".red().to_string(),
        Impact::Medium => "medium".yellow().to_string(),
        Impact::Low => "low".dimmed().to_string(),
    }
}
