//! CLI tool for scanning PyPI and npm dependencies for supply-chain risk

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use supply_chain_siren::{
    default_cache_path, determine_level, scan_project, FileCache, RiskLevel, ScanConfig,
    ScanReport, ScanResult,
};
use tabled::{settings::Style, Table, Tabled};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "supply-chain-siren")]
#[command(about = "Scan Python and JavaScript dependencies for supply-chain risk signals", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the project (or a single manifest) to scan
    #[arg(short = 'p', long, default_value = ".", global = true)]
    project_path: PathBuf,

    /// Path to custom configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Dependencies to ignore (can be specified multiple times)
    #[arg(long = "ignore", global = true)]
    ignore_dependencies: Vec<String>,

    /// Skip the metadata cache and always query the registries
    #[arg(long, global = true)]
    no_cache: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan dependencies and display a risk table
    Scan {
        /// Fail if any dependency has a risk score above this threshold (0-100)
        #[arg(long)]
        fail_threshold: Option<u8>,

        /// Display every signal for each dependency
        #[arg(long)]
        detailed: bool,
    },

    /// Generate detailed scan report
    Report {
        /// Output format
        #[arg(short = 'f', long, default_value = "markdown")]
        format: ReportFormat,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Check dependencies against the alert threshold (exit code based)
    Check {
        /// Highest acceptable risk score (defaults to the configured alert threshold)
        #[arg(long)]
        max_score: Option<u8>,
    },

    /// Remove all cached registry metadata
    ClearCache,
}

#[derive(Clone, Debug)]
enum ReportFormat {
    Json,
    Markdown,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Score")]
    score: u8,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Signals")]
    signals: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => match load_config(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{} Failed to load config: {:#}", "Error:".red().bold(), e);
                process::exit(1);
            }
        },
        None => ScanConfig::default(),
    };

    // Apply CLI overrides
    config
        .ignored_dependencies
        .extend(cli.ignore_dependencies.iter().cloned());
    if cli.no_cache {
        config.cache.enabled = false;
    }

    if let Commands::ClearCache = cli.command {
        match clear_cache(&config) {
            Ok(path) => println!("{} Cleared cache at {}", "Success:".green().bold(), path.display()),
            Err(e) => {
                eprintln!("{} Failed to clear cache: {:#}", "Error:".red().bold(), e);
                process::exit(1);
            }
        }
        return;
    }

    // Run scan
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Scanning dependencies...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = scan_project(&cli.project_path, &config).await;

    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Scan failed: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    // Handle subcommand
    match cli.command {
        Commands::Scan {
            fail_threshold,
            detailed,
        } => {
            display_table(&report);
            display_summary(&report);

            if detailed {
                println!();
                display_detailed(&report);
            }

            if let Some(threshold) = fail_threshold {
                let failing = report.alerts(threshold);
                if !failing.is_empty() {
                    eprintln!(
                        "\n{} {} dependencies above threshold {}:",
                        "Failed:".red().bold(),
                        failing.len(),
                        threshold
                    );
                    for result in &failing {
                        eprintln!(
                            "  - {} {}: score {}",
                            result.dependency.name, result.dependency.version, result.score
                        );
                    }
                    process::exit(1);
                }
            }
        }

        Commands::Report { format, output } => {
            let content = match format {
                ReportFormat::Json => generate_json_report(&report),
                ReportFormat::Markdown => generate_markdown_report(&report),
            };

            if let Some(output_path) = output {
                match std::fs::write(&output_path, content) {
                    Ok(_) => println!("Report written to: {}", output_path.display()),
                    Err(e) => {
                        eprintln!("{} Failed to write report: {}", "Error:".red().bold(), e);
                        process::exit(1);
                    }
                }
            } else {
                println!("{}", content);
            }
        }

        Commands::Check { max_score } => {
            let threshold = max_score.unwrap_or(config.alert_threshold);
            let failures = report.alerts(threshold);

            if !failures.is_empty() {
                eprintln!(
                    "{} {} dependencies exceed risk score {}:",
                    "Failed:".red().bold(),
                    failures.len(),
                    threshold
                );
                for result in failures {
                    eprintln!(
                        "  - {} {} ({}): score {} [{}]",
                        result.dependency.name,
                        result.dependency.version,
                        result.dependency.ecosystem,
                        result.score,
                        signal_list(result)
                    );
                }
                process::exit(1);
            } else {
                println!("{} All checks passed!", "Success:".green().bold());
            }
        }

        Commands::ClearCache => {}
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<ScanConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: ScanConfig =
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn clear_cache(config: &ScanConfig) -> anyhow::Result<PathBuf> {
    let path = match &config.cache.path {
        Some(path) => path.clone(),
        None => default_cache_path()?,
    };
    FileCache::open(&path, config.cache.ttl())?.clear()?;
    Ok(path)
}

fn signal_list(result: &ScanResult) -> String {
    if result.signals.is_empty() {
        return "-".to_string();
    }
    result
        .signals
        .iter()
        .map(|s| s.category.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn colored_level(score: u8) -> ColoredString {
    let level = determine_level(score);
    let label = level.to_string();
    match level {
        RiskLevel::None => label.green(),
        RiskLevel::Low => label.normal(),
        RiskLevel::Medium => label.yellow(),
        RiskLevel::High => label.red(),
    }
}

fn display_table(report: &ScanReport) {
    if report.results.is_empty() {
        println!("No dependencies found.");
        return;
    }

    let mut sorted: Vec<&ScanResult> = report.results.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));

    let rows: Vec<ResultRow> = sorted
        .into_iter()
        .map(|r| ResultRow {
            package: r.dependency.name.clone(),
            ecosystem: r.dependency.ecosystem.to_string(),
            version: r.dependency.version.clone(),
            score: r.score,
            risk: determine_level(r.score).to_string(),
            signals: signal_list(r),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

fn display_summary(report: &ScanReport) {
    let summary = &report.summary;

    println!("\n{}", "=== Scan Summary ===".bold());
    println!("Project: {}", report.project_path.cyan());
    println!("Manifests: {}", report.manifests.len());
    println!("Total dependencies: {}", summary.total_dependencies);
    println!(
        "  {} {}",
        "●".yellow(),
        format!("Flagged: {}", summary.flagged).yellow()
    );
    println!(
        "  {} {}",
        "●".red(),
        format!("Possible typosquats: {}", summary.typosquats).red()
    );
    println!(
        "  {} {}",
        "●".truecolor(255, 165, 0),
        format!("Metadata gaps: {}", summary.metadata_gaps).truecolor(255, 165, 0)
    );
    println!();
    println!("Highest score: {}", summary.max_score);
    println!("Average score: {:.1}", summary.average_score);

    for diagnostic in &report.diagnostics {
        println!("{} {}", "Warning:".yellow().bold(), diagnostic);
    }
}

fn display_detailed(report: &ScanReport) {
    println!("{}", "=== Detailed Results ===".bold());

    for result in report.results.iter().filter(|r| !r.signals.is_empty()) {
        println!(
            "\n{} {} [{}] Score: {}",
            result.dependency.name.bold(),
            result.dependency.version,
            colored_level(result.score),
            result.score
        );
        println!("  Source: {}", result.dependency.source.display());

        if let Some(latest) = &result.metadata.latest_version {
            println!("  Latest version: {}", latest);
        }
        if let Some(repository) = &result.metadata.repository_url {
            println!("  Repository: {}", repository);
        }

        for signal in &result.signals {
            println!(
                "    - [{}] +{} {}",
                signal.category,
                signal.weight,
                signal.message.yellow()
            );
        }
    }
}

fn generate_json_report(report: &ScanReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| {
        eprintln!("Failed to serialize report: {}", e);
        process::exit(1);
    })
}

fn generate_markdown_report(report: &ScanReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Supply-Chain Risk Report: {}\n\n", report.project_path));
    md.push_str(&format!("**Generated:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!(
        "- Total dependencies: {}\n",
        report.summary.total_dependencies
    ));
    md.push_str(&format!("- Flagged: {}\n", report.summary.flagged));
    md.push_str(&format!("- Possible typosquats: {}\n", report.summary.typosquats));
    md.push_str(&format!("- Metadata gaps: {}\n", report.summary.metadata_gaps));
    md.push_str(&format!("- Highest score: {}\n", report.summary.max_score));
    md.push_str(&format!(
        "- Average score: {:.1}\n\n",
        report.summary.average_score
    ));

    md.push_str("## Dependencies\n\n");
    md.push_str("| Package | Ecosystem | Version | Score | Risk | Signals |\n");
    md.push_str("|---------|-----------|---------|-------|------|---------|\n");

    for result in &report.results {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            result.dependency.name,
            result.dependency.ecosystem,
            result.dependency.version,
            result.score,
            determine_level(result.score),
            signal_list(result)
        ));
    }

    let flagged: Vec<&ScanResult> = report.results.iter().filter(|r| !r.signals.is_empty()).collect();
    if !flagged.is_empty() {
        md.push_str("\n## Findings\n\n");
        for result in flagged {
            md.push_str(&format!("### {} ({})\n\n", result.dependency.name, result.dependency.ecosystem));
            for signal in &result.signals {
                md.push_str(&format!("- **{}** (+{}): {}\n", signal.category, signal.weight, signal.message));
            }
            md.push('\n');
        }
    }

    if !report.diagnostics.is_empty() {
        md.push_str("## Diagnostics\n\n");
        for diagnostic in &report.diagnostics {
            md.push_str(&format!("- {}\n", diagnostic));
        }
    }

    md
}
