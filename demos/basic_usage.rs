//! Basic example of using the scan API

use std::path::Path;
use supply_chain_siren::{scan_project, ScanConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use default configuration
    let config = ScanConfig::default();

    // Scan the current project
    let project_path = Path::new(".");
    println!("Scanning project at: {}", project_path.display());

    let report = scan_project(project_path, &config).await?;

    println!("\n=== Scan Results ===");
    println!("Manifests: {}", report.manifests.len());
    println!("Total dependencies: {}", report.summary.total_dependencies);
    println!("Flagged: {}", report.summary.flagged);
    println!("Average score: {:.1}", report.summary.average_score);
    println!();

    let alerts = report.alerts(config.alert_threshold);
    if alerts.is_empty() {
        println!("✓ No dependencies above risk score {}", config.alert_threshold);
        return Ok(());
    }

    println!("High-risk dependencies:");
    for result in alerts {
        println!(
            "  - {} {} ({}): score {}",
            result.dependency.name,
            result.dependency.version,
            result.dependency.ecosystem,
            result.score
        );
        for signal in &result.signals {
            println!("    ⚠  {}", signal.message);
        }
    }

    Ok(())
}
