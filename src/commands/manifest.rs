//! `syscheck manifest --os <platform>`
//!
//! Shows what a collection would run against a platform without connecting.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::domain::manifest::Metric;
use crate::domain::Collector;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ManifestFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct ManifestView<'a> {
    platform: String,
    metrics: &'a [Metric],
    service_list_command: &'a str,
    default_patterns: &'a [String],
}

fn view(collector: &Collector) -> ManifestView<'_> {
    let manifest = collector.manifest();
    ManifestView {
        platform: manifest.platform().to_string(),
        metrics: manifest.metrics(),
        service_list_command: manifest.services().list_command,
        default_patterns: collector.patterns(),
    }
}

pub fn run(os: &str, format: ManifestFormat) -> Result<()> {
    let collector = Collector::new(os, Vec::new())?;

    match format {
        ManifestFormat::Json => {
            let json = serde_json::to_string_pretty(&view(&collector))
                .context("serializing manifest")?;
            println!("{json}");
        }
        ManifestFormat::Table => print_table(&collector),
    }
    Ok(())
}

fn print_table(collector: &Collector) {
    let manifest = collector.manifest();
    println!("{} {}", "Manifest:".bold(), manifest.platform().to_string().green().bold());
    println!();

    let width = manifest.names().map(str::len).max().unwrap_or(0);
    for metric in manifest.metrics() {
        println!(
            "  {}  {}",
            format!("{:<width$}", metric.name).bold(),
            metric.command.dimmed()
        );
    }

    println!();
    println!("{} {}", "Service listing:".bold(), manifest.services().list_command);
    println!(
        "{} {}",
        "Default patterns:".bold(),
        collector.patterns().join(" ")
    );
}
