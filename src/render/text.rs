use std::collections::BTreeMap;
use std::fmt::Write;

use colored::{ColoredString, Colorize};

use crate::domain::report::FAILURE_PREFIX;
use crate::domain::{MetricValue, Report};

pub fn render(report: &Report, host: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", format!("System Info: {host}").green().bold());

    for (key, outcome) in report.iter() {
        match outcome {
            Ok(MetricValue::Scalar(s)) => {
                let _ = writeln!(out, "{}: {s}", key.bold());
            }
            Ok(MetricValue::Lines(lines)) => {
                let _ = writeln!(out, "{}:", key.bold());
                for line in lines {
                    let _ = writeln!(out, "  {line}");
                }
            }
            Ok(MetricValue::Services(services)) => {
                let _ = writeln!(out, "{}:", key.bold());
                write_services(&mut out, services);
            }
            Err(failure) => {
                let _ = writeln!(out, "{}: {}", key.bold(), failure.display_value().red());
            }
        }
    }
    out
}

fn write_services(out: &mut String, services: &BTreeMap<String, String>) {
    if services.is_empty() {
        let _ = writeln!(out, "  {}", "(no matching services)".dimmed());
        return;
    }
    for (name, status) in services {
        let _ = writeln!(out, "  - {name}: {}", status_colour(status));
    }
}

fn status_colour(status: &str) -> ColoredString {
    if status.starts_with(FAILURE_PREFIX) {
        status.red()
    } else if status.eq_ignore_ascii_case("active") || status.eq_ignore_ascii_case("running") {
        status.green()
    } else {
        status.yellow()
    }
}
