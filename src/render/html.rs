//! Standalone HTML page for a report, plus the helpers that write it to disk
//! and hand it to the desktop browser.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::report::FAILURE_PREFIX;
use crate::domain::{MetricValue, Report};

const STYLE: &str = "\
body { background: #1e1e1e; color: #d4d4d4; font-family: 'Segoe UI', Helvetica, Arial, sans-serif; margin: 2em; }
h1 { color: #4ec9b0; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #3c3c3c; padding: 6px 10px; text-align: left; vertical-align: top; }
th { background: #252526; width: 22%; }
pre { margin: 0; white-space: pre-wrap; font-family: Consolas, monospace; }
ul { margin: 0; padding-left: 1.2em; }
.error { color: #f48771; }
.ok { color: #89d185; }
.warn { color: #cca700; }
footer { margin-top: 1.5em; color: #808080; font-size: 0.85em; }
";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render(report: &Report, host: &str, generated: DateTime<Utc>) -> String {
    let host = escape(host);
    let mut rows = String::new();

    for (key, outcome) in report.iter() {
        let cell = match outcome {
            Ok(MetricValue::Scalar(s)) => escape(s),
            Ok(MetricValue::Lines(lines)) => {
                let joined: Vec<String> = lines.iter().map(|l| escape(l)).collect();
                format!("<pre>{}</pre>", joined.join("\n"))
            }
            Ok(MetricValue::Services(services)) => services_list(services),
            Err(failure) => format!(
                "<span class=\"error\">{}</span>",
                escape(&failure.display_value())
            ),
        };
        let _ = writeln!(rows, "<tr><th>{}</th><td>{cell}</td></tr>", escape(key));
    }

    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>System Info: {host}</title>\n\
         <style>\n{STYLE}</style>\n\
         </head>\n\
         <body>\n\
         <h1>System Info: {host}</h1>\n\
         <table>\n{rows}</table>\n\
         <footer>Generated {} by syscheck {}</footer>\n\
         </body>\n\
         </html>\n",
        generated.format("%Y-%m-%d %H:%M:%S UTC"),
        env!("CARGO_PKG_VERSION"),
    )
}

fn services_list(services: &BTreeMap<String, String>) -> String {
    if services.is_empty() {
        return "<em>(no matching services)</em>".to_string();
    }
    let mut out = String::from("<ul>");
    for (name, status) in services {
        let class = if status.starts_with(FAILURE_PREFIX) {
            "error"
        } else if status.eq_ignore_ascii_case("active") || status.eq_ignore_ascii_case("running") {
            "ok"
        } else {
            "warn"
        };
        let _ = write!(
            out,
            "<li>{}: <span class=\"{class}\">{}</span></li>",
            escape(name),
            escape(status)
        );
    }
    out.push_str("</ul>");
    out
}

/// Write the page to `target`, or to a kept temporary `.html` file when no
/// target is given. Returns the path written.
pub fn write_report(html: &str, target: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = target {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, html).with_context(|| format!("writing {}", path.display()))?;
        return Ok(path.to_path_buf());
    }

    let mut file = tempfile::Builder::new()
        .prefix("syscheck-")
        .suffix(".html")
        .tempfile()
        .context("creating temporary HTML file")?;
    file.write_all(html.as_bytes())
        .context("writing temporary HTML file")?;
    let (_, path) = file.keep().context("keeping temporary HTML file")?;
    Ok(path)
}

pub fn open_in_browser(path: &Path) -> Result<()> {
    open::that(path).with_context(|| format!("opening {} in the default browser", path.display()))
}
