use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::domain::Report;

/// Pretty-printed with a four-space indent, keys in collection order.
pub fn render(report: &Report) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    report.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
