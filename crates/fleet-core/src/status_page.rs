use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One row of the status page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: u64,
    pub status: String,
    pub address: Option<String>,
    pub output_path: PathBuf,
}

/// Render every job into a standalone HTML page.
pub fn render_html(snapshots: &[JobSnapshot], generated_at: DateTime<Utc>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>compas-fleet status</title>\n</head>\n<body>\n");
    html.push_str(&format!(
        "<p>Updated {}</p>\n",
        escape(&generated_at.to_rfc3339())
    ));
    html.push_str("<table border=\"1\">\n");
    html.push_str("<tr><th>Job</th><th>Status</th><th>Address</th><th>Output</th></tr>\n");
    for row in snapshots {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            row.id,
            escape(&row.status),
            escape(row.address.as_deref().unwrap_or("-")),
            escape(&row.output_path.display().to_string()),
        ));
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Write the page next to `path` and rename it into place so readers never
/// see a half-written file.
pub fn write_page(path: &Path, snapshots: &[JobSnapshot]) -> Result<(), std::io::Error> {
    let html = render_html(snapshots, Utc::now());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("html.tmp");
    std::fs::write(&tmp, html)?;
    std::fs::rename(&tmp, path)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_escaped() {
        let rows = vec![JobSnapshot {
            id: 3,
            status: "<b>done</b> & dusted".to_string(),
            address: None,
            output_path: PathBuf::from("./output3"),
        }];
        let html = render_html(&rows, Utc::now());
        assert!(html.contains("&lt;b&gt;done&lt;/b&gt; &amp; dusted"));
        assert!(html.contains("<td>3</td>"));
        assert!(html.contains("<td>-</td>"));
        assert!(!html.contains("<b>done"));
    }
}
