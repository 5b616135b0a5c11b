//! CLI output formatting
//!
//! Renders catalog, provisioning, storage and metric results as tables or JSON.

use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use querydeck_core::cache::CacheStats;
use querydeck_core::indexes::IndexKind;
use querydeck_core::{
    ErrorSeverity, IndexDescriptor, OperationStats, ProvisionReport, QueryPlan, StorageReport,
};
use serde_json::json;
use std::collections::BTreeMap;

fn table(headers: &[&str], no_color: bool) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if no_color {
        table.set_header(headers.to_vec());
    } else {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    }
    table
}

/// Plan and cache key for `querydeck plan`
pub fn format_plan(plan: &QueryPlan, key: &str) -> String {
    let out = json!({
        "plan": plan.to_json(),
        "cacheKey": key,
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

/// Format the index catalog (table or JSON)
pub fn format_indexes(indexes: &[IndexDescriptor], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(indexes).unwrap_or_else(|_| "[]".to_string());
    }
    if indexes.is_empty() {
        return "No indexes.".to_string();
    }

    let mut table = table(&["Collection", "Name", "Fields", "Unique", "Text"], no_color);
    for index in indexes {
        let fields = index
            .fields
            .iter()
            .map(|f| match f.kind {
                IndexKind::Ascending => format!("{} ↑", f.name),
                IndexKind::Descending => format!("{} ↓", f.name),
                IndexKind::Text => format!("{} (text)", f.name),
            })
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(Row::from(vec![
            index.collection.clone(),
            index.name(),
            fields,
            yes_no(index.options.unique).to_string(),
            yes_no(index.options.text_search).to_string(),
        ]));
    }
    table.to_string()
}

/// Format a provisioning run
pub fn format_provision(report: &ProvisionReport, no_color: bool) -> String {
    let (warnings, errors) = report.error_count();
    let mut lines = vec![format!(
        "Indexes: {} created, {} already present, {} warnings, {} errors",
        report.created, report.already_present, warnings, errors
    )];

    if !report.errors.is_empty() {
        let mut table = table(&["Index", "Severity", "Message"], no_color);
        for error in &report.errors {
            let severity = match error.severity {
                ErrorSeverity::Warning => "warning",
                ErrorSeverity::Error => "error",
            };
            let severity = if no_color {
                Cell::new(severity)
            } else {
                Cell::new(severity).fg(match error.severity {
                    ErrorSeverity::Warning => Color::Yellow,
                    ErrorSeverity::Error => Color::Red,
                })
            };
            table.add_row(vec![
                Cell::new(&error.source),
                severity,
                Cell::new(truncate(&error.message, 60)),
            ]);
        }
        lines.push(table.to_string());
    }
    lines.join("\n")
}

/// Format per-collection storage figures
pub fn format_storage(report: &StorageReport, no_color: bool) -> String {
    let mut table = table(&["Collection", "Documents", "Indexes", "Size"], no_color);
    for stats in &report.collections {
        table.add_row(Row::from(vec![
            stats.collection.clone(),
            stats.documents.to_string(),
            stats.indexes.to_string(),
            format_bytes(stats.approx_size_bytes),
        ]));
    }
    table.add_row(Row::from(vec![
        "total".to_string(),
        report.total_documents.to_string(),
        report.total_indexes.to_string(),
        format_bytes(report.total_size_bytes),
    ]));
    table.to_string()
}

/// Format latency aggregates followed by cache counters
pub fn format_metrics(
    snapshot: &BTreeMap<String, OperationStats>,
    cache: &CacheStats,
    no_color: bool,
) -> String {
    let mut table = table(
        &["Operation", "Count", "Avg ms", "Min ms", "Max ms", "Total ms"],
        no_color,
    );
    for (name, stats) in snapshot {
        table.add_row(Row::from(vec![
            name.clone(),
            stats.count.to_string(),
            format!("{:.3}", stats.average),
            format!("{:.3}", stats.min),
            format!("{:.3}", stats.max),
            format!("{:.3}", stats.total),
        ]));
    }
    format!(
        "{}\nCache: {} entries, {} hits, {} misses, {} expired, {} size clears (hit ratio {:.1}%)",
        table,
        cache.entries,
        cache.hits,
        cache.misses,
        cache.expired,
        cache.size_clears,
        cache.hit_ratio() * 100.0
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "-"
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).collect::<String>() + "…"
    }
}
