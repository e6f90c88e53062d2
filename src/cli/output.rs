//! Output formatting for CLI commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TaxisArgs};
use crate::error::Result;
use crate::facet::FV;

/// Result of indexing a record file.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSummary {
    pub records_read: usize,
    pub documents_indexed: usize,
    pub total_documents: usize,
    pub duration_ms: u64,
    pub docs_per_second: f64,
}

/// One facet dimension of a search.
#[derive(Debug, Serialize, Deserialize)]
pub struct FacetOutput {
    pub name: String,
    pub values: Vec<FV>,
}

/// Result of a search.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchSummary {
    pub query: Option<String>,
    pub total_hits: usize,
    pub hits: Vec<serde_json::Value>,
    pub facets: Vec<FacetOutput>,
    pub duration_ms: u64,
}

/// Index statistics.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub last_modified: String,
    pub facet_dimensions: Vec<String>,
    pub sort_fields: BTreeMap<String, String>,
    pub suggest_fields: Vec<String>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &TaxisArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &TaxisArgs) -> Result<()> {
    if args.verbosity() > 1 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if std::any::type_name::<T>().contains("SearchSummary") {
        output_search_human(&value);
    } else {
        output_generic_human(&value, 0);
    }
    Ok(())
}

/// Output search results in human format.
fn output_search_human(value: &serde_json::Value) {
    let Some(obj) = value.as_object() else {
        return;
    };
    if let Some(hits) = obj.get("hits").and_then(|h| h.as_array()) {
        println!("Search Results:");
        println!("═══════════════");
        for (i, hit) in hits.iter().enumerate() {
            println!();
            println!("Result {}:", i + 1);
            println!("─────────────");
            if let Some(fields) = hit.as_object() {
                for (name, field) in fields {
                    println!("{name}: {}", format_value(field));
                }
            }
        }
        println!();
    }

    if let Some(total) = obj.get("total_hits").and_then(|t| t.as_u64()) {
        println!("Total hits: {total}");
    }
    if let Some(duration) = obj.get("duration_ms").and_then(|d| d.as_u64()) {
        println!("Search time: {duration}ms");
    }

    if let Some(facets) = obj.get("facets").and_then(|f| f.as_array()) {
        if facets.is_empty() {
            return;
        }
        println!();
        println!("Facets:");
        println!("───────");
        for facet in facets {
            let name = facet.get("name").and_then(|n| n.as_str()).unwrap_or("?");
            println!("{name}:");
            if let Some(values) = facet.get("values").and_then(|v| v.as_array()) {
                for fv in values {
                    let label = fv.get("label").and_then(|l| l.as_str()).unwrap_or("?");
                    let count = fv.get("count").and_then(|c| c.as_u64()).unwrap_or(0);
                    println!("  {label} ({count})");
                }
            }
        }
    }
}

/// Output generic data in human format, nesting by indentation.
fn output_generic_human(value: &serde_json::Value, indent: usize) {
    let spaces = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                match val {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_)
                        if !is_flat(val) =>
                    {
                        println!("{spaces}{key}:");
                        output_generic_human(val, indent + 1);
                    }
                    _ => println!("{spaces}{key}: {}", format_value(val)),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                if is_flat(item) {
                    println!("{spaces}- {}", format_value(item));
                } else {
                    println!("{spaces}-");
                    output_generic_human(item, indent + 1);
                }
            }
        }
        _ => println!("{spaces}{}", format_value(value)),
    }
}

fn is_flat(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(obj) => obj.is_empty(),
        serde_json::Value::Array(items) => items
            .iter()
            .all(|i| !matches!(i, serde_json::Value::Object(_) | serde_json::Value::Array(_))),
        _ => true,
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &TaxisArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        serde_json::Value::Object(_) => "{}".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&serde_json::json!("Red")), "Red");
        assert_eq!(format_value(&serde_json::json!([1, "a", null])), "[1, a, null]");
        assert_eq!(format_value(&serde_json::json!(2.5)), "2.5");
    }

    #[test]
    fn test_is_flat() {
        assert!(is_flat(&serde_json::json!(["a", 1])));
        assert!(!is_flat(&serde_json::json!([{"label": "Red"}])));
        assert!(!is_flat(&serde_json::json!({"a": 1})));
        assert!(is_flat(&serde_json::json!({})));
    }
}
