use anyhow::Result;

use archi_graph_core::schema::FieldSummary;
use archi_graph_core::{Namespace, SchemaRegistry};

fn rules(summary: &FieldSummary) -> String {
    let mut parts = Vec::new();
    if let Some(options) = summary.options {
        parts.push(options.join("|"));
    }
    match (summary.min, summary.max) {
        (Some(min), Some(max)) => parts.push(format!("{}..{}", min, max)),
        (Some(min), None) => parts.push(format!(">={}", min)),
        (None, Some(max)) => parts.push(format!("<={}", max)),
        (None, None) => {}
    }
    if let Some(len) = summary.max_length {
        parts.push(format!("len<={}", len));
    }
    if let Some(pattern) = &summary.pattern {
        parts.push(pattern.clone());
    }
    parts.join(" ")
}

/// Print the field definitions of one namespace, or of all of them.
pub fn run_schema(namespace: Option<Namespace>) -> Result<()> {
    let registry = SchemaRegistry::builtin();
    let namespaces: Vec<Namespace> = match namespace {
        Some(ns) => vec![ns],
        None => Namespace::ALL.to_vec(),
    };

    for ns in namespaces {
        println!("[{}]", ns);
        println!("  {:<34} {:<8} {:<14} RULES", "KEY", "TYPE", "DEFAULT");
        for def in registry.definitions_for(ns) {
            let summary = def.summary();
            println!(
                "  {:<34} {:<8} {:<14} {}",
                summary.key,
                summary.kind,
                summary.default.to_string(),
                rules(&summary)
            );
        }
        println!();
    }
    Ok(())
}
