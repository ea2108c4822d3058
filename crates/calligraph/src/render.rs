//! Output writers.
//!
//! The graph is the artifact; these writers only serialize it. DOT output
//! groups vertices into one cluster per namespace and leaves layout to
//! Graphviz; JSON output is the [`CallGraph`] model verbatim.

use std::fmt::Write;

use indexmap::IndexMap;

use crate::analyze::{CallGraph, GraphNode};

/// Renders the graph as Graphviz DOT.
///
/// *Defines* edges are drawn dashed and gray, *uses* edges solid. When the
/// nodes carry hue indices, each file gets an evenly spaced HSV hue.
#[must_use]
pub fn to_dot(graph: &CallGraph) -> String {
    let mut out = String::new();
    let hues = graph.file_index_count();

    out.push_str("digraph G {\n");
    out.push_str("    graph [rankdir=TB, fontname=\"Helvetica\"];\n");
    out.push_str("    node [shape=box, style=filled, fontname=\"Helvetica\"];\n");

    let mut clusters: IndexMap<&str, Vec<(&String, &GraphNode)>> = IndexMap::new();
    for (qualified, node) in &graph.nodes {
        clusters.entry(node.namespace.as_str()).or_default().push((qualified, node));
    }

    for (cluster_index, (namespace, nodes)) in clusters.iter().enumerate() {
        let indent = if namespace.is_empty() {
            "    "
        } else {
            let _ = writeln!(out, "    subgraph cluster_{cluster_index} {{");
            let _ = writeln!(out, "        label=\"{}\";", escape(namespace));
            let _ = writeln!(out, "        style=\"rounded\";");
            "        "
        };
        for (qualified, node) in nodes {
            let label = node.label.as_ref().map_or_else(
                || node.name.clone(),
                |label| format!("{}\\n{}", node.name, label),
            );
            let fill = fill_color(node, hues);
            let _ = writeln!(
                out,
                "{indent}\"{}\" [label=\"{}\", tooltip=\"{} {}\", fillcolor=\"{fill}\"];",
                escape(qualified),
                escape(&label),
                node.flavor,
                escape(qualified)
            );
        }
        if !namespace.is_empty() {
            out.push_str("    }\n");
        }
    }

    for (source, target) in &graph.defines_edges {
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\" [style=dashed, color=gray];",
            escape(source),
            escape(target)
        );
    }
    for (source, target) in &graph.uses_edges {
        let _ = writeln!(out, "    \"{}\" -> \"{}\";", escape(source), escape(target));
    }

    out.push_str("}\n");
    out
}

/// Renders the graph as JSON.
pub fn to_json(graph: &CallGraph) -> serde_json::Result<String> {
    serde_json::to_string_pretty(graph)
}

fn fill_color(node: &GraphNode, hues: u32) -> String {
    match node.file_index {
        Some(index) if hues > 0 => {
            let hue = f64::from(index) / f64::from(hues);
            format!("{hue:.3} 0.200 1.000")
        }
        _ => "#ffffff".to_owned(),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
