// Report generation from a finished walk

use certgraph_scanner::{DomainGraph, WalkResult, canonical_domain};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Dot,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "dot" | "graphviz" => Some(ReportFormat::Dot),
            _ => None,
        }
    }
}

/// One line per domain, ascending:
/// `<domain> <depth> [<neighbor1> <neighbor2> ...]`
pub fn generate_text_report(graph: &DomainGraph) -> String {
    let mut report = String::new();
    for node in graph.sorted() {
        report.push_str(&format!(
            "{} {} [{}]\n",
            node.domain,
            node.depth,
            node.neighbors.join(" ")
        ));
    }
    report
}

pub fn generate_json_report(
    result: &WalkResult,
    seeds: &[String],
) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "metadata": {
            "generator": "certgraph",
            "version": env!("CARGO_PKG_VERSION"),
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "seeds": seeds,
        },
        "summary": {
            "total_domains": result.graph.len(),
            "graph_depth": result.stats.dispatch.max_depth_seen,
            "duration_seconds": result.stats.elapsed.as_secs_f64(),
            "stats": result.stats,
        },
        "nodes": result.graph.sorted(),
    });

    serde_json::to_string_pretty(&json_report)
}

/// Graphviz digraph of the walk. Edges point at the canonical form of each
/// neighbor so wildcard names join the node they were resolved as.
pub fn generate_dot_report(graph: &DomainGraph) -> String {
    let nodes = graph.sorted();
    let targets: Vec<Vec<String>> = nodes
        .iter()
        .map(|node| node.neighbors.iter().map(|n| canonical_domain(n)).collect())
        .collect();

    let mut digraph: DiGraph<&str, &str> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &nodes {
        let idx = digraph.add_node(node.domain.as_str());
        index.insert(node.domain.as_str(), idx);
    }

    for (node, neighbors) in nodes.iter().zip(&targets) {
        let from = index[node.domain.as_str()];
        for neighbor in neighbors {
            let to = *index
                .entry(neighbor.as_str())
                .or_insert_with(|| digraph.add_node(neighbor.as_str()));
            digraph.add_edge(from, to, "");
        }
    }

    format!("{}", Dot::with_config(&digraph, &[Config::EdgeNoLabel]))
}

pub fn generate_report(
    format: ReportFormat,
    result: &WalkResult,
    seeds: &[String],
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(&result.graph)),
        ReportFormat::Json => generate_json_report(result, seeds),
        ReportFormat::Dot => Ok(generate_dot_report(&result.graph)),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
