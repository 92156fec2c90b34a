//! Text and JSON rendering for command results

use colored::Colorize;
use serde::Serialize;
use trellis_core::{DecayRunStats, GraphEdge, GraphNode, SemanticSweepStats};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn header(title: &str) {
    println!("{}", format!("=== {} ===", title).cyan().bold());
    println!();
}

pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("{}: {}", label.white().bold(), value);
}

/// Truncate a string for display (UTF-8 safe)
pub fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn content_preview(node: &GraphNode) -> String {
    match &node.content {
        serde_json::Value::String(s) => truncate(s, 70),
        other => truncate(&other.to_string(), 70),
    }
}

fn relevance(score: f64) -> colored::ColoredString {
    let text = format!("{:.3}", score);
    if score >= 0.7 {
        text.green()
    } else if score >= 0.4 {
        text.yellow()
    } else {
        text.red()
    }
}

pub fn node_line(node: &GraphNode) {
    let pruned = if node.is_pruned { " pruned".red().to_string() } else { String::new() };
    println!(
        "  {} {:>10} {}{}  {}",
        node.id.dimmed(),
        node.node_type.to_string().blue(),
        relevance(node.relevance_score),
        pruned,
        content_preview(node)
    );
}

pub fn node_detail(node: &GraphNode) {
    header("Node");
    field("ID", &node.id);
    field("Type", node.node_type);
    field("Source", node.source_type);
    field("Content", content_preview(node));
    field("Timestamp", node.timestamp.format("%Y-%m-%d %H:%M:%S"));
    field("Relevance", relevance(node.relevance_score));
    field("Decay Factor", format!("{:.3}", node.decay_factor));
    field("Confidence", format!("{:.2}", node.confidence));
    field("Access Count", node.access_count);
    if let Some(at) = node.last_accessed {
        field("Last Accessed", at.format("%Y-%m-%d %H:%M:%S"));
    }
    field("Degree", node.degree);
    field("Centrality", format!("{:.4}", node.centrality));
    field("Clustering", format!("{:.3}", node.clustering_coefficient));
    if let Some(community) = node.community_id {
        field("Community", community);
    }
    if !node.tags.is_empty() {
        field("Tags", node.tags.join(", "));
    }
    field("Embedding", format!("{} dims", node.embedding.len()));
    if node.is_pruned {
        field("Status", "PRUNED".red().bold());
    }
}

pub fn edge_line(edge: &GraphEdge) {
    let arrow = if edge.bidirectional { "<->" } else { "-->" };
    let inactive = if edge.is_active { String::new() } else { " inactive".red().to_string() };
    println!(
        "  {} {} {} {} [{}] {:.3}{}",
        edge.id.dimmed(),
        edge.source_id,
        arrow,
        edge.target_id,
        edge.edge_type.to_string().blue(),
        edge.strength,
        inactive
    );
}

pub fn edge_detail(edge: &GraphEdge) {
    header("Edge");
    field("ID", &edge.id);
    field("Type", edge.edge_type);
    field("Source", &edge.source_id);
    field("Target", &edge.target_id);
    field("Bidirectional", edge.bidirectional);
    field("Strength", relevance(edge.strength));
    field("Weight", format!("{:.3}", edge.weight));
    field("Probability", format!("{:.3}", edge.probability));
    field("Decay Rate", format!("{:.3}", edge.decay_rate));
    field("Interactions", edge.interaction_count);
    if !edge.context.is_empty() {
        field("Context", truncate(&edge.context, 70));
    }
    field("Active", if edge.is_active { "yes".green() } else { "no".red() });
}

pub fn decay_run(stats: &DecayRunStats) {
    if stats.skipped {
        println!("{}", "Decay sweep skipped (interval not elapsed or already running)".yellow());
        return;
    }
    field("Function", stats.decay_function);
    field("Base Rate", stats.decay_rate);
    field("Nodes Processed", stats.nodes_processed);
    field("Edges Processed", stats.edges_processed);
    field("Nodes Pruned", stats.nodes_pruned);
    field("Edges Pruned", stats.edges_pruned);
    field("Edges Cascaded", stats.edges_cascaded);
    if stats.failed > 0 {
        field("Failed", stats.failed.to_string().red());
    }
    field("Duration", format!("{}ms", stats.execution_time));
    if stats.truncated {
        println!("{}", "Run hit the per-run cap; the next run resumes".yellow());
    }
    if stats.cancelled {
        println!("{}", "Run was cancelled; the next run resumes".yellow());
    }
}

pub fn semantic_run(stats: &SemanticSweepStats) {
    if stats.skipped {
        println!("{}", "Semantic sweep skipped (interval not elapsed or already running)".yellow());
        return;
    }
    field("Nodes Scanned", stats.nodes_scanned);
    field("Edges Created", stats.edges_created);
    field("Edges Strengthened", stats.edges_strengthened);
    if stats.failed > 0 {
        field("Failed", stats.failed.to_string().red());
    }
    field("Duration", format!("{}ms", stats.execution_time));
    if stats.truncated {
        println!("{}", "Sweep hit the per-run cap; the next sweep resumes".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a\nb", 10), "a b");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }
}
