//! One handler per subcommand

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use colored::Colorize;
use trellis_core::{
    EdgeInput, EdgeType, MemoryGraph, NodeFilter, NodeInput, NodeOrder, NodeType, Point3,
    SourceType, SpatialQuery,
};

use crate::Commands;
use crate::output::{self, field, header, print_json};

pub fn dispatch(graph: &MemoryGraph, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::AddNode {
            content,
            node_type,
            source,
            json_content,
            metadata,
            tags,
            relevance,
            timestamp,
        } => {
            let input = NodeInput {
                node_type: parse_node_type(&node_type)?,
                content: if json_content {
                    serde_json::from_str(&content).context("Content is not valid JSON")?
                } else {
                    serde_json::Value::String(content)
                },
                metadata: match metadata {
                    Some(raw) => serde_json::from_str(&raw).context("Metadata must be a JSON object")?,
                    None => serde_json::Map::new(),
                },
                source_type: source.parse::<SourceType>().map_err(anyhow::Error::msg)?,
                timestamp: timestamp.as_deref().map(parse_time).transpose()?,
                relevance_score: relevance,
                confidence: None,
                tags: split_list(tags.as_deref()),
            };
            let node = graph.create_node(input)?;
            if json {
                return print_json(&node);
            }
            output::node_detail(&node);
            println!();
            println!("{}", "Node created".green().bold());
            Ok(())
        }

        Commands::AddEdge {
            source,
            target,
            edge_type,
            context,
            strength,
            bidirectional,
        } => {
            let mut input = EdgeInput::new(source, target, parse_edge_type(&edge_type)?, context);
            input.strength = strength;
            input.bidirectional = bidirectional;
            let edge = graph.create_edge(input)?;
            if json {
                return print_json(&edge);
            }
            output::edge_detail(&edge);
            Ok(())
        }

        Commands::Get { id } => {
            if let Some(node) = graph.get_node(&id)? {
                return if json { print_json(&node) } else { output::node_detail(&node); Ok(()) };
            }
            if let Some(edge) = graph.get_edge(&id)? {
                return if json { print_json(&edge) } else { output::edge_detail(&edge); Ok(()) };
            }
            bail!("No node or edge with id {}", id)
        }

        Commands::Access { id, edge } => {
            let outcome = if edge {
                graph.interact_edge(&id)?
            } else {
                graph.access_node(&id)?
            };
            let Some(outcome) = outcome else {
                bail!("{} {} not found, pruned or inactive", if edge { "Edge" } else { "Node" }, id);
            };
            if json {
                return print_json(&outcome);
            }
            field("ID", &outcome.id);
            field("Before", format!("{:.3}", outcome.before));
            field("After", format!("{:.3}", outcome.after).green());
            field("Uses", outcome.usage_count);
            Ok(())
        }

        Commands::Query {
            node_types,
            tags,
            min_relevance,
            contains,
            order,
            include_pruned,
            limit,
            offset,
        } => {
            let filter = NodeFilter {
                node_types: parse_node_types(node_types.as_deref())?,
                tags_any: split_list(tags.as_deref()),
                min_relevance,
                content_contains: contains,
                include_pruned,
                order: serde_json::from_value::<NodeOrder>(serde_json::Value::String(order))
                    .context("Unknown order")?,
                ..Default::default()
            };
            let nodes = graph.query_nodes(&filter, limit, offset)?;
            if json {
                return print_json(&nodes);
            }
            header(&format!("{} nodes", nodes.len()));
            nodes.iter().for_each(output::node_line);
            Ok(())
        }

        Commands::Spatial {
            center,
            radius,
            from,
            to,
            min_relevance,
            node_types,
            limit,
        } => {
            let query = SpatialQuery {
                center: center.as_deref().map(parse_point).transpose()?,
                radius,
                time_from: from.as_deref().map(parse_time).transpose()?,
                time_to: to.as_deref().map(parse_time).transpose()?,
                min_relevance,
                node_types: parse_node_types(node_types.as_deref())?,
                limit,
            };
            let result = graph.spatial_query(&query)?;
            if json {
                return print_json(&result);
            }
            header(&format!(
                "{} results ({} candidates{})",
                result.results.len(),
                result.candidates,
                if result.from_cache { ", cached" } else { "" }
            ));
            for scored in &result.results {
                print!("  {:.3} ", scored.score);
                output::node_line(&scored.node);
            }
            Ok(())
        }

        Commands::Similar {
            id,
            limit,
            threshold,
        } => {
            let similar = graph.find_similar_nodes(&id, limit, threshold)?;
            if json {
                return print_json(&similar);
            }
            header(&format!("{} similar nodes", similar.len()));
            for s in &similar {
                print!("  {:.3} ", s.score);
                output::node_line(&s.node);
            }
            Ok(())
        }

        Commands::Link { id, max } => {
            let edges = graph.create_semantic_edges(&id, max)?;
            if json {
                return print_json(&edges);
            }
            header(&format!("{} semantic edges created", edges.len()));
            edges.iter().for_each(output::edge_line);
            Ok(())
        }

        Commands::Decay { force } => {
            let stats = graph.apply_decay(force)?;
            if json {
                return print_json(&stats);
            }
            header("Decay Sweep");
            output::decay_run(&stats);
            Ok(())
        }

        Commands::SemanticSweep { force } => {
            let stats = graph.run_semantic_sweep(force)?;
            if json {
                return print_json(&stats);
            }
            header("Semantic Sweep");
            output::semantic_run(&stats);
            Ok(())
        }

        Commands::ResetDecay => {
            let (nodes, edges) = graph.reset_decay()?;
            if json {
                return print_json(&serde_json::json!({ "nodes": nodes, "edges": edges }));
            }
            println!(
                "{}",
                format!("Reset {} nodes and {} edges", nodes, edges).green().bold()
            );
            Ok(())
        }

        Commands::Optimize => {
            let report = graph.optimize()?;
            if json {
                return print_json(&report);
            }
            header("Optimize");
            field("Nodes", report.summary.node_count);
            field("Edges", report.summary.edge_count);
            field("Density", format!("{:.4}", report.summary.density));
            field("Average Clustering", format!("{:.3}", report.summary.average_clustering));
            field("Components", report.summary.component_count);
            field("Communities", report.communities);
            field("Semantic Clusters", report.clusters);
            field("Patterns", report.patterns);
            field("Degrees Repaired", report.degrees_repaired);
            field("Spatial Entries", report.spatial_entries);
            field("Duration", format!("{}ms", report.duration_ms));
            Ok(())
        }

        Commands::Stats => {
            let stats = graph.stats()?;
            let decay = graph.get_decay_stats()?;
            if json {
                return print_json(&serde_json::json!({ "engine": stats, "decay": decay }));
            }
            let g = &stats.graph;
            header("Trellis Graph Statistics");
            field("Nodes", format!("{} active, {} pruned", g.active_nodes, g.pruned_nodes));
            field("Edges", format!("{} active, {} inactive", g.active_edges, g.inactive_edges));
            field("Semantic Edges", g.semantic_edges);
            field("Average Relevance", format!("{:.3}", g.average_relevance));
            field("Average Strength", format!("{:.3}", g.average_strength));
            field("Average Degree", format!("{:.2}", g.average_degree));
            field("With Embeddings", g.nodes_with_embeddings);
            field("Communities", g.communities);
            if let Some(oldest) = g.oldest_node {
                field("Oldest Node", oldest.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(newest) = g.newest_node {
                field("Newest Node", newest.format("%Y-%m-%d %H:%M:%S"));
            }
            if !g.nodes_by_type.is_empty() {
                println!();
                println!("{}", "=== By Type ===".yellow().bold());
                for (node_type, count) in &g.nodes_by_type {
                    println!("  {:20} {:>6}", node_type, count);
                }
            }
            println!();
            println!("{}", "=== Index ===".yellow().bold());
            let s = &stats.spatial;
            field("Entries", s.entries);
            field("Depth", s.depth);
            field("Memory", format!("{} KiB", s.memory_bytes / 1024));
            println!();
            println!("{}", "=== Decay ===".yellow().bold());
            field("Runs", decay.totals.runs);
            field(
                "Last Completed",
                decay
                    .last_completed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".dimmed().to_string()),
            );
            Ok(())
        }

        Commands::History { limit } => {
            let runs = graph.get_decay_history(limit)?;
            if json {
                return print_json(&runs);
            }
            header(&format!("{} decay runs", runs.len()));
            for run in &runs {
                let when = run
                    .started_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!(
                    "  {}  nodes {:>6} (-{})  edges {:>6} (-{})  {:>6}ms{}",
                    when.dimmed(),
                    run.nodes_processed,
                    run.nodes_pruned,
                    run.edges_processed,
                    run.edges_pruned,
                    run.execution_time,
                    if run.skipped { " skipped".yellow().to_string() } else { String::new() }
                );
            }
            Ok(())
        }

        Commands::Audit { id, limit } => {
            let entries = graph.audit_log(id.as_deref(), limit)?;
            if json {
                return print_json(&entries);
            }
            header(&format!("{} audit entries", entries.len()));
            for e in &entries {
                println!(
                    "  {}  {:6} {:8} {} {}",
                    e.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    e.entity_kind,
                    e.action.blue(),
                    e.entity_id,
                    e.detail.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }

        Commands::Run { .. } => bail!("run is handled by the scheduler"),
    }
}

// ============================================================================
// ARGUMENT PARSING
// ============================================================================

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_node_type(raw: &str) -> anyhow::Result<NodeType> {
    raw.parse().map_err(anyhow::Error::msg)
}

fn parse_edge_type(raw: &str) -> anyhow::Result<EdgeType> {
    raw.parse().map_err(anyhow::Error::msg)
}

fn parse_node_types(raw: Option<&str>) -> anyhow::Result<Vec<NodeType>> {
    split_list(raw).iter().map(|t| parse_node_type(t)).collect()
}

fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn parse_point(raw: &str) -> anyhow::Result<Point3> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Invalid point: {}", raw))?;
    match parts.as_slice() {
        [x, y, z] => Ok(Point3::new(*x, *y, *z)),
        _ => bail!("Point must have three coordinates, got {}", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("a, b,,c ")), vec!["a", "b", "c"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_parse_point() {
        let p = parse_point("1.5, 0.2,1").unwrap();
        assert_eq!((p.x, p.y, p.z), (1.5, 0.2, 1.0));
        assert!(parse_point("1,2").is_err());
        assert!(parse_point("a,b,c").is_err());
    }

    #[test]
    fn test_parse_types() {
        assert_eq!(
            parse_node_types(Some("activity,external-reference")).unwrap(),
            vec![NodeType::Activity, NodeType::ExternalReference]
        );
        assert!(parse_node_type("bogus").is_err());
        assert_eq!(parse_edge_type("semantic").unwrap(), EdgeType::Semantic);
    }

    #[test]
    fn test_parse_time() {
        assert!(parse_time("2026-01-02T03:04:05Z").is_ok());
        assert!(parse_time("yesterday").is_err());
    }
}
