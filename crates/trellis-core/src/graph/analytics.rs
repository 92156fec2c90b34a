//! Graph analytics: clustering, centrality, communities, and structure mining.
//!
//! Everything here is a pure function over a [`Topology`] snapshot loaded
//! from the store. The petgraph arena is built per call and dropped after.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::{connected_components, page_rank};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use super::{EdgeType, NodeType};

/// PageRank damping factor
pub const PAGERANK_DAMPING: f64 = 0.85;
/// PageRank iterations
pub const PAGERANK_ITERATIONS: usize = 30;
/// Label propagation stops after this many rounds even if labels still move
pub const MAX_PROPAGATION_ROUNDS: usize = 20;
/// Minimum occurrences before a structure counts as a pattern
pub const MIN_PATTERN_OCCURRENCES: usize = 3;

// ---------------------------------------------------------------------------
// Input snapshot
// ---------------------------------------------------------------------------

/// An active edge as seen by analytics
#[derive(Debug, Clone)]
pub struct TopologyEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub strength: f64,
}

/// Non-pruned nodes and active edges between them
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub nodes: Vec<(String, NodeType)>,
    pub edges: Vec<TopologyEdge>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Derived metrics for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub node_id: String,
    pub clustering_coefficient: f64,
    pub centrality: f64,
    pub community_id: Option<i64>,
}

/// A community found by label propagation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: i64,
    pub members: Vec<String>,
    /// Fraction of possible member pairs that are linked
    pub density: f64,
}

/// Nodes connected through semantic edges
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticCluster {
    pub id: i64,
    pub members: Vec<String>,
    pub average_strength: f64,
}

/// A recurring (source type, edge type, target type) structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPattern {
    pub source_type: NodeType,
    pub edge_type: EdgeType,
    pub target_type: NodeType,
    pub occurrences: usize,
    /// Up to five edges exhibiting the pattern
    pub example_edge_ids: Vec<String>,
}

impl DetectedPattern {
    /// Stable textual signature, e.g. `activity-causal->learning`
    pub fn signature(&self) -> String {
        format!("{}-{}->{}", self.source_type, self.edge_type, self.target_type)
    }
}

/// Graph-wide summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub average_clustering: f64,
    pub component_count: usize,
    pub community_count: usize,
}

/// Everything `optimize()` writes back
#[derive(Debug, Clone, Default)]
pub struct AnalyticsReport {
    pub metrics: Vec<NodeMetrics>,
    pub communities: Vec<Community>,
    pub clusters: Vec<SemanticCluster>,
    pub patterns: Vec<DetectedPattern>,
    pub summary: GraphSummary,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

struct Arena {
    graph: DiGraph<String, f64>,
    index: HashMap<String, NodeIndex>,
    neighbours: Vec<HashMap<usize, f64>>,
}

impl Arena {
    fn build(topology: &Topology) -> Self {
        let mut graph = DiGraph::with_capacity(topology.nodes.len(), topology.edges.len());
        let mut index = HashMap::with_capacity(topology.nodes.len());
        for (id, _) in &topology.nodes {
            let idx = graph.add_node(id.clone());
            index.insert(id.clone(), idx);
        }

        let mut neighbours = vec![HashMap::new(); topology.nodes.len()];
        for edge in &topology.edges {
            let (Some(&s), Some(&t)) = (index.get(&edge.source_id), index.get(&edge.target_id))
            else {
                continue;
            };
            if s == t {
                continue;
            }
            graph.add_edge(s, t, edge.strength);
            *neighbours[s.index()].entry(t.index()).or_insert(0.0) += edge.strength;
            *neighbours[t.index()].entry(s.index()).or_insert(0.0) += edge.strength;
        }

        Self {
            graph,
            index,
            neighbours,
        }
    }
}

/// Run every analysis over a topology snapshot
pub fn analyze(topology: &Topology) -> AnalyticsReport {
    if topology.nodes.is_empty() {
        return AnalyticsReport::default();
    }

    let arena = Arena::build(topology);
    let clustering = clustering_coefficients(&arena.neighbours);
    let centrality = page_rank(&arena.graph, PAGERANK_DAMPING, PAGERANK_ITERATIONS);
    let labels = propagate_labels(&arena.neighbours);
    let (communities, community_of) = collect_communities(&labels, &arena, topology);

    let metrics = topology
        .nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _))| NodeMetrics {
            node_id: id.clone(),
            clustering_coefficient: clustering[i],
            centrality: centrality.get(i).copied().unwrap_or(0.0),
            community_id: community_of.get(&i).copied(),
        })
        .collect::<Vec<_>>();

    let clusters = semantic_clusters(topology, &arena.index);
    let patterns = detect_patterns(topology);

    let n = topology.nodes.len();
    let edge_count = arena.graph.edge_count();
    let possible = (n * n.saturating_sub(1)) as f64;
    let summary = GraphSummary {
        node_count: n,
        edge_count,
        density: if possible > 0.0 { edge_count as f64 / possible } else { 0.0 },
        average_degree: 2.0 * edge_count as f64 / n as f64,
        average_clustering: clustering.iter().sum::<f64>() / n as f64,
        component_count: connected_components(&arena.graph),
        community_count: communities.len(),
    };

    AnalyticsReport {
        metrics,
        communities,
        clusters,
        patterns,
        summary,
    }
}

/// Undirected local clustering coefficient per node
fn clustering_coefficients(neighbours: &[HashMap<usize, f64>]) -> Vec<f64> {
    neighbours
        .iter()
        .map(|adj| {
            let k = adj.len();
            if k < 2 {
                return 0.0;
            }
            let ids: Vec<usize> = adj.keys().copied().collect();
            let mut links = 0usize;
            for (a, &u) in ids.iter().enumerate() {
                for &v in &ids[a + 1..] {
                    if neighbours[u].contains_key(&v) {
                        links += 1;
                    }
                }
            }
            2.0 * links as f64 / (k * (k - 1)) as f64
        })
        .collect()
}

/// Weighted label propagation in index order; ties go to the smallest label
fn propagate_labels(neighbours: &[HashMap<usize, f64>]) -> Vec<usize> {
    let mut labels: Vec<usize> = (0..neighbours.len()).collect();

    for _ in 0..MAX_PROPAGATION_ROUNDS {
        let mut changed = false;
        for node in 0..neighbours.len() {
            if neighbours[node].is_empty() {
                continue;
            }
            let mut votes: BTreeMap<usize, f64> = BTreeMap::new();
            for (&other, &w) in &neighbours[node] {
                *votes.entry(labels[other]).or_insert(0.0) += w.max(f64::EPSILON);
            }
            let mut best = labels[node];
            let mut best_weight = f64::MIN;
            for (&label, &weight) in &votes {
                if weight > best_weight + 1e-12 {
                    best = label;
                    best_weight = weight;
                }
            }
            if best != labels[node] {
                labels[node] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    labels
}

fn collect_communities(
    labels: &[usize],
    arena: &Arena,
    topology: &Topology,
) -> (Vec<Community>, HashMap<usize, i64>) {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (node, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(node);
    }

    let mut groups: Vec<Vec<usize>> = groups.into_values().filter(|g| g.len() >= 2).collect();
    groups.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

    let mut community_of = HashMap::new();
    let mut communities = Vec::with_capacity(groups.len());
    for (id, members) in groups.into_iter().enumerate() {
        let member_set: HashSet<usize> = members.iter().copied().collect();
        let internal: usize = members
            .iter()
            .map(|&m| {
                arena.neighbours[m]
                    .keys()
                    .filter(|o| member_set.contains(o))
                    .count()
            })
            .sum::<usize>()
            / 2;
        let k = members.len();
        let density = internal as f64 / ((k * (k - 1)) as f64 / 2.0);

        for &m in &members {
            community_of.insert(m, id as i64);
        }
        communities.push(Community {
            id: id as i64,
            members: members.iter().map(|&m| topology.nodes[m].0.clone()).collect(),
            density,
        });
    }
    (communities, community_of)
}

/// Group nodes joined by semantic edges
fn semantic_clusters(topology: &Topology, index: &HashMap<String, NodeIndex>) -> Vec<SemanticCluster> {
    let mut sets = UnionFind::<usize>::new(topology.nodes.len());
    let mut touched = HashSet::new();
    for edge in topology.edges.iter().filter(|e| e.edge_type == EdgeType::Semantic) {
        if let (Some(s), Some(t)) = (index.get(&edge.source_id), index.get(&edge.target_id)) {
            sets.union(s.index(), t.index());
            touched.insert(s.index());
            touched.insert(t.index());
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for node in touched {
        groups.entry(sets.find(node)).or_default().push(node);
    }

    let mut clusters: Vec<Vec<usize>> = groups.into_values().collect();
    for members in &mut clusters {
        members.sort_unstable();
    }
    clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

    clusters
        .into_iter()
        .enumerate()
        .map(|(id, members)| {
            let ids: HashSet<&str> = members.iter().map(|&m| topology.nodes[m].0.as_str()).collect();
            let strengths: Vec<f64> = topology
                .edges
                .iter()
                .filter(|e| {
                    e.edge_type == EdgeType::Semantic && ids.contains(e.source_id.as_str())
                })
                .map(|e| e.strength)
                .collect();
            let average_strength = if strengths.is_empty() {
                0.0
            } else {
                strengths.iter().sum::<f64>() / strengths.len() as f64
            };
            SemanticCluster {
                id: id as i64,
                members: members.iter().map(|&m| topology.nodes[m].0.clone()).collect(),
                average_strength,
            }
        })
        .collect()
}

/// Count (source type, edge type, target type) triples
fn detect_patterns(topology: &Topology) -> Vec<DetectedPattern> {
    let types: HashMap<&str, NodeType> = topology
        .nodes
        .iter()
        .map(|(id, t)| (id.as_str(), *t))
        .collect();

    let mut counts: HashMap<(NodeType, EdgeType, NodeType), Vec<&str>> = HashMap::new();
    for edge in &topology.edges {
        let (Some(&s), Some(&t)) = (
            types.get(edge.source_id.as_str()),
            types.get(edge.target_id.as_str()),
        ) else {
            continue;
        };
        counts.entry((s, edge.edge_type, t)).or_default().push(&edge.id);
    }

    let mut patterns: Vec<DetectedPattern> = counts
        .into_iter()
        .filter(|(_, ids)| ids.len() >= MIN_PATTERN_OCCURRENCES)
        .map(|((source_type, edge_type, target_type), ids)| DetectedPattern {
            source_type,
            edge_type,
            target_type,
            occurrences: ids.len(),
            example_edge_ids: ids.iter().take(5).map(|s| s.to_string()).collect(),
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.signature().cmp(&b.signature()))
    });
    patterns
}
