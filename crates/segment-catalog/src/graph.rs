use common::Segment;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One transition: a segment leading from `from` to `to` within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct GraphEdge {
    pub generation: u64,
    pub from: u64,
    pub to: u64,
    pub identity: u64,
}

impl From<&Segment> for GraphEdge {
    fn from(segment: &Segment) -> Self {
        Self {
            generation: segment.generation(),
            from: segment.start_node(),
            to: segment.end_node(),
            identity: segment.identity(),
        }
    }
}

/// Snapshot of the whole segment graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogGraph {
    edges: Vec<GraphEdge>,
}

impl CatalogGraph {
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> Self {
        let mut edges: Vec<GraphEdge> = segments.into_iter().map(GraphEdge::from).collect();
        edges.sort();
        Self { edges }
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Render as Graphviz DOT with one cluster per generation.
    pub fn to_dot(&self) -> String {
        let mut by_generation: BTreeMap<u64, Vec<&GraphEdge>> = BTreeMap::new();
        for edge in &self.edges {
            by_generation.entry(edge.generation).or_default().push(edge);
        }

        let mut dot = String::from("digraph flock {\n");
        for (generation, edges) in by_generation {
            // Writing into a String cannot fail.
            let _ = writeln!(dot, "  subgraph cluster_{generation} {{");
            let _ = writeln!(dot, "    label=\"generation {generation}\";");
            for edge in edges {
                let _ = writeln!(
                    dot,
                    "    \"{g}:{from}\" -> \"{g}:{to}\" [label=\"{id}\"];",
                    g = generation,
                    from = edge.from,
                    to = edge.to,
                    id = edge.identity
                );
            }
            dot.push_str("  }\n");
        }
        dot.push_str("}\n");
        dot
    }
}
