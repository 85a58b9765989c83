//! Structural graph validation
//!
//! Validation runs before any node executes and is pure: validating the
//! same graph twice yields the same report. Errors reject the graph;
//! warnings (unreachable nodes) are surfaced but non-fatal.

use crate::graph::Graph;
use crate::node::Node;
use std::collections::{HashMap, HashSet, VecDeque};

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Whether the finding rejects the graph
    pub severity: Severity,

    /// Human-readable description
    pub message: String,
}

/// Aggregated validation findings for a graph
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Record an error
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    /// Record a warning
    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    /// All findings
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Error messages only
    pub fn errors(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
            .collect()
    }

    /// Warning messages only
    pub fn warnings(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.as_str())
            .collect()
    }

    /// Whether no errors were found (warnings are allowed)
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// All error messages joined for display
    pub fn error_summary(&self) -> String {
        self.errors().join("; ")
    }
}

/// Validate a graph's structure
pub fn validate(graph: &Graph) -> ValidationReport {
    let mut report = ValidationReport::default();

    if graph.nodes.is_empty() {
        report.push_error("graph has no nodes");
        return report;
    }

    if !graph.nodes.contains_key(&graph.entry_point) {
        report.push_error(format!(
            "entry point '{}' does not exist",
            graph.entry_point
        ));
    }

    for edge in &graph.edges {
        if !graph.nodes.contains_key(&edge.from) {
            report.push_error(format!("edge source '{}' does not exist", edge.from));
        }
        if !graph.nodes.contains_key(&edge.to) {
            report.push_error(format!("edge target '{}' does not exist", edge.to));
        }
    }

    if !graph.allow_cycles && !is_dag(graph) {
        report.push_error("graph contains a cycle but cycles are not allowed");
    }

    for node in graph.nodes.values() {
        let outgoing = graph.edges_from(node.id());

        if node.is_terminal() && !outgoing.is_empty() {
            report.push_error(format!(
                "output node '{}' must not have outgoing edges",
                node.id()
            ));
        }

        if let Node::Decision {
            id,
            branches,
            otherwise,
        } = node
        {
            let has_fallback = outgoing.iter().any(|e| e.is_fallback);
            let mut targets: Vec<&str> = branches.iter().map(|b| b.target.as_str()).collect();
            if let Some(otherwise) = otherwise {
                targets.push(otherwise.as_str());
            }
            for target in targets {
                let covered = has_fallback || outgoing.iter().any(|e| e.to == target);
                if !covered {
                    report.push_error(format!(
                        "decision node '{id}' declares branch target '{target}' \
                         but has no matching edge and no fallback edge"
                    ));
                }
            }
        }
    }

    // Reachability from the entry point. Warning severity only.
    if graph.nodes.contains_key(&graph.entry_point) {
        let reachable = reachable_from(graph, &graph.entry_point);
        let mut unreachable: Vec<&str> = graph
            .nodes
            .keys()
            .filter(|id| !reachable.contains(id.as_str()))
            .map(String::as_str)
            .collect();
        unreachable.sort();
        for id in unreachable {
            report.push_warning(format!(
                "node '{id}' is not reachable from entry point '{}'",
                graph.entry_point
            ));
        }
    }

    report
}

/// Whether the edge set is acyclic (three-color depth-first search)
pub fn is_dag(graph: &Graph) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut colors: HashMap<&str, Color> =
        graph.nodes.keys().map(|id| (id.as_str(), Color::White)).collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        colors: &mut HashMap<&'a str, Color>,
    ) -> bool {
        colors.insert(node, Color::Gray);
        for &next in adjacency.get(node).into_iter().flatten() {
            match colors.get(next) {
                Some(Color::Gray) => return false,
                Some(Color::White) => {
                    if !visit(next, adjacency, colors) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        colors.insert(node, Color::Black);
        true
    }

    let ids: Vec<&str> = colors.keys().copied().collect();
    for id in ids {
        if colors.get(id) == Some(&Color::White) && !visit(id, &adjacency, &mut colors) {
            return false;
        }
    }
    true
}

fn reachable_from<'a>(graph: &'a Graph, start: &'a str) -> HashSet<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for &next in adjacency.get(node).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}
