use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical form of a certificate hostname: lowercased, with a leading
/// `*.` wildcard label removed. A bare `*.` is returned unchanged.
pub fn canonical_domain(domain: &str) -> String {
    let lowered = domain.to_lowercase();
    match lowered.strip_prefix("*.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lowered,
    }
}

/// A pending discovery: a raw hostname as it appeared in a certificate
/// and the BFS level it would occupy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierItem {
    pub domain: String,
    pub depth: usize,
}

impl FrontierItem {
    pub fn new(domain: impl Into<String>, depth: usize) -> Self {
        Self {
            domain: domain.into(),
            depth,
        }
    }

    pub fn seed(domain: impl Into<String>) -> Self {
        Self::new(domain, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNode {
    pub domain: String,
    pub depth: usize,
    pub neighbors: Vec<String>,
}

impl DomainNode {
    pub fn new(domain: String, depth: usize, neighbors: Vec<String>) -> Self {
        Self {
            domain,
            depth,
            neighbors,
        }
    }
}

/// Every node committed during a walk, keyed by canonical domain.
#[derive(Debug, Clone, Default)]
pub struct DomainGraph {
    nodes: HashMap<String, DomainNode>,
}

impl DomainGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a finished node. Returns the node it replaced, which only
    /// happens if the same canonical domain was admitted twice.
    pub fn insert(&mut self, node: DomainNode) -> Option<DomainNode> {
        self.nodes.insert(node.domain.clone(), node)
    }

    pub fn get(&self, domain: &str) -> Option<&DomainNode> {
        self.nodes.get(domain)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending order of domain, the order reports use.
    pub fn sorted(&self) -> Vec<&DomainNode> {
        let mut nodes: Vec<&DomainNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.domain.cmp(&b.domain));
        nodes
    }
}

impl FromIterator<DomainNode> for DomainGraph {
    fn from_iter<I: IntoIterator<Item = DomainNode>>(iter: I) -> Self {
        let mut graph = DomainGraph::new();
        for node in iter {
            graph.insert(node);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_strips_wildcard() {
        assert_eq!(canonical_domain("*.example.com"), "example.com");
        assert_eq!(canonical_domain("example.com"), "example.com");
        assert_eq!(
            canonical_domain("*.example.com"),
            canonical_domain("example.com")
        );
    }

    #[test]
    fn test_canonical_lowercases() {
        assert_eq!(canonical_domain("WWW.Example.COM"), "www.example.com");
        assert_eq!(canonical_domain("*.Example.Com"), "example.com");
    }

    #[test]
    fn test_canonical_only_strips_leading_label() {
        assert_eq!(canonical_domain("a.*.example.com"), "a.*.example.com");
        assert_eq!(canonical_domain("*.*.example.com"), "*.example.com");
    }

    #[test]
    fn test_canonical_short_inputs() {
        assert_eq!(canonical_domain(""), "");
        assert_eq!(canonical_domain("*"), "*");
        assert_eq!(canonical_domain("*."), "*.");
        assert_eq!(canonical_domain("*.a"), "a");
    }

    #[test]
    fn test_graph_sorted_by_domain() {
        let graph: DomainGraph = vec![
            DomainNode::new("c.test".into(), 2, vec![]),
            DomainNode::new("a.test".into(), 0, vec!["b.test".into()]),
            DomainNode::new("b.test".into(), 1, vec![]),
        ]
        .into_iter()
        .collect();

        let order: Vec<&str> = graph.sorted().iter().map(|n| n.domain.as_str()).collect();
        assert_eq!(order, vec!["a.test", "b.test", "c.test"]);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DomainGraph::new();
        assert!(graph.is_empty());
        assert!(graph.sorted().is_empty());
    }
}
