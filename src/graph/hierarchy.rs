//! In-memory transitive closure of subsumption edges.

use std::collections::{BTreeSet, HashMap};

use crate::error::{KbError, KbResult};

/// Transitive closure of a subsumption relation.
///
/// Direct edges are counted with multiplicity because the store keeps
/// duplicate triples; an edge leaves the closure only when its last
/// supporting triple is removed.
///
/// Cycles are rejected: an edge `child ⊑ parent` is refused when `parent`
/// is already subsumed by `child`. Self-edges are accepted and ignored.
#[derive(Debug, Clone, Default)]
pub struct HierarchyCache {
    edge_counts: HashMap<(String, String), usize>,
    parents: HashMap<String, BTreeSet<String>>,
    children: HashMap<String, BTreeSet<String>>,
    ancestors: HashMap<String, BTreeSet<String>>,
    descendants: HashMap<String, BTreeSet<String>>,
}

impl HierarchyCache {
    /// An empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether adding `child ⊑ parent` would close a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, child: &str, parent: &str) -> bool {
        child != parent
            && self
                .descendants
                .get(child)
                .is_some_and(|desc| desc.contains(parent))
    }

    /// Adds the edge `child ⊑ parent` and propagates reachability.
    ///
    /// Returns true if the closure changed.
    ///
    /// # Errors
    ///
    /// Returns `KbError::HierarchyCycle` if `parent` is already subsumed by
    /// `child`. The cache is left untouched.
    pub fn add_edge(&mut self, child: &str, parent: &str) -> KbResult<bool> {
        if child == parent {
            return Ok(false);
        }
        if self.would_create_cycle(child, parent) {
            return Err(KbError::HierarchyCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        let count = self
            .edge_counts
            .entry((child.to_string(), parent.to_string()))
            .or_insert(0);
        *count += 1;
        if *count > 1 {
            return Ok(false);
        }

        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());

        let mut upper = self.ancestors_of(parent);
        upper.insert(parent.to_string());
        let mut lower = self.descendants_of(child);
        lower.insert(child.to_string());

        for node in &lower {
            self.ancestors
                .entry(node.clone())
                .or_default()
                .extend(upper.iter().cloned());
        }
        for node in &upper {
            self.descendants
                .entry(node.clone())
                .or_default()
                .extend(lower.iter().cloned());
        }
        Ok(true)
    }

    /// Removes one occurrence of `child ⊑ parent`.
    ///
    /// When the last occurrence goes, the closure is rebuilt for the nodes
    /// above and below the edge. Returns true if the closure changed.
    pub fn remove_edge(&mut self, child: &str, parent: &str) -> bool {
        let key = (child.to_string(), parent.to_string());
        let Some(count) = self.edge_counts.get_mut(&key) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.edge_counts.remove(&key);

        let mut lower = self.descendants_of(child);
        lower.insert(child.to_string());
        let mut upper = self.ancestors_of(parent);
        upper.insert(parent.to_string());

        if let Some(ps) = self.parents.get_mut(child) {
            ps.remove(parent);
            if ps.is_empty() {
                self.parents.remove(child);
            }
        }
        if let Some(cs) = self.children.get_mut(parent) {
            cs.remove(child);
            if cs.is_empty() {
                self.children.remove(parent);
            }
        }

        for node in &lower {
            let reach = Self::reachable(&self.parents, node);
            Self::store(&mut self.ancestors, node, reach);
        }
        for node in &upper {
            let reach = Self::reachable(&self.children, node);
            Self::store(&mut self.descendants, node, reach);
        }
        true
    }

    /// All nodes strictly subsumed by `node`.
    #[must_use]
    pub fn descendants_of(&self, node: &str) -> BTreeSet<String> {
        self.descendants.get(node).cloned().unwrap_or_default()
    }

    /// All nodes strictly subsuming `node`.
    #[must_use]
    pub fn ancestors_of(&self, node: &str) -> BTreeSet<String> {
        self.ancestors.get(node).cloned().unwrap_or_default()
    }

    /// `node` followed by its descendants.
    #[must_use]
    pub fn with_descendants(&self, node: &str) -> Vec<String> {
        let mut out = vec![node.to_string()];
        if let Some(desc) = self.descendants.get(node) {
            out.extend(desc.iter().cloned());
        }
        out
    }

    /// Reflexive subsumption test.
    #[must_use]
    pub fn is_subsumed_by(&self, child: &str, parent: &str) -> bool {
        child == parent
            || self
                .ancestors
                .get(child)
                .is_some_and(|anc| anc.contains(parent))
    }

    /// Number of distinct direct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_counts.len()
    }

    /// True if the hierarchy has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edge_counts.is_empty()
    }

    /// Removes every edge.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn reachable(adjacency: &HashMap<String, BTreeSet<String>>, start: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = adjacency
            .get(start)
            .map(|next| next.iter().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            if seen.insert(node.to_string()) {
                if let Some(next) = adjacency.get(node) {
                    stack.extend(next.iter().map(String::as_str));
                }
            }
        }
        seen
    }

    fn store(map: &mut HashMap<String, BTreeSet<String>>, node: &str, reach: BTreeSet<String>) {
        if reach.is_empty() {
            map.remove(node);
        } else {
            map.insert(node.to_string(), reach);
        }
    }
}

/// Class and property hierarchies of one store.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    /// Subclass-of edges.
    pub classes: HierarchyCache,
    /// Subproperty-of edges.
    pub properties: HierarchyCache,
}

impl Taxonomy {
    /// Empties both hierarchies.
    pub fn clear(&mut self) {
        self.classes.clear();
        self.properties.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn closure_is_order_independent() {
        let mut forward = HierarchyCache::new();
        forward.add_edge("A", "B").unwrap();
        forward.add_edge("B", "C").unwrap();

        let mut backward = HierarchyCache::new();
        backward.add_edge("B", "C").unwrap();
        backward.add_edge("A", "B").unwrap();

        for cache in [&forward, &backward] {
            assert_eq!(cache.descendants_of("C"), set(&["A", "B"]));
            assert_eq!(cache.ancestors_of("A"), set(&["B", "C"]));
            assert!(cache.is_subsumed_by("A", "C"));
        }
    }

    #[test]
    fn rejects_cycles_and_leaves_cache_unchanged() {
        let mut cache = HierarchyCache::new();
        cache.add_edge("A", "B").unwrap();
        cache.add_edge("B", "C").unwrap();

        let err = cache.add_edge("C", "A").unwrap_err();
        assert!(err.is_hierarchy_cycle());
        assert!(cache.add_edge("B", "A").is_err());

        assert_eq!(cache.edge_count(), 2);
        assert!(!cache.descendants_of("A").contains("A"));
        assert_eq!(cache.descendants_of("A"), BTreeSet::new());
    }

    #[test]
    fn self_edge_is_ignored() {
        let mut cache = HierarchyCache::new();
        assert!(!cache.add_edge("A", "A").unwrap());
        assert!(cache.is_empty());
        assert!(cache.is_subsumed_by("A", "A"));
    }

    #[test]
    fn remove_rebuilds_affected_component() {
        let mut cache = HierarchyCache::new();
        cache.add_edge("A", "B").unwrap();
        cache.add_edge("B", "C").unwrap();
        cache.add_edge("X", "Y").unwrap();

        assert!(cache.remove_edge("B", "C"));
        assert_eq!(cache.descendants_of("C"), BTreeSet::new());
        assert_eq!(cache.ancestors_of("A"), set(&["B"]));
        assert_eq!(cache.descendants_of("Y"), set(&["X"]));
    }

    #[test]
    fn diamond_keeps_alternative_path() {
        let mut cache = HierarchyCache::new();
        cache.add_edge("D", "B").unwrap();
        cache.add_edge("D", "C").unwrap();
        cache.add_edge("B", "A").unwrap();
        cache.add_edge("C", "A").unwrap();

        cache.remove_edge("B", "A");
        assert!(cache.is_subsumed_by("D", "A"));
        assert_eq!(cache.descendants_of("A"), set(&["C", "D"]));
    }

    #[test]
    fn duplicate_edges_are_counted() {
        let mut cache = HierarchyCache::new();
        assert!(cache.add_edge("A", "B").unwrap());
        assert!(!cache.add_edge("A", "B").unwrap());

        assert!(!cache.remove_edge("A", "B"));
        assert!(cache.is_subsumed_by("A", "B"));
        assert!(cache.remove_edge("A", "B"));
        assert!(!cache.is_subsumed_by("A", "B"));
        assert!(!cache.remove_edge("A", "B"));
    }

    #[test]
    fn with_descendants_starts_with_node() {
        let mut cache = HierarchyCache::new();
        cache.add_edge("Dog", "Animal").unwrap();
        assert_eq!(cache.with_descendants("Animal"), vec!["Animal".to_string(), "Dog".to_string()]);
        assert_eq!(cache.with_descendants("Cat"), vec!["Cat".to_string()]);
    }
}
