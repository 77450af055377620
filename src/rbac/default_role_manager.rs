//! Index-based role graph
//!
//! Nodes are interned into a `Vec<String>`; edges are index sets. Reachability
//! is a breadth-first walk with an explicit visited set, so cycles in the
//! inheritance relation terminate.

use super::RoleManager;
use ahash::{AHashMap, AHashSet};
use std::collections::{BTreeSet, VecDeque};

/// Domain key used for links without a domain
const DEFAULT_DOMAIN: &str = "";

#[derive(Debug, Default, Clone)]
struct RoleGraph {
    names: Vec<String>,
    index: AHashMap<String, usize>,
    /// node -> roles it inherits from
    parents: Vec<BTreeSet<usize>>,
    /// node -> subjects inheriting from it
    children: Vec<BTreeSet<usize>>,
}

impl RoleGraph {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.parents.push(BTreeSet::new());
        self.children.push(BTreeSet::new());
        id
    }

    fn add_edge(&mut self, child: &str, parent: &str) {
        let c = self.intern(child);
        let p = self.intern(parent);
        self.parents[c].insert(p);
        self.children[p].insert(c);
    }

    fn remove_edge(&mut self, child: &str, parent: &str) -> bool {
        let (Some(&c), Some(&p)) = (self.index.get(child), self.index.get(parent)) else {
            return false;
        };
        let removed = self.parents[c].remove(&p);
        self.children[p].remove(&c);
        removed
    }

    fn names_of<'a>(&'a self, ids: impl IntoIterator<Item = &'a usize>) -> Vec<String> {
        let mut names: Vec<String> = ids.into_iter().map(|&id| self.names[id].clone()).collect();
        names.sort();
        names
    }

    /// Nodes reachable from `start` through parent edges, in discovery order,
    /// excluding `start`. Stops early once `target` is found.
    fn walk(&self, start: usize, max_depth: Option<usize>, target: Option<usize>) -> (Vec<usize>, bool) {
        let mut visited = AHashSet::new();
        let mut queue = VecDeque::new();
        let mut found = Vec::new();

        visited.insert(start);
        queue.push_back((start, 0usize));

        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.map_or(false, |max| depth >= max) {
                continue;
            }
            for &parent in &self.parents[node] {
                if !visited.insert(parent) {
                    continue;
                }
                if Some(parent) == target {
                    found.push(parent);
                    return (found, true);
                }
                found.push(parent);
                queue.push_back((parent, depth + 1));
            }
        }

        (found, false)
    }
}

/// Role manager with one graph per domain
///
/// # Examples
///
/// ```
/// use tollgate::{DefaultRoleManager, RoleManager};
///
/// let mut roles = DefaultRoleManager::new();
/// roles.add_link("alice", "admin", None);
/// roles.add_link("admin", "staff", None);
///
/// assert!(roles.has_link("alice", "staff", None));
/// assert!(roles.has_link("bob", "bob", None));
/// assert!(!roles.has_link("staff", "alice", None));
/// ```
#[derive(Debug, Default, Clone)]
pub struct DefaultRoleManager {
    domains: AHashMap<String, RoleGraph>,
    max_depth: Option<usize>,
}

impl DefaultRoleManager {
    /// Unbounded hierarchy depth
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop following inheritance after `max_depth` links
    pub fn with_max_depth(max_depth: usize) -> Self {
        DefaultRoleManager {
            domains: AHashMap::new(),
            max_depth: Some(max_depth),
        }
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    fn graph(&self, domain: Option<&str>) -> Option<&RoleGraph> {
        self.domains.get(domain.unwrap_or(DEFAULT_DOMAIN))
    }
}

impl RoleManager for DefaultRoleManager {
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        self.domains
            .entry(domain.unwrap_or(DEFAULT_DOMAIN).to_string())
            .or_default()
            .add_edge(name1, name2);
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        self.domains
            .get_mut(domain.unwrap_or(DEFAULT_DOMAIN))
            .map(|graph| graph.remove_edge(name1, name2))
            .unwrap_or(false)
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }
        let Some(graph) = self.graph(domain) else {
            return false;
        };
        let (Some(&start), Some(&target)) = (graph.index.get(name1), graph.index.get(name2)) else {
            return false;
        };
        graph.walk(start, self.max_depth, Some(target)).1
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.graph(domain)
            .and_then(|graph| {
                graph
                    .index
                    .get(name)
                    .map(|&id| graph.names_of(&graph.parents[id]))
            })
            .unwrap_or_default()
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.graph(domain)
            .and_then(|graph| {
                graph
                    .index
                    .get(name)
                    .map(|&id| graph.names_of(&graph.children[id]))
            })
            .unwrap_or_default()
    }

    fn get_implicit_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.graph(domain)
            .and_then(|graph| {
                graph.index.get(name).map(|&id| {
                    graph
                        .walk(id, self.max_depth, None)
                        .0
                        .into_iter()
                        .map(|role| graph.names[role].clone())
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        self.domains.clear();
    }
}
