//! Hierarchy traversal
//!
//! Depth-first walks over one snapshot of the parent -> child edges. All
//! walks use an explicit stack and a visited set, so depth is bounded only
//! by memory and a malformed (cyclic) snapshot still terminates.

use std::collections::{BTreeSet, HashSet};

use super::storage::{ChildrenMap, ItemMap};

/// Read-only view of the edge relation
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    children: ChildrenMap,
}

impl Hierarchy {
    pub fn new(children: ChildrenMap) -> Self {
        Self { children }
    }

    /// Direct children of `name`
    pub fn children_of(&self, name: &str) -> Option<&ItemMap> {
        self.children.get(name)
    }

    pub fn has_child(&self, parent: &str, child: &str) -> bool {
        self.children_of(parent)
            .is_some_and(|children| children.contains_key(child))
    }

    /// Direct parents of `name`
    pub fn parents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.children
            .iter()
            .filter(move |(_, children)| children.contains_key(name))
            .map(|(parent, _)| parent.as_str())
    }

    /// Whether adding the edge `parent -> child` would close a cycle, i.e.
    /// `parent` is `child` or is reachable below it.
    pub fn detect_loop(&self, parent: &str, child: &str) -> bool {
        if parent == child {
            return true;
        }

        let mut stack = vec![child];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(children) = self.children_of(current) else {
                continue;
            };
            for name in children.keys() {
                if name == parent {
                    return true;
                }
                stack.push(name.as_str());
            }
        }

        false
    }

    /// Collect every descendant of `name` into `result`.
    ///
    /// `result` may already hold descendants of other roots; those subtrees
    /// are not walked again.
    pub fn children_recursive(&self, name: &str, result: &mut BTreeSet<String>) {
        let mut stack = vec![name];
        while let Some(current) = stack.pop() {
            let Some(children) = self.children_of(current) else {
                continue;
            };
            for child in children.keys() {
                if result.insert(child.clone()) {
                    stack.push(child.as_str());
                }
            }
        }
    }

    /// Every ancestor of `name`, nearest first along each branch
    pub fn parents_recursive(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            for parent in self.parents_of(&current) {
                if seen.insert(parent.to_string()) {
                    result.push(parent.to_string());
                    stack.push(parent.to_string());
                }
            }
        }

        result
    }
}
