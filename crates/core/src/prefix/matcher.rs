use crate::error::{Result, RoutingError};
use crate::util::{elements_of, path_from};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Node {
    children: BTreeMap<String, Node>,
    marked: bool,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.marked || self.children.is_empty()
    }

    fn cut(&mut self, remaining: usize) {
        if remaining == 0 {
            self.children.clear();
            return;
        }
        for child in self.children.values_mut() {
            child.cut(remaining - 1);
        }
    }

    fn collect_leaves(&self, trail: &mut Vec<String>, out: &mut Vec<String>) {
        for (label, child) in &self.children {
            trail.push(label.clone());
            if child.is_leaf() {
                out.push(path_from(trail));
            } else {
                child.collect_leaves(trail, out);
            }
            trail.pop();
        }
    }
}

/// Prefix tree of path segments. The root is implicit and never a leaf.
#[derive(Debug, Clone, Default)]
pub struct ParentTree {
    root: Node,
}

impl ParentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the path without marking it. Deeper paths added later extend it.
    pub fn add_path(&mut self, path: &str) {
        let mut node = &mut self.root;
        for element in elements_of(path) {
            if node.marked {
                return;
            }
            node = node.children.entry(element.to_string()).or_default();
        }
    }

    /// Adds the path as a prefix endpoint. Everything below a marked node is
    /// already covered by it.
    pub fn add_and_mark_path(&mut self, path: &str) {
        let elements = elements_of(path);
        if elements.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for element in elements {
            if node.marked {
                return;
            }
            node = node.children.entry(element.to_string()).or_default();
        }
        node.marked = true;
        node.children.clear();
    }

    /// Collapses everything deeper than `max_depth` into the node at that depth.
    pub fn cut(&mut self, max_depth: usize) {
        for child in self.root.children.values_mut() {
            child.cut(max_depth.saturating_sub(1));
        }
    }

    /// Paths of all leaves, in label order.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }
}

/// Immutable matcher answering whether a path falls under a known prefix.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    tree: ParentTree,
    max_depth: usize,
}

impl PathMatcher {
    pub fn new<I, S>(entries: I, max_depth: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if max_depth < 2 {
            return Err(RoutingError::InvalidArgument(format!(
                "matcher depth must be at least 2, got {max_depth}"
            )));
        }
        let mut tree = ParentTree::new();
        for entry in entries {
            tree.add_and_mark_path(entry.as_ref());
        }
        tree.cut(max_depth);
        Ok(Self { tree, max_depth })
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True when `path` is at or below a known prefix.
    pub fn matches(&self, path: &str) -> bool {
        let mut node = &self.tree.root;
        for element in elements_of(path) {
            match node.children.get(element) {
                None => return false,
                Some(child) if child.is_leaf() => return true,
                Some(child) => node = child,
            }
        }
        false
    }

    /// True when `path` is a known prefix or an ancestor of one.
    pub fn contains(&self, path: &str) -> bool {
        if self.tree.is_empty() {
            return false;
        }
        let mut node = &self.tree.root;
        for element in elements_of(path) {
            match node.children.get(element) {
                None => return false,
                Some(child) if child.is_leaf() => return true,
                Some(child) => node = child,
            }
        }
        true
    }

    pub fn entries(&self) -> Vec<String> {
        self.tree.leaf_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_below_two_is_rejected() {
        assert!(PathMatcher::new(["/org"], 1).is_err());
        assert!(PathMatcher::new(["/org"], 2).is_ok());
    }

    #[test]
    fn test_empty_matcher_matches_nothing() {
        let matcher = PathMatcher::new(Vec::<String>::new(), 2).unwrap();
        assert!(!matcher.matches("/org/apache"));
        assert!(!matcher.matches("/"));
        assert!(!matcher.contains("/"));
    }

    #[test]
    fn test_matches_at_or_below_prefix() {
        let matcher = PathMatcher::new(["/org/apache", "/com"], 2).unwrap();
        assert!(matcher.matches("/org/apache"));
        assert!(matcher.matches("/org/apache/maven/pom.xml"));
        assert!(matcher.matches("/com/example/a.jar"));
        assert!(!matcher.matches("/org"));
        assert!(!matcher.matches("/org/codehaus/x.pom"));
        assert!(!matcher.matches("/net"));
    }

    #[test]
    fn test_depth_cut_collapses_deep_entries() {
        let matcher = PathMatcher::new(["/org/apache/maven/plugins"], 2).unwrap();
        assert!(matcher.matches("/org/apache/commons/x.jar"));
        assert_eq!(matcher.entries(), vec!["/org/apache".to_string()]);
    }

    #[test]
    fn test_contains_ancestors() {
        let matcher = PathMatcher::new(["/org/apache", "/com"], 3).unwrap();
        assert!(matcher.contains("/org"));
        assert!(matcher.contains("/org/apache"));
        assert!(matcher.contains("/org/apache/maven"));
        assert!(!matcher.contains("/org/codehaus"));
        assert!(!matcher.contains("/net"));
    }

    #[test]
    fn test_matches_implies_contains() {
        let entries = ["/org/apache/maven", "/org/codehaus", "/com", "/net/sf/x"];
        let matcher = PathMatcher::new(entries, 3).unwrap();
        let paths = [
            "/", "/org", "/org/apache", "/org/apache/maven", "/org/apache/maven/a/b",
            "/org/codehaus/plexus", "/com", "/com/x", "/net", "/net/sf", "/net/sf/y",
        ];
        for path in paths {
            if matcher.matches(path) {
                assert!(matcher.contains(path), "{path}");
            }
        }
    }

    #[test]
    fn test_shorter_entry_covers_longer() {
        let matcher = PathMatcher::new(["/org/apache/maven", "/org"], 3).unwrap();
        assert_eq!(matcher.entries(), vec!["/org".to_string()]);
        assert!(matcher.matches("/org/anything"));
    }

    #[test]
    fn test_unmarked_tree_leaves() {
        let mut tree = ParentTree::new();
        tree.add_path("/org");
        tree.add_path("/org/apache");
        tree.add_path("/org/apache/maven");
        tree.add_path("/com");
        tree.cut(2);
        assert_eq!(tree.leaf_paths(), vec!["/com", "/org/apache"]);
    }
}
