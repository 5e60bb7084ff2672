use serde::{Deserialize, Serialize};

/// Whether the body for a revision is still stored or has been reclaimed by
/// compaction / stemming. Missing nodes keep the tree shape so later merges
/// still line up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevStatus {
    Available,
    Missing,
}

/// One revision in the tree. Children are kept sorted by hash so merge
/// results are canonical regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevNode {
    pub id: String,
    pub status: RevStatus,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RevNode>,
}

impl RevNode {
    pub fn leaf(id: String, status: RevStatus, deleted: bool) -> Self {
        RevNode {
            id,
            status,
            deleted,
            children: Vec::new(),
        }
    }
}

/// A rooted path in the forest; `pos` is the depth of the root node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevRoot {
    pub pos: u64,
    pub node: RevNode,
}

/// A document's whole revision history: a forest of rooted trees, sorted by
/// root depth.
pub type RevTree = Vec<RevRoot>;

/// A leaf revision together with its depth and tombstone flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub rev: String,
    pub pos: u64,
    pub deleted: bool,
}

/// One node of a root-to-leaf path, without children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathNode {
    pub id: String,
    pub status: RevStatus,
    pub deleted: bool,
}

/// A full root-to-leaf path; `pos` is the depth of the first node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevPath {
    pub pos: u64,
    pub nodes: Vec<PathNode>,
}

/// Pre-order walk over every node. The visitor receives
/// `(is_leaf, pos, id, node)`.
pub fn traverse<F>(tree: &RevTree, visit: &mut F)
where
    F: FnMut(bool, u64, &str, &RevNode),
{
    for root in tree {
        traverse_node(root.pos, &root.node, visit);
    }
}

fn traverse_node<F>(pos: u64, node: &RevNode, visit: &mut F)
where
    F: FnMut(bool, u64, &str, &RevNode),
{
    visit(node.children.is_empty(), pos, &node.id, node);
    for child in &node.children {
        traverse_node(pos + 1, child, visit);
    }
}

/// Whether the revision `<pos>-<id>` appears anywhere in the tree.
pub fn rev_exists(tree: &RevTree, pos: u64, id: &str) -> bool {
    let mut found = false;
    traverse(tree, &mut |_, node_pos, node_id, _| {
        if node_pos == pos && node_id == id {
            found = true;
        }
    });
    found
}

/// All leaf revisions, deepest first.
pub fn collect_leaves(tree: &RevTree) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    traverse(tree, &mut |is_leaf, pos, id, node| {
        if is_leaf {
            leaves.push(Leaf {
                rev: format!("{pos}-{id}"),
                pos,
                deleted: node.deleted,
            });
        }
    });
    leaves.sort_by(|a, b| b.pos.cmp(&a.pos));
    leaves
}

/// Every root-to-leaf path in the forest.
pub fn root_to_leaf(tree: &RevTree) -> Vec<RevPath> {
    let mut paths = Vec::new();
    for root in tree {
        let mut history = Vec::new();
        walk_paths(root.pos, &root.node, &mut history, &mut paths);
    }
    paths
}

fn walk_paths(pos: u64, node: &RevNode, history: &mut Vec<PathNode>, paths: &mut Vec<RevPath>) {
    history.push(PathNode {
        id: node.id.clone(),
        status: node.status,
        deleted: node.deleted,
    });
    if node.children.is_empty() {
        paths.push(RevPath {
            pos: pos + 1 - history.len() as u64,
            nodes: history.clone(),
        });
    }
    for child in &node.children {
        walk_paths(pos + 1, child, history, paths);
    }
    history.pop();
}

/// Rebuilds a linear chain from `nodes[skip..]`, last entry becoming the
/// leaf. Returns `None` when nothing remains after the skip.
pub(crate) fn path_to_tree(nodes: &[PathNode], skip: usize) -> Option<RevNode> {
    let slice = nodes.get(skip..)?;
    let mut rebuilt: Option<RevNode> = None;
    for entry in slice.iter().rev() {
        let children = rebuilt.take().into_iter().collect();
        rebuilt = Some(RevNode {
            id: entry.id.clone(),
            status: entry.status,
            deleted: entry.deleted,
            children,
        });
    }
    rebuilt
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Builds a linear chain `ids[0] -> ids[1] -> ...`, the last id being the
    /// (available) leaf and earlier ones missing, rooted at `pos`.
    pub fn chain(pos: u64, ids: &[&str], leaf_deleted: bool) -> RevRoot {
        let mut node: Option<RevNode> = None;
        for (i, id) in ids.iter().enumerate().rev() {
            let is_leaf_entry = i == ids.len() - 1;
            let status = if is_leaf_entry {
                RevStatus::Available
            } else {
                RevStatus::Missing
            };
            node = Some(RevNode {
                id: (*id).to_string(),
                status,
                deleted: is_leaf_entry && leaf_deleted,
                children: node.take().into_iter().collect(),
            });
        }
        RevRoot {
            pos,
            node: node.expect("chain requires at least one id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::chain;
    use super::*;

    #[test]
    fn traversal_visits_every_node_with_depths() {
        let tree = vec![chain(1, &["a", "b", "c"], false)];
        let mut seen = Vec::new();
        traverse(&tree, &mut |is_leaf, pos, id, _| {
            seen.push((is_leaf, pos, id.to_string()));
        });
        assert_eq!(
            seen,
            vec![
                (false, 1, "a".to_string()),
                (false, 2, "b".to_string()),
                (true, 3, "c".to_string()),
            ]
        );
    }

    #[test]
    fn finds_existing_revs() {
        let tree = vec![chain(1, &["a", "b"], false)];
        assert!(rev_exists(&tree, 2, "b"));
        assert!(!rev_exists(&tree, 1, "b"));
        assert!(!rev_exists(&tree, 2, "z"));
    }

    #[test]
    fn leaves_come_back_deepest_first() {
        let mut root = chain(1, &["a", "b", "c"], false);
        // Branch at "a": a -> d
        root.node.children.push(RevNode::leaf(
            "d".to_string(),
            RevStatus::Available,
            true,
        ));
        let leaves = collect_leaves(&vec![root]);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].rev, "3-c");
        assert_eq!(leaves[1].rev, "2-d");
        assert!(leaves[1].deleted);
    }

    #[test]
    fn root_to_leaf_covers_all_branches() {
        let mut root = chain(2, &["a", "b"], false);
        root.node.children.push(RevNode::leaf(
            "z".to_string(),
            RevStatus::Available,
            false,
        ));
        let paths = root_to_leaf(&vec![root]);
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert_eq!(path.pos, 2);
            assert_eq!(path.nodes[0].id, "a");
        }
    }

    #[test]
    fn path_rebuild_round_trips() {
        let tree = vec![chain(1, &["a", "b", "c"], false)];
        let paths = root_to_leaf(&tree);
        let rebuilt = path_to_tree(&paths[0].nodes, 0).unwrap();
        assert_eq!(rebuilt, tree[0].node);
        let trimmed = path_to_tree(&paths[0].nodes, 2).unwrap();
        assert_eq!(trimmed.id, "c");
        assert!(trimmed.children.is_empty());
    }
}
