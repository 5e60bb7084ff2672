use crate::tree::{path_to_tree, root_to_leaf, traverse, RevNode, RevRoot, RevTree};
use std::collections::BTreeSet;

/// How an edit path related to the existing tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeKind {
    /// The path extended an existing leaf.
    NewLeaf,
    /// The path forked off an interior node, creating a conflict branch.
    NewBranch,
    /// The path attached nowhere new (a replay, or a disconnected root).
    InternalNode,
}

/// Result of grafting one path into a revision tree.
#[derive(Clone, Debug)]
pub struct Merged {
    pub tree: RevTree,
    pub kind: MergeKind,
    /// Revisions trimmed away by stemming and no longer present anywhere in
    /// the tree; their stored bodies can be reclaimed.
    pub stemmed_revs: Vec<String>,
}

/// Grafts `path` into `tree`, then stems every root-to-leaf path down to
/// `revs_limit` entries.
pub fn merge(tree: &RevTree, path: RevRoot, revs_limit: usize) -> Merged {
    let (grafted, kind) = do_merge(tree.clone(), &path, false);
    let (stemmed_tree, stemmed_revs) = stem(grafted, revs_limit);
    Merged {
        tree: stemmed_tree,
        kind,
        stemmed_revs,
    }
}

/// Merges `src` into `dst` node-by-node. Returns what the merge introduced,
/// or `None` when every revision of `src` was already present.
fn merge_into(dst: &mut RevNode, src: RevNode) -> Option<MergeKind> {
    // A body known to one side is known to the merged node.
    if dst.status == crate::tree::RevStatus::Missing {
        dst.status = src.status;
    }
    let mut kind = None;
    for child in src.children {
        if dst.children.is_empty() {
            if kind.is_none() {
                kind = Some(MergeKind::NewLeaf);
            }
            dst.children.push(child);
            continue;
        }
        if let Some(existing) = dst.children.iter_mut().find(|c| c.id == child.id) {
            let sub = merge_into(existing, child);
            if kind.is_none() {
                kind = sub;
            }
        } else {
            if kind.is_none() {
                kind = Some(MergeKind::NewBranch);
            }
            dst.children.push(child);
            dst.children.sort_by(|a, b| a.id.cmp(&b.id));
        }
    }
    kind
}

/// Finds the node `depth` levels below `root` whose id matches `target_id`
/// and merges `sub` into it.
fn graft_at_depth(
    root: &mut RevNode,
    depth: u64,
    target_id: &str,
    sub: RevNode,
) -> Option<Option<MergeKind>> {
    if depth == 0 {
        if root.id == target_id {
            return Some(merge_into(root, sub));
        }
        return None;
    }
    for child in root.children.iter_mut() {
        if let Some(kind) = graft_at_depth(child, depth - 1, target_id, sub.clone()) {
            return Some(kind);
        }
    }
    None
}

/// Inserts `path` into the forest. When `dont_expand` is set (used while
/// rebuilding after stemming) paths are only merged at identical roots.
fn do_merge(tree: RevTree, path: &RevRoot, dont_expand: bool) -> (RevTree, MergeKind) {
    if tree.is_empty() {
        return (vec![path.clone()], MergeKind::NewLeaf);
    }

    let mut restree: RevTree = Vec::new();
    let mut kind: Option<MergeKind> = None;
    let mut merged = false;

    for mut branch in tree {
        if branch.pos == path.pos && branch.node.id == path.node.id {
            let sub = merge_into(&mut branch.node, path.node.clone());
            if kind.is_none() {
                kind = sub;
            }
            merged = true;
            restree.push(branch);
        } else if !dont_expand && branch.pos < path.pos {
            // The path roots below this branch: walk down and graft where the
            // ids line up.
            let diff = path.pos - branch.pos;
            if let Some(sub) = graft_at_depth(&mut branch.node, diff, &path.node.id, path.node.clone())
            {
                if kind.is_none() {
                    kind = sub;
                }
                merged = true;
            }
            restree.push(branch);
        } else if !dont_expand && path.pos < branch.pos {
            // The branch roots below the path: graft the branch into the path
            // and let the path replace it.
            let diff = branch.pos - path.pos;
            let mut replacement = path.clone();
            if let Some(sub) =
                graft_at_depth(&mut replacement.node, diff, &branch.node.id, branch.node.clone())
            {
                if kind.is_none() {
                    kind = sub;
                }
                merged = true;
                restree.push(replacement);
            } else {
                restree.push(branch);
            }
        } else {
            restree.push(branch);
        }
    }

    if !merged {
        restree.push(path.clone());
    }
    restree.sort_by_key(|root| root.pos);
    (restree, kind.unwrap_or(MergeKind::InternalNode))
}

/// Trims every root-to-leaf path to at most `depth` revisions, rebuilding the
/// forest from the surviving suffixes. Returns the revisions that dropped out
/// of the tree entirely.
fn stem(tree: RevTree, depth: usize) -> (RevTree, Vec<String>) {
    let paths = root_to_leaf(&tree);
    let mut stemmed: BTreeSet<String> = BTreeSet::new();
    let mut result: Option<RevTree> = None;

    for path in paths {
        let len = path.nodes.len();
        let (skip, pos) = if len > depth {
            let num = len - depth;
            for (offset, node) in path.nodes.iter().take(num).enumerate() {
                stemmed.insert(format!("{}-{}", path.pos + offset as u64, node.id));
            }
            (num, path.pos + num as u64)
        } else {
            (0, path.pos)
        };
        let Some(node) = path_to_tree(&path.nodes, skip) else {
            continue;
        };
        let trimmed = RevRoot { pos, node };
        result = Some(match result {
            Some(acc) => do_merge(acc, &trimmed, true).0,
            None => vec![trimmed],
        });
    }

    let result = result.unwrap_or_default();
    if !stemmed.is_empty() {
        // A rev may survive on another, shorter path; those are not reclaimed.
        traverse(&result, &mut |_, pos, id, _| {
            stemmed.remove(&format!("{pos}-{id}"));
        });
    }
    (result, stemmed.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_utils::chain;
    use crate::tree::{collect_leaves, rev_exists, RevStatus};

    const NO_LIMIT: usize = 1000;

    #[test]
    fn first_edit_becomes_the_tree() {
        let merged = merge(&Vec::new(), chain(1, &["a"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::NewLeaf);
        assert_eq!(merged.tree.len(), 1);
        assert!(merged.stemmed_revs.is_empty());
    }

    #[test]
    fn linear_extension_is_a_new_leaf() {
        let tree = vec![chain(1, &["a"], false)];
        // Edit rooted at 1-a producing 2-b.
        let merged = merge(&tree, chain(1, &["a", "b"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::NewLeaf);
        let leaves = collect_leaves(&merged.tree);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].rev, "2-b");
    }

    #[test]
    fn sibling_edit_is_a_new_branch() {
        let tree = vec![chain(1, &["a", "b"], false)];
        let merged = merge(&tree, chain(1, &["a", "c"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::NewBranch);
        let leaves = collect_leaves(&merged.tree);
        assert_eq!(leaves.len(), 2);
    }

    #[test]
    fn replaying_an_existing_path_adds_nothing() {
        let tree = vec![chain(1, &["a", "b"], false)];
        let merged = merge(&tree, chain(1, &["a", "b"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::InternalNode);
        assert_eq!(merged.tree, tree);
    }

    #[test]
    fn deep_path_grafts_onto_interior_node() {
        let tree = vec![chain(1, &["a", "b", "c"], false)];
        // A replicated edit that only knows about its parent: 2-b -> 3-d.
        let merged = merge(&tree, chain(2, &["b", "d"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::NewBranch);
        assert!(rev_exists(&merged.tree, 3, "d"));
        assert!(rev_exists(&merged.tree, 3, "c"));
        assert_eq!(merged.tree.len(), 1);
    }

    #[test]
    fn disconnected_path_becomes_a_second_root() {
        let tree = vec![chain(1, &["a"], false)];
        let merged = merge(&tree, chain(3, &["x", "y"], false), NO_LIMIT);
        assert_eq!(merged.kind, MergeKind::InternalNode);
        assert_eq!(merged.tree.len(), 2);
    }

    #[test]
    fn merge_marks_missing_nodes_available_when_either_side_has_the_body() {
        let tree = vec![chain(1, &["a", "b"], false)];
        // The stored tree has 1-a missing; a full replicated chain carries it.
        let mut full = chain(1, &["a", "b"], false);
        full.node.status = RevStatus::Available;
        let merged = merge(&tree, full, NO_LIMIT);
        assert_eq!(merged.tree[0].node.status, RevStatus::Available);
    }

    #[test]
    fn stemming_trims_old_revs_and_reports_them() {
        let tree = vec![chain(1, &["a", "b", "c"], false)];
        let merged = merge(&tree, chain(3, &["c", "d"], false), 2);
        // Depth 2 keeps only 3-c -> 4-d.
        assert_eq!(merged.stemmed_revs, vec!["1-a".to_string(), "2-b".to_string()]);
        assert!(!rev_exists(&merged.tree, 1, "a"));
        assert!(!rev_exists(&merged.tree, 2, "b"));
        assert!(rev_exists(&merged.tree, 4, "d"));
        assert_eq!(merged.tree[0].pos, 3);
    }

    #[test]
    fn stemming_keeps_revs_shared_with_shorter_branches() {
        let mut root = chain(1, &["a", "b", "c"], false);
        root.node.children.push(crate::tree::RevNode::leaf(
            "z".to_string(),
            RevStatus::Available,
            false,
        ));
        let tree = vec![root];
        let merged = merge(&tree, chain(3, &["c", "d"], false), 3);
        // 1-a sits on the surviving branch 1-a -> 2-z, so it is not reclaimed.
        assert!(rev_exists(&merged.tree, 1, "a"));
        assert!(!merged.stemmed_revs.contains(&"1-a".to_string()));
    }
}
