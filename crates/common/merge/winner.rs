use crate::metadata::DocMetadata;
use crate::rev::parse_rev;
use crate::tree::{collect_leaves, traverse, RevNode, RevStatus};

/// Elects the winning revision: non-deleted leaves beat deleted ones, then
/// deeper leaves win, then the lexicographically larger hash. The election is
/// deterministic, so every replica of the same tree agrees on the winner.
pub fn winning_rev(metadata: &DocMetadata) -> String {
    let mut winner: Option<(bool, u64, String)> = None;
    traverse(&metadata.rev_tree, &mut |is_leaf, pos, id, node| {
        if !is_leaf {
            return;
        }
        let replace = match &winner {
            None => true,
            Some((won_deleted, won_pos, won_id)) => {
                if *won_deleted != node.deleted {
                    *won_deleted
                } else if *won_pos != pos {
                    *won_pos < pos
                } else {
                    won_id.as_str() < id
                }
            }
        };
        if replace {
            winner = Some((node.deleted, pos, id.to_string()));
        }
    });
    match winner {
        Some((_, pos, id)) => format!("{pos}-{id}"),
        None => String::new(),
    }
}

/// Whether `rev` (or the winner, when absent) is a tombstone.
pub fn is_deleted(metadata: &DocMetadata, rev: Option<&str>) -> bool {
    let rev = match rev {
        Some(rev) => rev.to_string(),
        None => winning_rev(metadata),
    };
    let Ok(info) = parse_rev(&rev) else {
        return false;
    };
    let mut deleted = false;
    traverse(&metadata.rev_tree, &mut |_, pos, id, node| {
        if pos == info.pos && id == info.id {
            deleted = node.deleted;
        }
    });
    deleted
}

/// Non-winning, non-deleted leaf revisions: the conflicts a reader may want
/// surfaced next to the winner.
pub fn collect_conflicts(metadata: &DocMetadata) -> Vec<String> {
    let winner = winning_rev(metadata);
    collect_leaves(&metadata.rev_tree)
        .into_iter()
        .filter(|leaf| leaf.rev != winner && !leaf.deleted)
        .map(|leaf| leaf.rev)
        .collect()
}

/// Marks every available non-leaf revision as missing and returns them; the
/// storage engine reclaims their stored bodies.
pub fn compact_tree(metadata: &mut DocMetadata) -> Vec<String> {
    let mut revs = Vec::new();
    for root in metadata.rev_tree.iter_mut() {
        mark_interior_missing(root.pos, &mut root.node, &mut revs);
    }
    revs
}

fn mark_interior_missing(pos: u64, node: &mut RevNode, revs: &mut Vec<String>) {
    if !node.children.is_empty() && node.status == RevStatus::Available {
        node.status = RevStatus::Missing;
        revs.push(format!("{}-{}", pos, node.id));
    }
    for child in node.children.iter_mut() {
        mark_interior_missing(pos + 1, child, revs);
    }
}
