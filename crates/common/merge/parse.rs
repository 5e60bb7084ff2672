use crate::error::MergeError;
use crate::metadata::DocMetadata;
use crate::rev::{format_rev, new_rev_id, parse_rev, Revisions};
use crate::tree::{RevNode, RevRoot, RevStatus};
use serde_json::{Map, Value};

/// Special document members the engine understands. Anything else starting
/// with an underscore is rejected.
const RESERVED_WORDS: [&str; 10] = [
    "_id",
    "_rev",
    "_deleted",
    "_attachments",
    "_revisions",
    "_rev_tree",
    "_conflicts",
    "_deleted_conflicts",
    "_revs_info",
    "_local_seq",
];

/// Members that stay in the stored body rather than the metadata row.
const DATA_WORDS: [&str; 2] = ["_deleted", "_attachments"];

/// A user document split into its metadata half (identity + revision path)
/// and the body that will be stored under the allocated sequence.
#[derive(Clone, Debug)]
pub struct ParsedDoc {
    pub metadata: DocMetadata,
    /// The revision this write produces.
    pub rev: String,
    pub data: Map<String, Value>,
    pub deleted: bool,
    /// Revisions trimmed by stemming during the merge phase; filled in by
    /// `process_docs`.
    pub stemmed_revs: Vec<String>,
}

/// Document ids may not start with an underscore, except for the well-known
/// local and design prefixes.
pub fn validate_doc_id(id: &str) -> Result<(), MergeError> {
    if id.is_empty() {
        return Err(MergeError::InvalidId);
    }
    if id.starts_with('_') && !id.starts_with("_local/") && !id.starts_with("_design/") {
        return Err(MergeError::ReservedId(id.to_string()));
    }
    Ok(())
}

/// Turns a user document into a [`ParsedDoc`].
///
/// With `new_edits` a fresh deterministic revision is generated on top of the
/// supplied parent `_rev` (or at depth 1 for a new document). Without it the
/// caller names revisions explicitly, either through `_revisions` (a full
/// ancestry chain, newest first) or a bare `_rev`.
pub fn parse_doc(doc: Value, new_edits: bool) -> Result<ParsedDoc, MergeError> {
    let Value::Object(mut body) = doc else {
        return Err(MergeError::NotAnObject);
    };

    let id = match body.remove("_id") {
        Some(Value::String(id)) => id,
        Some(_) => return Err(MergeError::InvalidId),
        None if new_edits => uuid::Uuid::new_v4().simple().to_string(),
        None => return Err(MergeError::InvalidId),
    };
    validate_doc_id(&id)?;

    let deleted = matches!(body.get("_deleted"), Some(Value::Bool(true)));
    let parent_rev = match body.remove("_rev") {
        Some(Value::String(rev)) => Some(rev),
        Some(Value::Null) | None => None,
        Some(_) => return Err(MergeError::InvalidRev("_rev must be a string".to_string())),
    };
    let revisions = body.remove("_revisions");

    for key in body.keys() {
        if key.starts_with('_') && !RESERVED_WORDS.contains(&key.as_str()) {
            return Err(MergeError::ReservedField(key.clone()));
        }
    }
    for key in RESERVED_WORDS {
        if !DATA_WORDS.contains(&key) {
            body.remove(key);
        }
    }

    let (pos, rev_id, root) = if new_edits {
        let rev_id = new_rev_id(parent_rev.as_deref(), deleted, &body);
        match parent_rev {
            Some(parent) => {
                let parent = parse_rev(&parent)?;
                let root = RevRoot {
                    pos: parent.pos,
                    node: RevNode {
                        id: parent.id,
                        status: RevStatus::Missing,
                        deleted: false,
                        children: vec![RevNode::leaf(
                            rev_id.clone(),
                            RevStatus::Available,
                            deleted,
                        )],
                    },
                };
                (parent.pos + 1, rev_id, root)
            }
            None => {
                let root = RevRoot {
                    pos: 1,
                    node: RevNode::leaf(rev_id.clone(), RevStatus::Available, deleted),
                };
                (1, rev_id, root)
            }
        }
    } else if let Some(revisions) = revisions {
        let revisions: Revisions =
            serde_json::from_value(revisions).map_err(|_| MergeError::InvalidRevisions)?;
        let len = revisions.ids.len() as u64;
        if len == 0 || revisions.start < len {
            return Err(MergeError::InvalidRevisions);
        }
        let rev_id = revisions.ids[0].clone();
        let root = RevRoot {
            pos: revisions.start - len + 1,
            node: chain_from_revisions(&revisions, deleted),
        };
        (revisions.start, rev_id, root)
    } else {
        let rev = parent_rev.ok_or(MergeError::MissingRev)?;
        let info = parse_rev(&rev)?;
        let root = RevRoot {
            pos: info.pos,
            node: RevNode::leaf(info.id.clone(), RevStatus::Available, deleted),
        };
        (info.pos, info.id, root)
    };

    let rev = format_rev(pos, &rev_id);
    Ok(ParsedDoc {
        metadata: DocMetadata::new(id, vec![root]),
        rev,
        data: body,
        deleted,
        stemmed_revs: Vec::new(),
    })
}

/// Builds the linear ancestry chain from a `_revisions` member: the oldest id
/// roots the chain, the newest becomes the (available) leaf.
fn chain_from_revisions(revisions: &Revisions, deleted: bool) -> RevNode {
    let mut node = RevNode::leaf(revisions.ids[0].clone(), RevStatus::Available, deleted);
    for id in revisions.ids.iter().skip(1) {
        node = RevNode {
            id: id.clone(),
            status: RevStatus::Missing,
            deleted: false,
            children: vec![node],
        };
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_edit_roots_at_depth_one() {
        let parsed = parse_doc(json!({"_id": "a", "value": 1}), true).unwrap();
        assert_eq!(parsed.metadata.id, "a");
        assert!(parsed.rev.starts_with("1-"));
        assert_eq!(parsed.metadata.rev_tree.len(), 1);
        assert_eq!(parsed.metadata.rev_tree[0].pos, 1);
        assert!(!parsed.deleted);
        assert_eq!(parsed.data.get("value"), Some(&json!(1)));
        assert!(!parsed.data.contains_key("_id"));
    }

    #[test]
    fn edit_of_existing_doc_extends_the_parent() {
        let parsed = parse_doc(json!({"_id": "a", "_rev": "1-abc", "value": 2}), true).unwrap();
        assert!(parsed.rev.starts_with("2-"));
        let root = &parsed.metadata.rev_tree[0];
        assert_eq!(root.pos, 1);
        assert_eq!(root.node.id, "abc");
        assert_eq!(root.node.status, RevStatus::Missing);
        assert_eq!(root.node.children.len(), 1);
        assert_eq!(root.node.children[0].status, RevStatus::Available);
    }

    #[test]
    fn generates_an_id_when_absent() {
        let parsed = parse_doc(json!({"value": 1}), true).unwrap();
        assert!(!parsed.metadata.id.is_empty());
    }

    #[test]
    fn tombstone_flag_flows_into_the_leaf() {
        let parsed = parse_doc(json!({"_id": "a", "_rev": "1-x", "_deleted": true}), true).unwrap();
        assert!(parsed.deleted);
        assert!(parsed.metadata.rev_tree[0].node.children[0].deleted);
        // _deleted stays in the body.
        assert_eq!(parsed.data.get("_deleted"), Some(&json!(true)));
    }

    #[test]
    fn explicit_revisions_build_the_full_chain() {
        let doc = json!({
            "_id": "a",
            "_rev": "3-ccc",
            "_revisions": {"start": 3, "ids": ["ccc", "bbb", "aaa"]},
        });
        let parsed = parse_doc(doc, false).unwrap();
        assert_eq!(parsed.rev, "3-ccc");
        let root = &parsed.metadata.rev_tree[0];
        assert_eq!(root.pos, 1);
        assert_eq!(root.node.id, "aaa");
        assert_eq!(root.node.children[0].id, "bbb");
        assert_eq!(root.node.children[0].children[0].id, "ccc");
    }

    #[test]
    fn explicit_rev_without_revisions_is_a_bare_leaf() {
        let parsed = parse_doc(json!({"_id": "a", "_rev": "5-eee"}), false).unwrap();
        assert_eq!(parsed.rev, "5-eee");
        assert_eq!(parsed.metadata.rev_tree[0].pos, 5);
        assert!(parsed.metadata.rev_tree[0].node.children.is_empty());
    }

    #[test]
    fn rejects_unknown_underscore_members() {
        let err = parse_doc(json!({"_id": "a", "_zoo": 1}), true).unwrap_err();
        assert!(matches!(err, MergeError::ReservedField(field) if field == "_zoo"));
    }

    #[test]
    fn rejects_reserved_ids_but_allows_local_and_design() {
        assert!(parse_doc(json!({"_id": "_bad"}), true).is_err());
        assert!(parse_doc(json!({"_id": "_design/x"}), true).is_ok());
        assert!(parse_doc(json!({"_id": "_local/x"}), true).is_ok());
        assert!(parse_doc(json!({"_id": ""}), true).is_err());
    }

    #[test]
    fn missing_rev_with_new_edits_disabled_is_an_error() {
        assert!(matches!(
            parse_doc(json!({"_id": "a"}), false),
            Err(MergeError::MissingRev)
        ));
    }
}
