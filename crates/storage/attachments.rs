//! Attachments subsystem: content-addressed binaries plus a reference map
//! from digest to the `"<docid>@<rev>"` pairs using it. Bodies are written
//! once per digest; references accumulate and are reclaimed by compaction.

use crate::api::tables::{ATTACH_STORE, BINARY_STORE};
use crate::api::{BatchOp, StorageBackend};
use crate::error::StoreError;
use crate::keys::attachment_digest;
use crate::transaction::Transaction;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An attachment body as returned by `get_attachment`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentData {
    Binary(Bytes),
    Base64(String),
}

/// The stored row of the attach store. Rows written before reference
/// tracking existed carry no `refs` map; those are kept as-is and never
/// reclaimed, since rebuilding their references would take a full database
/// scan.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct AttachRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<BTreeMap<String, bool>>,
}

/// One attachment of one incoming document, decoded ahead of the write
/// phase. Stubs carry their original JSON entry; inline attachments carry the
/// decoded bytes and computed digest.
#[derive(Clone, Debug)]
pub(crate) struct AttachmentPlan {
    pub name: String,
    pub content_type: Option<String>,
    pub digest: String,
    pub length: u64,
    pub data: Option<Bytes>,
    pub stub_entry: Option<Value>,
}

impl AttachmentPlan {
    pub fn is_stub(&self) -> bool {
        self.stub_entry.is_some()
    }
}

/// Decodes the `_attachments` member of a parsed document into write plans.
/// Inline bodies must be base64 strings; stubs must carry a digest.
pub(crate) fn extract_plans(
    data: &Map<String, Value>,
) -> Result<Vec<AttachmentPlan>, StoreError> {
    let Some(attachments) = data.get("_attachments") else {
        return Ok(Vec::new());
    };
    let Some(attachments) = attachments.as_object() else {
        return Err(StoreError::BadArgument(
            "_attachments must be an object".to_string(),
        ));
    };

    let mut plans = Vec::new();
    for (name, att) in attachments {
        let Some(att_obj) = att.as_object() else {
            return Err(StoreError::BadArgument(format!(
                "attachment {name} must be an object"
            )));
        };
        let content_type = att_obj
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        if att_obj.get("stub").and_then(Value::as_bool) == Some(true) {
            let digest = att_obj
                .get("digest")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    StoreError::BadArgument(format!("stub attachment {name} has no digest"))
                })?;
            let length = att_obj.get("length").and_then(Value::as_u64).unwrap_or(0);
            plans.push(AttachmentPlan {
                name: name.clone(),
                content_type,
                digest: digest.to_string(),
                length,
                data: None,
                stub_entry: Some(att.clone()),
            });
            continue;
        }

        let encoded = att_obj.get("data").and_then(Value::as_str).ok_or_else(|| {
            StoreError::BadArgument(format!("attachment {name} has no data"))
        })?;
        let bytes = STANDARD.decode(encoded).map_err(|_| {
            StoreError::BadArgument("Attachment is not a valid base64 string".to_string())
        })?;
        let digest = attachment_digest(&bytes);
        plans.push(AttachmentPlan {
            name: name.clone(),
            content_type,
            digest,
            length: bytes.len() as u64,
            data: Some(Bytes::from(bytes)),
            stub_entry: None,
        });
    }
    Ok(plans)
}

/// Adds `"<docid>@<rev>"` to the digest's reference map, creating the row on
/// first use. Returns whether the row was newly created, which is what
/// decides if the binary body gets written. Rows without a `refs` map are
/// left untouched.
pub(crate) fn save_attachment_refs(
    backend: &dyn StorageBackend,
    txn: &mut Transaction,
    digest: &str,
    ref_key: &str,
) -> Result<bool, StoreError> {
    match txn.get(backend, ATTACH_STORE, digest.as_bytes())? {
        None => {
            let mut refs = BTreeMap::new();
            refs.insert(ref_key.to_string(), true);
            let row = AttachRow { refs: Some(refs) };
            txn.push(BatchOp::Put {
                table: ATTACH_STORE,
                key: digest.as_bytes().to_vec(),
                value: serde_json::to_vec(&row)?,
            });
            Ok(true)
        }
        Some(raw) => {
            let mut row: AttachRow = serde_json::from_slice(&raw)?;
            if let Some(refs) = row.refs.as_mut() {
                refs.insert(ref_key.to_string(), true);
                txn.push(BatchOp::Put {
                    table: ATTACH_STORE,
                    key: digest.as_bytes().to_vec(),
                    value: serde_json::to_vec(&row)?,
                });
            }
            Ok(false)
        }
    }
}

/// Reads an attachment body. An absent row reads as empty bytes, which is the
/// legal representation of a zero-length attachment.
pub(crate) fn read_attachment(
    backend: &dyn StorageBackend,
    digest: &str,
) -> Result<Bytes, StoreError> {
    Ok(backend
        .get(BINARY_STORE, digest.as_bytes())?
        .map(Bytes::from)
        .unwrap_or_default())
}

/// Replaces attachment stubs in a document with their base64 bodies.
pub(crate) fn inline_attachments(
    backend: &dyn StorageBackend,
    doc: &mut Map<String, Value>,
) -> Result<(), StoreError> {
    let Some(attachments) = doc.get_mut("_attachments").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    for att in attachments.values_mut() {
        let Some(att_obj) = att.as_object_mut() else {
            continue;
        };
        let Some(digest) = att_obj.get("digest").and_then(Value::as_str) else {
            continue;
        };
        let bytes = read_attachment(backend, digest)?;
        att_obj.insert("data".to_string(), Value::String(STANDARD.encode(&bytes)));
        att_obj.remove("stub");
    }
    Ok(())
}
