//! Referential actions for document backends.
//!
//! Document stores enforce no foreign keys, so deleting documents has to
//! be followed by explicit writes on every collection that references
//! them. Single references and list references are handled differently:
//! a list reference only ever loses the deleted ids, whatever its
//! `ondelete` says.

use serde_json::{json, Value as JsonValue};

use super::{storage_name, DocumentCommand};
use crate::codec::{Codec, DocumentCodec};
use crate::error::DalResult;
use crate::schema::{OnDelete, Table};
use crate::types::FieldType;
use crate::value::Value;

/// A write that keeps references consistent after a delete
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeAction {
    /// Remove documents whose reference points at a deleted id
    DeleteReferencing { collection: String, filter: JsonValue },
    /// Null a single reference that points at a deleted id
    NullifyReference {
        collection: String,
        filter: JsonValue,
        field: String,
    },
    /// Pull deleted ids out of a list of references
    PullFromList {
        collection: String,
        filter: JsonValue,
        field: String,
        ids: Vec<JsonValue>,
    },
}

impl CascadeAction {
    pub fn collection(&self) -> &str {
        match self {
            CascadeAction::DeleteReferencing { collection, .. }
            | CascadeAction::NullifyReference { collection, .. }
            | CascadeAction::PullFromList { collection, .. } => collection,
        }
    }

    /// The write command to run
    pub fn command(&self) -> DocumentCommand {
        match self {
            CascadeAction::DeleteReferencing { collection, filter } => DocumentCommand::Delete {
                collection: collection.clone(),
                filter: filter.clone(),
            },
            CascadeAction::NullifyReference {
                collection,
                filter,
                field,
            } => DocumentCommand::Update {
                collection: collection.clone(),
                filter: filter.clone(),
                update: json!({ "$set": { field.as_str(): null } }),
            },
            CascadeAction::PullFromList {
                collection,
                filter,
                field,
                ids,
            } => DocumentCommand::Update {
                collection: collection.clone(),
                filter: filter.clone(),
                update: json!({ "$pull": { field.as_str(): { "$in": ids } } }),
            },
        }
    }
}

/// Actions needed on `referencing` after deleting `deleted_ids` from
/// `target`, in table then field order.
pub fn cascade_actions(
    referencing: &[Table],
    target: &Table,
    deleted_ids: &[Value],
) -> DalResult<Vec<CascadeAction>> {
    if deleted_ids.is_empty() {
        return Ok(Vec::new());
    }
    let codec = DocumentCodec;
    let ids = deleted_ids
        .iter()
        .map(|id| codec.encode(id, &FieldType::Id).map(|raw| raw.to_json()))
        .collect::<DalResult<Vec<_>>>()?;

    let mut actions = Vec::new();
    for table in referencing {
        for field in table.references_to(target.sql_name()) {
            let key = storage_name(&field).to_string();
            let filter = json!({ key.as_str(): { "$in": ids } });
            let collection = table.sql_name().to_string();
            let action = match (field.field_type(), field.ondelete()) {
                (_, OnDelete::NoAction) => continue,
                (FieldType::ListReference(_), _) => CascadeAction::PullFromList {
                    collection,
                    filter,
                    field: key,
                    ids: ids.clone(),
                },
                (_, OnDelete::Cascade) => CascadeAction::DeleteReferencing { collection, filter },
                (_, OnDelete::SetNull) => CascadeAction::NullifyReference {
                    collection,
                    filter,
                    field: key,
                },
            };
            actions.push(action);
        }
    }
    Ok(actions)
}
