// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! The transaction model and commit protocol (§4.4).
//!
//! A [`TransactionOp`] names one of the mutation kinds the design
//! recognizes. Conflict detection is a pure function over each
//! transaction's *touched uuid set*: a transaction whose touch set is
//! known statically (append, delete-by-uuid, update, upsert) only
//! conflicts with a concurrently committed transaction if the two sets
//! overlap; a transaction whose touch set depends on data read at
//! execution time (predicate delete, compaction) conservatively
//! conflicts with any concurrent commit (§9 Open Question).

use std::collections::{HashMap, HashSet};

use contextframe_table::Record;
use uuid::Uuid;

/// Manifest config key holding the comma-separated uuid set a committed
/// transaction touched, used by concurrent retrying writers to decide
/// whether they actually conflict (§4.4 commit protocol step 4).
pub const TOUCHED_UUIDS_CONFIG_KEY: &str = "contextframe.transaction.touched_uuids";
/// Manifest config key marking a committed transaction as having
/// touched an unbounded/data-dependent row set.
pub const BROAD_TOUCH_CONFIG_KEY: &str = "contextframe.transaction.broad";

/// One mutation kind a transaction can apply (§4.4).
#[derive(Debug, Clone)]
pub enum TransactionOp {
    Append { records: Vec<Record> },
    DeleteByPredicate { predicate: String },
    DeleteByUuids { uuids: Vec<Uuid> },
    Update { records_by_uuid: HashMap<Uuid, Record> },
    Upsert { records: Vec<Record> },
    CreateIndex { name: String },
    DropIndex { name: String },
    MergeIndexDeltas { name: String },
    Compact,
    Tag { name: String, version: u64 },
    Untag { name: String },
}

impl TransactionOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::DeleteByPredicate { .. } | Self::DeleteByUuids { .. } => "delete",
            Self::Update { .. } => "update",
            Self::Upsert { .. } => "upsert",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::MergeIndexDeltas { .. } => "merge_index_deltas",
            Self::Compact => "compact",
            Self::Tag { .. } => "tag",
            Self::Untag { .. } => "untag",
        }
    }

    /// The uuids this operation is known to touch, or `None` if the
    /// touched set can only be known once the operation actually reads
    /// the dataset (a predicate delete or a compaction).
    pub fn touched_uuids(&self) -> Option<HashSet<Uuid>> {
        match self {
            Self::Append { .. } => Some(HashSet::new()),
            Self::DeleteByUuids { uuids } => Some(uuids.iter().copied().collect()),
            Self::Update { records_by_uuid } => Some(records_by_uuid.keys().copied().collect()),
            Self::Upsert { records } => Some(records.iter().map(|r| r.uuid).collect()),
            Self::DeleteByPredicate { .. } | Self::Compact => None,
            Self::CreateIndex { .. }
            | Self::DropIndex { .. }
            | Self::MergeIndexDeltas { .. }
            | Self::Tag { .. }
            | Self::Untag { .. } => Some(HashSet::new()),
        }
    }
}

/// Stamp `config` with the touch metadata for a transaction about to be
/// committed.
pub fn record_touch_metadata(config: &mut HashMap<String, String>, op: &TransactionOp) {
    config.remove(TOUCHED_UUIDS_CONFIG_KEY);
    config.remove(BROAD_TOUCH_CONFIG_KEY);
    match op.touched_uuids() {
        Some(uuids) => {
            let joined = uuids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
            config.insert(TOUCHED_UUIDS_CONFIG_KEY.to_string(), joined);
        }
        None => {
            config.insert(BROAD_TOUCH_CONFIG_KEY.to_string(), "true".to_string());
        }
    }
}

/// True if a transaction touching `touched` conflicts with an
/// already-committed manifest carrying `committed_config`'s touch
/// metadata.
pub fn conflicts_with(touched: &Option<HashSet<Uuid>>, committed_config: &HashMap<String, String>) -> bool {
    if committed_config.get(BROAD_TOUCH_CONFIG_KEY).map(String::as_str) == Some("true") {
        return true;
    }
    let Some(touched) = touched else {
        return true;
    };
    if touched.is_empty() {
        return false;
    }
    let committed: HashSet<Uuid> = committed_config
        .get(TOUCHED_UUIDS_CONFIG_KEY)
        .map(|s| {
            s.split(',')
                .filter(|part| !part.is_empty())
                .filter_map(|part| Uuid::parse_str(part).ok())
                .collect()
        })
        .unwrap_or_default();
    !touched.is_disjoint(&committed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_uuid_sets_do_not_conflict() {
        let a = Some([Uuid::new_v4()].into_iter().collect::<HashSet<_>>());
        let mut config = HashMap::new();
        record_touch_metadata(&mut config, &TransactionOp::DeleteByUuids { uuids: vec![Uuid::new_v4()] });
        assert!(!conflicts_with(&a, &config));
    }

    #[test]
    fn overlapping_uuid_sets_conflict() {
        let shared = Uuid::new_v4();
        let a = Some([shared].into_iter().collect::<HashSet<_>>());
        let mut config = HashMap::new();
        record_touch_metadata(&mut config, &TransactionOp::DeleteByUuids { uuids: vec![shared] });
        assert!(conflicts_with(&a, &config));
    }

    #[test]
    fn predicate_delete_conflicts_with_anything() {
        let a: Option<HashSet<Uuid>> = None;
        let mut config = HashMap::new();
        record_touch_metadata(&mut config, &TransactionOp::Append { records: Vec::new() });
        assert!(conflicts_with(&a, &config));
    }

    #[test]
    fn compaction_is_recorded_as_broad() {
        let mut config = HashMap::new();
        record_touch_metadata(&mut config, &TransactionOp::Compact);
        let touched = Some(HashSet::new());
        assert!(conflicts_with(&touched, &config));
    }
}
