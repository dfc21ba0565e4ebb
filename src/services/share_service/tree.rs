use crate::entities::{file_entries, prelude::FileEntries};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use std::collections::{HashSet, VecDeque};

/// Breadth-first walk over entries and all their current descendants, handed
/// out in batches of at most `batch_size` ids.
///
/// Only the frontier and the visited set are held in memory; every query is
/// bounded by the batch size.
pub struct EntryTreeWalker {
    pending: VecDeque<String>,
    seen: HashSet<String>,
    batch_size: usize,
}

impl EntryTreeWalker {
    pub fn new(roots: Vec<String>, batch_size: usize) -> Self {
        let mut seen = HashSet::new();
        let pending = roots
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Self {
            pending,
            seen,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn next_batch<C: ConnectionTrait>(
        &mut self,
        db: &C,
    ) -> Result<Option<Vec<String>>, DbErr> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let take = self.batch_size.min(self.pending.len());
        let batch: Vec<String> = self.pending.drain(..take).collect();

        let children: Vec<String> = FileEntries::find()
            .select_only()
            .column(file_entries::Column::Id)
            .filter(file_entries::Column::ParentId.is_in(batch.clone()))
            .filter(file_entries::Column::DeletedAt.is_null())
            .into_tuple()
            .all(db)
            .await?;

        for child in children {
            // A corrupted tree must not loop forever
            if self.seen.insert(child.clone()) {
                self.pending.push_back(child);
            }
        }

        Ok(Some(batch))
    }

    /// Drains the whole tree; only for callers that know it is small.
    pub async fn collect_all<C: ConnectionTrait>(mut self, db: &C) -> Result<Vec<String>, DbErr> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch(db).await? {
            all.extend(batch);
        }
        Ok(all)
    }
}

/// Filters `ids` down to entries that exist and are not soft-deleted,
/// preserving order.
pub async fn live_entry_ids<C: ConnectionTrait>(
    db: &C,
    ids: &[String],
) -> Result<Vec<String>, DbErr> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found: HashSet<String> = FileEntries::find()
        .select_only()
        .column(file_entries::Column::Id)
        .filter(file_entries::Column::Id.is_in(ids.to_vec()))
        .filter(file_entries::Column::DeletedAt.is_null())
        .into_tuple::<String>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    Ok(ids
        .iter()
        .filter(|id| found.contains(*id) && seen.insert((*id).clone()))
        .cloned()
        .collect())
}
