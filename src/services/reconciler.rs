//! Merge a batch of normalized events into the event store.
//!
//! Identity is the external id alone. A new id is inserted in full; a known id
//! only receives the volatile fields listed in `EventPatch`, so curated columns
//! (category, extension bag, organizer, ...) survive a re-fetch.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::{EventPatch, NewEvent};
use crate::db::EventRepository;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Insert-or-patch every record inside one transaction. Any failure rolls
/// back the whole batch.
pub async fn reconcile(pool: &SqlitePool, events: &[NewEvent]) -> AppResult<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    if events.is_empty() {
        return Ok(summary);
    }

    let mut tx = pool.begin().await.map_err(AppError::Database)?;

    for event in events {
        match EventRepository::find_id_by_external_id(&mut *tx, &event.external_id).await? {
            Some(id) => {
                EventRepository::apply_patch(&mut *tx, id, &EventPatch::from(event)).await?;
                summary.updated += 1;
            }
            None => {
                EventRepository::insert(&mut *tx, event).await?;
                summary.inserted += 1;
            }
        }
    }

    // Dropping `tx` on an early return above rolls back.
    tx.commit().await.map_err(AppError::Database)?;

    tracing::info!(
        inserted = summary.inserted,
        updated = summary.updated,
        "Reconciled event batch"
    );

    Ok(summary)
}
