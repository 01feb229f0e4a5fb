//! Bounded atomic multi-write unit.
//!
//! Reconciliation, reversal and rollover all persist through this batch.
//! Writes are staged in *groups*: ops that must land together, typically one
//! user's prediction writes plus that user's counter increment. Groups are
//! packed into chunks of at most `MAX_BATCH_OPS` operations and each chunk
//! commits in one transaction. A group never spans a chunk boundary, which
//! is what keeps a retry after a partial failure idempotent: a committed
//! group re-derives to zero deltas, an uncommitted group never half-applied.

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{EngineError, Result};

/// Upper bound on operations per atomic chunk.
pub const MAX_BATCH_OPS: usize = 500;

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Persist a prediction's newly computed points and breakdown.
    UpdatePredictionScore {
        prediction_id: String,
        points: i64,
        breakdown_json: String,
        calculated_at: String,
    },
    /// Relative increment of a user's aggregate counters. Never an absolute
    /// overwrite: concurrent reconciliations for different fixtures must
    /// compose via addition.
    IncrementUserTotals {
        user_id: String,
        points_delta: i64,
        scorer_match_delta: i64,
        last_updated: String,
    },
    /// Season rollover: zero the running total, leave lifetime counters.
    ResetUserPoints {
        user_id: String,
        last_updated: String,
    },
    DeletePrediction {
        prediction_id: String,
    },
    DeleteFixture {
        fixture_id: String,
    },
}

impl WriteOp {
    async fn apply(&self, tx: &mut Transaction<'_, Sqlite>) -> sqlx::Result<()> {
        match self {
            WriteOp::UpdatePredictionScore {
                prediction_id,
                points,
                breakdown_json,
                calculated_at,
            } => {
                sqlx::query(
                    "UPDATE predictions SET points_earned = ?, breakdown = ?, calculated_at = ? WHERE id = ?",
                )
                .bind(points)
                .bind(breakdown_json)
                .bind(calculated_at)
                .bind(prediction_id)
                .execute(&mut **tx)
                .await?;
            }
            WriteOp::IncrementUserTotals {
                user_id,
                points_delta,
                scorer_match_delta,
                last_updated,
            } => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET total_points = total_points + ?,
                        scorer_match_count = scorer_match_count + ?,
                        last_updated = ?
                    WHERE id = ?
                    "#,
                )
                .bind(points_delta)
                .bind(scorer_match_delta)
                .bind(last_updated)
                .bind(user_id)
                .execute(&mut **tx)
                .await?;
            }
            WriteOp::ResetUserPoints {
                user_id,
                last_updated,
            } => {
                sqlx::query("UPDATE users SET total_points = 0, last_updated = ? WHERE id = ?")
                    .bind(last_updated)
                    .bind(user_id)
                    .execute(&mut **tx)
                    .await?;
            }
            WriteOp::DeletePrediction { prediction_id } => {
                sqlx::query("DELETE FROM predictions WHERE id = ?")
                    .bind(prediction_id)
                    .execute(&mut **tx)
                    .await?;
            }
            WriteOp::DeleteFixture { fixture_id } => {
                sqlx::query("DELETE FROM fixtures WHERE id = ?")
                    .bind(fixture_id)
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WriteBatch {
    groups: Vec<Vec<WriteOp>>,
    chunk_limit: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::with_chunk_limit(MAX_BATCH_OPS)
    }

    pub fn with_chunk_limit(chunk_limit: usize) -> Self {
        Self {
            groups: Vec::new(),
            chunk_limit: chunk_limit.max(1),
        }
    }

    /// Stage a group of ops that must commit in the same chunk.
    pub fn stage(&mut self, group: Vec<WriteOp>) {
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn op_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Pack whole groups greedily under the chunk limit. A group larger
    /// than the limit becomes its own oversized chunk rather than being
    /// split.
    fn into_chunks(self) -> Vec<Vec<WriteOp>> {
        let mut chunks: Vec<Vec<WriteOp>> = Vec::new();
        let mut current: Vec<WriteOp> = Vec::new();

        for group in self.groups {
            if !current.is_empty() && current.len() + group.len() > self.chunk_limit {
                chunks.push(std::mem::take(&mut current));
            }
            current.extend(group);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Commit chunk by chunk, each chunk one transaction. On failure,
    /// already-committed chunks stay durable and the error reports how far
    /// the batch got; the caller retries the whole logical operation.
    pub async fn commit(self, pool: &SqlitePool) -> Result<()> {
        let chunks = self.into_chunks();
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let op_count = chunk.len();
            commit_chunk(pool, chunk)
                .await
                .map_err(|source| EngineError::PartialCommit {
                    committed: index,
                    total,
                    source,
                })?;
            tracing::debug!("Committed batch chunk {}/{} ({} ops)", index + 1, total, op_count);
        }

        Ok(())
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

async fn commit_chunk(pool: &SqlitePool, chunk: Vec<WriteOp>) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for op in &chunk {
        op.apply(&mut tx).await?;
    }
    tx.commit().await
}
