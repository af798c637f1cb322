//! LanceDB passage index.
//!
//! One table (default `template_guide`) holds the policy paragraphs with
//! their embeddings. The table is created lazily by the first `add`, so an
//! index that was never built reports a count of zero.

use std::path::Path;
use std::sync::Arc;

use alimtalk_core::{Passage, ScoredPassage, passages, relevance_order};
use arrow::array::{
    Array, FixedSizeListBuilder, Float32Array, Float32Builder, LargeStringArray,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use tracing::info;

use crate::{PassageIndex, StoreError};

/// LanceDB-backed passage collection.
pub struct LanceIndex {
    db: lancedb::Connection,
    table_name: String,
    dim: i32,
}

impl LanceIndex {
    /// Connect to a LanceDB database at the given path.
    ///
    /// Creates the database directory if it doesn't exist. `dim` must match
    /// the embedder that produces the stored vectors.
    pub async fn open(path: &Path, table_name: &str, dim: usize) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let dim = i32::try_from(dim)
            .map_err(|_| StoreError::Other(format!("embedding dimension {dim} too large")))?;
        let db = lancedb::connect(uri).execute().await?;
        info!(path = uri, table = table_name, dim, "opened LanceDB passage index");
        Ok(Self {
            db,
            table_name: table_name.to_string(),
            dim,
        })
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        let names = self.db.table_names().execute().await?;
        Ok(names.contains(&self.table_name))
    }

    /// Open the passage table, or `None` if it was never created.
    async fn table(&self) -> Result<Option<lancedb::Table>, StoreError> {
        if !self.exists().await? {
            return Ok(None);
        }
        let table = self.db.open_table(&self.table_name).execute().await?;
        Ok(Some(table))
    }

    fn to_batch(&self, passages: &[Passage]) -> Result<RecordBatch, StoreError> {
        let schema = Arc::new(passages::passage_schema(self.dim));

        let ids = UInt32Array::from_iter_values(passages.iter().map(|p| p.id));
        let texts = StringArray::from_iter_values(passages.iter().map(|p| p.text.as_str()));

        let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), self.dim);
        for p in passages {
            if p.embedding.len() != self.dim as usize {
                return Err(StoreError::Other(format!(
                    "passage {} has {} dimensions, index expects {}",
                    p.id,
                    p.embedding.len(),
                    self.dim
                )));
            }
            emb_builder.values().append_slice(&p.embedding);
            emb_builder.append(true);
        }

        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(texts),
                Arc::new(emb_builder.finish()),
            ],
        )?)
    }
}

#[async_trait]
impl PassageIndex for LanceIndex {
    async fn count(&self) -> Result<usize, StoreError> {
        match self.table().await? {
            Some(table) => Ok(table.count_rows(None).await?),
            None => Ok(0),
        }
    }

    async fn add(&self, passages: Vec<Passage>) -> Result<(), StoreError> {
        if passages.is_empty() {
            return Ok(());
        }
        let batch = self.to_batch(&passages)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.table().await? {
            Some(table) => {
                table.add(Box::new(reader)).execute().await?;
            }
            None => {
                self.db
                    .create_table(&self.table_name, Box::new(reader))
                    .execute()
                    .await?;
            }
        }

        info!(
            table = %self.table_name,
            rows = passages.len(),
            "added passages to LanceDB"
        );
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, StoreError> {
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        // Widen the fetch until no passage tied with the k-th can be cut off,
        // so ties always resolve by ascending id.
        let mut limit = k;
        loop {
            let mut hits = nearest(&table, query, limit).await?;
            hits.sort_by(relevance_order);
            let complete = hits.len() < limit || hits[limit - 1].score != hits[k - 1].score;
            if complete {
                hits.truncate(k);
                return Ok(hits);
            }
            limit = limit.saturating_mul(2);
        }
    }

    async fn ids(&self) -> Result<Vec<u32>, StoreError> {
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::columns(&[passages::ID]))
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut ids = Vec::new();
        for batch in &batches {
            ids.extend(id_column(batch)?.values().iter().copied());
        }
        Ok(ids)
    }

    async fn delete(&self, ids: &[u32]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(table) = self.table().await? else {
            return Ok(0);
        };
        let list = ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        table.delete(&format!("{} IN ({list})", passages::ID)).await?;
        info!(table = %self.table_name, count = ids.len(), "deleted passages");
        Ok(ids.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if self.exists().await? {
            self.db.drop_table(&self.table_name, &[]).await?;
            info!(table = %self.table_name, "dropped passage table");
        }
        Ok(())
    }
}

// ── Row extraction ──

async fn nearest(
    table: &lancedb::Table,
    query: &[f32],
    limit: usize,
) -> Result<Vec<ScoredPassage>, StoreError> {
    let batches: Vec<RecordBatch> = table
        .vector_search(query)?
        .distance_type(DistanceType::Cosine)
        .limit(limit)
        .execute()
        .await?
        .try_collect()
        .await?;

    let mut hits = Vec::new();
    for batch in &batches {
        hits.extend(scored_rows(batch)?);
    }
    Ok(hits)
}

fn id_column(batch: &RecordBatch) -> Result<&UInt32Array, StoreError> {
    batch
        .column_by_name(passages::ID)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| StoreError::Other("missing or mistyped 'id' column".into()))
}

/// Turn a vector-search batch into scored passages (`score = 1 - distance`).
fn scored_rows(batch: &RecordBatch) -> Result<Vec<ScoredPassage>, StoreError> {
    let ids = id_column(batch)?;
    let text_col = batch
        .column_by_name(passages::TEXT)
        .ok_or_else(|| StoreError::Other("missing 'text' column".into()))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| StoreError::Other("missing '_distance' column".into()))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(text) = get_string(text_col.as_ref(), row) else {
            continue;
        };
        rows.push(ScoredPassage {
            id: ids.value(row),
            text,
            score: 1.0 - distances.value(row),
        });
    }
    Ok(rows)
}

fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn passage(id: u32, embedding: [f32; 4]) -> Passage {
        Passage {
            id,
            text: format!("paragraph {id}"),
            embedding: embedding.to_vec(),
        }
    }

    async fn open_tmp(tmp: &TempDir) -> LanceIndex {
        LanceIndex::open(&tmp.path().join("guide_db"), "template_guide", 4)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn never_built_index_counts_zero() {
        let tmp = TempDir::new().unwrap();
        let index = open_tmp(&tmp).await;
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_then_search_returns_nearest_first() {
        let tmp = TempDir::new().unwrap();
        let index = open_tmp(&tmp).await;
        index
            .add(vec![
                passage(0, [1.0, 0.0, 0.0, 0.0]),
                passage(1, [0.0, 1.0, 0.0, 0.0]),
                passage(2, [0.6, 0.8, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 3);
        let hits = index.search(&[0.0, 1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn ties_at_the_cutoff_resolve_by_ascending_id() {
        let tmp = TempDir::new().unwrap();
        let index = open_tmp(&tmp).await;
        index
            .add(vec![
                passage(5, [1.0, 0.0, 0.0, 0.0]),
                passage(3, [1.0, 0.0, 0.0, 0.0]),
                passage(9, [0.0, 0.0, 1.0, 0.0]),
                passage(4, [1.0, 0.0, 0.0, 0.0]),
                passage(1, [1.0, 0.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        let ids: Vec<u32> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn delete_by_ids_and_clear() {
        let tmp = TempDir::new().unwrap();
        let index = open_tmp(&tmp).await;
        index
            .add(vec![
                passage(0, [1.0, 0.0, 0.0, 0.0]),
                passage(1, [0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let ids = index.ids().await.unwrap();
        index.delete(&ids).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        index.add(vec![passage(0, [1.0, 0.0, 0.0, 0.0])]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = open_tmp(&tmp).await;
        let bad = Passage {
            id: 0,
            text: "x".into(),
            embedding: vec![1.0, 0.0],
        };
        assert!(matches!(index.add(vec![bad]).await, Err(StoreError::Other(_))));
    }
}
