//! Network and SQLite [`VectorIndex`] backends.
//!
//! - **[`SqliteVectorIndex`]** (`provider = "local"`): vectors as BLOBs in the
//!   `content_vectors` table, brute-force cosine similarity at query time.
//! - **[`PineconeIndex`]** (`provider = "pinecone"`): the Pinecone data-plane
//!   REST API (`/vectors/upsert`, `/query`, `/vectors/delete`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::{Row, SqlitePool};

use thoughtsynth_core::embedding::{blob_to_vec, vec_to_blob};
use thoughtsynth_core::models::now_millis;
use thoughtsynth_core::vector::{
    rank_matches, VectorFilter, VectorIndex, VectorMatch, VectorMetadata, VectorRecord,
};

use crate::config::VectorIndexConfig;

// ============ Local (SQLite) ============

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let now = now_millis().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO content_vectors (id, content_id, owner_id, kind, dims, vector, metadata_json, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    content_id = excluded.content_id,
                    owner_id = excluded.owner_id,
                    kind = excluded.kind,
                    dims = excluded.dims,
                    vector = excluded.vector,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.id)
            .bind(record.metadata.content_id)
            .bind(&record.metadata.owner_id)
            .bind(record.metadata.kind.as_str())
            .bind(record.values.len() as i64)
            .bind(vec_to_blob(&record.values))
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vector, metadata_json FROM content_vectors
            WHERE (?1 IS NULL OR owner_id = ?1)
              AND (?2 IS NULL OR content_id = ?2)
              AND (?3 IS NULL OR kind = ?3)
            "#,
        )
        .bind(filter.owner_id.as_deref())
        .bind(filter.content_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut loaded: Vec<(String, Vec<f32>, VectorMetadata)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let metadata_json: String = row.get("metadata_json");
            let metadata: VectorMetadata = serde_json::from_str(&metadata_json)
                .context("Corrupt metadata_json in content_vectors")?;
            loaded.push((row.get("id"), blob_to_vec(&blob), metadata));
        }

        Ok(rank_matches(
            vector,
            loaded
                .iter()
                .map(|(id, values, meta)| (id.as_str(), values.as_slice(), meta)),
            filter,
            top_k,
        ))
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM content_vectors WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============ Pinecone ============

pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig, api_key: String) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow!("vector_index.host required for pinecone provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
            client,
        })
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let (Some(ns), Some(obj)) = (&self.namespace, body.as_object_mut()) {
            obj.insert("namespace".to_string(), Value::String(ns.clone()));
        }

        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on {}: {}", status, path, body_text);
        }

        // Delete and upsert may answer with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Translate a [`VectorFilter`] into Pinecone's metadata filter language.
pub fn pinecone_filter(filter: &VectorFilter) -> Value {
    let mut clauses = Map::new();
    if let Some(owner) = &filter.owner_id {
        clauses.insert("ownerId".into(), json!({ "$eq": owner }));
    }
    if let Some(content_id) = filter.content_id {
        clauses.insert("contentId".into(), json!({ "$eq": content_id }));
    }
    if let Some(kind) = filter.kind {
        clauses.insert("type".into(), json!({ "$eq": kind.as_str() }));
    }
    Value::Object(clauses)
}

/// Pinecone returns every metadata number as a float; restore integer ids.
fn normalize_metadata(mut metadata: Value) -> Value {
    if let Some(obj) = metadata.as_object_mut() {
        for key in ["contentId", "takeawayId"] {
            if let Some(f) = obj.get(key).and_then(Value::as_f64) {
                obj.insert(key.to_string(), json!(f as i64));
            }
        }
    }
    metadata
}

/// Parse a `/query` response, skipping matches whose metadata is unusable.
pub fn parse_pinecone_matches(response: &Value) -> Vec<VectorMatch> {
    response
        .get("matches")
        .and_then(Value::as_array)
        .map(|matches| {
            matches
                .iter()
                .filter_map(|m| {
                    let id = m.get("id")?.as_str()?.to_string();
                    let score = m.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
                    let metadata = normalize_metadata(m.get("metadata")?.clone());
                    match serde_json::from_value::<VectorMetadata>(metadata) {
                        Ok(metadata) => Some(VectorMatch { id, score, metadata }),
                        Err(e) => {
                            tracing::warn!(id = %id, error = %e, "skipping match with bad metadata");
                            None
                        }
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let vectors: Vec<Value> = records
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": r.metadata,
                })
            })
            .collect();
        self.post("/vectors/upsert", json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let response = self
            .post(
                "/query",
                json!({
                    "vector": vector,
                    "topK": top_k,
                    "filter": pinecone_filter(filter),
                    "includeMetadata": true,
                }),
            )
            .await?;
        Ok(parse_pinecone_matches(&response))
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post("/vectors/delete", json!({ "ids": ids })).await?;
        Ok(())
    }
}

/// Build the configured vector index, or `None` when disabled.
///
/// `pool` backs the `local` provider.
pub fn create_vector_index(
    config: &VectorIndexConfig,
    pool: Option<&SqlitePool>,
) -> Result<Option<Arc<dyn VectorIndex>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "local" => {
            let pool = pool.ok_or_else(|| {
                anyhow!("vector_index provider 'local' needs a SQLite database")
            })?;
            Ok(Some(Arc::new(SqliteVectorIndex::new(pool.clone()))))
        }
        "pinecone" => {
            let key = std::env::var(&config.api_key_env)
                .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
            Ok(Some(Arc::new(PineconeIndex::new(config, key)?)))
        }
        other => bail!("Unknown vector_index provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thoughtsynth_core::vector::VectorKind;

    #[test]
    fn filter_translates_each_clause() {
        let filter = VectorFilter {
            owner_id: Some("u1".into()),
            content_id: Some(7),
            kind: Some(VectorKind::Takeaway),
        };
        assert_eq!(
            pinecone_filter(&filter),
            json!({
                "ownerId": {"$eq": "u1"},
                "contentId": {"$eq": 7},
                "type": {"$eq": "takeaway"},
            })
        );
        assert_eq!(pinecone_filter(&VectorFilter::default()), json!({}));
    }

    #[test]
    fn matches_restore_integer_ids() {
        let response = json!({
            "matches": [
                {
                    "id": "content-7",
                    "score": 0.91,
                    "metadata": {
                        "contentId": 7.0,
                        "type": "content",
                        "ownerId": "u1",
                        "title": "T",
                        "createdAt": "2024-01-01T00:00:00Z"
                    }
                },
                {"id": "broken", "score": 0.5, "metadata": {"foo": 1}}
            ]
        });
        let matches = parse_pinecone_matches(&response);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].metadata.content_id, 7);
        assert_eq!(matches[0].metadata.kind, VectorKind::Content);
    }

    #[test]
    fn missing_matches_is_empty() {
        assert!(parse_pinecone_matches(&json!({})).is_empty());
    }
}
