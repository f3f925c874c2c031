use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use engram_shared::{MemoryError, MemoryFilter, MemoryMetadata, MemoryRecord, span_kind};
use sea_orm::{
  ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, FromQueryResult, Statement,
  TransactionTrait,
  prelude::{DateTimeWithTimeZone, PgVector},
  sea_query::{ArrayType, Value},
};

use crate::{MemoryUpdate, SimilarityHit, validate_collection_name};

/// Production vector store: one table per collection in postgres with
/// pgvector, cosine metric, ANN index per `DB_PROVIDER_CONFIG`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
  db: DatabaseConnection,
  collection: String,
  dim: usize,
  index: AnnIndex,
  ready: Arc<AtomicBool>,
}

/// ANN index choice, honored from provider config when present.
#[derive(Debug, Clone)]
enum AnnIndex {
  IvfFlat { lists: u32 },
  Hnsw { m: u32, ef_construction: u32 },
}

impl AnnIndex {
  fn from_provider_config(config: Option<&serde_json::Value>) -> Self {
    let kind = config
      .and_then(|c| c.get("index"))
      .and_then(|v| v.as_str())
      .unwrap_or("ivfflat");
    match kind {
      "hnsw" => Self::Hnsw {
        m: read_u32(config, "m", 16),
        ef_construction: read_u32(config, "ef_construction", 64),
      },
      _ => Self::IvfFlat {
        lists: read_u32(config, "lists", 100),
      },
    }
  }

  fn create_sql(&self, table: &str) -> String {
    match self {
      Self::IvfFlat { lists } => format!(
        "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} \
         USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists});"
      ),
      Self::Hnsw { m, ef_construction } => format!(
        "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} \
         USING hnsw (embedding vector_cosine_ops) WITH (m = {m}, ef_construction = {ef_construction});"
      ),
    }
  }
}

fn read_u32(config: Option<&serde_json::Value>, key: &str, default: u32) -> u32 {
  config
    .and_then(|c| c.get(key))
    .and_then(serde_json::Value::as_u64)
    .and_then(|v| u32::try_from(v).ok())
    .unwrap_or(default)
}

/// Connection problems are worth re-attempting; everything else from
/// the backend is a database failure.
fn map_db_err(err: DbErr) -> MemoryError {
  match &err {
    DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => MemoryError::Retryable(err.to_string()),
    _ => {
      let message = err.to_string();
      if message.contains("timed out") || message.contains("connection reset") {
        MemoryError::Retryable(message)
      } else {
        MemoryError::Database(message)
      }
    }
  }
}

#[derive(Debug, FromQueryResult)]
struct StoredRow {
  id: String,
  document: String,
  embedding: PgVector,
  user_id: String,
  app_id: String,
  session_id: String,
  agent_name: String,
  event_timestamp: Option<DateTimeWithTimeZone>,
  created_at: DateTimeWithTimeZone,
  updated_at: DateTimeWithTimeZone,
}

impl StoredRow {
  fn into_record(self) -> MemoryRecord {
    MemoryRecord {
      id: self.id,
      document: self.document,
      embedding: self.embedding.to_vec(),
      metadata: MemoryMetadata {
        user_id: self.user_id,
        app_id: self.app_id,
        session_id: self.session_id,
        agent_name: self.agent_name,
        event_timestamp: self.event_timestamp.map(|ts| ts.with_timezone(&Utc)),
      },
      created_at: self.created_at.with_timezone(&Utc),
      updated_at: self.updated_at.with_timezone(&Utc),
    }
  }
}

#[derive(Debug, FromQueryResult)]
struct SimilarityRow {
  id: String,
  document: String,
  user_id: String,
  app_id: String,
  session_id: String,
  agent_name: String,
  event_timestamp: Option<DateTimeWithTimeZone>,
  created_at: DateTimeWithTimeZone,
  updated_at: DateTimeWithTimeZone,
  similarity: f64,
}

impl SimilarityRow {
  fn into_hit(self) -> SimilarityHit {
    SimilarityHit {
      id: self.id,
      document: self.document,
      metadata: MemoryMetadata {
        user_id: self.user_id,
        app_id: self.app_id,
        session_id: self.session_id,
        agent_name: self.agent_name,
        event_timestamp: self.event_timestamp.map(|ts| ts.with_timezone(&Utc)),
      },
      created_at: self.created_at.with_timezone(&Utc),
      updated_at: self.updated_at.with_timezone(&Utc),
      similarity: (self.similarity as f32).clamp(0.0, 1.0),
    }
  }
}

const RECORD_COLUMNS: &str = "id, document, embedding, user_id, app_id, session_id, agent_name, \
   event_timestamp, created_at, updated_at";

impl PostgresStore {
  pub async fn connect(
    database_url: &str,
    collection_name: &str,
    dim: usize,
    provider_config: Option<&serde_json::Value>,
  ) -> Result<Self, MemoryError> {
    validate_collection_name(collection_name)?;

    let db = Database::connect(database_url).await.map_err(|err| {
      MemoryError::Configuration(format!("cannot connect to postgres: {err}"))
    })?;

    Ok(Self {
      db,
      collection: collection_name.to_owned(),
      dim,
      index: AnnIndex::from_provider_config(provider_config),
      ready: Arc::new(AtomicBool::new(false)),
    })
  }

  /// Ensure extension, table and ANN index exist. Safe to run
  /// concurrently: everything is `IF NOT EXISTS` and the index-creation
  /// race with another process is tolerated.
  pub async fn setup(&self) -> Result<(), MemoryError> {
    let table = &self.collection;
    let dim = self.dim;

    self
      .execute(Statement::from_string(
        DbBackend::Postgres,
        "CREATE EXTENSION IF NOT EXISTS vector;",
      ))
      .await?;

    self
      .execute(Statement::from_string(
        DbBackend::Postgres,
        format!(
          "CREATE TABLE IF NOT EXISTS {table} (
             id TEXT PRIMARY KEY,
             document TEXT NOT NULL,
             embedding VECTOR({dim}) NOT NULL,
             user_id TEXT NOT NULL,
             app_id TEXT NOT NULL,
             session_id TEXT NOT NULL,
             agent_name TEXT NOT NULL,
             event_timestamp TIMESTAMPTZ DEFAULT now(),
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
           );"
        ),
      ))
      .await?;

    let index_result = self
      .execute(Statement::from_string(
        DbBackend::Postgres,
        self.index.create_sql(table),
      ))
      .await;
    if let Err(err) = index_result {
      // Another process can win the index race between the existence
      // check and creation
      if !err.to_string().to_lowercase().contains("already exists") {
        return Err(err);
      }
      tracing::warn!(table, "ANN index was created concurrently, continuing");
    }

    self.ready.store(true, Ordering::Release);
    tracing::info!(table, dim, "collection is open");
    Ok(())
  }

  async fn execute(&self, stmt: Statement) -> Result<(), MemoryError> {
    self.db.execute_raw(stmt).await.map_err(map_db_err)?;
    Ok(())
  }

  fn ensure_open(&self) -> Result<(), MemoryError> {
    if self.ready.load(Ordering::Acquire) {
      Ok(())
    } else {
      Err(MemoryError::Database(
        "collection is not initialized; call setup() first".into(),
      ))
    }
  }

  fn check_dimensions(&self, embedding: &[f32]) -> Result<(), MemoryError> {
    if embedding.len() == self.dim {
      Ok(())
    } else {
      Err(MemoryError::InvalidRequest(format!(
        "embedding dimension mismatch: expected {}, got {}",
        self.dim,
        embedding.len()
      )))
    }
  }

  #[tracing::instrument(name = "db.add", skip_all, fields(span.kind = span_kind::DB, db.item_count = items.len()))]
  pub async fn add(&self, items: Vec<MemoryRecord>) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    if items.is_empty() {
      return Ok(vec![]);
    }
    for item in &items {
      if item.document.is_empty() {
        return Err(MemoryError::InvalidRequest(
          "memory document must be non-empty".into(),
        ));
      }
      self.check_dimensions(&item.embedding)?;
    }

    let table = &self.collection;
    let sql = format!(
      "INSERT INTO {table} (id, document, embedding, user_id, app_id, session_id, agent_name, \
         event_timestamp, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
       ON CONFLICT (id) DO UPDATE SET
         document = EXCLUDED.document,
         embedding = EXCLUDED.embedding,
         updated_at = now();"
    );

    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();

    let txn = self.db.begin().await.map_err(map_db_err)?;
    for item in items {
      let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        &sql,
        vec![
          item.id.into(),
          item.document.into(),
          PgVector::from(item.embedding).into(),
          item.metadata.user_id.into(),
          item.metadata.app_id.into(),
          item.metadata.session_id.into(),
          item.metadata.agent_name.into(),
          item.metadata.event_timestamp.into(),
          item.created_at.into(),
          item.updated_at.into(),
        ],
      );
      txn.execute_raw(stmt).await.map_err(map_db_err)?;
    }
    txn.commit().await.map_err(map_db_err)?;

    tracing::debug!(count = ids.len(), "added memories");
    Ok(ids)
  }

  #[tracing::instrument(name = "db.update", skip_all, fields(span.kind = span_kind::DB, db.item_count = items.len()))]
  pub async fn update(&self, items: Vec<MemoryUpdate>) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    for item in &items {
      self.check_dimensions(&item.embedding)?;
    }

    let table = &self.collection;
    let sql = format!(
      "UPDATE {table} SET document = $1, embedding = $2, updated_at = now()
       WHERE id = $3 RETURNING id;"
    );

    let mut updated = Vec::new();
    for item in items {
      let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        &sql,
        vec![
          item.document.into(),
          PgVector::from(item.embedding).into(),
          item.id.clone().into(),
        ],
      );
      let rows = self.db.query_all_raw(stmt).await.map_err(map_db_err)?;
      if !rows.is_empty() {
        updated.push(item.id);
      }
    }
    Ok(updated)
  }

  #[tracing::instrument(name = "db.delete", skip_all, fields(span.kind = span_kind::DB, db.item_count = ids.len()))]
  pub async fn delete(&self, ids: &[String]) -> Result<Vec<String>, MemoryError> {
    self.ensure_open()?;
    if ids.is_empty() {
      return Ok(vec![]);
    }

    let table = &self.collection;
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      format!("DELETE FROM {table} WHERE id = ANY($1);"),
      vec![string_array(ids)],
    );
    self.db.execute_raw(stmt).await.map_err(map_db_err)?;
    Ok(ids.to_vec())
  }

  #[tracing::instrument(name = "db.query.id", skip_all, fields(span.kind = span_kind::DB, db.item_count = ids.len()))]
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, MemoryError> {
    self.ensure_open()?;
    if ids.is_empty() {
      return Ok(vec![]);
    }

    let table = &self.collection;
    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      format!("SELECT {RECORD_COLUMNS} FROM {table} WHERE id = ANY($1);"),
      vec![string_array(ids)],
    );

    let rows = self.db.query_all_raw(stmt).await.map_err(map_db_err)?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
      let stored = StoredRow::from_query_result(&row, "").map_err(map_db_err)?;
      records.push(stored.into_record());
    }
    Ok(records)
  }

  #[tracing::instrument(name = "db.query.metadata", skip_all, fields(span.kind = span_kind::DB, db.limit = limit))]
  pub async fn query_by_filter(
    &self,
    filter: &MemoryFilter,
    limit: usize,
  ) -> Result<Vec<MemoryRecord>, MemoryError> {
    self.ensure_open()?;

    let table = &self.collection;
    let (where_sql, mut values) = filter_clause(filter, 1);
    values.push((limit as i64).into());
    let limit_param = values.len();

    let stmt = Statement::from_sql_and_values(
      DbBackend::Postgres,
      format!(
        "SELECT {RECORD_COLUMNS} FROM {table}{where_sql} \
         ORDER BY created_at DESC LIMIT ${limit_param};"
      ),
      values,
    );

    let rows = self.db.query_all_raw(stmt).await.map_err(map_db_err)?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
      let stored = StoredRow::from_query_result(&row, "").map_err(map_db_err)?;
      records.push(stored.into_record());
    }
    Ok(records)
  }

  #[tracing::instrument(
    name = "db.query.similarity",
    skip_all,
    fields(span.kind = span_kind::DB, db.query_count = embeddings.len(), db.top_k = top_k)
  )]
  pub async fn query_by_similarity(
    &self,
    embeddings: &[Vec<f32>],
    filter: &MemoryFilter,
    top_k: usize,
  ) -> Result<Vec<Vec<SimilarityHit>>, MemoryError> {
    self.ensure_open()?;
    for embedding in embeddings {
      self.check_dimensions(embedding)?;
    }

    let table = &self.collection;
    let (where_sql, filter_values) = filter_clause(filter, 2);
    let top_k_param = filter_values.len() + 2;
    let sql = format!(
      "SELECT id, document, user_id, app_id, session_id, agent_name, \
         event_timestamp, created_at, updated_at, \
         1 - (embedding <=> $1) AS similarity
       FROM {table}{where_sql}
       ORDER BY embedding <=> $1
       LIMIT ${top_k_param};"
    );

    let mut groups = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
      let mut values: Vec<Value> = vec![PgVector::from(embedding.clone()).into()];
      values.extend(filter_values.iter().cloned());
      values.push((top_k as i64).into());

      let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
      let rows = self.db.query_all_raw(stmt).await.map_err(map_db_err)?;
      let mut hits = Vec::with_capacity(rows.len());
      for row in rows {
        let scored = SimilarityRow::from_query_result(&row, "").map_err(map_db_err)?;
        hits.push(scored.into_hit());
      }
      groups.push(hits);
    }
    Ok(groups)
  }
}

/// `WHERE a = $i AND b = $i+1 …` over the set filter fields, with the
/// matching bound values. `start_index` is the first free placeholder.
fn filter_clause(filter: &MemoryFilter, start_index: usize) -> (String, Vec<Value>) {
  let entries = filter.entries();
  if entries.is_empty() {
    return (String::new(), vec![]);
  }

  let mut clause = String::from(" WHERE ");
  let mut values = Vec::with_capacity(entries.len());
  for (offset, (column, value)) in entries.iter().enumerate() {
    if offset > 0 {
      clause.push_str(" AND ");
    }
    let _ = write!(clause, "{column} = ${}", start_index + offset);
    values.push((*value).into());
  }
  (clause, values)
}

fn string_array(ids: &[String]) -> Value {
  Value::Array(
    ArrayType::String,
    Some(Box::new(ids.iter().cloned().map(Value::from).collect())),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filter_clause_numbers_placeholders_from_start_index() {
    let filter = MemoryFilter {
      user_id: Some("u1".into()),
      session_id: Some("s1".into()),
      ..MemoryFilter::default()
    };
    let (clause, values) = filter_clause(&filter, 2);
    assert_eq!(clause, " WHERE user_id = $2 AND session_id = $3");
    assert_eq!(values.len(), 2);
  }

  #[test]
  fn empty_filter_produces_no_clause() {
    let (clause, values) = filter_clause(&MemoryFilter::default(), 1);
    assert!(clause.is_empty());
    assert!(values.is_empty());
  }

  #[test]
  fn provider_config_selects_ann_index() {
    let config = serde_json::json!({"index": "hnsw", "m": 32});
    let index = AnnIndex::from_provider_config(Some(&config));
    let sql = index.create_sql("memories");
    assert!(sql.contains("USING hnsw"));
    assert!(sql.contains("m = 32"));
    assert!(sql.contains("ef_construction = 64"));

    let default = AnnIndex::from_provider_config(None);
    assert!(default.create_sql("memories").contains("ivfflat"));
  }
}
