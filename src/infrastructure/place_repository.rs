//! SQLite-backed place repository
//!
//! Upserts read the stored row, merge in Rust and write back inside one
//! transaction, so the merge rules live in `PlaceRecord::merge` only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::domain::neighbors::NeighborSet;
use crate::domain::record::{EmailSource, IdentityKey, PlaceRecord};
use crate::domain::repositories::RecordRepository;

const SELECT_COLUMNS: &str = "identity_key, place_id, name, address, phone, latitude, longitude, \
     owner_name, email, email_source, talk_url, instagram_url, blog_url, keyword, neighbors, \
     created_at, updated_at";

#[derive(Debug, FromRow)]
struct PlaceRow {
    identity_key: String,
    place_id: String,
    name: String,
    address: String,
    phone: String,
    latitude: f64,
    longitude: f64,
    owner_name: String,
    email: String,
    email_source: String,
    talk_url: String,
    instagram_url: String,
    blog_url: String,
    keyword: String,
    neighbors: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlaceRow> for PlaceRecord {
    type Error = anyhow::Error;

    fn try_from(row: PlaceRow) -> Result<Self> {
        let neighbors = row
            .neighbors
            .as_deref()
            .map(serde_json::from_str::<NeighborSet>)
            .transpose()
            .with_context(|| format!("Corrupted neighbor set for {}", row.identity_key))?;

        Ok(Self {
            identity_key: IdentityKey::from_stored(row.identity_key),
            place_id: row.place_id,
            name: row.name,
            address: row.address,
            phone: row.phone,
            latitude: row.latitude,
            longitude: row.longitude,
            owner_name: row.owner_name,
            email: row.email,
            email_source: EmailSource::parse(&row.email_source),
            talk_url: row.talk_url,
            instagram_url: row.instagram_url,
            blog_url: row.blog_url,
            keyword: row.keyword,
            neighbors,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SqlitePlaceRepository {
    pool: SqlitePool,
}

impl SqlitePlaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_in(
        tx: &mut Transaction<'_, Sqlite>,
        key: &IdentityKey,
    ) -> Result<Option<PlaceRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM places WHERE identity_key = ?");
        let row = sqlx::query_as::<_, PlaceRow>(&sql)
            .bind(key.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(PlaceRecord::try_from).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM places")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl RecordRepository for SqlitePlaceRepository {
    async fn upsert(&self, record: &PlaceRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let merged = match Self::fetch_in(&mut tx, &record.identity_key).await? {
            Some(mut stored) => {
                stored.merge(record);
                stored
            }
            None => record.clone(),
        };

        let neighbors_json = merged
            .neighbors
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r"
            INSERT OR REPLACE INTO places
            (identity_key, place_id, name, address, phone, latitude, longitude,
             owner_name, email, email_source, talk_url, instagram_url, blog_url,
             keyword, neighbors, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(merged.identity_key.as_str())
        .bind(&merged.place_id)
        .bind(&merged.name)
        .bind(&merged.address)
        .bind(&merged.phone)
        .bind(merged.latitude)
        .bind(merged.longitude)
        .bind(&merged.owner_name)
        .bind(&merged.email)
        .bind(merged.email_source.as_str())
        .bind(&merged.talk_url)
        .bind(&merged.instagram_url)
        .bind(&merged.blog_url)
        .bind(&merged.keyword)
        .bind(neighbors_json)
        .bind(merged.created_at)
        .bind(merged.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("💾 Upserted place {}", merged.identity_key);
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_all(&self) -> Result<Vec<PlaceRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM places ORDER BY created_at, identity_key");
        let rows = sqlx::query_as::<_, PlaceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PlaceRecord::try_from).collect()
    }

    async fn fetch(&self, key: &IdentityKey) -> Result<Option<PlaceRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM places WHERE identity_key = ?");
        let row = sqlx::query_as::<_, PlaceRow>(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(PlaceRecord::try_from).transpose()
    }
}
