//! `transfer_codes` table access.
//!
//! One row per issued code, carrying the serialized profile snapshot, a
//! 15-minute expiry and a single-use marker. Expiry is enforced by timestamp
//! comparison at redeem time; expired rows linger until someone garbage
//! collects them externally. Marking a row redeemed is deliberately
//! best-effort: the caller gets a typed [`RedeemMark`] and the profile data is
//! returned even when the marker write fails.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub const TRANSFER_CODE_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
pub struct TransferCodeRow {
    pub id: String,
    pub code: String,
    /// Serialized profile snapshot, returned verbatim on redeem.
    pub profile_data: String,
    pub expires_at: String,
    pub redeemed_at: Option<String>,
    pub created_by_ip: String,
    pub created_at: String,
}

/// Outcome of the best-effort mark-as-redeemed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemMark {
    Marked,
    /// The write failed; logged, never surfaced to the redeeming user.
    LoggedFailure,
}

#[derive(Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Private in-memory database, one connection so every query sees it.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfer_codes (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                profile_data TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                redeemed_at TEXT,
                created_by_ip TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transfer_codes_code ON transfer_codes(code)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Builds and inserts a row for `code`, expiring [`TRANSFER_CODE_TTL_MINUTES`]
    /// from `now`. Returns the stored row.
    pub async fn create_code(
        &self,
        code: &str,
        profile_data: &str,
        created_by_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<TransferCodeRow, sqlx::Error> {
        let row = TransferCodeRow {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            profile_data: profile_data.to_string(),
            expires_at: iso(now + Duration::minutes(TRANSFER_CODE_TTL_MINUTES)),
            redeemed_at: None,
            created_by_ip: created_by_ip.to_string(),
            created_at: iso(now),
        };
        self.insert(&row).await?;
        Ok(row)
    }

    pub async fn insert(&self, row: &TransferCodeRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO transfer_codes
                (id, code, profile_data, expires_at, redeemed_at, created_by_ip, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.code)
        .bind(&row.profile_data)
        .bind(&row.expires_at)
        .bind(&row.redeemed_at)
        .bind(&row.created_by_ip)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Exact-match lookup; the oldest row wins if the generator ever collided.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<TransferCodeRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, code, profile_data, expires_at, redeemed_at, created_by_ip, created_at
            FROM transfer_codes
            WHERE code = ?
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| map_row(&r)))
    }

    /// Best-effort single-use marker. Availability beats strict consistency
    /// here: two redeemers racing inside one request window can both succeed.
    pub async fn mark_redeemed(&self, id: &str, now: DateTime<Utc>) -> RedeemMark {
        let result = sqlx::query(
            r#"UPDATE transfer_codes SET redeemed_at = ? WHERE id = ? AND redeemed_at IS NULL"#,
        )
        .bind(iso(now))
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => RedeemMark::Marked,
            Ok(_) => {
                tracing::warn!(id, "transfer code was already marked redeemed");
                RedeemMark::LoggedFailure
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "failed to mark transfer code as redeemed");
                RedeemMark::LoggedFailure
            }
        }
    }
}

pub fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn map_row(row: &SqliteRow) -> TransferCodeRow {
    TransferCodeRow {
        id: row.get("id"),
        code: row.get("code"),
        profile_data: row.get("profile_data"),
        expires_at: row.get("expires_at"),
        redeemed_at: row.get("redeemed_at"),
        created_by_ip: row.get("created_by_ip"),
        created_at: row.get("created_at"),
    }
}
