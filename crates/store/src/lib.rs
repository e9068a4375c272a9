use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use campus_contracts::token;
use campus_contracts::{NewReport, Report, ReportFilter, ReportStatus, Stats, SubmittedReport};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

mod filter;

use self::filter::{NEWEST_FIRST, REPORT_COLUMNS, filtered_reports_query};

pub const DEFAULT_SCHEMA: &str = include_str!("../schema/schema.sql");

const STATS_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS stats (id INTEGER PRIMARY KEY, total_reports INTEGER NOT NULL DEFAULT 0, verified_reports INTEGER NOT NULL DEFAULT 0, pending_reports INTEGER NOT NULL DEFAULT 0, resolved_reports INTEGER NOT NULL DEFAULT 0, updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)";

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Sqlx(sqlx::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "record not found"),
            StoreError::Sqlx(err) => write!(f, "{}", err),
            StoreError::Io(err) => write!(f, "store io error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsMode {
    /// Read the denormalized `stats` row as-is. It is never updated on submission.
    Stored,
    /// Derive counts from the `reports` table on every read.
    Live,
}

impl StatsMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatsMode::Stored => "stored",
            StatsMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub stats_mode: StatsMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            stats_mode: StatsMode::Stored,
        }
    }
}

/// Everything the HTTP layer needs from storage.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn insert_report(&self, report: &NewReport) -> Result<SubmittedReport, StoreError>;

    async fn find_by_token(&self, token: &str) -> Result<Report, StoreError>;

    /// Newest first. Rows sharing a `created_at` second are ordered by id, newest first.
    async fn list_latest(&self, limit: u32) -> Result<Vec<Report>, StoreError>;

    async fn list_filtered(
        &self,
        filter: &ReportFilter,
        limit: u32,
    ) -> Result<Vec<Report>, StoreError>;

    async fn get_stats(&self) -> Result<Stats, StoreError>;

    async fn count_reports(&self) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct ReportStore {
    pool: SqlitePool,
    stats_mode: StatsMode,
}

impl ReportStore {
    pub async fn connect(db_url: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new().max_connections(options.max_connections);

        if is_in_memory(db_url) {
            // Each connection to :memory: is its own database.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else if let Some(parent) = connect_options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent)?;
        }

        let pool = pool_options.connect_with(connect_options).await?;

        Ok(Self {
            pool,
            stats_mode: options.stats_mode,
        })
    }

    pub async fn connect_and_prepare(
        db_url: &str,
        options: StoreOptions,
        schema_sql: &str,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, options).await?;
        store.apply_schema(schema_sql).await?;
        store.ensure_stats_row().await?;
        Ok(store)
    }

    /// Runs the schema as one batch. Statements must be safe to re-run.
    pub async fn apply_schema(&self, schema_sql: &str) -> Result<(), StoreError> {
        sqlx::raw_sql(schema_sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn ensure_stats_row(&self) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO stats (id, total_reports, verified_reports, pending_reports, resolved_reports) VALUES (1, 0, 0, 0, 0)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn stats_mode(&self) -> StatsMode {
        self.stats_mode
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_stats_row(&self) -> Result<Option<Stats>, StoreError> {
        let row = sqlx::query(
            "SELECT total_reports, verified_reports, pending_reports, resolved_reports FROM stats WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(stats_from_row).transpose()
    }

    async fn stored_stats(&self) -> Result<Stats, StoreError> {
        match self.fetch_stats_row().await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => tracing::warn!("stats row missing; seeding it"),
            Err(err) => tracing::warn!(error = %err, "stats read failed; recreating stats table"),
        }

        sqlx::query(STATS_TABLE_DDL).execute(&self.pool).await?;
        self.ensure_stats_row().await?;
        self.fetch_stats_row().await?.ok_or(StoreError::NotFound)
    }

    async fn live_stats(&self) -> Result<Stats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_reports, \
             COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS verified_reports, \
             COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS pending_reports, \
             COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS resolved_reports \
             FROM reports",
        )
        .bind(ReportStatus::Verified.as_str())
        .bind(ReportStatus::Pending.as_str())
        .bind(ReportStatus::Resolved.as_str())
        .fetch_one(&self.pool)
        .await?;

        stats_from_row(&row)
    }
}

#[async_trait]
impl ReportRepository for ReportStore {
    async fn insert_report(&self, report: &NewReport) -> Result<SubmittedReport, StoreError> {
        let token = token::generate_token();

        let result = sqlx::query(
            "INSERT INTO reports (token, category, title, description, location, status) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(&report.category)
        .bind(&report.title)
        .bind(&report.description)
        .bind(&report.location)
        .bind(ReportStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(SubmittedReport {
            id: result.last_insert_rowid(),
            token,
        })
    }

    async fn find_by_token(&self, token: &str) -> Result<Report, StoreError> {
        let sql = format!(
            "SELECT {} FROM reports WHERE token = ? ORDER BY id LIMIT 1",
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        report_from_row(&row)
    }

    async fn list_latest(&self, limit: u32) -> Result<Vec<Report>, StoreError> {
        let sql = format!(
            "SELECT {} FROM reports{} LIMIT ?",
            REPORT_COLUMNS, NEWEST_FIRST
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(report_from_row).collect()
    }

    async fn list_filtered(
        &self,
        filter: &ReportFilter,
        limit: u32,
    ) -> Result<Vec<Report>, StoreError> {
        let mut builder = filtered_reports_query(filter, limit);
        let rows = builder.build().fetch_all(&self.pool).await?;

        rows.iter().map(report_from_row).collect()
    }

    async fn get_stats(&self) -> Result<Stats, StoreError> {
        match self.stats_mode {
            StatsMode::Stored => self.stored_stats().await,
            StatsMode::Live => self.live_stats().await,
        }
    }

    async fn count_reports(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn report_from_row(row: &SqliteRow) -> Result<Report, StoreError> {
    Ok(Report {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row
            .try_get::<Option<String>, _>("location")?
            .unwrap_or_default(),
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn stats_from_row(row: &SqliteRow) -> Result<Stats, StoreError> {
    Ok(Stats {
        total_reports: row.try_get("total_reports")?,
        verified_reports: row.try_get("verified_reports")?,
        pending_reports: row.try_get("pending_reports")?,
        resolved_reports: row.try_get("resolved_reports")?,
    })
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(StoreError::Io)
}
