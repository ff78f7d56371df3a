use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::fingerprint::types::FingerprintDetail;
use crate::storage::types::{ConnectionRecord, ConnectionRow, FingerprintRecord, FingerprintRow};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;
// Format of SQLite's CURRENT_TIMESTAMP
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS www (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        injesttime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        ip TEXT,
        useragent TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_www_ip ON www(ip);",
    "CREATE TABLE IF NOT EXISTS fingerprints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        injesttime TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        connection_id TEXT,
        record_tls_version TEXT,
        tls_version TEXT,
        ciphersuite TEXT,
        compression_length TEXT,
        compression TEXT,
        extensions TEXT,
        e_curves TEXT,
        sig_alg TEXT,
        ec_point_fmt TEXT,
        grease TEXT,
        supported_versions TEXT,
        packet BLOB
    );",
];

#[derive(Debug, sqlx::FromRow)]
struct WwwRow {
    id: i64,
    injesttime: String,
    ip: Option<String>,
    useragent: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct FingerprintsRow {
    id: i64,
    injesttime: String,
    connection_id: String,
    record_tls_version: String,
    tls_version: String,
    ciphersuite: String,
    compression_length: String,
    compression: String,
    extensions: String,
    e_curves: String,
    sig_alg: String,
    ec_point_fmt: String,
    grease: String,
    supported_versions: String,
    packet: Vec<u8>,
}

fn parse_injesttime(value: &str) -> Result<DateTime<Utc>, StorageError> {
    NaiveDateTime::parse_from_str(value, SQLITE_TIMESTAMP)
        .map(|t| t.and_utc())
        .map_err(|e| StorageError::ReadFailed(format!("injesttime '{}': {}", value, e)))
}

fn unhex(column: &str, value: &str) -> Result<Vec<u8>, StorageError> {
    hex::decode(value).map_err(|e| StorageError::ReadFailed(format!("{} '{}': {}", column, value, e)))
}

impl WwwRow {
    fn into_row(self) -> Result<ConnectionRow, StorageError> {
        Ok(ConnectionRow {
            id: self.id,
            injesttime: parse_injesttime(&self.injesttime)?,
            ip: self.ip.unwrap_or_default(),
            user_agent: self.useragent.unwrap_or_default(),
        })
    }
}

impl FingerprintsRow {
    fn into_row(self) -> Result<FingerprintRow, StorageError> {
        let detail = FingerprintDetail {
            record_tls_version: unhex("record_tls_version", &self.record_tls_version)?,
            tls_version: unhex("tls_version", &self.tls_version)?,
            ciphersuite: unhex("ciphersuite", &self.ciphersuite)?,
            compression_length: unhex("compression_length", &self.compression_length)?,
            compression: unhex("compression", &self.compression)?,
            extensions: unhex("extensions", &self.extensions)?,
            e_curves: unhex("e_curves", &self.e_curves)?,
            sig_alg: unhex("sig_alg", &self.sig_alg)?,
            ec_point_fmt: unhex("ec_point_fmt", &self.ec_point_fmt)?,
            grease: unhex("grease", &self.grease)? == [1],
            supported_versions: unhex("supported_versions", &self.supported_versions)?,
        };
        Ok(FingerprintRow {
            id: self.id,
            injesttime: parse_injesttime(&self.injesttime)?,
            connection_id: Uuid::parse_str(&self.connection_id)
                .map_err(|e| StorageError::ReadFailed(format!("connection_id: {}", e)))?,
            detail,
            packet: self.packet,
        })
    }
}

/// SQLite store shared by the capture pipeline and the TLS listener.
///
/// All writes are single-statement inserts, so concurrent callers never
/// observe a partial row.
#[derive(Debug, Clone)]
pub struct DatabaseStorage {
    pool: SqlitePool,
}

impl DatabaseStorage {
    /// Opens (creating if needed) the database at `path` and checks that it
    /// answers a trivial query.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::ConnectionFailed(format!("{}: {}", parent.display(), e)))?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        debug!("Opened database {}", path.display());
        Ok(Self { pool })
    }

    /// Creates the tables and index if absent. Safe to call any number of
    /// times, from any number of tasks.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn insert_connection(&self, record: &ConnectionRecord) -> Result<u64, StorageError> {
        let result = sqlx::query("INSERT INTO www (ip, useragent) VALUES (?1, ?2)")
            .bind(record.ip.to_string())
            .bind(&record.user_agent)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Stores every detail field as lowercase hex, the grease flag as `00`/`01`.
    pub async fn insert_fingerprint(
        &self,
        record: &FingerprintRecord<'_>,
    ) -> Result<u64, StorageError> {
        let detail = record.detail;
        let result = sqlx::query(
            "INSERT INTO fingerprints (connection_id, record_tls_version, tls_version, ciphersuite,
                compression_length, compression, extensions, e_curves, sig_alg, ec_point_fmt,
                grease, supported_versions, packet)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(record.connection_id.to_string())
        .bind(hex::encode(&detail.record_tls_version))
        .bind(hex::encode(&detail.tls_version))
        .bind(hex::encode(&detail.ciphersuite))
        .bind(hex::encode(&detail.compression_length))
        .bind(hex::encode(&detail.compression))
        .bind(hex::encode(&detail.extensions))
        .bind(hex::encode(&detail.e_curves))
        .bind(hex::encode(&detail.sig_alg))
        .bind(hex::encode(&detail.ec_point_fmt))
        .bind(hex::encode([detail.grease as u8]))
        .bind(hex::encode(&detail.supported_versions))
        .bind(record.packet)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn connection_rows(&self) -> Result<Vec<ConnectionRow>, StorageError> {
        let rows: Vec<WwwRow> = sqlx::query_as(
            "SELECT id, CAST(injesttime AS TEXT) AS injesttime, ip, useragent FROM www ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        rows.into_iter().map(WwwRow::into_row).collect()
    }

    pub async fn fingerprint_rows(&self) -> Result<Vec<FingerprintRow>, StorageError> {
        let rows: Vec<FingerprintsRow> = sqlx::query_as(
            "SELECT id, CAST(injesttime AS TEXT) AS injesttime, connection_id, record_tls_version,
                tls_version, ciphersuite, compression_length, compression, extensions, e_curves,
                sig_alg, ec_point_fmt, grease, supported_versions, packet
             FROM fingerprints ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        rows.into_iter().map(FingerprintsRow::into_row).collect()
    }

    /// Names of the user tables, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
