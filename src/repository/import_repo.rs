// ==========================================
// 门店聚类对标推荐系统 - 导入批次仓储
// ==========================================
// 依据: v0.2_importer_schema.sql import_batch 表
// 职责: 导入批次元信息的读写
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::sales::ImportBatch;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// ImportBatchRepository - 导入批次仓储
// ==========================================
pub struct ImportBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportBatchRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入导入批次记录
    pub fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_batch (
                batch_id, file_name, total_rows, success_rows,
                blocked_rows, warning_rows, imported_at, elapsed_ms, dq_report_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                batch.batch_id,
                batch.file_name,
                batch.total_rows,
                batch.success_rows,
                batch.blocked_rows,
                batch.warning_rows,
                batch
                    .imported_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                batch.elapsed_ms,
                batch.dq_report_json,
            ],
        )?;
        Ok(())
    }

    /// 按批次 ID 查询
    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                r#"
                SELECT batch_id, file_name, total_rows, success_rows,
                       blocked_rows, warning_rows, imported_at, elapsed_ms, dq_report_json
                FROM import_batch
                WHERE batch_id = ?1
                "#,
                params![batch_id],
                |row| {
                    Ok(ImportBatch {
                        batch_id: row.get(0)?,
                        file_name: row.get(1)?,
                        total_rows: row.get(2)?,
                        success_rows: row.get(3)?,
                        blocked_rows: row.get(4)?,
                        warning_rows: row.get(5)?,
                        imported_at: row.get::<_, Option<String>>(6)?.and_then(parse_utc_opt),
                        elapsed_ms: row.get(7)?,
                        dq_report_json: row.get(8)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn parse_utc_opt(s: String) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .ok()
}
