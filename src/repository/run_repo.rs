// ==========================================
// 门店聚类对标推荐系统 - 运行记录仓储
// ==========================================
// 职责: run_log / run_diagnostics 表的读写
// 用途: 运行可追溯性(每次流水线运行一条记录 + 逐检测器诊断)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::violation::RunDiagnostics;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// RunRecord - 运行记录
// ==========================================
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub period: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub detectors_run: Option<String>, // 分号拼接的检测器列表
    pub config_snapshot_json: Option<String>,
    pub notes: Option<String>,
}

// ==========================================
// RunLogRepository - 运行记录仓储
// ==========================================
pub struct RunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunLogRepository {
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

    /// 登记运行开始
    pub fn insert_run_start(
        &self,
        run_id: &str,
        period: &str,
        started_at: DateTime<Utc>,
        config_snapshot_json: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO run_log (run_id, period, started_at, config_snapshot_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                run_id,
                period,
                started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                config_snapshot_json,
            ],
        )?;
        Ok(())
    }

    /// 登记运行结束
    pub fn finish_run(
        &self,
        run_id: &str,
        finished_at: DateTime<Utc>,
        detectors_run: &str,
        notes: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE run_log
            SET finished_at = ?2, detectors_run = ?3, notes = ?4
            WHERE run_id = ?1
            "#,
            params![
                run_id,
                finished_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                detectors_run,
                notes,
            ],
        )?;
        Ok(())
    }

    /// 保存逐检测器诊断(JSON 形态)
    pub fn save_diagnostics(&self, run_id: &str, diag: &RunDiagnostics) -> RepositoryResult<()> {
        let diag_json = serde_json::to_string(diag)
            .map_err(|e| RepositoryError::InternalError(format!("诊断序列化失败: {}", e)))?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO run_diagnostics (run_id, detector, period, diag_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![run_id, diag.detector.to_db_str(), diag.period, diag_json],
        )?;
        Ok(())
    }

    /// 加载一次运行的全部诊断
    pub fn load_diagnostics(&self, run_id: &str) -> RepositoryResult<Vec<RunDiagnostics>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT diag_json FROM run_diagnostics WHERE run_id = ?1 ORDER BY detector ASC",
        )?;

        let json_rows = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut diags = Vec::with_capacity(json_rows.len());
        for json in json_rows {
            let diag: RunDiagnostics = serde_json::from_str(&json)
                .map_err(|e| RepositoryError::InternalError(format!("诊断反序列化失败: {}", e)))?;
            diags.push(diag);
        }

        Ok(diags)
    }

    /// 按 run_id 查询运行记录
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<RunRecord>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                r#"
                SELECT run_id, period, started_at, finished_at,
                       detectors_run, config_snapshot_json, notes
                FROM run_log
                WHERE run_id = ?1
                "#,
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        run_id: row.get(0)?,
                        period: row.get(1)?,
                        started_at: parse_utc(&row.get::<_, String>(2)?),
                        finished_at: row
                            .get::<_, Option<String>>(3)?
                            .map(|s| parse_utc(&s)),
                        detectors_run: row.get(4)?,
                        config_snapshot_json: row.get(5)?,
                        notes: row.get(6)?,
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

/// 解析 "%Y-%m-%d %H:%M:%S" 的 UTC 时间戳(非法值回落 epoch)
fn parse_utc(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default())
}
