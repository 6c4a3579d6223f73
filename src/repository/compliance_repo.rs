// ==========================================
// 门店聚类对标推荐系统 - 历史执行率仓储
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.4 合规闸门契约
// 红线: compliance_history 是上游预测器产物,本系统只读;
// 表缺失属于闸门降级场景,由调用方(闸门)处理,不在此兜底
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::table_exists;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 历史执行率记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecHistory {
    pub exec_rate: f64,    // 历史执行率(0.0 - 1.0)
    pub sample_size: i64,  // 样本量
}

// ==========================================
// ComplianceRepository - 历史执行率仓储
// ==========================================
pub struct ComplianceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ComplianceRepository {
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

    /// 查询门店的历史执行率
    ///
    /// # 返回
    /// - Ok(Some): 有历史记录
    /// - Ok(None): 无该门店记录
    /// - Err(MissingInputTable): 表不存在(闸门据此降级为不可用)
    pub fn find_by_store(&self, store_code: &str) -> RepositoryResult<Option<ExecHistory>> {
        let conn = self.get_conn()?;

        if !table_exists(&conn, "compliance_history")? {
            return Err(RepositoryError::MissingInputTable {
                table: "compliance_history".to_string(),
            });
        }

        let result = conn
            .query_row(
                "SELECT exec_rate, sample_size FROM compliance_history WHERE store_code = ?1",
                params![store_code],
                |row| {
                    Ok(ExecHistory {
                        exec_rate: row.get(0)?,
                        sample_size: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    /// 写入历史执行率(测试与夹具使用)
    pub fn upsert(&self, store_code: &str, exec_rate: f64, sample_size: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO compliance_history (store_code, exec_rate, sample_size)
            VALUES (?1, ?2, ?3)
            "#,
            params![store_code, exec_rate, sample_size],
        )?;
        Ok(())
    }
}
