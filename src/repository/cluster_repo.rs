// ==========================================
// 门店聚类对标推荐系统 - 聚类分配仓储
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART D 引擎铁律
// 红线: Repository 不含业务逻辑; cluster_id/group_id 双列恒齐备,
// 读取一律 COALESCE(cluster_id, group_id)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::store::{ClusterAssignment, ClusterLookup};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::{column_exists, table_exists};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// ClusterAssignmentRow - 落库行结构
// ==========================================
// 与 cluster_assignment 表同形(双列),由导入层派生补齐后写入
#[derive(Debug, Clone)]
pub struct ClusterAssignmentRow {
    pub store_code: String,
    pub cluster_id: String,
    pub group_id: String,
    pub period: String,
}

// ==========================================
// ClusterRepository - 聚类分配仓储
// ==========================================
/// 职责: 管理 cluster_assignment 表的读写
/// 用途: 导入层写入,引擎层只读(上游聚类产物,本系统不修改分配)
pub struct ClusterRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ClusterRepository {
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

    /// 批量插入聚类分配(INSERT OR REPLACE)
    ///
    /// # 说明
    /// - 主键: (store_code, period)
    /// - 使用事务确保原子性
    pub fn batch_insert(&self, rows: Vec<ClusterAssignmentRow>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for row in rows {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO cluster_assignment (
                    store_code, cluster_id, group_id, period
                ) VALUES (?1, ?2, ?3, ?4)
                "#,
                params![row.store_code, row.cluster_id, row.group_id, row.period],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载指定报告期的聚类分配
    ///
    /// # 说明
    /// - 读取口径: COALESCE(cluster_id, group_id)
    /// - 表缺失 ⇒ MissingInputTable(结构性错误,不得吞掉)
    /// - 外部工具建的旧表可能只有单列(init_schema 不改已有表结构),
    ///   缺列 ⇒ MissingColumn,精确报出缺的是哪一列
    pub fn load_assignments(&self, period: &str) -> RepositoryResult<Vec<ClusterAssignment>> {
        let conn = self.get_conn()?;

        if !table_exists(&conn, "cluster_assignment")? {
            return Err(RepositoryError::MissingInputTable {
                table: "cluster_assignment".to_string(),
            });
        }
        for col in ["cluster_id", "group_id"] {
            if !column_exists(&conn, "cluster_assignment", col)? {
                return Err(RepositoryError::MissingColumn {
                    table: "cluster_assignment".to_string(),
                    column: col.to_string(),
                });
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, COALESCE(cluster_id, group_id) AS cluster_id, period
            FROM cluster_assignment
            WHERE period = ?1
            ORDER BY store_code ASC
            "#,
        )?;

        let assignments = stmt
            .query_map(params![period], |row| {
                Ok(ClusterAssignment {
                    store_code: row.get(0)?,
                    cluster_id: row.get(1)?,
                    period: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(assignments)
    }

    /// 加载指定报告期的只读查找表
    pub fn load_lookup(&self, period: &str) -> RepositoryResult<ClusterLookup> {
        let assignments = self.load_assignments(period)?;
        Ok(ClusterLookup::new(assignments))
    }

    /// 指定报告期的分配行数
    pub fn count_by_period(&self, period: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cluster_assignment WHERE period = ?1",
            params![period],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
