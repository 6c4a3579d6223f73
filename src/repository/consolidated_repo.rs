// ==========================================
// 门店聚类对标推荐系统 - 合并结果仓储
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.6 合并阶段
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::consolidated::{ConsolidatedLineItem, StoreRollup};
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// ==========================================
// ConsolidatedRepository - 合并结果仓储
// ==========================================
/// 职责: 管理 consolidated_detail / consolidated_store 表
pub struct ConsolidatedRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ConsolidatedRepository {
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

    /// 整批替换某报告期的合并明细(幂等重跑)
    pub fn replace_detail(
        &self,
        period: &str,
        lines: &[ConsolidatedLineItem],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM consolidated_detail WHERE period = ?1",
            params![period],
        )?;

        let mut count = 0;
        for line in lines {
            tx.execute(
                r#"
                INSERT INTO consolidated_detail (
                    store_code, line_key, cat_code, subcat_code, spu_code,
                    cluster_id, period, delta_qty, invest_amt, severity, detector_flags
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    line.store_code,
                    line.line_key,
                    line.cat_code,
                    line.subcat_code,
                    line.spu_code,
                    line.cluster_id,
                    line.period,
                    line.delta_qty,
                    line.invest_amt,
                    line.severity.to_db_str(),
                    line.flags_str(),
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载某报告期的合并明细,排序完全限定
    pub fn load_detail(&self, period: &str) -> RepositoryResult<Vec<ConsolidatedLineItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, line_key, cat_code, subcat_code, spu_code,
                   cluster_id, period, delta_qty, invest_amt, severity, detector_flags
            FROM consolidated_detail
            WHERE period = ?1
            ORDER BY store_code ASC, line_key ASC
            "#,
        )?;

        let lines = stmt
            .query_map(params![period], |row| {
                let flags_str: String = row.get(10)?;
                Ok(ConsolidatedLineItem {
                    store_code: row.get(0)?,
                    line_key: row.get(1)?,
                    cat_code: row.get(2)?,
                    subcat_code: row.get(3)?,
                    spu_code: row.get(4)?,
                    cluster_id: row.get(5)?,
                    period: row.get(6)?,
                    delta_qty: row.get(7)?,
                    invest_amt: row.get(8)?,
                    severity: SeverityTier::from_str(&row.get::<_, String>(9)?)
                        .unwrap_or(SeverityTier::Low),
                    detector_flags: parse_flags(&flags_str),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(lines)
    }

    /// 整批替换某报告期的门店汇总
    pub fn replace_store(&self, period: &str, rollups: &[StoreRollup]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM consolidated_store WHERE period = ?1",
            params![period],
        )?;

        let mut count = 0;
        for r in rollups {
            tx.execute(
                r#"
                INSERT INTO consolidated_store (
                    store_code, cluster_id, period, line_count,
                    increase_lines, decrease_lines, total_delta_qty,
                    total_invest_amt, undefined_invest_lines
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    r.store_code,
                    r.cluster_id,
                    r.period,
                    r.line_count,
                    r.increase_lines,
                    r.decrease_lines,
                    r.total_delta_qty,
                    r.total_invest_amt,
                    r.undefined_invest_lines,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载某报告期的门店汇总
    pub fn load_store(&self, period: &str) -> RepositoryResult<Vec<StoreRollup>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, cluster_id, period, line_count,
                   increase_lines, decrease_lines, total_delta_qty,
                   total_invest_amt, undefined_invest_lines
            FROM consolidated_store
            WHERE period = ?1
            ORDER BY store_code ASC
            "#,
        )?;

        let rollups = stmt
            .query_map(params![period], |row| {
                Ok(StoreRollup {
                    store_code: row.get(0)?,
                    cluster_id: row.get(1)?,
                    period: row.get(2)?,
                    line_count: row.get(3)?,
                    increase_lines: row.get(4)?,
                    decrease_lines: row.get(5)?,
                    total_delta_qty: row.get(6)?,
                    total_invest_amt: row.get(7)?,
                    undefined_invest_lines: row.get(8)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rollups)
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 解析分号拼接的检测器标志列(未知标志静默跳过)
fn parse_flags(s: &str) -> BTreeSet<DetectorKind> {
    s.split(';')
        .filter_map(DetectorKind::from_str)
        .collect()
}
