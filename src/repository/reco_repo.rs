// ==========================================
// 门店聚类对标推荐系统 - 推荐结果仓储
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.3/4.6 输出口径
// 红线: Repository 不含业务逻辑
// 说明: reco_detail 为 v2 首选明细面; reco_result 为 v1 遗留面,
// 本版本只读不写,供合并阶段回落
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::quantity::Quantity;
use crate::domain::sales::CategoryKey;
use crate::domain::types::{ComplianceStatus, DetectorKind, SeverityTier};
use crate::domain::violation::{Recommendation, StoreSummary, Violation};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// LegacyRecoRow - v1 遗留结果行
// ==========================================
// 品类级,无 spu/合规列(旧版运行的落库形态)
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecoRow {
    pub store_code: String,
    pub cluster_id: String,
    pub cat_code: String,
    pub subcat_code: Option<String>,
    pub period: String,
    pub detector: DetectorKind,
    pub current_qty: Option<f64>,
    pub benchmark_qty: Option<f64>,
    pub delta_qty: i64,
    pub invest_amt: Option<f64>,
    pub severity: SeverityTier,
}

// ==========================================
// RecoRepository - 推荐结果仓储
// ==========================================
/// 职责: 管理 reco_detail / reco_result / reco_store_summary 表
pub struct RecoRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecoRepository {
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

    // ==========================================
    // reco_detail (v2 首选面)
    // ==========================================

    /// 整批替换某检测器某报告期的明细(幂等重跑)
    ///
    /// # 说明
    /// - 先 DELETE 再 INSERT,同一事务
    /// - 数量/单价/投资的"未定义"按 NULL 落库
    pub fn replace_detail(
        &self,
        detector: DetectorKind,
        period: &str,
        recos: &[Recommendation],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM reco_detail WHERE detector = ?1 AND period = ?2",
            params![detector.to_db_str(), period],
        )?;

        let mut count = 0;
        for reco in recos {
            let v = &reco.violation;
            tx.execute(
                r#"
                INSERT INTO reco_detail (
                    store_code, cluster_id, cat_code, subcat_code, spu_code, period,
                    detector, current_qty, benchmark_qty, delta_qty,
                    unit_price, invest_amt, severity, compliance, predicted_rate,
                    rank_in_store, reason
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
                params![
                    v.store_code,
                    v.cluster_id,
                    v.key.cat_code,
                    v.key.subcat_code,
                    v.key.spu_code,
                    v.period,
                    v.detector.to_db_str(),
                    v.current_qty.value(),
                    v.benchmark_qty.value(),
                    v.delta_qty,
                    v.unit_price,
                    v.invest_amt,
                    v.severity.to_db_str(),
                    v.compliance.to_db_str(),
                    v.predicted_rate,
                    reco.rank_in_store,
                    v.reason,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载某检测器某报告期的明细,排序完全限定
    pub fn load_detail(
        &self,
        detector: DetectorKind,
        period: &str,
    ) -> RepositoryResult<Vec<Recommendation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, cluster_id, cat_code, subcat_code, spu_code, period,
                   current_qty, benchmark_qty, delta_qty,
                   unit_price, invest_amt, severity, compliance, predicted_rate,
                   rank_in_store, reason
            FROM reco_detail
            WHERE detector = ?1 AND period = ?2
            ORDER BY store_code ASC, rank_in_store ASC,
                     cat_code ASC, ifnull(spu_code,'') ASC
            "#,
        )?;

        let recos = stmt
            .query_map(params![detector.to_db_str(), period], |row| {
                Ok(Recommendation {
                    violation: Violation {
                        store_code: row.get(0)?,
                        cluster_id: row.get(1)?,
                        key: CategoryKey {
                            cat_code: row.get(2)?,
                            subcat_code: row.get(3)?,
                            spu_code: row.get(4)?,
                        },
                        detector,
                        period: row.get(5)?,
                        current_qty: Quantity::from(row.get::<_, Option<f64>>(6)?),
                        benchmark_qty: Quantity::from(row.get::<_, Option<f64>>(7)?),
                        delta_qty: row.get(8)?,
                        unit_price: row.get(9)?,
                        invest_amt: row.get(10)?,
                        severity: SeverityTier::from_str(&row.get::<_, String>(11)?)
                            .unwrap_or(SeverityTier::Low),
                        compliance: ComplianceStatus::from_str(&row.get::<_, String>(12)?),
                        predicted_rate: row.get(13)?,
                        reason: row.get(15)?,
                    },
                    rank_in_store: row.get(14)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(recos)
    }

    /// 某检测器某报告期在首选面是否有行
    pub fn has_detail_rows(&self, detector: DetectorKind, period: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reco_detail WHERE detector = ?1 AND period = ?2",
            params![detector.to_db_str(), period],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ==========================================
    // reco_result (v1 遗留面,只读回落 + 夹具种子)
    // ==========================================

    /// 加载遗留结果行(合并阶段回落读取)
    pub fn load_legacy_result(
        &self,
        detector: DetectorKind,
        period: &str,
    ) -> RepositoryResult<Vec<LegacyRecoRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, cluster_id, cat_code, subcat_code, period,
                   current_qty, benchmark_qty, delta_qty, invest_amt, severity
            FROM reco_result
            WHERE detector = ?1 AND period = ?2
            ORDER BY store_code ASC, cat_code ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![detector.to_db_str(), period], |row| {
                Ok(LegacyRecoRow {
                    store_code: row.get(0)?,
                    cluster_id: row.get(1)?,
                    cat_code: row.get(2)?,
                    subcat_code: row.get(3)?,
                    period: row.get(4)?,
                    detector,
                    current_qty: row.get(5)?,
                    benchmark_qty: row.get(6)?,
                    delta_qty: row.get(7)?,
                    invest_amt: row.get(8)?,
                    severity: SeverityTier::from_str(&row.get::<_, String>(9)?)
                        .unwrap_or(SeverityTier::Low),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rows)
    }

    /// 写入遗留结果行(仅测试/夹具: 模拟旧版运行落库)
    pub fn insert_legacy_rows(&self, rows: Vec<LegacyRecoRow>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for r in rows {
            tx.execute(
                r#"
                INSERT INTO reco_result (
                    store_code, cluster_id, cat_code, subcat_code, period,
                    detector, current_qty, benchmark_qty, delta_qty, invest_amt, severity
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    r.store_code,
                    r.cluster_id,
                    r.cat_code,
                    r.subcat_code,
                    r.period,
                    r.detector.to_db_str(),
                    r.current_qty,
                    r.benchmark_qty,
                    r.delta_qty,
                    r.invest_amt,
                    r.severity.to_db_str(),
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    // ==========================================
    // reco_store_summary
    // ==========================================

    /// 整批替换某检测器某报告期的门店汇总
    pub fn replace_store_summaries(
        &self,
        detector: DetectorKind,
        period: &str,
        summaries: &[StoreSummary],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM reco_store_summary WHERE detector = ?1 AND period = ?2",
            params![detector.to_db_str(), period],
        )?;

        let mut count = 0;
        for s in summaries {
            tx.execute(
                r#"
                INSERT INTO reco_store_summary (
                    store_code, cluster_id, detector, period,
                    reco_count, total_delta_qty, total_invest_amt, undefined_invest_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    s.store_code,
                    s.cluster_id,
                    s.detector.to_db_str(),
                    s.period,
                    s.reco_count,
                    s.total_delta_qty,
                    s.total_invest_amt,
                    s.undefined_invest_count,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载某报告期的全部门店汇总(跨检测器)
    pub fn load_store_summaries(&self, period: &str) -> RepositoryResult<Vec<StoreSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, cluster_id, detector, period,
                   reco_count, total_delta_qty, total_invest_amt, undefined_invest_count
            FROM reco_store_summary
            WHERE period = ?1
            ORDER BY store_code ASC, detector ASC
            "#,
        )?;

        let summaries = stmt
            .query_map(params![period], |row| {
                let detector_str: String = row.get(2)?;
                Ok(StoreSummary {
                    store_code: row.get(0)?,
                    cluster_id: row.get(1)?,
                    detector: DetectorKind::from_str(&detector_str)
                        .unwrap_or(DetectorKind::MissingAssortment),
                    period: row.get(3)?,
                    reco_count: row.get(4)?,
                    total_delta_qty: row.get(5)?,
                    total_invest_amt: row.get(6)?,
                    undefined_invest_count: row.get(7)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(summaries)
    }
}
