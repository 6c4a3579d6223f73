// ==========================================
// 门店聚类对标推荐系统 - 导出 API
// ==========================================
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 阶段 9: 结果外发
// 职责: 持久化面 → 报告期标注的 CSV 文件 + 人读运行报告
// 红线: 每个首选命名文件同时产出旧版命名副本(下游消费方兼容);
//       未定义数量/金额导出为空单元格,不得补 0
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::quantity::Quantity;
use crate::domain::types::DetectorKind;
use crate::engine::aggregator::ResultAggregator;
use crate::repository::consolidated_repo::ConsolidatedRepository;
use crate::repository::reco_repo::RecoRepository;
use crate::repository::run_repo::RunLogRepository;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ==========================================
// ExportApi - 导出 API
// ==========================================
pub struct ExportApi {
    conn: Arc<Mutex<Connection>>,
}

impl ExportApi {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 导出一期全部产物
    ///
    /// # 产出
    /// - 逐检测器明细 CSV(首选 + 旧版命名副本)
    /// - 门店汇总 CSV(首选 + 旧版命名副本)
    /// - 合并明细/门店汇总 CSV(首选 + 旧版命名副本)
    /// - 人读运行报告 .txt
    ///
    /// # 返回
    /// 实际写出的文件路径(无行的面跳过,不写空文件)
    pub fn export_all(&self, period: &str, run_id: &str, out_dir: &Path) -> ApiResult<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)?;
        let mut written = Vec::new();

        for detector in DetectorKind::all() {
            written.extend(self.export_detector_detail(detector, period, out_dir)?);
        }
        written.extend(self.export_store_summaries(period, out_dir)?);
        written.extend(self.export_consolidated(period, out_dir)?);
        written.push(self.export_run_report(run_id, out_dir)?);

        info!(period = %period, files = written.len(), "结果导出完成");
        Ok(written)
    }

    /// 导出单检测器明细
    ///
    /// 首选: reco_detail_<检测器>_<期>.csv
    /// 旧版: <短代码>_result_<期>.csv
    pub fn export_detector_detail(
        &self,
        detector: DetectorKind,
        period: &str,
        out_dir: &Path,
    ) -> ApiResult<Vec<PathBuf>> {
        let repo = RecoRepository::from_connection(Arc::clone(&self.conn));
        let recos = repo.load_detail(detector, period)?;
        if recos.is_empty() {
            debug!(detector = %detector, period = %period, "明细面无行,跳过导出");
            return Ok(Vec::new());
        }

        let preferred = out_dir.join(format!(
            "reco_detail_{}_{}.csv",
            detector.to_db_str().to_lowercase(),
            period
        ));
        let mut wtr = csv::Writer::from_path(&preferred)?;
        wtr.write_record([
            "store_code",
            "cluster_id",
            "cat_code",
            "subcat_code",
            "spu_code",
            "period",
            "detector",
            "current_qty",
            "benchmark_qty",
            "delta_qty",
            "unit_price",
            "invest_amt",
            "severity",
            "compliance",
            "predicted_rate",
            "rank_in_store",
            "reason",
        ])?;
        for reco in &recos {
            let v = &reco.violation;
            wtr.write_record(&[
                v.store_code.clone(),
                v.cluster_id.clone(),
                v.key.cat_code.clone(),
                opt_str(&v.key.subcat_code),
                opt_str(&v.key.spu_code),
                v.period.clone(),
                v.detector.to_db_str().to_string(),
                qty_cell(&v.current_qty),
                qty_cell(&v.benchmark_qty),
                v.delta_qty.to_string(),
                opt_f64_cell(v.unit_price),
                opt_f64_cell(v.invest_amt),
                v.severity.to_db_str().to_string(),
                v.compliance.to_db_str().to_string(),
                opt_f64_cell(v.predicted_rate),
                reco.rank_in_store.to_string(),
                v.reason.clone(),
            ])?;
        }
        wtr.flush()?;

        let legacy = out_dir.join(format!("{}_result_{}.csv", detector.legacy_code(), period));
        fs::copy(&preferred, &legacy)?;

        Ok(vec![preferred, legacy])
    }

    /// 导出门店汇总(跨检测器)
    ///
    /// 首选: reco_store_summary_<期>.csv
    /// 旧版: store_summary_<期>.csv
    pub fn export_store_summaries(&self, period: &str, out_dir: &Path) -> ApiResult<Vec<PathBuf>> {
        let repo = RecoRepository::from_connection(Arc::clone(&self.conn));
        let summaries = repo.load_store_summaries(period)?;
        if summaries.is_empty() {
            debug!(period = %period, "门店汇总面无行,跳过导出");
            return Ok(Vec::new());
        }

        let preferred = out_dir.join(format!("reco_store_summary_{}.csv", period));
        let mut wtr = csv::Writer::from_path(&preferred)?;
        wtr.write_record([
            "store_code",
            "cluster_id",
            "detector",
            "period",
            "reco_count",
            "total_delta_qty",
            "total_invest_amt",
            "undefined_invest_count",
        ])?;
        for s in &summaries {
            wtr.write_record(&[
                s.store_code.clone(),
                s.cluster_id.clone(),
                s.detector.to_db_str().to_string(),
                s.period.clone(),
                s.reco_count.to_string(),
                s.total_delta_qty.to_string(),
                opt_f64_cell(s.total_invest_amt),
                s.undefined_invest_count.to_string(),
            ])?;
        }
        wtr.flush()?;

        let legacy = out_dir.join(format!("store_summary_{}.csv", period));
        fs::copy(&preferred, &legacy)?;

        Ok(vec![preferred, legacy])
    }

    /// 导出合并产物(明细 + 门店汇总)
    ///
    /// 首选: consolidated_detail_<期>.csv / consolidated_store_<期>.csv
    /// 旧版: final_result_<期>.csv / final_store_rollup_<期>.csv
    pub fn export_consolidated(&self, period: &str, out_dir: &Path) -> ApiResult<Vec<PathBuf>> {
        let repo = ConsolidatedRepository::from_connection(Arc::clone(&self.conn));
        let lines = repo.load_detail(period)?;
        let rollups = repo.load_store(period)?;
        if lines.is_empty() {
            debug!(period = %period, "合并面无行,跳过导出");
            return Ok(Vec::new());
        }

        let mut written = Vec::new();

        let detail = out_dir.join(format!("consolidated_detail_{}.csv", period));
        let mut wtr = csv::Writer::from_path(&detail)?;
        wtr.write_record([
            "store_code",
            "line_key",
            "cat_code",
            "subcat_code",
            "spu_code",
            "cluster_id",
            "period",
            "delta_qty",
            "invest_amt",
            "severity",
            "detector_flags",
        ])?;
        for line in &lines {
            wtr.write_record(&[
                line.store_code.clone(),
                line.line_key.clone(),
                line.cat_code.clone(),
                opt_str(&line.subcat_code),
                opt_str(&line.spu_code),
                opt_str(&line.cluster_id),
                line.period.clone(),
                line.delta_qty.to_string(),
                opt_f64_cell(line.invest_amt),
                line.severity.to_db_str().to_string(),
                line.flags_str(),
            ])?;
        }
        wtr.flush()?;
        let detail_legacy = out_dir.join(format!("final_result_{}.csv", period));
        fs::copy(&detail, &detail_legacy)?;
        written.push(detail);
        written.push(detail_legacy);

        let store = out_dir.join(format!("consolidated_store_{}.csv", period));
        let mut wtr = csv::Writer::from_path(&store)?;
        wtr.write_record([
            "store_code",
            "cluster_id",
            "period",
            "line_count",
            "increase_lines",
            "decrease_lines",
            "total_delta_qty",
            "total_invest_amt",
            "undefined_invest_lines",
        ])?;
        for r in &rollups {
            wtr.write_record(&[
                r.store_code.clone(),
                opt_str(&r.cluster_id),
                r.period.clone(),
                r.line_count.to_string(),
                r.increase_lines.to_string(),
                r.decrease_lines.to_string(),
                r.total_delta_qty.to_string(),
                opt_f64_cell(r.total_invest_amt),
                r.undefined_invest_lines.to_string(),
            ])?;
        }
        wtr.flush()?;
        let store_legacy = out_dir.join(format!("final_store_rollup_{}.csv", period));
        fs::copy(&store, &store_legacy)?;
        written.push(store);
        written.push(store_legacy);

        Ok(written)
    }

    /// 导出人读运行报告
    pub fn export_run_report(&self, run_id: &str, out_dir: &Path) -> ApiResult<PathBuf> {
        let run_repo = RunLogRepository::from_connection(Arc::clone(&self.conn));
        let record = run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("运行记录(run_id={})不存在", run_id)))?;
        let diagnostics = run_repo.load_diagnostics(run_id)?;

        let aggregator = ResultAggregator::new();
        let report = aggregator.render_run_report(run_id, &record.period, &diagnostics);

        let path = out_dir.join(format!("run_report_{}.txt", run_id));
        fs::write(&path, report)?;
        Ok(path)
    }
}

/// Option<String> → 单元格(None ⇒ 空)
fn opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

/// Option<f64> → 单元格(None ⇒ 空,不得补 0)
fn opt_f64_cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Quantity → 单元格(未定义 ⇒ 空)
fn qty_cell(q: &Quantity) -> String {
    opt_f64_cell(q.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::consolidated::{ConsolidatedLineItem, StoreRollup};
    use crate::domain::sales::CategoryKey;
    use crate::domain::types::{ComplianceStatus, SeverityTier};
    use crate::domain::violation::{Recommendation, Violation};
    use crate::repository::schema::init_schema;
    use std::collections::BTreeSet;

    fn setup() -> (Arc<Mutex<Connection>>, ExportApi, tempfile::TempDir) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let api = ExportApi::new(Arc::clone(&conn));
        let dir = tempfile::tempdir().unwrap();
        (conn, api, dir)
    }

    fn make_reco(store: &str, delta: i64, invest: Option<f64>) -> Recommendation {
        Recommendation {
            violation: Violation {
                store_code: store.to_string(),
                cluster_id: "G01".to_string(),
                key: CategoryKey::item("C10", Some("C10-01".to_string()), "SPU001"),
                detector: DetectorKind::MissingAssortment,
                period: "202506".to_string(),
                current_qty: Quantity::Resolved(0.0),
                benchmark_qty: Quantity::Resolved(delta as f64),
                delta_qty: delta,
                unit_price: invest.map(|_| 10.0),
                invest_amt: invest,
                severity: SeverityTier::High,
                compliance: ComplianceStatus::Unknown,
                predicted_rate: None,
                reason: "测试导出".to_string(),
            },
            rank_in_store: 1,
        }
    }

    #[test]
    fn test_detector_detail_with_legacy_copy() {
        let (conn, api, dir) = setup();
        let repo = RecoRepository::from_connection(conn);
        repo.replace_detail(
            DetectorKind::MissingAssortment,
            "202506",
            &[make_reco("S001", 8, Some(52.0))],
        )
        .unwrap();

        let files = api
            .export_detector_detail(DetectorKind::MissingAssortment, "202506", dir.path())
            .unwrap();

        assert_eq!(files.len(), 2);
        let preferred = dir.path().join("reco_detail_missing_assortment_202506.csv");
        let legacy = dir.path().join("missing_result_202506.csv");
        assert!(preferred.exists());
        assert!(legacy.exists());
        // 旧版副本与首选文件字节一致
        assert_eq!(fs::read(&preferred).unwrap(), fs::read(&legacy).unwrap());

        let content = fs::read_to_string(&preferred).unwrap();
        assert!(content.contains("S001"));
        assert!(content.contains("MISSING_ASSORTMENT"));
    }

    #[test]
    fn test_undefined_invest_exports_empty_cell() {
        let (conn, api, dir) = setup();
        let repo = RecoRepository::from_connection(conn);
        repo.replace_detail(
            DetectorKind::MissingAssortment,
            "202506",
            &[make_reco("S001", 8, None)],
        )
        .unwrap();

        api.export_detector_detail(DetectorKind::MissingAssortment, "202506", dir.path())
            .unwrap();

        let content = fs::read_to_string(
            dir.path().join("reco_detail_missing_assortment_202506.csv"),
        )
        .unwrap();
        // 单价/投资列为空,不是 0
        let data_line = content.lines().nth(1).unwrap();
        let cells: Vec<&str> = data_line.split(',').collect();
        assert_eq!(cells[10], ""); // unit_price
        assert_eq!(cells[11], ""); // invest_amt
    }

    #[test]
    fn test_empty_surface_skips_file() {
        let (_conn, api, dir) = setup();
        let files = api
            .export_detector_detail(DetectorKind::Overcapacity, "202506", dir.path())
            .unwrap();
        assert!(files.is_empty());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_consolidated_export_pair() {
        let (conn, api, dir) = setup();
        let repo = ConsolidatedRepository::from_connection(conn);
        let mut flags = BTreeSet::new();
        flags.insert(DetectorKind::MissingAssortment);
        repo.replace_detail(
            "202506",
            &[ConsolidatedLineItem {
                store_code: "S001".to_string(),
                line_key: "SPU001".to_string(),
                cat_code: "C10".to_string(),
                subcat_code: None,
                spu_code: Some("SPU001".to_string()),
                cluster_id: Some("G01".to_string()),
                period: "202506".to_string(),
                delta_qty: 8,
                invest_amt: Some(52.0),
                severity: SeverityTier::High,
                detector_flags: flags,
            }],
        )
        .unwrap();
        repo.replace_store(
            "202506",
            &[StoreRollup {
                store_code: "S001".to_string(),
                cluster_id: Some("G01".to_string()),
                period: "202506".to_string(),
                line_count: 1,
                increase_lines: 1,
                decrease_lines: 0,
                total_delta_qty: 8,
                total_invest_amt: Some(52.0),
                undefined_invest_lines: 0,
            }],
        )
        .unwrap();

        let files = api.export_consolidated("202506", dir.path()).unwrap();

        assert_eq!(files.len(), 4);
        assert!(dir.path().join("consolidated_detail_202506.csv").exists());
        assert!(dir.path().join("final_result_202506.csv").exists());
        assert!(dir.path().join("consolidated_store_202506.csv").exists());
        assert!(dir.path().join("final_store_rollup_202506.csv").exists());
    }
}
