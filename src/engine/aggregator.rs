// ==========================================
// 门店聚类对标推荐系统 - 结果汇总引擎
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART B7 运行报告
// 依据: Detector_Specs_v0.2_Integrated.md - 5.2 门店摘要
// ==========================================
// 职责: 推荐 → 门店级摘要;诊断 → 人读运行报告
// 红线: 投资合计只累加已定义值,未定义条数单独上报,不得混入 0
// ==========================================

use crate::domain::violation::{Recommendation, RunDiagnostics, StoreSummary};
use std::collections::BTreeMap;

// ==========================================
// ResultAggregator - 结果汇总引擎
// ==========================================
// 红线: 无状态引擎,所有方法都是纯函数
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// 按 (门店, 检测器) 汇总推荐
    ///
    /// # 规则
    /// - total_invest_amt 只累加已定义投资;全部未定义 ⇒ None
    /// - undefined_invest_count 记录投资未定义的推荐条数
    /// - 输出按 (门店, 检测器) 升序,保证重复运行次序一致
    pub fn summarize(&self, recos: &[Recommendation], period: &str) -> Vec<StoreSummary> {
        let mut groups: BTreeMap<(String, crate::domain::types::DetectorKind), StoreSummary> =
            BTreeMap::new();

        for reco in recos {
            let v = &reco.violation;
            let entry = groups
                .entry((v.store_code.clone(), v.detector))
                .or_insert_with(|| StoreSummary {
                    store_code: v.store_code.clone(),
                    cluster_id: v.cluster_id.clone(),
                    detector: v.detector,
                    period: period.to_string(),
                    reco_count: 0,
                    total_delta_qty: 0,
                    total_invest_amt: None,
                    undefined_invest_count: 0,
                });

            entry.reco_count += 1;
            entry.total_delta_qty += v.delta_qty;
            match v.invest_amt {
                Some(amt) => {
                    entry.total_invest_amt = Some(entry.total_invest_amt.unwrap_or(0.0) + amt);
                }
                None => {
                    entry.undefined_invest_count += 1;
                }
            }
        }

        groups.into_values().collect()
    }

    /// 渲染人读运行报告
    ///
    /// 逐检测器一段: 输入行数 / 连接率 / 各级排除计数 / 最终产出,
    /// 区分"没有机会"与"数据没连上"
    pub fn render_run_report(
        &self,
        run_id: &str,
        period: &str,
        diagnostics: &[RunDiagnostics],
    ) -> String {
        let mut report = String::new();
        report.push_str("========================================\n");
        report.push_str("门店聚类对标推荐 - 运行报告\n");
        report.push_str(&format!("运行: {}  期间: {}\n", run_id, period));
        report.push_str("========================================\n");

        let mut total_emitted = 0u32;
        for diag in diagnostics {
            total_emitted += diag.emitted;

            report.push_str(&format!("\n[{}] {}\n", diag.detector, diag.detector.label_cn()));
            report.push_str(&format!(
                "  输入行数: {}  连接成功: {}  连接率: {:.1}%\n",
                diag.input_rows,
                diag.matched_rows,
                diag.join_match_rate() * 100.0
            ));
            report.push_str(&format!(
                "  未匹配聚类: {}  销量未定义: {}  小聚类跳过: {}\n",
                diag.unmatched_rows, diag.undefined_qty_rows, diag.small_cluster_skips
            ));
            report.push_str(&format!(
                "  候选: {}  差量为空: {}  低于最小变化: {}\n",
                diag.candidates, diag.delta_skips, diag.below_min_change_skips
            ));
            report.push_str(&format!(
                "  闸门拒绝: {}  闸门未知: {}  门店截断: {}\n",
                diag.gate_rejected, diag.gate_unavailable, diag.capped_out
            ));
            report.push_str(&format!("  最终产出: {}\n", diag.emitted));
        }

        report.push_str("\n========================================\n");
        report.push_str(&format!("合计产出推荐: {}\n", total_emitted));
        report.push_str("========================================\n");

        report
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quantity::Quantity;
    use crate::domain::sales::CategoryKey;
    use crate::domain::types::{ComplianceStatus, DetectorKind, SeverityTier};
    use crate::domain::violation::Violation;

    fn make_reco(store: &str, spu: &str, delta: i64, invest: Option<f64>) -> Recommendation {
        Recommendation {
            violation: Violation {
                store_code: store.to_string(),
                cluster_id: "CL-01".to_string(),
                key: CategoryKey::item("C10", None, spu),
                detector: DetectorKind::MissingAssortment,
                period: "202506".to_string(),
                current_qty: Quantity::Resolved(0.0),
                benchmark_qty: Quantity::Resolved(10.0),
                delta_qty: delta,
                unit_price: None,
                invest_amt: invest,
                severity: SeverityTier::Medium,
                compliance: ComplianceStatus::Unknown,
                predicted_rate: None,
                reason: "测试".to_string(),
            },
            rank_in_store: 1,
        }
    }

    #[test]
    fn test_summarize_sums_per_store() {
        let agg = ResultAggregator::new();
        let recos = vec![
            make_reco("S001", "SPU001", 5, Some(100.0)),
            make_reco("S001", "SPU002", 3, Some(60.0)),
            make_reco("S002", "SPU001", -4, Some(-80.0)),
        ];

        let summaries = agg.summarize(&recos, "202506");

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].store_code, "S001");
        assert_eq!(summaries[0].reco_count, 2);
        assert_eq!(summaries[0].total_delta_qty, 8);
        assert_eq!(summaries[0].total_invest_amt, Some(160.0));
        assert_eq!(summaries[1].store_code, "S002");
        assert_eq!(summaries[1].total_delta_qty, -4);
        assert_eq!(summaries[1].total_invest_amt, Some(-80.0));
    }

    #[test]
    fn test_summarize_undefined_invest_not_coerced() {
        let agg = ResultAggregator::new();
        let recos = vec![
            make_reco("S001", "SPU001", 5, Some(100.0)),
            make_reco("S001", "SPU002", 3, None),
        ];

        let summaries = agg.summarize(&recos, "202506");

        // 未定义不混入合计,条数单独上报
        assert_eq!(summaries[0].total_invest_amt, Some(100.0));
        assert_eq!(summaries[0].undefined_invest_count, 1);
    }

    #[test]
    fn test_summarize_all_undefined_gives_none() {
        let agg = ResultAggregator::new();
        let recos = vec![make_reco("S001", "SPU001", 5, None)];

        let summaries = agg.summarize(&recos, "202506");

        assert_eq!(summaries[0].total_invest_amt, None);
        assert_eq!(summaries[0].undefined_invest_count, 1);
    }

    #[test]
    fn test_render_run_report_contains_counters() {
        let agg = ResultAggregator::new();
        let mut diag = RunDiagnostics::new(DetectorKind::MissingAssortment, "202506");
        diag.input_rows = 100;
        diag.matched_rows = 80;
        diag.unmatched_rows = 20;
        diag.candidates = 12;
        diag.emitted = 7;

        let report = agg.render_run_report("run-001", "202506", &[diag]);

        assert!(report.contains("MISSING_ASSORTMENT"));
        assert!(report.contains("输入行数: 100"));
        assert!(report.contains("连接率: 80.0%"));
        assert!(report.contains("最终产出: 7"));
        assert!(report.contains("合计产出推荐: 7"));
    }
}
