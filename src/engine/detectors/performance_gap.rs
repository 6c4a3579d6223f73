// ==========================================
// 门店聚类对标推荐系统 - 业绩差距检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 6. 业绩差距检测
// ==========================================
// 候选条件: 门店品类件数低于群内头部分位均值,且 z-score 双重确认
// 差量口径: min(差距, 当前量 × 增幅上限),向上取整
// 红线: z 确认防止把正常波动当差距;零动销无增幅基数,不产出
// ==========================================

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::domain::violation::RunDiagnostics;
use crate::engine::benchmark::PeerBenchmarkCalculator;
use crate::engine::detectors::{
    build_working_set, group_by_store_category, CandidateSite, DeltaOutcome, DetectorContext,
    GapDetector,
};
use std::collections::BTreeMap;

// ==========================================
// PerformanceGapDetector - 业绩差距检测器
// ==========================================
pub struct PerformanceGapDetector {
    calc: PeerBenchmarkCalculator,
}

pub struct PerformanceGapCandidate {
    site: CandidateSite,
    qty: f64,
    sales_amt: f64,
    top_mean: f64,
    z: f64,
    percentile: f64, // 群内百分位(审计口径)
}

impl PerformanceGapDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }
}

impl Default for PerformanceGapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for PerformanceGapDetector {
    type Candidate = PerformanceGapCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::PerformanceGap
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.performance_gap.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let granularity = ctx.params.shared.granularity;
        let ws = build_working_set(ctx, diag);
        let stats = group_by_store_category(&ws, granularity, diag);

        let mut groups: BTreeMap<(String, String), Vec<&super::StoreCategoryStat>> =
            BTreeMap::new();
        for stat in &stats {
            if let Some(cluster_id) = &stat.cluster_id {
                groups
                    .entry((cluster_id.clone(), stat.group_code.clone()))
                    .or_default()
                    .push(stat);
            }
        }

        let p = &ctx.params.performance_gap;
        let mut candidates = Vec::new();

        for ((cluster_id, _group_code), members) in &groups {
            if members.len() < ctx.params.shared.min_cluster_stores {
                diag.small_cluster_skips += 1;
                continue;
            }

            let values: Vec<f64> = members.iter().map(|s| s.qty).collect();
            let (top_mean, _top_n) = match self.calc.top_performer_mean(&values, p.top_quartile_pct)
            {
                Some(pair) => pair,
                None => continue,
            };
            let (mean, std) = match self.calc.mean_and_std(&values) {
                Some(pair) => pair,
                None => continue,
            };

            for stat in members {
                if stat.qty >= top_mean {
                    continue;
                }
                // z-score 双重确认,过滤正常波动
                let z = self.calc.z_score(stat.qty, mean, std);
                if z > -p.z_confirm {
                    continue;
                }
                let percentile = self
                    .calc
                    .percentile_rank(&values, stat.qty)
                    .unwrap_or_default();
                candidates.push(PerformanceGapCandidate {
                    site: CandidateSite {
                        store_code: stat.store_code.clone(),
                        cluster_id: cluster_id.clone(),
                        key: stat.category_key(granularity),
                    },
                    qty: stat.qty,
                    sales_amt: stat.sales_amt,
                    top_mean,
                    z,
                    percentile,
                });
            }
        }

        candidates
    }

    fn site<'c>(&self, candidate: &'c Self::Candidate) -> &'c CandidateSite {
        &candidate.site
    }

    fn compute_delta(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
    ) -> Option<DeltaOutcome> {
        let gap = candidate.top_mean - candidate.qty;
        // 增幅上限以当前量为基数,零动销没有可放大的基数
        let capped = gap.min(candidate.qty * ctx.params.performance_gap.max_increase_pct);
        let delta_qty = capped.ceil() as i64;

        let unit_price = if candidate.qty > 0.0 {
            Some(candidate.sales_amt / candidate.qty)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(candidate.qty),
            benchmark_qty: Quantity::Resolved(candidate.top_mean),
            delta_qty,
            unit_price,
            reason: format!(
                "群内百分位 {:.0}%,头部均值 {:.1},本店 {:.1},z={:.2}",
                candidate.percentile * 100.0,
                candidate.top_mean,
                candidate.qty,
                candidate.z
            ),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.performance_gap;
        let gap_ratio = if candidate.top_mean > 0.0 {
            (candidate.top_mean - candidate.qty) / candidate.top_mean
        } else {
            0.0
        };
        if gap_ratio >= p.severity_high_gap {
            SeverityTier::High
        } else if gap_ratio >= p.severity_medium_gap {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sales::SalesRecord;
    use crate::domain::store::{ClusterAssignment, ClusterLookup};
    use crate::engine::detectors::run_gap_detector;
    use crate::engine::gate::NullComplianceGate;

    fn make_record(store: &str, cat: &str, amt: f64, qty: f64) -> SalesRecord {
        SalesRecord {
            store_code: store.to_string(),
            cat_code: cat.to_string(),
            subcat_code: None,
            spu_code: None,
            period: "202506".to_string(),
            sales_amt: amt,
            total_qty: Some(qty),
            base_qty: None,
            promo_qty: None,
            ship_qty: None,
        }
    }

    fn make_lookup(stores: &[&str]) -> ClusterLookup {
        ClusterLookup::new(
            stores
                .iter()
                .map(|s| ClusterAssignment {
                    store_code: s.to_string(),
                    cluster_id: "G01".to_string(),
                    period: "202506".to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_confirmed_laggard_gets_capped_increase() {
        // 8 店: 头部 2 店(25%)均值 100,S008 = 20 显著落后
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 1000.0, 100.0),
            make_record("S003", "C10", 800.0, 80.0),
            make_record("S004", "C10", 780.0, 78.0),
            make_record("S005", "C10", 760.0, 76.0),
            make_record("S006", "C10", 740.0, 74.0),
            make_record("S007", "C10", 720.0, 72.0),
            make_record("S008", "C10", 200.0, 20.0),
        ];
        let lookup = make_lookup(&[
            "S001", "S002", "S003", "S004", "S005", "S006", "S007", "S008",
        ]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = PerformanceGapDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert_eq!(recos.len(), 1);
        let v = &recos[0].violation;
        assert_eq!(v.store_code, "S008");
        // 差距 = 100 − 20 = 80,上限 = 20 × 0.5 = 10 → ceil(10) = 10
        assert_eq!(v.delta_qty, 10);
        assert_eq!(v.benchmark_qty, Quantity::Resolved(100.0));
        // 差距率 0.8 ≥ 0.5 → High
        assert_eq!(v.severity, SeverityTier::High);
        assert_eq!(diag.candidates, 1);
    }

    #[test]
    fn test_mild_laggard_not_confirmed_by_z() {
        // S007 低于头部均值但在正常波动带内(|z| < 1),不候选
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 950.0, 95.0),
            make_record("S003", "C10", 900.0, 90.0),
            make_record("S004", "C10", 880.0, 88.0),
            make_record("S005", "C10", 860.0, 86.0),
            make_record("S006", "C10", 850.0, 85.0),
            make_record("S007", "C10", 840.0, 84.0),
        ];
        let lookup = make_lookup(&["S001", "S002", "S003", "S004", "S005", "S006", "S007"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = PerformanceGapDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
    }

    #[test]
    fn test_zero_activity_store_filtered_by_min_change() {
        // S008 零动销: 差距按增幅上限封顶为 0,落入最小变化量过滤
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 1000.0, 100.0),
            make_record("S003", "C10", 800.0, 80.0),
            make_record("S004", "C10", 780.0, 78.0),
            make_record("S005", "C10", 760.0, 76.0),
            make_record("S006", "C10", 740.0, 74.0),
            make_record("S007", "C10", 720.0, 72.0),
            make_record("S008", "C10", 0.0, 0.0),
        ];
        let lookup = make_lookup(&[
            "S001", "S002", "S003", "S004", "S005", "S006", "S007", "S008",
        ]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = PerformanceGapDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.below_min_change_skips, 1);
    }
}
