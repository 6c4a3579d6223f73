// ==========================================
// 门店聚类对标推荐系统 - 铺货失衡检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 2. 铺货失衡检测
// ==========================================
// 候选条件: 门店品类销量 z-score 绝对值 ≥ 入围阈值
// 差量口径: 向群均值回归,受当前值最大调整比例约束
// 红线: 方差为零的组 z=0 如实产出,不得除零;样本不足的组整组跳过
// ==========================================

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::sales::CategoryKey;
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::domain::violation::RunDiagnostics;
use crate::engine::benchmark::PeerBenchmarkCalculator;
use crate::engine::detectors::{
    build_working_set, group_by_store_category, CandidateSite, DeltaOutcome, DetectorContext,
    GapDetector,
};
use std::collections::BTreeMap;

// ==========================================
// ImbalanceDetector - 铺货失衡检测器
// ==========================================
pub struct ImbalanceDetector {
    calc: PeerBenchmarkCalculator,
}

/// 失衡候选: 门店品类量与群统计随身携带
pub struct ImbalanceCandidate {
    site: CandidateSite,
    qty: f64,
    sales_amt: f64,
    mean: f64,
    z: f64,
}

impl ImbalanceDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }
}

impl Default for ImbalanceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for ImbalanceDetector {
    type Candidate = ImbalanceCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::ImbalancedAllocation
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.imbalance.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let granularity = ctx.params.shared.granularity;
        let ws = build_working_set(ctx, diag);
        let stats = group_by_store_category(&ws, granularity, diag);

        // (聚类, 分组) → 成员统计
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

        let z_entry = ctx.params.imbalance.z_entry;
        let mut candidates = Vec::new();

        for ((cluster_id, _group_code), members) in &groups {
            // 样本不足的组整组跳过
            if members.len() < ctx.params.shared.min_cluster_stores {
                diag.small_cluster_skips += 1;
                continue;
            }

            let values: Vec<f64> = members.iter().map(|s| s.qty).collect();
            let (mean, std) = match self.calc.mean_and_std(&values) {
                Some(pair) => pair,
                None => continue,
            };

            for stat in members {
                let z = self.calc.z_score(stat.qty, mean, std);
                if z.abs() < z_entry {
                    continue;
                }
                candidates.push(ImbalanceCandidate {
                    site: CandidateSite {
                        store_code: stat.store_code.clone(),
                        cluster_id: cluster_id.clone(),
                        key: stat.category_key(granularity),
                    },
                    qty: stat.qty,
                    sales_amt: stat.sales_amt,
                    mean,
                    z,
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
        let max_adjust = candidate.qty * ctx.params.imbalance.max_adjust_pct;
        let raw = (candidate.mean - candidate.qty).clamp(-max_adjust, max_adjust);

        // 增量向上取整,减量向下取整
        let delta_qty = if raw >= 0.0 {
            raw.ceil() as i64
        } else {
            raw.floor() as i64
        };

        let unit_price = if candidate.qty > 0.0 {
            Some(candidate.sales_amt / candidate.qty)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(candidate.qty),
            benchmark_qty: Quantity::Resolved(candidate.mean),
            delta_qty,
            unit_price,
            reason: format!(
                "群均量 {:.1},本店 {:.1},z={:.2}",
                candidate.mean, candidate.qty, candidate.z
            ),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.imbalance;
        let abs_z = candidate.z.abs();
        if abs_z >= p.severity_high_z {
            SeverityTier::High
        } else if abs_z >= p.severity_medium_z {
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
    use crate::domain::types::ComplianceStatus;
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

    /// 6 店群,5 店量级一致,1 店显著偏低
    fn outlier_low_fixture() -> Vec<SalesRecord> {
        vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 1020.0, 102.0),
            make_record("S003", "C10", 980.0, 98.0),
            make_record("S004", "C10", 1010.0, 101.0),
            make_record("S005", "C10", 990.0, 99.0),
            make_record("S006", "C10", 200.0, 20.0), // 离群
        ]
    }

    #[test]
    fn test_low_outlier_pulled_toward_mean() {
        let sales = outlier_low_fixture();
        let lookup = make_lookup(&["S001", "S002", "S003", "S004", "S005", "S006"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = ImbalanceDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert_eq!(recos.len(), 1);
        let v = &recos[0].violation;
        assert_eq!(v.store_code, "S006");
        // 群均 86.67,差距 66.67,但上限 = 20 × 0.3 = 6 → ceil(6.0) = 6
        assert_eq!(v.delta_qty, 6);
        assert_eq!(v.current_qty, Quantity::Resolved(20.0));
        assert_eq!(v.compliance, ComplianceStatus::Unknown);
        assert_eq!(diag.candidates, 1);
    }

    #[test]
    fn test_high_outlier_gets_negative_delta() {
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 1020.0, 102.0),
            make_record("S003", "C10", 980.0, 98.0),
            make_record("S004", "C10", 1010.0, 101.0),
            make_record("S005", "C10", 990.0, 99.0),
            make_record("S006", "C10", 5000.0, 500.0), // 显著偏高
        ];
        let lookup = make_lookup(&["S001", "S002", "S003", "S004", "S005", "S006"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = ImbalanceDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert_eq!(recos.len(), 1);
        let v = &recos[0].violation;
        assert_eq!(v.store_code, "S006");
        // 向均值回归为负,上限 500 × 0.3 = 150 → floor(−150) = −150
        assert_eq!(v.delta_qty, -150);
    }

    #[test]
    fn test_zero_variance_group_emits_nothing() {
        // 全组同量: std=0 ⇒ 所有 z=0,无候选(不是除零崩溃)
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 1000.0, 100.0),
            make_record("S003", "C10", 1000.0, 100.0),
            make_record("S004", "C10", 1000.0, 100.0),
            make_record("S005", "C10", 1000.0, 100.0),
        ];
        let lookup = make_lookup(&["S001", "S002", "S003", "S004", "S005"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = ImbalanceDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.candidates, 0);
    }

    #[test]
    fn test_small_group_excluded_entirely() {
        let sales = vec![
            make_record("S001", "C10", 1000.0, 100.0),
            make_record("S002", "C10", 200.0, 20.0),
        ];
        let lookup = make_lookup(&["S001", "S002"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = ImbalanceDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.small_cluster_skips, 1);
    }
}
