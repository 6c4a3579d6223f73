// ==========================================
// 门店聚类对标推荐系统 - 超容检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4. 超容检测
// ==========================================
// 候选条件: 门店品类件数 > 群目标(群均值)
// 差量口径: 品类超出量按单品件数占比分摊到单品,
//           单品缩减 = min(分摊份额, 单品件数 × 缩减上限),向下取整
// 红线: 只减不增;缩减对象是单品行,品类行不直接产出
// ==========================================

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::types::{DetectorKind, Granularity, SeverityTier};
use crate::domain::violation::RunDiagnostics;
use crate::engine::benchmark::PeerBenchmarkCalculator;
use crate::engine::detectors::{
    build_working_set, group_by_store_category, group_by_store_item, CandidateSite, DeltaOutcome,
    DetectorContext, GapDetector, StoreItemStat,
};
use std::collections::BTreeMap;

// ==========================================
// OvercapacityDetector - 超容检测器
// ==========================================
pub struct OvercapacityDetector {
    calc: PeerBenchmarkCalculator,
}

/// 超容候选: 超容门店内的一个单品
pub struct OvercapacityCandidate {
    site: CandidateSite,
    item_qty: f64,
    item_amt: f64,
    cat_qty: f64, // 门店该品类解析件数合计
    excess: f64,  // 品类超出量
    target: f64,  // 群目标(均值)
    group_code: String,
}

impl OvercapacityDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }

    fn item_group_code(stat: &StoreItemStat, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Category => &stat.cat_code,
            Granularity::Subcategory => stat
                .subcat_code
                .as_deref()
                .unwrap_or(stat.cat_code.as_str()),
        }
    }
}

impl Default for OvercapacityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for OvercapacityDetector {
    type Candidate = OvercapacityCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::Overcapacity
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.overcapacity.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let granularity = ctx.params.shared.granularity;
        let ws = build_working_set(ctx, diag);
        let cat_stats = group_by_store_category(&ws, granularity, diag);

        // 单品行单独聚合,未定义计数只记一次(品类聚合已计)
        let mut item_diag = RunDiagnostics::new(self.kind(), ctx.period);
        let item_stats = group_by_store_item(&ws, &mut item_diag);

        // (门店, 分组) → 该店该组单品统计
        let mut items_by_store_group: BTreeMap<(String, String), Vec<&StoreItemStat>> =
            BTreeMap::new();
        for stat in &item_stats {
            let group_code = Self::item_group_code(stat, granularity).to_string();
            items_by_store_group
                .entry((stat.store_code.clone(), group_code))
                .or_default()
                .push(stat);
        }

        // (聚类, 分组) → 成员品类统计
        let mut groups: BTreeMap<(String, String), Vec<&super::StoreCategoryStat>> =
            BTreeMap::new();
        for stat in &cat_stats {
            if let Some(cluster_id) = &stat.cluster_id {
                groups
                    .entry((cluster_id.clone(), stat.group_code.clone()))
                    .or_default()
                    .push(stat);
            }
        }

        let mut candidates = Vec::new();

        for ((cluster_id, group_code), members) in &groups {
            if members.len() < ctx.params.shared.min_cluster_stores {
                diag.small_cluster_skips += 1;
                continue;
            }

            let values: Vec<f64> = members.iter().map(|s| s.qty).collect();
            let (target, _std) = match self.calc.mean_and_std(&values) {
                Some(pair) => pair,
                None => continue,
            };

            for member in members {
                let excess = member.qty - target;
                if excess <= 0.0 {
                    continue;
                }

                // 超出量分摊到该店该组的每个单品
                let key = (member.store_code.clone(), group_code.clone());
                let items = match items_by_store_group.get(&key) {
                    Some(items) => items,
                    None => continue, // 只有品类汇总行,无单品可分摊
                };
                for item in items {
                    candidates.push(OvercapacityCandidate {
                        site: CandidateSite {
                            store_code: item.store_code.clone(),
                            cluster_id: cluster_id.clone(),
                            key: item.key(),
                        },
                        item_qty: item.qty,
                        item_amt: item.sales_amt,
                        cat_qty: member.qty,
                        excess,
                        target,
                        group_code: group_code.clone(),
                    });
                }
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
        if candidate.cat_qty <= 0.0 {
            return None;
        }
        let share = candidate.excess * (candidate.item_qty / candidate.cat_qty);
        let reduction = share.min(candidate.item_qty * ctx.params.overcapacity.max_reduction_pct);

        // 减量向下取整(负方向)
        let delta_qty = (-reduction).floor() as i64;

        let unit_price = if candidate.item_qty > 0.0 {
            Some(candidate.item_amt / candidate.item_qty)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(candidate.item_qty),
            benchmark_qty: Quantity::Resolved(candidate.item_qty - reduction),
            delta_qty,
            unit_price,
            reason: format!(
                "品类 {} 件数 {:.1} 超出群目标 {:.1},按份额缩减",
                candidate.group_code, candidate.cat_qty, candidate.target
            ),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.overcapacity;
        let excess_ratio = if candidate.target > 0.0 {
            candidate.excess / candidate.target
        } else {
            f64::INFINITY
        };
        if excess_ratio >= p.severity_high_excess {
            SeverityTier::High
        } else if excess_ratio >= p.severity_medium_excess {
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

    fn make_record(store: &str, spu: &str, amt: f64, qty: f64) -> SalesRecord {
        SalesRecord {
            store_code: store.to_string(),
            cat_code: "C10".to_string(),
            subcat_code: None,
            spu_code: Some(spu.to_string()),
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
    fn test_excess_distributed_proportionally() {
        // S001-S004 品类件数各 100,S005 = 160(SPU001 10 件 + SPU002 150 件)
        // 群目标 = 112,超出 48
        let sales = vec![
            make_record("S001", "SPU000", 1000.0, 100.0),
            make_record("S002", "SPU000", 1000.0, 100.0),
            make_record("S003", "SPU000", 1000.0, 100.0),
            make_record("S004", "SPU000", 1000.0, 100.0),
            make_record("S005", "SPU001", 200.0, 10.0),
            make_record("S005", "SPU002", 3000.0, 150.0),
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
        let detector = OvercapacityDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert_eq!(recos.len(), 2);
        assert!(recos.iter().all(|r| r.violation.store_code == "S005"));
        assert!(recos.iter().all(|r| r.violation.delta_qty < 0));

        let spu1 = recos
            .iter()
            .find(|r| r.violation.key.spu_code.as_deref() == Some("SPU001"))
            .unwrap();
        let spu2 = recos
            .iter()
            .find(|r| r.violation.key.spu_code.as_deref() == Some("SPU002"))
            .unwrap();
        // SPU001 份额 = 48 × 10/160 = 3.0,上限 10 × 0.4 = 4 → −3
        assert_eq!(spu1.violation.delta_qty, -3);
        assert_eq!(spu1.violation.benchmark_qty, Quantity::Resolved(7.0));
        // SPU002 份额 = 48 × 150/160 = 45.0,上限 60 → −45
        assert_eq!(spu2.violation.delta_qty, -45);
        assert_eq!(diag.candidates, 2);
    }

    #[test]
    fn test_reduction_capped_per_item() {
        // 超出量大: S001-S004 各 40,S005 = 160 → 目标 64,超出 96
        // SPU001 份额 = 96 × 10/160 = 6 > 上限 10 × 0.4 = 4 → 取 4
        let sales = vec![
            make_record("S001", "SPU000", 400.0, 40.0),
            make_record("S002", "SPU000", 400.0, 40.0),
            make_record("S003", "SPU000", 400.0, 40.0),
            make_record("S004", "SPU000", 400.0, 40.0),
            make_record("S005", "SPU001", 200.0, 10.0),
            make_record("S005", "SPU002", 3000.0, 150.0),
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
        let detector = OvercapacityDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        let spu1 = recos
            .iter()
            .find(|r| r.violation.key.spu_code.as_deref() == Some("SPU001"))
            .unwrap();
        assert_eq!(spu1.violation.delta_qty, -4);
        // 超出率 96/64 = 1.5 ≥ 0.5 → High
        assert_eq!(spu1.violation.severity, SeverityTier::High);
    }

    #[test]
    fn test_stores_at_or_below_target_emit_nothing() {
        let sales = vec![
            make_record("S001", "SPU000", 1000.0, 100.0),
            make_record("S002", "SPU000", 1000.0, 100.0),
            make_record("S003", "SPU000", 1000.0, 100.0),
            make_record("S004", "SPU000", 1000.0, 100.0),
            make_record("S005", "SPU000", 1000.0, 100.0),
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
        let detector = OvercapacityDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.candidates, 0);
    }
}
