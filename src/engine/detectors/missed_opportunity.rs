// ==========================================
// 门店聚类对标推荐系统 - 销售机会流失检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 5. 销售机会流失检测
// ==========================================
// 候选条件: 本店在售某单品,但量低于群内头部门店期望量
// 差量口径: 期望量(头部均值 × 季节因子) − 本店量,向上取整
// 红线: 头部门店自身不候选;零动销交给缺品口径
// ==========================================

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::domain::violation::RunDiagnostics;
use crate::engine::benchmark::PeerBenchmarkCalculator;
use crate::engine::detectors::{
    build_working_set, group_by_store_item, CandidateSite, DeltaOutcome, DetectorContext,
    GapDetector, StoreItemStat,
};
use std::collections::BTreeMap;

// ==========================================
// MissedOpportunityDetector - 销售机会流失检测器
// ==========================================
pub struct MissedOpportunityDetector {
    calc: PeerBenchmarkCalculator,
}

pub struct MissedOpportunityCandidate {
    site: CandidateSite,
    qty: f64,
    sales_amt: f64,
    expected: f64, // 头部均值 × 季节因子
    top_mean: f64,
    top_n: usize,
}

impl MissedOpportunityDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }
}

impl Default for MissedOpportunityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for MissedOpportunityDetector {
    type Candidate = MissedOpportunityCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::MissedOpportunity
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.missed_opportunity.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let ws = build_working_set(ctx, diag);
        let items = group_by_store_item(&ws, diag);

        // (聚类, 单品) → 成员统计
        let mut groups: BTreeMap<(String, String), Vec<&StoreItemStat>> = BTreeMap::new();
        for stat in &items {
            if let Some(cluster_id) = &stat.cluster_id {
                groups
                    .entry((cluster_id.clone(), stat.spu_code.clone()))
                    .or_default()
                    .push(stat);
            }
        }

        let top_pct = ctx.params.missed_opportunity.top_percentile;
        let mut candidates = Vec::new();

        for ((cluster_id, _spu_code), mut members) in groups {
            if members.len() < ctx.params.shared.min_cluster_stores {
                diag.small_cluster_skips += 1;
                continue;
            }

            let values: Vec<f64> = members.iter().map(|s| s.qty).collect();
            let (top_mean, top_n) = match self.calc.top_performer_mean(&values, top_pct) {
                Some(pair) => pair,
                None => continue,
            };

            // 头部切分: 量降序、门店编码升序,保证切分确定
            members.sort_by(|a, b| {
                b.qty
                    .partial_cmp(&a.qty)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.store_code.cmp(&b.store_code))
            });

            for (idx, stat) in members.iter().enumerate() {
                if idx < top_n {
                    continue; // 头部门店自身不候选
                }
                if stat.qty <= 0.0 {
                    continue;
                }
                let seasonal = ctx.seasonal_factor(&stat.cat_code);
                let expected = top_mean * seasonal;
                if stat.qty >= expected {
                    continue;
                }
                candidates.push(MissedOpportunityCandidate {
                    site: CandidateSite {
                        store_code: stat.store_code.clone(),
                        cluster_id: cluster_id.clone(),
                        key: stat.key(),
                    },
                    qty: stat.qty,
                    sales_amt: stat.sales_amt,
                    expected,
                    top_mean,
                    top_n,
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
        _ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
    ) -> Option<DeltaOutcome> {
        let gap = candidate.expected - candidate.qty;
        if gap <= 0.0 {
            return None;
        }
        let delta_qty = gap.ceil() as i64;

        let unit_price = if candidate.qty > 0.0 {
            Some(candidate.sales_amt / candidate.qty)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(candidate.qty),
            benchmark_qty: Quantity::Resolved(candidate.expected),
            delta_qty,
            unit_price,
            reason: format!(
                "头部 {} 店均量 {:.1},期望 {:.1},本店 {:.1}",
                candidate.top_n, candidate.top_mean, candidate.expected, candidate.qty
            ),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.missed_opportunity;
        // 差距占期望量比例
        let gap_ratio = if candidate.expected > 0.0 {
            (candidate.expected - candidate.qty) / candidate.expected
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
