// ==========================================
// 门店聚类对标推荐系统 - 低于保底检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 3. 低于保底检测
// ==========================================
// 候选条件: 0 < 月动销 < 固定保底量(不依赖同群统计)
// 差量口径: 保底量 − 动销量,向上取整,只增不减
// 红线: 动销为零的组合不候选(零动销交给缺品口径,不在此重复)
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

// ==========================================
// BelowMinimumDetector - 低于保底检测器
// ==========================================
pub struct BelowMinimumDetector {
    calc: PeerBenchmarkCalculator,
}

pub struct BelowMinimumCandidate {
    site: CandidateSite,
    qty: f64,
    sales_amt: f64,
}

impl BelowMinimumDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }
}

impl Default for BelowMinimumDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for BelowMinimumDetector {
    type Candidate = BelowMinimumCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::BelowMinimum
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.below_minimum.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let granularity = ctx.params.shared.granularity;
        let ws = build_working_set(ctx, diag);
        let stats = group_by_store_category(&ws, granularity, diag);

        let minimum = ctx.params.below_minimum.min_monthly_units;
        let mut candidates = Vec::new();

        for stat in &stats {
            // 未分配门店无法落聚类字段,不产出
            let cluster_id = match &stat.cluster_id {
                Some(c) => c.clone(),
                None => continue,
            };
            if stat.qty <= 0.0 || stat.qty >= minimum {
                continue;
            }
            candidates.push(BelowMinimumCandidate {
                site: CandidateSite {
                    store_code: stat.store_code.clone(),
                    cluster_id,
                    key: stat.category_key(granularity),
                },
                qty: stat.qty,
                sales_amt: stat.sales_amt,
            });
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
        let minimum = ctx.params.below_minimum.min_monthly_units;
        let gap = self.calc.minimum_rate_gap(candidate.qty, minimum);
        let delta_qty = gap.ceil() as i64;

        let unit_price = if candidate.qty > 0.0 {
            Some(candidate.sales_amt / candidate.qty)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(candidate.qty),
            benchmark_qty: Quantity::Resolved(minimum),
            delta_qty,
            unit_price,
            reason: format!("月动销 {:.1} 低于保底 {:.0}", candidate.qty, minimum),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.below_minimum;
        // 动销占保底比例越低越严重
        let ratio = candidate.qty / p.min_monthly_units;
        if ratio <= p.severity_high_ratio {
            SeverityTier::High
        } else if ratio <= p.severity_medium_ratio {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }
}
