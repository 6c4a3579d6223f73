// ==========================================
// 门店聚类对标推荐系统 - 缺品检测器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 1. 缺品检测
// ==========================================
// 候选条件: 同聚类在售率 ≥ 阈值 且 本店无该单品销售记录
// 差量口径: 载体门店店均量 × 规模系数 × 季节因子,向上取整
// 红线: 在售率分母 = 聚类分配表成员数,不是有销售数据的门店数
// ==========================================

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::sales::CategoryKey;
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::domain::violation::RunDiagnostics;
use crate::engine::benchmark::PeerBenchmarkCalculator;
use crate::engine::detectors::{
    build_working_set, group_by_store_item, CandidateSite, DeltaOutcome, DetectorContext,
    GapDetector,
};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// MissingAssortmentDetector - 缺品检测器
// ==========================================
pub struct MissingAssortmentDetector {
    calc: PeerBenchmarkCalculator,
}

/// 缺品候选: 某店未铺某单品,同聚类载体统计随身携带
pub struct MissingCandidate {
    site: CandidateSite,
    adoption: f64,
    peer_count: usize,
    peer_qty_sum: f64,
    peer_amt_sum: f64,
}

/// (聚类, 单品) 载体聚合
struct ItemCarriers {
    cat_code: String,
    subcat_code: Option<String>,
    carrier_count: usize, // 销售额达门槛的载体数
    carrier_qty_sum: f64,
    carrier_amt_sum: f64,
}

impl MissingAssortmentDetector {
    pub fn new() -> Self {
        Self {
            calc: PeerBenchmarkCalculator::new(),
        }
    }
}

impl Default for MissingAssortmentDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GapDetector for MissingAssortmentDetector {
    type Candidate = MissingCandidate;

    fn kind(&self) -> DetectorKind {
        DetectorKind::MissingAssortment
    }

    fn max_per_store(&self, params: &RecoParams) -> usize {
        params.missing_assortment.max_reco_per_store
    }

    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate> {
        let ws = build_working_set(ctx, diag);
        let items = group_by_store_item(&ws, diag);

        // 销售宇宙: 至少有一行销售数据的门店(无数据门店不生成推荐)
        let active_stores: BTreeSet<&str> = ws
            .rows
            .iter()
            .map(|row| row.record.store_code.as_str())
            .collect();

        // 在售判定用全部单品行: 有任何销售记录即已铺,
        // 销量未解析的行也证明在售(缺品只看铺没铺,不看卖了几件)
        let mut presence: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        for row in &ws.rows {
            if let (Some(cluster_id), Some(spu)) = (row.cluster_id, &row.record.spu_code) {
                presence
                    .entry((cluster_id.to_string(), spu.clone()))
                    .or_default()
                    .insert(row.record.store_code.clone());
            }
        }

        // (聚类, 单品) → 载体聚合(仅已解析销量的统计口径)
        let mut carriers: BTreeMap<(String, String), ItemCarriers> = BTreeMap::new();
        for stat in &items {
            let cluster_id = match &stat.cluster_id {
                Some(c) => c.clone(),
                None => continue, // 未分配门店不参与对标
            };
            let agg = carriers
                .entry((cluster_id, stat.spu_code.clone()))
                .or_insert_with(|| ItemCarriers {
                    cat_code: stat.cat_code.clone(),
                    subcat_code: stat.subcat_code.clone(),
                    carrier_count: 0,
                    carrier_qty_sum: 0.0,
                    carrier_amt_sum: 0.0,
                });
            if stat.sales_amt >= ctx.params.shared.min_sales_amt {
                agg.carrier_count += 1;
                agg.carrier_qty_sum += stat.qty;
                agg.carrier_amt_sum += stat.sales_amt;
            }
        }

        let threshold = ctx.params.missing_assortment.adoption_rate_threshold;
        let mut skipped_clusters: BTreeSet<String> = BTreeSet::new();
        let mut candidates = Vec::new();

        for ((cluster_id, spu_code), agg) in &carriers {
            let cluster_size = ctx.clusters.cluster_size(cluster_id);
            if cluster_size < ctx.params.shared.min_cluster_stores {
                if skipped_clusters.insert(cluster_id.clone()) {
                    diag.small_cluster_skips += 1;
                }
                continue;
            }

            // 在售率分母 = 分配表成员数
            let adoption = match self.calc.adoption_rate(agg.carrier_count, cluster_size) {
                Some(rate) => rate,
                None => continue,
            };
            if adoption < threshold {
                continue;
            }

            let members = match ctx.clusters.members_of(cluster_id) {
                Some(m) => m,
                None => continue,
            };
            let stocked = presence.get(&(cluster_id.clone(), spu_code.clone()));
            for store in members {
                if stocked.map_or(false, |s| s.contains(store)) {
                    continue; // 已在售(哪怕销量未解析或低于门槛)不算缺品
                }
                if !active_stores.contains(store.as_str()) {
                    continue;
                }
                candidates.push(MissingCandidate {
                    site: CandidateSite {
                        store_code: store.clone(),
                        cluster_id: cluster_id.clone(),
                        key: CategoryKey::item(
                            agg.cat_code.clone(),
                            agg.subcat_code.clone(),
                            spu_code.clone(),
                        ),
                    },
                    adoption,
                    peer_count: agg.carrier_count,
                    peer_qty_sum: agg.carrier_qty_sum,
                    peer_amt_sum: agg.carrier_amt_sum,
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
        if candidate.peer_count == 0 {
            return None;
        }
        // 载体店均量(仅已解析销量,identify 阶段已排除未解析行)
        let peer_avg = candidate.peer_qty_sum / candidate.peer_count as f64;
        if peer_avg <= 0.0 {
            return None;
        }

        let seasonal = ctx.seasonal_factor(&candidate.site.key.cat_code);
        let expected = peer_avg * ctx.params.missing_assortment.volume_scale * seasonal;
        let delta_qty = expected.ceil() as i64;

        // 单价取载体合计口径(本店无记录,无自身价格可用)
        let unit_price = if candidate.peer_qty_sum > 0.0 {
            Some(candidate.peer_amt_sum / candidate.peer_qty_sum)
        } else {
            None
        };

        Some(DeltaOutcome {
            current_qty: Quantity::Resolved(0.0),
            benchmark_qty: Quantity::Resolved(peer_avg),
            delta_qty,
            unit_price,
            reason: format!(
                "同聚类 {:.0}% 门店在售(载体 {} 店,店均 {:.1}),本店未铺",
                candidate.adoption * 100.0,
                candidate.peer_count,
                peer_avg
            ),
        })
    }

    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        _outcome: &DeltaOutcome,
    ) -> SeverityTier {
        let p = &ctx.params.missing_assortment;
        if candidate.adoption >= p.severity_high_adoption {
            SeverityTier::High
        } else if candidate.adoption >= p.severity_medium_adoption {
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
            subcat_code: Some("C10-02".to_string()),
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
    fn test_four_of_five_adoption_flags_the_fifth() {
        // 5 店聚类,4 店在售 SPU001(在售率 0.8 = 阈值),第 5 店只卖别的
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU001", 400.0, 8.0),
            make_record("S004", "SPU001", 500.0, 10.0),
            make_record("S005", "SPU099", 300.0, 6.0), // 有数据,未铺 SPU001
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
        let detector = MissingAssortmentDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert_eq!(recos.len(), 1);
        let v = &recos[0].violation;
        assert_eq!(v.store_code, "S005");
        assert_eq!(v.key.spu_code.as_deref(), Some("SPU001"));
        assert_eq!(v.current_qty, Quantity::Resolved(0.0));
        // 店均 10,规模系数 0.8 → ceil(8.0) = 8
        assert_eq!(v.delta_qty, 8);
        // 载体单价 2000/40 = 50
        assert_eq!(v.unit_price, Some(50.0));
        assert_eq!(diag.candidates, 1);
        assert_eq!(diag.emitted, 1);
    }

    #[test]
    fn test_store_without_any_sales_gets_nothing() {
        // S005 在分配表里但本期没有任何销售数据 → 不推荐
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU001", 400.0, 8.0),
            make_record("S004", "SPU001", 500.0, 10.0),
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
        let detector = MissingAssortmentDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
    }

    #[test]
    fn test_below_floor_carrier_is_not_missing() {
        // S005 在售 SPU001 但销售额低于门槛: 不计入在售率,也不算缺品
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU001", 400.0, 8.0),
            make_record("S004", "SPU001", 500.0, 10.0),
            make_record("S005", "SPU001", 50.0, 1.0), // 低于 min_sales_amt
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
        let detector = MissingAssortmentDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
    }

    #[test]
    fn test_amount_only_row_still_counts_as_stocked() {
        // S005 有 SPU001 记录但四个销量口径全空: 在售成立,不算缺品
        let mut amount_only = make_record("S005", "SPU001", 300.0, 0.0);
        amount_only.total_qty = None;
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU001", 400.0, 8.0),
            make_record("S004", "SPU001", 500.0, 10.0),
            amount_only,
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
        let detector = MissingAssortmentDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.undefined_qty_rows, 1);
    }

    #[test]
    fn test_small_cluster_skipped() {
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU099", 300.0, 6.0),
        ];
        // 3 店 < min_cluster_stores(5)
        let lookup = make_lookup(&["S001", "S002", "S003"]);
        let params = RecoParams::default();
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: None,
            params: &params,
        };
        let detector = MissingAssortmentDetector::new();

        let (recos, diag) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        assert!(recos.is_empty());
        assert_eq!(diag.small_cluster_skips, 1);
    }

    #[test]
    fn test_seasonal_factor_scales_delta() {
        let sales = vec![
            make_record("S001", "SPU001", 500.0, 10.0),
            make_record("S002", "SPU001", 600.0, 12.0),
            make_record("S003", "SPU001", 400.0, 8.0),
            make_record("S004", "SPU001", 500.0, 10.0),
            make_record("S005", "SPU099", 300.0, 6.0),
        ];
        let lookup = make_lookup(&["S001", "S002", "S003", "S004", "S005"]);
        let params = RecoParams::default();
        let mut seasonal = BTreeMap::new();
        seasonal.insert("C10".to_string(), 1.5);
        let ctx = DetectorContext {
            period: "202506",
            sales: &sales,
            clusters: &lookup,
            seasonal: Some(&seasonal),
            params: &params,
        };
        let detector = MissingAssortmentDetector::new();

        let (recos, _) = run_gap_detector(&detector, &ctx, &NullComplianceGate);

        // 店均 10 × 0.8 × 1.5 = 12
        assert_eq!(recos[0].violation.delta_qty, 12);
    }
}
