// ==========================================
// 门店聚类对标推荐系统 - 缺口检测器体系
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 0.2 检测器体系
// 依据: Reco_Dev_Master_Spec.md - PART B4 检测器状态机
// ==========================================
// 职责: 六类检测器共享的上下文/连接/驱动骨架
// 状态机: 识别候选 → 计算差量 → 过滤分级 → 闸门 → 截断
// 红线: 销量未解析的候选跳过,不得补 0;未分配门店不得伪造聚类
// ==========================================

pub mod below_minimum;
pub mod imbalance;
pub mod missed_opportunity;
pub mod missing_assortment;
pub mod overcapacity;
pub mod performance_gap;

pub use below_minimum::BelowMinimumDetector;
pub use imbalance::ImbalanceDetector;
pub use missed_opportunity::MissedOpportunityDetector;
pub use missing_assortment::MissingAssortmentDetector;
pub use overcapacity::OvercapacityDetector;
pub use performance_gap::PerformanceGapDetector;

use crate::config::RecoParams;
use crate::domain::quantity::Quantity;
use crate::domain::sales::{CategoryKey, SalesRecord};
use crate::domain::store::ClusterLookup;
use crate::domain::types::{ComplianceStatus, DetectorKind, Granularity, JoinMode, SeverityTier};
use crate::domain::violation::{Recommendation, RunDiagnostics, Violation};
use crate::engine::capper::PerStoreCapper;
use crate::engine::gate::{ComplianceGate, GateDecision};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

// ==========================================
// DetectorContext - 检测器运行上下文
// ==========================================
// 一次运行装配一次,六个检测器共享只读引用
pub struct DetectorContext<'a> {
    pub period: &'a str,
    pub sales: &'a [SalesRecord],
    pub clusters: &'a ClusterLookup,
    /// 季节因子(cat_code → factor),缺失 ⇒ 降级为 1.0
    pub seasonal: Option<&'a BTreeMap<String, f64>>,
    pub params: &'a RecoParams,
}

impl<'a> DetectorContext<'a> {
    /// 品类季节因子(无表/无行 ⇒ 1.0,降级继续)
    pub fn seasonal_factor(&self, cat_code: &str) -> f64 {
        self.seasonal
            .and_then(|factors| factors.get(cat_code))
            .copied()
            .unwrap_or(1.0)
    }
}

// ==========================================
// WorkingSet - 销售×聚类连接结果
// ==========================================

/// 连接后的一行: 销售事实 + 所属聚类(未分配 ⇒ None)
pub struct JoinedRow<'a> {
    pub record: &'a SalesRecord,
    pub cluster_id: Option<&'a str>,
}

pub struct WorkingSet<'a> {
    pub rows: Vec<JoinedRow<'a>>,
}

/// 连接销售事实与聚类分配
///
/// # 规则
/// - Strict: 未匹配行整体剔除
/// - Inclusive: 未匹配行保留(cluster_id = None,不参与对标,可审计)
/// - 两种模式都如实计数 matched / unmatched
pub fn build_working_set<'a>(
    ctx: &DetectorContext<'a>,
    diag: &mut RunDiagnostics,
) -> WorkingSet<'a> {
    diag.input_rows = ctx.sales.len() as u32;

    let mut rows = Vec::with_capacity(ctx.sales.len());
    for record in ctx.sales {
        match ctx.clusters.cluster_of(&record.store_code) {
            Some(cluster_id) => {
                diag.matched_rows += 1;
                rows.push(JoinedRow {
                    record,
                    cluster_id: Some(cluster_id),
                });
            }
            None => {
                diag.unmatched_rows += 1;
                if ctx.params.shared.join_mode == JoinMode::Inclusive {
                    rows.push(JoinedRow {
                        record,
                        cluster_id: None,
                    });
                }
            }
        }
    }

    debug!(
        input = diag.input_rows,
        matched = diag.matched_rows,
        unmatched = diag.unmatched_rows,
        mode = ?ctx.params.shared.join_mode,
        "销售×聚类连接完成"
    );

    WorkingSet { rows }
}

// ==========================================
// 共享分组统计
// ==========================================

/// (门店, 品类分组) 级统计,品类族检测器的工作单元
#[derive(Debug, Clone)]
pub struct StoreCategoryStat {
    pub store_code: String,
    pub cluster_id: Option<String>,
    pub cat_code: String,
    pub group_code: String,
    pub qty: f64,       // 解析销量合计(仅已解析行)
    pub sales_amt: f64, // 销售额合计(仅已解析行)
}

impl StoreCategoryStat {
    /// 对标分组键(子类粒度时带上品类,子类缺失已回落品类)
    pub fn category_key(&self, granularity: Granularity) -> CategoryKey {
        match granularity {
            Granularity::Category => CategoryKey::category(self.group_code.clone()),
            Granularity::Subcategory => {
                if self.group_code == self.cat_code {
                    CategoryKey::category(self.cat_code.clone())
                } else {
                    CategoryKey {
                        cat_code: self.cat_code.clone(),
                        subcat_code: Some(self.group_code.clone()),
                        spu_code: None,
                    }
                }
            }
        }
    }

    /// 真实单价(解析销量为 0 ⇒ None,绝不由金额反推)
    pub fn unit_price(&self) -> Option<f64> {
        if self.qty > 0.0 {
            Some(self.sales_amt / self.qty)
        } else {
            None
        }
    }
}

/// 按 (门店, 品类分组) 聚合解析销量
///
/// 销量未解析的行整体排除并计数,销售额不跟进(排除即整行排除)
pub fn group_by_store_category(
    ws: &WorkingSet<'_>,
    granularity: Granularity,
    diag: &mut RunDiagnostics,
) -> Vec<StoreCategoryStat> {
    let mut groups: BTreeMap<(String, String), StoreCategoryStat> = BTreeMap::new();

    for row in &ws.rows {
        let qty = match row.record.resolved_qty() {
            Quantity::Resolved(v) => v,
            Quantity::Undefined => {
                diag.undefined_qty_rows += 1;
                continue;
            }
        };

        let group_code = row.record.group_code(granularity).to_string();
        let entry = groups
            .entry((row.record.store_code.clone(), group_code.clone()))
            .or_insert_with(|| StoreCategoryStat {
                store_code: row.record.store_code.clone(),
                cluster_id: row.cluster_id.map(|s| s.to_string()),
                cat_code: row.record.cat_code.clone(),
                group_code,
                qty: 0.0,
                sales_amt: 0.0,
            });
        entry.qty += qty;
        entry.sales_amt += row.record.sales_amt;
    }

    groups.into_values().collect()
}

/// (门店, 单品) 级统计,单品族检测器的工作单元
#[derive(Debug, Clone)]
pub struct StoreItemStat {
    pub store_code: String,
    pub cluster_id: Option<String>,
    pub cat_code: String,
    pub subcat_code: Option<String>,
    pub spu_code: String,
    pub qty: f64,
    pub sales_amt: f64,
}

impl StoreItemStat {
    pub fn key(&self) -> CategoryKey {
        CategoryKey::item(
            self.cat_code.clone(),
            self.subcat_code.clone(),
            self.spu_code.clone(),
        )
    }

    /// 真实单价(解析销量为 0 ⇒ None,绝不由金额反推)
    pub fn unit_price(&self) -> Option<f64> {
        if self.qty > 0.0 {
            Some(self.sales_amt / self.qty)
        } else {
            None
        }
    }
}

/// 按 (门店, 单品) 聚合解析销量,仅单品级行参与
pub fn group_by_store_item(
    ws: &WorkingSet<'_>,
    diag: &mut RunDiagnostics,
) -> Vec<StoreItemStat> {
    let mut groups: BTreeMap<(String, String), StoreItemStat> = BTreeMap::new();

    for row in &ws.rows {
        let spu_code = match &row.record.spu_code {
            Some(spu) => spu.clone(),
            None => continue, // 品类汇总行不属于单品族
        };

        let qty = match row.record.resolved_qty() {
            Quantity::Resolved(v) => v,
            Quantity::Undefined => {
                diag.undefined_qty_rows += 1;
                continue;
            }
        };

        let entry = groups
            .entry((row.record.store_code.clone(), spu_code.clone()))
            .or_insert_with(|| StoreItemStat {
                store_code: row.record.store_code.clone(),
                cluster_id: row.cluster_id.map(|s| s.to_string()),
                cat_code: row.record.cat_code.clone(),
                subcat_code: row.record.subcat_code.clone(),
                spu_code,
                qty: 0.0,
                sales_amt: 0.0,
            });
        entry.qty += qty;
        entry.sales_amt += row.record.sales_amt;
    }

    groups.into_values().collect()
}

// ==========================================
// GapDetector Trait - 三阶段状态机
// ==========================================

/// 候选定位: 哪家店、哪个聚类、哪个条目
#[derive(Debug, Clone)]
pub struct CandidateSite {
    pub store_code: String,
    pub cluster_id: String,
    pub key: CategoryKey,
}

/// 差量计算结果(第二阶段产物,字段组装由驱动统一完成)
#[derive(Debug, Clone)]
pub struct DeltaOutcome {
    pub current_qty: Quantity,
    pub benchmark_qty: Quantity,
    pub delta_qty: i64,
    /// 真实单价(未解析 ⇒ None ⇒ 投资额未定义)
    pub unit_price: Option<f64>,
    pub reason: String,
}

pub trait GapDetector {
    type Candidate;

    fn kind(&self) -> DetectorKind;

    /// 门店截断上限(检测器各自配置)
    fn max_per_store(&self, params: &RecoParams) -> usize;

    /// 阶段一: 识别候选(连接/分组/排除计数写入 diag)
    fn identify(
        &self,
        ctx: &DetectorContext<'_>,
        diag: &mut RunDiagnostics,
    ) -> Vec<Self::Candidate>;

    fn site<'c>(&self, candidate: &'c Self::Candidate) -> &'c CandidateSite;

    /// 阶段二: 计算差量(None ⇒ 底层数据不可解析,候选跳过)
    fn compute_delta(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
    ) -> Option<DeltaOutcome>;

    /// 阶段三: 严重程度分级
    fn classify(
        &self,
        ctx: &DetectorContext<'_>,
        candidate: &Self::Candidate,
        outcome: &DeltaOutcome,
    ) -> SeverityTier;
}

// ==========================================
// run_gap_detector - 共享驱动
// ==========================================

/// 驱动一个检测器跑完整状态机
///
/// # 规则
/// - |delta| < 最小变化量 ⇒ 过滤(共享阈值)
/// - 投资额 = delta × 单价 × (1 − 毛利率),单价未解析 ⇒ None
/// - 闸门尽力而为: 出错/不可用 ⇒ Unknown,绝不因闸门废整轮
/// - 闸门拒绝不丢弃,保留并在截断排序中沉底
#[instrument(skip(detector, ctx, gate), fields(detector = %detector.kind(), period = %ctx.period))]
pub fn run_gap_detector<D: GapDetector>(
    detector: &D,
    ctx: &DetectorContext<'_>,
    gate: &dyn ComplianceGate,
) -> (Vec<Recommendation>, RunDiagnostics) {
    let mut diag = RunDiagnostics::new(detector.kind(), ctx.period);

    // 阶段一: 识别候选
    let candidates = detector.identify(ctx, &mut diag);
    diag.candidates = candidates.len() as u32;
    debug!(detector = %detector.kind(), candidates = diag.candidates, "候选识别完成");

    let margin_rate = ctx.params.shared.default_margin_rate;
    let mut violations = Vec::new();

    for candidate in &candidates {
        // 阶段二: 差量
        let outcome = match detector.compute_delta(ctx, candidate) {
            Some(outcome) => outcome,
            None => {
                diag.delta_skips += 1;
                continue;
            }
        };

        // 共享最小变化量过滤
        if outcome.delta_qty.abs() < ctx.params.shared.min_qty_change {
            diag.below_min_change_skips += 1;
            continue;
        }

        // 阶段三: 分级
        let severity = detector.classify(ctx, candidate, &outcome);
        let site = detector.site(candidate);

        // 投资额口径(固定公式,单价未解析 ⇒ 未定义)
        let invest_amt = outcome
            .unit_price
            .map(|price| outcome.delta_qty as f64 * price * (1.0 - margin_rate));

        // 闸门评估(尽力而为)
        let current = outcome.current_qty.value().unwrap_or_default();
        let proposed = current + outcome.delta_qty as f64;
        let (compliance, predicted_rate) = match gate.evaluate(
            &site.store_code,
            &site.key.line_key(),
            current,
            proposed,
        ) {
            Ok(GateDecision::Decided {
                approved: true,
                predicted_rate,
            }) => (ComplianceStatus::Approved, Some(predicted_rate)),
            Ok(GateDecision::Decided {
                approved: false,
                predicted_rate,
            }) => {
                diag.gate_rejected += 1;
                (ComplianceStatus::Rejected, Some(predicted_rate))
            }
            Ok(GateDecision::Unavailable) => {
                diag.gate_unavailable += 1;
                (ComplianceStatus::Unknown, None)
            }
            Err(e) => {
                warn!(
                    detector = %detector.kind(),
                    store = %site.store_code,
                    error = %e,
                    "闸门评估失败,按 Unknown 继续"
                );
                diag.gate_unavailable += 1;
                (ComplianceStatus::Unknown, None)
            }
        };

        violations.push(Violation {
            store_code: site.store_code.clone(),
            cluster_id: site.cluster_id.clone(),
            key: site.key.clone(),
            detector: detector.kind(),
            period: ctx.period.to_string(),
            current_qty: outcome.current_qty,
            benchmark_qty: outcome.benchmark_qty,
            delta_qty: outcome.delta_qty,
            unit_price: outcome.unit_price,
            invest_amt,
            severity,
            compliance,
            predicted_rate,
            reason: outcome.reason,
        });
    }

    // 门店截断
    let capper = PerStoreCapper::new();
    let (recommendations, capped_out) =
        capper.cap(violations, detector.max_per_store(ctx.params));
    diag.capped_out = capped_out;
    diag.emitted = recommendations.len() as u32;

    info!(
        detector = %detector.kind(),
        candidates = diag.candidates,
        delta_skips = diag.delta_skips,
        below_min = diag.below_min_change_skips,
        gate_rejected = diag.gate_rejected,
        capped_out = diag.capped_out,
        emitted = diag.emitted,
        "检测器运行完成"
    );

    (recommendations, diag)
}
