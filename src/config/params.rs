// ==========================================
// 门店聚类对标推荐系统 - 检测器参数集
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 11. 配置项全集
// 红线: 引擎内不得出现魔法数字,全部阈值集中于此,
// 可经 config_kv 覆写(键方案 reco/<段>/<字段>)
// ==========================================

use crate::domain::types::{Granularity, JoinMode};
use serde::{Deserialize, Serialize};

// ==========================================
// SharedPolicy - 六检测器共享策略
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPolicy {
    /// 最小聚类规模(小于该规模的聚类整体跳过,不合并、不删除)
    pub min_cluster_stores: usize,
    /// 在售判定的动销金额下限(低于该销售额不算有效在售)
    pub min_sales_amt: f64,
    /// 最小推荐变化量(绝对值,低于则过滤)
    pub min_qty_change: i64,
    /// 默认毛利率(投资估算: delta × 单价 × (1 - 毛利率))
    pub default_margin_rate: f64,
    /// 销售事实与聚类分配的连接严格度
    pub join_mode: JoinMode,
    /// 品类族检测器的对标粒度
    pub granularity: Granularity,
}

impl Default for SharedPolicy {
    fn default() -> Self {
        SharedPolicy {
            min_cluster_stores: 5,
            min_sales_amt: 100.0,
            min_qty_change: 1,
            default_margin_rate: 0.35,
            join_mode: JoinMode::Inclusive,
            granularity: Granularity::Category,
        }
    }
}

// ==========================================
// MissingAssortmentParams - 缺品检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingAssortmentParams {
    /// 同群采纳率阈值(达到即视为"群内热销")
    pub adoption_rate_threshold: f64,
    /// 期望铺货量缩放系数(同群户均销量 × 系数)
    pub volume_scale: f64,
    /// 严重程度: 采纳率 ≥ 该值 ⇒ High
    pub severity_high_adoption: f64,
    /// 严重程度: 采纳率 ≥ 该值 ⇒ Medium(否则 Low)
    pub severity_medium_adoption: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for MissingAssortmentParams {
    fn default() -> Self {
        MissingAssortmentParams {
            adoption_rate_threshold: 0.8,
            volume_scale: 0.8,
            severity_high_adoption: 0.95,
            severity_medium_adoption: 0.88,
            max_reco_per_store: 10,
        }
    }
}

// ==========================================
// ImbalanceParams - 铺货失衡检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImbalanceParams {
    /// 候选入口: |z| ≥ 该值才构成失衡候选
    pub z_entry: f64,
    /// 严重程度: |z| ≥ 该值 ⇒ High
    pub severity_high_z: f64,
    /// 严重程度: |z| ≥ 该值 ⇒ Medium(否则 Low)
    pub severity_medium_z: f64,
    /// 单次调整上限(占当前值比例)
    pub max_adjust_pct: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for ImbalanceParams {
    fn default() -> Self {
        ImbalanceParams {
            z_entry: 1.5,
            severity_high_z: 3.0,
            severity_medium_z: 2.0,
            max_adjust_pct: 0.3,
            max_reco_per_store: 15,
        }
    }
}

// ==========================================
// BelowMinimumParams - 低于保底检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelowMinimumParams {
    /// 固定保底动销率(件/期,不依赖同群)
    pub min_monthly_units: f64,
    /// 严重程度: 观测率 < 保底 × 该值 ⇒ High
    pub severity_high_ratio: f64,
    /// 严重程度: 观测率 < 保底 × 该值 ⇒ Medium(否则 Low)
    pub severity_medium_ratio: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for BelowMinimumParams {
    fn default() -> Self {
        BelowMinimumParams {
            min_monthly_units: 2.0,
            severity_high_ratio: 0.4,
            severity_medium_ratio: 0.7,
            max_reco_per_store: 20,
        }
    }
}

// ==========================================
// OvercapacityParams - 超容检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvercapacityParams {
    /// 单次削减上限(占当前值比例)
    pub max_reduction_pct: f64,
    /// 严重程度: 超出比例 ≥ 该值 ⇒ High
    pub severity_high_excess: f64,
    /// 严重程度: 超出比例 ≥ 该值 ⇒ Medium(否则 Low)
    pub severity_medium_excess: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for OvercapacityParams {
    fn default() -> Self {
        OvercapacityParams {
            max_reduction_pct: 0.4,
            severity_high_excess: 0.5,
            severity_medium_excess: 0.25,
            max_reco_per_store: 15,
        }
    }
}

// ==========================================
// MissedOpportunityParams - 销售机会流失检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedOpportunityParams {
    /// 头部门店分位(0.2 = 取群内表现前 20% 作为期望来源)
    pub top_percentile: f64,
    /// 严重程度: 缺口占期望比例 ≥ 该值 ⇒ High
    pub severity_high_gap: f64,
    /// 严重程度: 缺口占期望比例 ≥ 该值 ⇒ Medium(否则 Low)
    pub severity_medium_gap: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for MissedOpportunityParams {
    fn default() -> Self {
        MissedOpportunityParams {
            top_percentile: 0.2,
            severity_high_gap: 0.5,
            severity_medium_gap: 0.3,
            max_reco_per_store: 10,
        }
    }
}

// ==========================================
// PerformanceGapParams - 业绩差距检测参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceGapParams {
    /// 头部分位(0.25 = 群内前四分之一的均值作为基准)
    pub top_quartile_pct: f64,
    /// z 值确认阈值(z ≤ -该值才确认差距,排除噪声)
    pub z_confirm: f64,
    /// 单次提升上限(占当前值比例)
    pub max_increase_pct: f64,
    /// 严重程度: 缺口占基准比例 ≥ 该值 ⇒ High
    pub severity_high_gap: f64,
    /// 严重程度: 缺口占基准比例 ≥ 该值 ⇒ Medium(否则 Low)
    pub severity_medium_gap: f64,
    /// 单店推荐上限
    pub max_reco_per_store: usize,
}

impl Default for PerformanceGapParams {
    fn default() -> Self {
        PerformanceGapParams {
            top_quartile_pct: 0.25,
            z_confirm: 1.0,
            max_increase_pct: 0.5,
            severity_high_gap: 0.5,
            severity_medium_gap: 0.3,
            max_reco_per_store: 10,
        }
    }
}

// ==========================================
// GateParams - 合规闸门参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateParams {
    /// 预测执行率 ≥ 该值 ⇒ Approved
    pub approve_threshold: f64,
    /// 变化幅度衰减系数(幅度越大,预测执行率衰减越多)
    pub change_dampening: f64,
    /// 最小样本量(历史样本低于该值 ⇒ Unknown,不预测)
    pub min_sample_size: i64,
}

impl Default for GateParams {
    fn default() -> Self {
        GateParams {
            approve_threshold: 0.6,
            change_dampening: 0.5,
            min_sample_size: 3,
        }
    }
}

// ==========================================
// RecoParams - 全量参数集
// ==========================================
// 一次运行的完整参数快照; Default 即出厂默认,
// ConfigManager 负责叠加 config_kv 覆写
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoParams {
    pub shared: SharedPolicy,
    pub missing_assortment: MissingAssortmentParams,
    pub imbalance: ImbalanceParams,
    pub below_minimum: BelowMinimumParams,
    pub overcapacity: OvercapacityParams,
    pub missed_opportunity: MissedOpportunityParams,
    pub performance_gap: PerformanceGapParams,
    pub gate: GateParams,
}
