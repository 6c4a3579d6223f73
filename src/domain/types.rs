// ==========================================
// 门店聚类对标推荐系统 - 领域类型定义
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART A2 红线
// 依据: Detector_Specs_v0.2_Integrated.md - 0.2 检测器体系
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 检测器类型 (Detector Kind)
// ==========================================
// 六类缺口检测器,共享同一状态机: 识别候选 → 计算差量 → 过滤分级
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectorKind {
    MissingAssortment,    // 缺品检测(同群热销而本店未铺)
    ImbalancedAllocation, // 铺货失衡检测(z-score 偏离群均值)
    BelowMinimum,         // 低于保底检测(动销低于固定保底率)
    Overcapacity,         // 超容检测(品类件数超出目标容量)
    MissedOpportunity,    // 销售机会流失检测(低于头部门店期望量)
    PerformanceGap,       // 业绩差距检测(低于群内头部分位基准)
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::MissingAssortment => write!(f, "MISSING_ASSORTMENT"),
            DetectorKind::ImbalancedAllocation => write!(f, "IMBALANCED_ALLOCATION"),
            DetectorKind::BelowMinimum => write!(f, "BELOW_MINIMUM"),
            DetectorKind::Overcapacity => write!(f, "OVERCAPACITY"),
            DetectorKind::MissedOpportunity => write!(f, "MISSED_OPPORTUNITY"),
            DetectorKind::PerformanceGap => write!(f, "PERFORMANCE_GAP"),
        }
    }
}

impl DetectorKind {
    /// 全部检测器,按流水线执行顺序
    pub fn all() -> [DetectorKind; 6] {
        [
            DetectorKind::MissingAssortment,
            DetectorKind::ImbalancedAllocation,
            DetectorKind::BelowMinimum,
            DetectorKind::Overcapacity,
            DetectorKind::MissedOpportunity,
            DetectorKind::PerformanceGap,
        ]
    }

    /// 从字符串解析检测器类型(大小写不敏感,兼容 CLI 短名)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "MISSING_ASSORTMENT" | "MISSING" => Some(DetectorKind::MissingAssortment),
            "IMBALANCED_ALLOCATION" | "IMBALANCE" => Some(DetectorKind::ImbalancedAllocation),
            "BELOW_MINIMUM" | "BELOW_MIN" => Some(DetectorKind::BelowMinimum),
            "OVERCAPACITY" | "OVERCAP" => Some(DetectorKind::Overcapacity),
            "MISSED_OPPORTUNITY" | "MISSED" => Some(DetectorKind::MissedOpportunity),
            "PERFORMANCE_GAP" | "PERF_GAP" => Some(DetectorKind::PerformanceGap),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DetectorKind::MissingAssortment => "MISSING_ASSORTMENT",
            DetectorKind::ImbalancedAllocation => "IMBALANCED_ALLOCATION",
            DetectorKind::BelowMinimum => "BELOW_MINIMUM",
            DetectorKind::Overcapacity => "OVERCAPACITY",
            DetectorKind::MissedOpportunity => "MISSED_OPPORTUNITY",
            DetectorKind::PerformanceGap => "PERFORMANCE_GAP",
        }
    }

    /// 中文名称(用于运行报告)
    pub fn label_cn(&self) -> &'static str {
        match self {
            DetectorKind::MissingAssortment => "缺品检测",
            DetectorKind::ImbalancedAllocation => "铺货失衡检测",
            DetectorKind::BelowMinimum => "低于保底检测",
            DetectorKind::Overcapacity => "超容检测",
            DetectorKind::MissedOpportunity => "销售机会流失检测",
            DetectorKind::PerformanceGap => "业绩差距检测",
        }
    }

    /// 旧版结果表使用的检测器短代码(遗留文件名/表名兼容)
    pub fn legacy_code(&self) -> &'static str {
        match self {
            DetectorKind::MissingAssortment => "missing",
            DetectorKind::ImbalancedAllocation => "imbalance",
            DetectorKind::BelowMinimum => "below_min",
            DetectorKind::Overcapacity => "overcap",
            DetectorKind::MissedOpportunity => "missed_opp",
            DetectorKind::PerformanceGap => "perf_gap",
        }
    }
}

// ==========================================
// 严重程度分层 (Severity Tier)
// ==========================================
// 红线: 等级制,不是评分制
// 顺序: Low < Medium < High (截断排序依赖该顺序)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityTier {
    Low,    // 低(轻微偏离)
    Medium, // 中(显著偏离)
    High,   // 高(严重偏离,优先处理)
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeverityTier::Low => write!(f, "LOW"),
            SeverityTier::Medium => write!(f, "MEDIUM"),
            SeverityTier::High => write!(f, "HIGH"),
        }
    }
}

impl SeverityTier {
    /// 从字符串解析严重程度
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LOW" => Some(SeverityTier::Low),
            "MEDIUM" => Some(SeverityTier::Medium),
            "HIGH" => Some(SeverityTier::High),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SeverityTier::Low => "LOW",
            SeverityTier::Medium => "MEDIUM",
            SeverityTier::High => "HIGH",
        }
    }
}

// ==========================================
// 合规状态 (Compliance Status)
// ==========================================
// 依据: Detector_Specs 4.4 合规闸门契约
// 红线: 闸门不可用 ⇒ Unknown,不得伪造 Approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Approved, // 闸门预测可执行
    Rejected, // 闸门预测不可执行
    Unknown,  // 闸门不可用/未评估
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Approved => write!(f, "APPROVED"),
            ComplianceStatus::Rejected => write!(f, "REJECTED"),
            ComplianceStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ComplianceStatus {
    /// 从字符串解析合规状态(未知值回落 Unknown)
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "APPROVED" => ComplianceStatus::Approved,
            "REJECTED" => ComplianceStatus::Rejected,
            _ => ComplianceStatus::Unknown,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Approved => "APPROVED",
            ComplianceStatus::Rejected => "REJECTED",
            ComplianceStatus::Unknown => "UNKNOWN",
        }
    }
}

// ==========================================
// 连接严格度 (Join Mode)
// ==========================================
// 销售事实与聚类分配的连接方式,作为基准计算器的共享参数
// Inclusive: 未匹配门店保留并计入诊断; Strict: 进入候选前剔除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinMode {
    Inclusive, // 宽松连接(左连接语义)
    Strict,    // 严格连接(内连接语义)
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinMode::Inclusive => write!(f, "INCLUSIVE"),
            JoinMode::Strict => write!(f, "STRICT"),
        }
    }
}

impl JoinMode {
    /// 从字符串解析连接严格度
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "STRICT" => JoinMode::Strict,
            _ => JoinMode::Inclusive, // 默认值
        }
    }
}

// ==========================================
// 对标粒度 (Granularity)
// ==========================================
// 品类族检测器的分组粒度; 单品族检测器始终使用 SPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Category,    // 品类粒度
    Subcategory, // 子类粒度
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Category => write!(f, "CATEGORY"),
            Granularity::Subcategory => write!(f, "SUBCATEGORY"),
        }
    }
}

impl Granularity {
    /// 从字符串解析对标粒度(兼容 CLI 短名)
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SUBCATEGORY" | "SUBCAT" => Granularity::Subcategory,
            _ => Granularity::Category, // 默认值
        }
    }
}
