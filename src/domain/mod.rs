// ==========================================
// 门店聚类对标推荐系统 - 领域模型层
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 依据: Detector_Specs_v0.2_Integrated.md - 主实体定义
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod consolidated;
pub mod quantity;
pub mod sales;
pub mod store;
pub mod types;
pub mod violation;

// 重导出核心类型
pub use consolidated::{ConsolidatedLineItem, StoreRollup};
pub use quantity::{Quantity, QuantityResolver};
pub use sales::{
    CategoryKey, DqLevel, DqReport, DqSummary, DqViolation, ImportBatch, ImportResult,
    RawClusterRecord, RawSalesRecord, SalesRecord,
};
pub use store::{ClusterAssignment, ClusterLookup};
pub use types::{
    ComplianceStatus, DetectorKind, Granularity, JoinMode, SeverityTier,
};
pub use violation::{Recommendation, RunDiagnostics, StoreSummary, Violation};
