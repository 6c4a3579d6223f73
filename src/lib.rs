// ==========================================
// 门店聚类对标推荐系统 - 核心库
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - 系统宪法
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (推荐建议,人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ComplianceStatus, DetectorKind, Granularity, JoinMode, SeverityTier,
};

// 领域实体
pub use domain::{
    CategoryKey, ClusterAssignment, ClusterLookup, ConsolidatedLineItem, Quantity,
    Recommendation, RunDiagnostics, SalesRecord, StoreRollup, StoreSummary, Violation,
};

// 引擎
pub use engine::{
    AnalysisOutcome, ComplianceGate, HistoryComplianceGate, NullComplianceGate,
    PeerBenchmarkCalculator, PerStoreCapper, RecoOrchestrator, ResultAggregator,
    ResultConsolidator, RunOptions,
};

// 配置
pub use config::{ConfigManager, ParamReader, RecoParams};

// API
pub use api::{AnalysisApi, ApiError, ApiResult, ExportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "门店聚类对标推荐系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.2";
