// ==========================================
// 门店聚类对标推荐系统 - 配置层
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 11. 配置项全集
// ==========================================
// 职责: 参数集中定义与 config_kv 覆写
// 存储: config_kv 表 (scope_id='global')
// ==========================================

pub mod config_manager;
pub mod param_reader;
pub mod params;

// 重导出核心配置类型
pub use config_manager::{sections, ConfigManager};
pub use param_reader::ParamReader;
pub use params::{
    BelowMinimumParams, GateParams, ImbalanceParams, MissedOpportunityParams,
    MissingAssortmentParams, OvercapacityParams, PerformanceGapParams, RecoParams, SharedPolicy,
};
