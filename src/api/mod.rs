// ==========================================
// 门店聚类对标推荐系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 CLI 入口调用
// ==========================================

pub mod error;
pub mod analysis_api;
pub mod export_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use analysis_api::AnalysisApi;
pub use export_api::ExportApi;
