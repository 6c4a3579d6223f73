// ==========================================
// 门店聚类对标推荐系统 - 数据仓储层
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART D 引擎铁律
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod cluster_repo;
pub mod compliance_repo;
pub mod consolidated_repo;
pub mod error;
pub mod import_repo;
pub mod reco_repo;
pub mod run_repo;
pub mod sales_repo;
pub mod schema;

// 重导出核心仓储
pub use cluster_repo::{ClusterAssignmentRow, ClusterRepository};
pub use compliance_repo::{ComplianceRepository, ExecHistory};
pub use consolidated_repo::ConsolidatedRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_repo::ImportBatchRepository;
pub use reco_repo::{LegacyRecoRow, RecoRepository};
pub use run_repo::{RunLogRepository, RunRecord};
pub use sales_repo::SalesRepository;
pub use schema::{column_exists, init_schema, table_exists, SCHEMA_VERSION};
