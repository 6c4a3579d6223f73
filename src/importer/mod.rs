// ==========================================
// 门店聚类对标推荐系统 - 导入层
// ==========================================
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 导入管道
// ==========================================
// 职责: 外部数据导入,生成内部数据
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod cluster_importer;
pub mod dq_validator;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod sales_importer;

// 重导出核心类型
pub use cluster_importer::ClusterImporter;
pub use dq_validator::{generate_dq_report, ClusterDqValidator, SalesDqValidator};
pub use error::{ImportError, ImporterResult};
pub use field_mapper::{ClusterFieldMapper, SalesFieldMapper};
pub use file_parser::{CsvParser, ExcelParser, FileParser, UniversalFileParser};
pub use sales_importer::SalesImporter;
