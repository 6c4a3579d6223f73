// ==========================================
// 门店聚类对标推荐系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型,转换Repository错误为用户友好的错误消息
// 红线合规: 可解释性(所有错误信息必须包含显式原因)
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 结构性输入错误(致命,不得用默认值顶替)
    // ==========================================
    #[error("必需输入缺失: {0}")]
    MissingInput(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 流水线错误
    // ==========================================
    #[error("分析流水线执行失败: {0}")]
    PipelineError(String),

    #[error("结果导出失败: {0}")]
    ExportError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 结构性错误保留原语义,调用方据此中止而非降级
            RepositoryError::MissingInputTable { table } => {
                ApiError::MissingInput(format!("输入表 {} 不存在", table))
            }
            RepositoryError::MissingColumn { table, column } => {
                ApiError::MissingInput(format!("表 {} 缺少必需列 {}", table, column))
            }

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::ValidationError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::ValidationError(format!("外键约束违反: {}", msg))
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::ExportError(err.to_string())
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        ApiError::ExportError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        // 结构性缺失转换
        let repo_err = RepositoryError::MissingInputTable {
            table: "sales_fact".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::MissingInput(msg) => assert!(msg.contains("sales_fact")),
            _ => panic!("Expected MissingInput"),
        }

        // NotFound 转换
        let repo_err = RepositoryError::NotFound {
            entity: "RunRecord".to_string(),
            id: "R001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("RunRecord"));
                assert!(msg.contains("R001"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_error_message_includes_reason() {
        let err = ApiError::PipelineError("聚类分配表为空".to_string());
        assert!(err.to_string().contains("聚类分配表为空"));
    }
}
