// ==========================================
// 门店聚类对标推荐系统 - 参数读取 Trait
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART E 工程结构
// 职责: 定义分析流水线所需的参数读取接口(不包含实现)
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::params::RecoParams;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ParamReader Trait
// ==========================================
// 用途: 流水线/检测器所需的参数读取接口
// 实现者: ConfigManager(从 config_kv 表叠加覆写)
#[async_trait]
pub trait ParamReader: Send + Sync {
    /// 加载全量参数集(出厂默认 + config_kv 覆写)
    ///
    /// # 返回
    /// - RecoParams: 本次运行的参数快照
    async fn load_params(&self) -> Result<RecoParams, Box<dyn Error>>;

    /// 获取配置快照 JSON(记入 run_log,保证运行可追溯)
    async fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>>;
}
