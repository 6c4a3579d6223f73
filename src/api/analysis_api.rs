// ==========================================
// 门店聚类对标推荐系统 - 分析 API
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART E 工程结构
// 职责: 封装分析流水线入口,校验入参,查询运行产物
// 架构: API 层 → Engine 层 (RecoOrchestrator) → Repository 层
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ParamReader;
use crate::domain::types::DetectorKind;
use crate::domain::violation::StoreSummary;
use crate::engine::aggregator::ResultAggregator;
use crate::engine::gate::ComplianceGate;
use crate::engine::orchestrator::{AnalysisOutcome, RecoOrchestrator, RunOptions};
use crate::repository::reco_repo::RecoRepository;
use crate::repository::run_repo::RunLogRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// AnalysisApi - 分析 API
// ==========================================
pub struct AnalysisApi<C>
where
    C: ParamReader,
{
    conn: Arc<Mutex<Connection>>,
    orchestrator: RecoOrchestrator<C>,
}

impl<C> AnalysisApi<C>
where
    C: ParamReader,
{
    /// 创建新的 AnalysisApi 实例
    ///
    /// # 参数
    /// - conn: 共享数据库连接
    /// - config: 参数读取器
    /// - gate: 合规闸门实现
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<C>, gate: Arc<dyn ComplianceGate>) -> Self {
        let orchestrator = RecoOrchestrator::new(Arc::clone(&conn), config, gate);
        Self { conn, orchestrator }
    }

    /// 执行完整分析流水线(六检测器 + 合并器)
    ///
    /// # 参数
    /// - period: 报告期(YYYYMM)
    /// - options: 逐次运行覆写
    pub async fn run_analysis(
        &self,
        period: &str,
        options: &RunOptions,
    ) -> ApiResult<AnalysisOutcome> {
        validate_period(period)?;
        self.orchestrator
            .run_full_analysis(period, options)
            .await
            .map_err(|e| ApiError::PipelineError(e.to_string()))
    }

    /// 单检测器重跑(随后仍执行合并器,落库面与全量运行一致)
    ///
    /// # 说明
    /// - 合并器读取的是持久化面,其余检测器上一次的产出仍参与合并
    pub async fn run_detector(
        &self,
        kind: DetectorKind,
        period: &str,
        options: &RunOptions,
    ) -> ApiResult<AnalysisOutcome> {
        validate_period(period)?;
        let mut opts = options.clone();
        opts.detectors = vec![kind];
        self.orchestrator
            .run_full_analysis(period, &opts)
            .await
            .map_err(|e| ApiError::PipelineError(e.to_string()))
    }

    /// 查询某报告期的门店汇总(跨检测器)
    pub fn get_store_summaries(&self, period: &str) -> ApiResult<Vec<StoreSummary>> {
        validate_period(period)?;
        let repo = RecoRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.load_store_summaries(period)?)
    }

    /// 渲染某次运行的人读报告
    ///
    /// # 返回
    /// - Ok(String): 中文运行报告(逐检测器漏斗计数)
    /// - Err(NotFound): run_id 无对应运行记录
    pub fn get_run_report(&self, run_id: &str) -> ApiResult<String> {
        if run_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("运行ID不能为空".to_string()));
        }

        let run_repo = RunLogRepository::from_connection(Arc::clone(&self.conn));
        let record = run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("运行记录(run_id={})不存在", run_id)))?;
        let diagnostics = run_repo.load_diagnostics(run_id)?;

        let aggregator = ResultAggregator::new();
        Ok(aggregator.render_run_report(run_id, &record.period, &diagnostics))
    }
}

/// 校验报告期格式(YYYYMM)
fn validate_period(period: &str) -> ApiResult<()> {
    if period.len() != 6 || !period.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::InvalidInput(format!(
            "报告期格式应为 YYYYMM: {}",
            period
        )));
    }
    let month: u32 = period[4..6].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return Err(ApiError::InvalidInput(format!(
            "报告期月份非法: {}",
            period
        )));
    }
    Ok(())
}
