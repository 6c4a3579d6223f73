// ==========================================
// 门店聚类对标推荐系统 - 分析流水线编排器
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 分析主流程
// 用途: 协调六检测器与合并器的执行顺序、诊断落库与运行登记
// 红线: 单个检测器落库失败不废整轮;输入面结构性错误才中止;
//       季节因子缺失降级为 1.0 并告警,不得中止
// ==========================================

use crate::config::param_reader::ParamReader;
use crate::config::params::RecoParams;
use crate::domain::consolidated::{ConsolidatedLineItem, StoreRollup};
use crate::domain::types::{DetectorKind, Granularity, JoinMode};
use crate::domain::violation::{Recommendation, RunDiagnostics, StoreSummary};
use crate::engine::aggregator::ResultAggregator;
use crate::engine::consolidator::ResultConsolidator;
use crate::engine::detectors::{
    run_gap_detector, BelowMinimumDetector, DetectorContext, ImbalanceDetector,
    MissedOpportunityDetector, MissingAssortmentDetector, OvercapacityDetector,
    PerformanceGapDetector,
};
use crate::engine::gate::ComplianceGate;
use crate::repository::cluster_repo::ClusterRepository;
use crate::repository::reco_repo::RecoRepository;
use crate::repository::run_repo::RunLogRepository;
use crate::repository::sales_repo::SalesRepository;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// RunOptions - 运行选项
// ==========================================
// 用途: CLI/API 对参数面的逐次覆写(不落 config_kv)
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 要运行的检测器(空 = 全部六个)
    pub detectors: Vec<DetectorKind>,
    /// 覆写品类族对标粒度
    pub granularity: Option<Granularity>,
    /// 覆写销量×聚类连接口径
    pub join_mode: Option<JoinMode>,
}

// ==========================================
// AnalysisOutcome - 分析结果
// ==========================================
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub run_id: String,
    pub period: String,

    // 逐检测器输出
    pub recommendations: BTreeMap<DetectorKind, Vec<Recommendation>>,
    pub diagnostics: Vec<RunDiagnostics>,

    // 合并器输出
    pub consolidated_lines: Vec<ConsolidatedLineItem>,
    pub store_rollups: Vec<StoreRollup>,

    // 落库失败的检测器(检测本身不失败,失败发生在持久化)
    pub failed_detectors: Vec<(DetectorKind, String)>,
}

// ==========================================
// RecoOrchestrator - 分析流水线编排器
// ==========================================
pub struct RecoOrchestrator<C>
where
    C: ParamReader,
{
    conn: Arc<Mutex<Connection>>,
    config: Arc<C>,
    gate: Arc<dyn ComplianceGate>,
}

impl<C> RecoOrchestrator<C>
where
    C: ParamReader,
{
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - conn: 共享数据库连接
    /// - config: 参数读取器
    /// - gate: 合规闸门实现(不可用时传 NullComplianceGate)
    pub fn new(conn: Arc<Mutex<Connection>>, config: Arc<C>, gate: Arc<dyn ComplianceGate>) -> Self {
        Self { conn, config, gate }
    }

    /// 执行完整分析流水线(单报告期)
    ///
    /// # 参数
    /// - period: 报告期(YYYYMM)
    /// - options: 逐次运行覆写
    ///
    /// # 返回
    /// 分析结果(全部中间产物已落库)
    #[instrument(skip(self, options), fields(period = %period))]
    pub async fn run_full_analysis(
        &self,
        period: &str,
        options: &RunOptions,
    ) -> Result<AnalysisOutcome, Box<dyn Error>> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        info!(run_id = %run_id, period = %period, "开始执行分析流水线");

        // ==========================================
        // 步骤1: 参数快照与运行登记
        // ==========================================
        debug!("步骤1: 加载参数并登记运行");

        let mut params = self.config.load_params().await?;
        apply_overrides(&mut params, options);
        let snapshot = self.config.get_config_snapshot().await?;

        let run_repo = RunLogRepository::from_connection(Arc::clone(&self.conn));
        run_repo.insert_run_start(&run_id, period, started_at, &snapshot)?;

        // ==========================================
        // 步骤2: 加载输入面
        // ==========================================
        debug!("步骤2: 加载销量与聚类输入面");

        let sales_repo = SalesRepository::from_connection(Arc::clone(&self.conn));
        let cluster_repo = ClusterRepository::from_connection(Arc::clone(&self.conn));

        let sales = sales_repo.load_by_period(period)?;
        let clusters = cluster_repo.load_lookup(period)?;

        if sales.is_empty() {
            warn!(period = %period, "该报告期无销量行,流水线将产出空结果");
        }
        if clusters.is_empty() {
            warn!(period = %period, "该报告期无聚类分配,全部销量行将视为未匹配");
        }

        // 季节因子为可选增强面,缺表降级为全 1.0
        let seasonal = sales_repo.load_seasonal_factors(period)?;
        if seasonal.is_none() {
            warn!(period = %period, "季节因子表不存在,全品类按 1.0 降级");
        }

        info!(
            sales_rows = sales.len(),
            stores_assigned = clusters.store_count(),
            clusters = clusters.cluster_ids().count(),
            "输入面加载完成"
        );

        // ==========================================
        // 步骤3: 逐检测器执行(三阶段状态机)
        // ==========================================
        debug!("步骤3: 执行检测器");

        let ctx = DetectorContext {
            period,
            sales: &sales,
            clusters: &clusters,
            seasonal: seasonal.as_ref(),
            params: &params,
        };

        let to_run: Vec<DetectorKind> = if options.detectors.is_empty() {
            DetectorKind::all().to_vec()
        } else {
            options.detectors.clone()
        };

        let reco_repo = RecoRepository::from_connection(Arc::clone(&self.conn));
        let aggregator = ResultAggregator::new();

        let mut recommendations = BTreeMap::new();
        let mut diagnostics = Vec::new();
        let mut failed_detectors = Vec::new();
        let mut succeeded: Vec<DetectorKind> = Vec::new();

        for kind in &to_run {
            let (recos, diag) = self.dispatch_detector(*kind, &ctx);

            // 落库失败只隔离该检测器,其余继续
            let persisted = reco_repo
                .replace_detail(*kind, period, &recos)
                .and_then(|_| {
                    let summaries = aggregator.summarize(&recos, period);
                    reco_repo.replace_store_summaries(*kind, period, &summaries)
                })
                .and_then(|_| run_repo.save_diagnostics(&run_id, &diag));

            match persisted {
                Ok(()) => {
                    succeeded.push(*kind);
                    recommendations.insert(*kind, recos);
                    diagnostics.push(diag);
                }
                Err(e) => {
                    error!(detector = %kind, error = %e, "检测器结果落库失败,跳过该检测器");
                    failed_detectors.push((*kind, e.to_string()));
                }
            }
        }

        // ==========================================
        // 步骤4: 合并器(跨检测器去重与防重计)
        // ==========================================
        debug!("步骤4: 执行结果合并");

        let subcat_lookup = build_subcat_lookup(&sales);
        let consolidator = ResultConsolidator::new(Arc::clone(&self.conn));
        let (consolidated_lines, store_rollups) =
            consolidator.consolidate(period, &clusters, &subcat_lookup)?;

        // ==========================================
        // 步骤5: 运行收尾登记
        // ==========================================
        debug!("步骤5: 登记运行结束");

        let detectors_run = succeeded
            .iter()
            .map(|k| k.to_db_str())
            .collect::<Vec<_>>()
            .join(";");
        let notes = if failed_detectors.is_empty() {
            String::new()
        } else {
            failed_detectors
                .iter()
                .map(|(k, e)| format!("{}: {}", k.to_db_str(), e))
                .collect::<Vec<_>>()
                .join("; ")
        };
        run_repo.finish_run(&run_id, Utc::now(), &detectors_run, &notes)?;

        info!(
            run_id = %run_id,
            detectors_ok = succeeded.len(),
            detectors_failed = failed_detectors.len(),
            consolidated_lines = consolidated_lines.len(),
            "分析流水线执行完成"
        );

        Ok(AnalysisOutcome {
            run_id,
            period: period.to_string(),
            recommendations,
            diagnostics,
            consolidated_lines,
            store_rollups,
            failed_detectors,
        })
    }

    /// 按检测器类型分发执行
    ///
    /// GapDetector 带关联类型,无法对象化,此处静态分发
    fn dispatch_detector(
        &self,
        kind: DetectorKind,
        ctx: &DetectorContext<'_>,
    ) -> (Vec<Recommendation>, RunDiagnostics) {
        let gate = self.gate.as_ref();
        match kind {
            DetectorKind::MissingAssortment => {
                run_gap_detector(&MissingAssortmentDetector::new(), ctx, gate)
            }
            DetectorKind::ImbalancedAllocation => {
                run_gap_detector(&ImbalanceDetector::new(), ctx, gate)
            }
            DetectorKind::BelowMinimum => run_gap_detector(&BelowMinimumDetector::new(), ctx, gate),
            DetectorKind::Overcapacity => run_gap_detector(&OvercapacityDetector::new(), ctx, gate),
            DetectorKind::MissedOpportunity => {
                run_gap_detector(&MissedOpportunityDetector::new(), ctx, gate)
            }
            DetectorKind::PerformanceGap => {
                run_gap_detector(&PerformanceGapDetector::new(), ctx, gate)
            }
        }
    }
}

/// 应用逐次运行覆写
fn apply_overrides(params: &mut RecoParams, options: &RunOptions) {
    if let Some(granularity) = options.granularity {
        params.shared.granularity = granularity;
    }
    if let Some(join_mode) = options.join_mode {
        params.shared.join_mode = join_mode;
    }
}

/// 单品 → 子类查找表(合并器左连接用,取自本期销量行)
fn build_subcat_lookup(sales: &[crate::domain::sales::SalesRecord]) -> BTreeMap<String, String> {
    let mut lookup = BTreeMap::new();
    for record in sales {
        if let (Some(spu), Some(subcat)) = (&record.spu_code, &record.subcat_code) {
            lookup
                .entry(spu.clone())
                .or_insert_with(|| subcat.clone());
        }
    }
    lookup
}
