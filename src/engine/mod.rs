// ==========================================
// 门店聚类对标推荐系统 - 引擎层
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART D 引擎铁律
// 依据: Detector_Specs_v0.2_Integrated.md - 1. 总体架构
// ==========================================
// 职责: 对标统计、六检测器、闸门、截断、合并、汇总与编排
// 红线: Engine 不拼 SQL;检测器只消费真实销量,金额禁止折算件数;
//       所有建议必须输出 reason
// ==========================================

pub mod aggregator;
pub mod benchmark;
pub mod capper;
pub mod consolidator;
pub mod detectors;
pub mod gate;
pub mod orchestrator;

// 重导出核心引擎
pub use aggregator::ResultAggregator;
pub use benchmark::PeerBenchmarkCalculator;
pub use capper::PerStoreCapper;
pub use consolidator::ResultConsolidator;
pub use detectors::{
    run_gap_detector, BelowMinimumDetector, DetectorContext, GapDetector, ImbalanceDetector,
    MissedOpportunityDetector, MissingAssortmentDetector, OvercapacityDetector,
    PerformanceGapDetector,
};
pub use gate::{ComplianceGate, GateDecision, HistoryComplianceGate, NullComplianceGate};
pub use orchestrator::{AnalysisOutcome, RecoOrchestrator, RunOptions};
