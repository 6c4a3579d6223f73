// ==========================================
// 全流程端到端测试
// ==========================================
// 目标: 导入后数据 → AnalysisApi 全量分析 → 合并/汇总落库 → 运行报告
// 场景: 六店聚类,S006 为显著落后门店
// ==========================================


use retail_reco_dss::api::AnalysisApi;
use retail_reco_dss::config::ConfigManager;
use retail_reco_dss::domain::types::{ComplianceStatus, DetectorKind};
use retail_reco_dss::engine::{ComplianceGate, NullComplianceGate, RunOptions};
use retail_reco_dss::repository::{ConsolidatedRepository, RecoRepository, RunLogRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use test_helpers::{create_test_db, open_shared_connection, seed_standard_cluster_scenario};

fn make_api(
    conn: &std::sync::Arc<std::sync::Mutex<rusqlite::Connection>>,
) -> AnalysisApi<ConfigManager> {
    let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
    let gate: Arc<dyn ComplianceGate> = Arc::new(NullComplianceGate);
    AnalysisApi::new(conn.clone(), config, gate)
}

#[tokio::test]
async fn test_full_pipeline_end_to_end() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let conn = open_shared_connection(&db_path).unwrap();
    seed_standard_cluster_scenario(&conn);

    let api = make_api(&conn);
    let outcome = api
        .run_analysis("202506", &RunOptions::default())
        .await
        .unwrap();

    // 六个检测器全部跑完并留诊断
    assert_eq!(outcome.diagnostics.len(), 6);
    assert!(outcome.failed_detectors.is_empty());

    // 运行日志闭合
    let run_repo = RunLogRepository::from_connection(conn.clone());
    let record = run_repo.find_by_id(&outcome.run_id).unwrap().unwrap();
    assert!(record.finished_at.is_some());
    assert_eq!(
        record.detectors_run.as_deref().map(|s| s.split(';').count()),
        Some(6)
    );

    // 落后门店 S006 至少被一个检测器点名
    let s006_hits: usize = outcome
        .recommendations
        .values()
        .flatten()
        .filter(|r| r.violation.store_code == "S006")
        .count();
    assert!(s006_hits > 0, "S006 应产生建议");

    // NullComplianceGate ⇒ 全部结论未知,且没有建议因闸门被丢弃
    for reco in outcome.recommendations.values().flatten() {
        assert_eq!(reco.violation.compliance, ComplianceStatus::Unknown);
        assert!(reco.violation.predicted_rate.is_none());
    }

    // 合并结果非空且 (门店, 行键) 唯一
    assert!(!outcome.consolidated_lines.is_empty());
    let mut seen = BTreeSet::new();
    for line in &outcome.consolidated_lines {
        assert!(
            seen.insert((line.store_code.clone(), line.line_key.clone())),
            "合并结果出现重复行键: {} {}",
            line.store_code,
            line.line_key
        );
        assert_eq!(line.period, "202506");
        // 所有门店都有聚类分配,左连接应全部补齐
        assert_eq!(line.cluster_id.as_deref(), Some("CL-01"));
    }

    // 合并落库与返回值一致
    let consolidated_repo = ConsolidatedRepository::from_connection(conn.clone());
    let persisted = consolidated_repo.load_detail("202506").unwrap();
    assert_eq!(persisted.len(), outcome.consolidated_lines.len());

    // 门店汇总包含 S006
    assert!(outcome
        .store_rollups
        .iter()
        .any(|r| r.store_code == "S006"));

    // 运行报告可读且含关键信息
    let report = api.get_run_report(&outcome.run_id).unwrap();
    assert!(report.contains(&outcome.run_id));
    assert!(report.contains("202506"));
}

#[tokio::test]
async fn test_single_detector_rerun_preserves_other_surfaces() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let conn = open_shared_connection(&db_path).unwrap();
    seed_standard_cluster_scenario(&conn);

    let api = make_api(&conn);
    let full = api
        .run_analysis("202506", &RunOptions::default())
        .await
        .unwrap();

    // 标准场景应至少有两个检测器产出建议(合并前口径,合并可能约减品类行)
    let firing: Vec<DetectorKind> = full
        .recommendations
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, _)| *k)
        .collect();
    assert!(firing.len() > 1, "标准场景应至少命中两个检测器,得到 {:?}", firing);

    let full_flags: BTreeSet<DetectorKind> = full
        .consolidated_lines
        .iter()
        .flat_map(|l| l.detector_flags.iter().copied())
        .collect();

    // 只重跑一个检测器:其余检测器的已落库结果仍参与重新合并
    let rerun = api
        .run_detector(DetectorKind::BelowMinimum, "202506", &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(rerun.diagnostics.len(), 1);

    let rerun_flags: BTreeSet<DetectorKind> = rerun
        .consolidated_lines
        .iter()
        .flat_map(|l| l.detector_flags.iter().copied())
        .collect();
    assert_eq!(
        rerun_flags, full_flags,
        "单检测器重跑后合并面应保留其它检测器的贡献"
    );
    assert_eq!(rerun.consolidated_lines.len(), full.consolidated_lines.len());
}

#[tokio::test]
async fn test_detail_surfaces_persisted_per_detector() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let conn = open_shared_connection(&db_path).unwrap();
    seed_standard_cluster_scenario(&conn);

    let api = make_api(&conn);
    let outcome = api
        .run_analysis("202506", &RunOptions::default())
        .await
        .unwrap();

    // 每个检测器的明细落库与内存产出一一对应
    let reco_repo = RecoRepository::from_connection(conn.clone());
    for kind in DetectorKind::all() {
        let in_memory = outcome.recommendations.get(&kind).map(Vec::len).unwrap_or(0);
        let persisted = reco_repo.load_detail(kind, "202506").unwrap();
        assert_eq!(
            persisted.len(),
            in_memory,
            "{} 的落库行数应与产出一致",
            kind
        );
    }

    // 门店内排名从 1 连续编号
    for recos in outcome.recommendations.values() {
        let mut by_store: std::collections::BTreeMap<&str, Vec<u32>> =
            std::collections::BTreeMap::new();
        for r in recos {
            by_store
                .entry(r.violation.store_code.as_str())
                .or_default()
                .push(r.rank_in_store);
        }
        for (store, mut ranks) in by_store {
            ranks.sort_unstable();
            let expect: Vec<u32> = (1..=ranks.len() as u32).collect();
            assert_eq!(ranks, expect, "{} 的排名应连续", store);
        }
    }
}

#[tokio::test]
async fn test_empty_period_produces_closed_run_without_output() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let conn = open_shared_connection(&db_path).unwrap();
    seed_standard_cluster_scenario(&conn);

    let api = make_api(&conn);
    // 另一个报告期没有任何数据:运行应正常闭合,产出为空
    let outcome = api
        .run_analysis("202401", &RunOptions::default())
        .await
        .unwrap();

    assert!(outcome.recommendations.values().all(|v| v.is_empty()));
    assert!(outcome.consolidated_lines.is_empty());
    assert!(outcome.store_rollups.is_empty());

    let run_repo = RunLogRepository::from_connection(conn);
    let record = run_repo.find_by_id(&outcome.run_id).unwrap().unwrap();
    assert!(record.finished_at.is_some());
}
