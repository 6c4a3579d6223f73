// ==========================================
// 门店聚类对标推荐系统 - 批处理主入口
// ==========================================
// 依据: Reco_Dev_Master_Spec.md
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统(批处理 CLI,无交互界面)
// ==========================================

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use retail_reco_dss::api::{AnalysisApi, ExportApi};
use retail_reco_dss::config::{ConfigManager, ParamReader};
use retail_reco_dss::db::{open_sqlite_connection, warn_on_version_drift};
use retail_reco_dss::domain::types::{DetectorKind, Granularity, JoinMode};
use retail_reco_dss::engine::{ComplianceGate, HistoryComplianceGate, RunOptions};
use retail_reco_dss::importer::{ClusterImporter, SalesImporter};
use retail_reco_dss::logging;
use retail_reco_dss::repository::{init_schema, ComplianceRepository};
use rusqlite::Connection;
use tracing::{error, info};

// ==========================================
// 命令行参数
// ==========================================

/// 解析后的 CLI 命令
#[derive(Debug)]
enum Command {
    /// 全量/子集分析: retail-reco-dss <期间> [选项]
    Run {
        period: String,
        options: RunOptions,
        out_dir: PathBuf,
        db_path: String,
    },
    /// 导入销售数据: retail-reco-dss import-sales <文件>
    ImportSales { file: PathBuf, db_path: String },
    /// 导入聚类分配: retail-reco-dss import-clusters <文件>
    ImportClusters { file: PathBuf, db_path: String },
    /// 查看运行报告: retail-reco-dss report <run_id>
    Report { run_id: String, db_path: String },
}

/// 默认数据库路径
///
/// 优先级: RETAIL_RECO_DSS_DB_PATH 环境变量 > 用户数据目录 > 当前目录回退
fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("RETAIL_RECO_DSS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./retail_reco_dss.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("retail-reco-dss");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("retail_reco_dss.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn print_usage() {
    eprintln!("{} v{}", retail_reco_dss::APP_NAME, retail_reco_dss::VERSION);
    eprintln!();
    eprintln!("用法:");
    eprintln!("  retail-reco-dss <期间YYYYMM> [--granularity=cat|subcat] [--join=inclusive|strict]");
    eprintln!("                  [--detectors=missing,imbalance,below_min,overcap,missed,perf_gap]");
    eprintln!("                  [--out=目录] [--db=路径]");
    eprintln!("  retail-reco-dss import-sales <文件.csv|.xlsx> [--db=路径]");
    eprintln!("  retail-reco-dss import-clusters <文件.csv|.xlsx> [--db=路径]");
    eprintln!("  retail-reco-dss report <run_id> [--db=路径]");
    eprintln!();
    eprintln!("环境变量:");
    eprintln!("  RETAIL_RECO_DSS_DB_PATH  数据库路径(未显式传 --db 时生效)");
    eprintln!("  RUST_LOG                 日志级别过滤器(默认 info)");
}

/// 解析命令行参数(不含程序名)
fn parse_args(args: &[String]) -> Result<Command, String> {
    let first = args.first().ok_or_else(|| "缺少命令或期间参数".to_string())?;

    let mut db_path = get_default_db_path();

    match first.as_str() {
        "import-sales" | "import-clusters" => {
            let file = args
                .get(1)
                .filter(|s| !s.starts_with("--"))
                .ok_or_else(|| format!("{} 需要文件路径参数", first))?;
            for arg in &args[2..] {
                if let Some(v) = arg.strip_prefix("--db=") {
                    db_path = v.to_string();
                } else {
                    return Err(format!("未知参数: {}", arg));
                }
            }
            let file = PathBuf::from(file);
            if first == "import-sales" {
                Ok(Command::ImportSales { file, db_path })
            } else {
                Ok(Command::ImportClusters { file, db_path })
            }
        }
        "report" => {
            let run_id = args
                .get(1)
                .filter(|s| !s.starts_with("--"))
                .ok_or_else(|| "report 需要 run_id 参数".to_string())?;
            for arg in &args[2..] {
                if let Some(v) = arg.strip_prefix("--db=") {
                    db_path = v.to_string();
                } else {
                    return Err(format!("未知参数: {}", arg));
                }
            }
            Ok(Command::Report {
                run_id: run_id.to_string(),
                db_path,
            })
        }
        period => {
            if period.starts_with("--") {
                return Err(format!("期间参数必须是第一个位置参数,收到: {}", period));
            }

            let mut options = RunOptions::default();
            let mut out_dir = PathBuf::from("./reco_out");

            for arg in &args[1..] {
                if let Some(v) = arg.strip_prefix("--granularity=") {
                    options.granularity = Some(Granularity::from_str(v));
                } else if let Some(v) = arg.strip_prefix("--join=") {
                    options.join_mode = Some(JoinMode::from_str(v));
                } else if let Some(v) = arg.strip_prefix("--detectors=") {
                    let mut kinds: Vec<DetectorKind> = Vec::new();
                    for name in v.split(',').filter(|s| !s.trim().is_empty()) {
                        let kind = DetectorKind::from_str(name.trim())
                            .ok_or_else(|| format!("未知检测器: {}", name))?;
                        if !kinds.contains(&kind) {
                            kinds.push(kind);
                        }
                    }
                    if kinds.is_empty() {
                        return Err("--detectors 至少需要一个检测器".to_string());
                    }
                    options.detectors = kinds;
                } else if let Some(v) = arg.strip_prefix("--out=") {
                    out_dir = PathBuf::from(v);
                } else if let Some(v) = arg.strip_prefix("--db=") {
                    db_path = v.to_string();
                } else {
                    return Err(format!("未知参数: {}", arg));
                }
            }

            Ok(Command::Run {
                period: period.to_string(),
                options,
                out_dir,
                db_path,
            })
        }
    }
}

// ==========================================
// 入口
// ==========================================

#[tokio::main]
async fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(msg) => {
            eprintln!("参数错误: {}", msg);
            eprintln!();
            print_usage();
            process::exit(2);
        }
    };

    info!("==================================================");
    info!("{}", retail_reco_dss::APP_NAME);
    info!("系统版本: {}", retail_reco_dss::VERSION);
    info!("==================================================");

    if let Err(e) = dispatch(command).await {
        error!(error = %e, "运行失败");
        eprintln!("运行失败: {}", e);
        process::exit(1);
    }
}

async fn dispatch(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Run {
            period,
            options,
            out_dir,
            db_path,
        } => run_analysis(&period, &options, &out_dir, &db_path).await,
        Command::ImportSales { file, db_path } => import_sales(&file, &db_path).await,
        Command::ImportClusters { file, db_path } => import_clusters(&file, &db_path).await,
        Command::Report { run_id, db_path } => show_report(&run_id, &db_path),
    }
}

/// 打开数据库并确保 schema 就绪
fn open_db(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    info!("使用数据库: {}", db_path);
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    warn_on_version_drift(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

// ==========================================
// 子命令: 全量分析 + 导出
// ==========================================
async fn run_analysis(
    period: &str,
    options: &RunOptions,
    out_dir: &PathBuf,
    db_path: &str,
) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;

    let config = Arc::new(ConfigManager::from_connection(conn.clone())?);

    // 合规闸门: 历史执行率闸门。历史表缺失/样本不足时闸门自行降级为"未知",不中断运行
    let gate_params = config.load_params().await?.gate;
    let gate: Arc<dyn ComplianceGate> = Arc::new(HistoryComplianceGate::new(
        ComplianceRepository::from_connection(conn.clone()),
        gate_params,
    ));

    let analysis_api = AnalysisApi::new(conn.clone(), config, gate);
    let outcome = analysis_api.run_analysis(period, options).await?;

    // 导出(明细/汇总/合并/报告,首选命名 + 兼容命名副本)
    let export_api = ExportApi::new(conn);
    let files = export_api.export_all(period, &outcome.run_id, out_dir)?;

    // 控制台摘要
    let reco_total: usize = outcome.recommendations.values().map(|v| v.len()).sum();
    println!("==================================================");
    println!("运行完成: {}", outcome.run_id);
    println!("期间: {}", outcome.period);
    println!(
        "建议明细: {} 条 / 合并后: {} 条",
        reco_total,
        outcome.consolidated_lines.len()
    );
    println!("涉及门店: {} 家", outcome.store_rollups.len());
    if !outcome.failed_detectors.is_empty() {
        println!(
            "落库失败检测器: {} 个(详见运行日志)",
            outcome.failed_detectors.len()
        );
    }
    println!("导出文件 {} 个 -> {}", files.len(), out_dir.display());
    for file in &files {
        println!("  {}", file.display());
    }
    println!("==================================================");
    println!();
    println!("{}", analysis_api.get_run_report(&outcome.run_id)?);

    // 部分检测器落库失败时以非零码退出,供批处理调度识别
    if !outcome.failed_detectors.is_empty() {
        process::exit(1);
    }
    Ok(())
}

// ==========================================
// 子命令: 数据导入
// ==========================================
async fn import_sales(file: &PathBuf, db_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;
    let importer = SalesImporter::new(conn);
    let result = importer.import_from_file(file).await?;
    print_import_summary(
        "销售数据",
        &result.batch.batch_id,
        &result.summary,
        result.elapsed_time,
    );
    Ok(())
}

async fn import_clusters(file: &PathBuf, db_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;
    let importer = ClusterImporter::new(conn);
    let result = importer.import_from_file(file).await?;
    print_import_summary(
        "聚类分配",
        &result.batch.batch_id,
        &result.summary,
        result.elapsed_time,
    );
    Ok(())
}

fn print_import_summary(
    label: &str,
    batch_id: &str,
    summary: &retail_reco_dss::domain::DqSummary,
    elapsed: std::time::Duration,
) {
    println!("{}导入完成: 批次 {}", label, batch_id);
    println!(
        "  总行数 {} / 成功 {} / 阻断 {} / 警告 {}",
        summary.total_rows, summary.success, summary.blocked, summary.warning
    );
    println!("  耗时 {:.2}s", elapsed.as_secs_f64());
}

// ==========================================
// 子命令: 运行报告
// ==========================================
fn show_report(run_id: &str, db_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;
    let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
    let gate: Arc<dyn ComplianceGate> = Arc::new(retail_reco_dss::engine::NullComplianceGate);
    let api = AnalysisApi::new(conn, config, gate);
    println!("{}", api.get_run_report(run_id)?);
    Ok(())
}
