// ==========================================
// 门店聚类对标推荐系统 - 日志初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 批处理 CLI 场景: 输出面向终端操作员,默认压低三方库噪音
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 未设置 RUST_LOG 时的默认过滤指令
///
/// 本 crate 记到 info,三方库(rusqlite/calamine 等)只记 warn 以上
const DEFAULT_DIRECTIVES: &str = "warn,retail_reco_dss=info";

/// 初始化日志系统(二进制入口调用一次)
///
/// # 环境变量
/// - RUST_LOG: 覆盖默认过滤器
///   例如: RUST_LOG=retail_reco_dss=debug 可查看检测器逐步诊断
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    // 批处理输出不带行号,保留模块路径便于定位检测器
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

/// 初始化测试环境的日志系统
///
/// 默认本 crate debug 级;失败用例可通过 RUST_LOG 进一步放开
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("retail_reco_dss=debug"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
