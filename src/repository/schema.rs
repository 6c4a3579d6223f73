// ==========================================
// 门店聚类对标推荐系统 - 数据库模式
// ==========================================
// 依据: schema_v0.1.sql + v0.2_importer_schema.sql 合并口径
// 职责: 建表 DDL 与 init_schema 入口(生产与测试共用)
// 红线: cluster_assignment 双列(cluster_id/group_id)恒齐备;
// sales_fact 销量列可 NULL,NULL 即"未定义",不得以 0 落库
// ==========================================

use crate::repository::error::RepositoryResult;
use rusqlite::Connection;

/// 当前 schema 版本(v2: 新增 reco_detail 首选明细表,保留 v1 的 reco_result 遗留表)
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA_DDL: &str = r#"
-- ===== 版本与配置 =====
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 输入事实(导入层写入,引擎层只读) =====
CREATE TABLE IF NOT EXISTS cluster_assignment (
    store_code TEXT NOT NULL,
    cluster_id TEXT NOT NULL,
    group_id   TEXT NOT NULL,
    period     TEXT NOT NULL,
    imported_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_code, period)
);

CREATE TABLE IF NOT EXISTS sales_fact (
    store_code  TEXT NOT NULL,
    cat_code    TEXT NOT NULL,
    subcat_code TEXT,
    spu_code    TEXT,
    period      TEXT NOT NULL,
    sales_amt   REAL NOT NULL,
    total_qty   REAL,
    base_qty    REAL,
    promo_qty   REAL,
    ship_qty    REAL,
    imported_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sales_fact_key
    ON sales_fact(store_code, cat_code, ifnull(subcat_code,''), ifnull(spu_code,''), period);

CREATE INDEX IF NOT EXISTS idx_sales_fact_period ON sales_fact(period);

-- 可选增强源: 季节因子(缺表/缺行 ⇒ 降级按 1.0 继续)
CREATE TABLE IF NOT EXISTS seasonal_factor (
    cat_code TEXT NOT NULL,
    period   TEXT NOT NULL,
    factor   REAL NOT NULL,
    PRIMARY KEY (cat_code, period)
);

-- 可选增强源: 历史执行率(合规闸门数据基础)
CREATE TABLE IF NOT EXISTS compliance_history (
    store_code  TEXT PRIMARY KEY,
    exec_rate   REAL NOT NULL,
    sample_size INTEGER NOT NULL
);

-- ===== 导入批次 =====
CREATE TABLE IF NOT EXISTS import_batch (
    batch_id       TEXT PRIMARY KEY,
    file_name      TEXT,
    total_rows     INTEGER NOT NULL DEFAULT 0,
    success_rows   INTEGER NOT NULL DEFAULT 0,
    blocked_rows   INTEGER NOT NULL DEFAULT 0,
    warning_rows   INTEGER NOT NULL DEFAULT 0,
    imported_at    TEXT,
    elapsed_ms     INTEGER,
    dq_report_json TEXT
);

-- ===== 运行记录 =====
CREATE TABLE IF NOT EXISTS run_log (
    run_id               TEXT PRIMARY KEY,
    period               TEXT NOT NULL,
    started_at           TEXT NOT NULL,
    finished_at          TEXT,
    detectors_run        TEXT,
    config_snapshot_json TEXT,
    notes                TEXT
);

CREATE TABLE IF NOT EXISTS run_diagnostics (
    run_id    TEXT NOT NULL REFERENCES run_log(run_id) ON DELETE CASCADE,
    detector  TEXT NOT NULL,
    period    TEXT NOT NULL,
    diag_json TEXT NOT NULL,
    PRIMARY KEY (run_id, detector)
);

-- ===== 检测器输出 =====
-- v2 首选明细表(单品级,含合规字段)
CREATE TABLE IF NOT EXISTS reco_detail (
    store_code     TEXT NOT NULL,
    cluster_id     TEXT NOT NULL,
    cat_code       TEXT NOT NULL,
    subcat_code    TEXT,
    spu_code       TEXT,
    period         TEXT NOT NULL,
    detector       TEXT NOT NULL,
    current_qty    REAL,
    benchmark_qty  REAL,
    delta_qty      INTEGER NOT NULL,
    unit_price     REAL,
    invest_amt     REAL,
    severity       TEXT NOT NULL,
    compliance     TEXT NOT NULL,
    predicted_rate REAL,
    rank_in_store  INTEGER NOT NULL,
    reason         TEXT NOT NULL,
    created_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_reco_detail_key
    ON reco_detail(detector, period, store_code, cat_code, ifnull(spu_code,''));

CREATE INDEX IF NOT EXISTS idx_reco_detail_period ON reco_detail(period, detector);

-- v1 遗留结果表(品类级,无 spu/合规列; 仅作合并阶段的回落读取面)
CREATE TABLE IF NOT EXISTS reco_result (
    store_code    TEXT NOT NULL,
    cluster_id    TEXT NOT NULL,
    cat_code      TEXT NOT NULL,
    subcat_code   TEXT,
    period        TEXT NOT NULL,
    detector      TEXT NOT NULL,
    current_qty   REAL,
    benchmark_qty REAL,
    delta_qty     INTEGER NOT NULL,
    invest_amt    REAL,
    severity      TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_reco_result_period ON reco_result(period, detector);

CREATE TABLE IF NOT EXISTS reco_store_summary (
    store_code             TEXT NOT NULL,
    cluster_id             TEXT NOT NULL,
    detector               TEXT NOT NULL,
    period                 TEXT NOT NULL,
    reco_count             INTEGER NOT NULL,
    total_delta_qty        INTEGER NOT NULL,
    total_invest_amt       REAL,
    undefined_invest_count INTEGER NOT NULL,
    created_at             TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_code, detector, period)
);

-- ===== 合并输出 =====
CREATE TABLE IF NOT EXISTS consolidated_detail (
    store_code     TEXT NOT NULL,
    line_key       TEXT NOT NULL,
    cat_code       TEXT NOT NULL,
    subcat_code    TEXT,
    spu_code       TEXT,
    cluster_id     TEXT,
    period         TEXT NOT NULL,
    delta_qty      INTEGER NOT NULL,
    invest_amt     REAL,
    severity       TEXT NOT NULL,
    detector_flags TEXT NOT NULL,
    created_at     TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_code, line_key, period)
);

CREATE TABLE IF NOT EXISTS consolidated_store (
    store_code             TEXT NOT NULL,
    cluster_id             TEXT,
    period                 TEXT NOT NULL,
    line_count             INTEGER NOT NULL,
    increase_lines         INTEGER NOT NULL,
    decrease_lines         INTEGER NOT NULL,
    total_delta_qty        INTEGER NOT NULL,
    total_invest_amt       REAL,
    undefined_invest_lines INTEGER NOT NULL,
    created_at             TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_code, period)
);
"#;

/// 初始化数据库 schema(幂等,可重复执行)
pub fn init_schema(conn: &Connection) -> RepositoryResult<()> {
    conn.execute_batch(SCHEMA_DDL)?;

    // 登记 global 配置作用域
    conn.execute(
        r#"
        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global')
        "#,
        [],
    )?;

    // 登记 schema 版本
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 检查表是否存在
pub fn table_exists(conn: &Connection, table: &str) -> RepositoryResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// 检查表中是否存在指定列
///
/// # 说明
/// - pragma_table_info 的表名参数在部分 SQLite 构建下无法参数化,
///   表名来自内部常量,单引号转义后内联;列名走参数化
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> RepositoryResult<bool> {
    let table_escaped = table.replace('\'', "''");
    let sql = format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?1",
        table_escaped
    );
    let count: i64 = conn.query_row(&sql, [column], |row| row.get(0))?;
    Ok(count > 0)
}
