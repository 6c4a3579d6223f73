// ==========================================
// 门店聚类对标推荐系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// ==========================================

use crate::repository::schema::SCHEMA_VERSION;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;
use tracing::warn;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 库版本高于程序期望时告警（只提示，不做自动迁移）
///
/// 说明：
/// - 旧库由 init_schema 增量补齐；新库旧程序无法补齐，只能提示升级
pub fn warn_on_version_drift(conn: &Connection) -> rusqlite::Result<()> {
    if let Some(found) = read_schema_version(conn)? {
        if found > SCHEMA_VERSION {
            warn!(
                found,
                expected = SCHEMA_VERSION,
                "数据库 schema 版本高于程序期望，请升级程序后再运行"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_read_schema_version_takes_max() {
        let conn = Connection::open_in_memory().unwrap();
        crate::repository::schema::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (9)",
            [],
        )
        .unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(9));
    }
}
