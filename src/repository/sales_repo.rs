// ==========================================
// 门店聚类对标推荐系统 - 销售事实仓储
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART D 引擎铁律
// 红线: Repository 不含业务逻辑; 销量列 NULL 即"未定义",
// 读写均不得以 0 替代
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::sales::SalesRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::schema::table_exists;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// SalesRepository - 销售事实仓储
// ==========================================
/// 职责: 管理 sales_fact / seasonal_factor 表的读写
/// 用途: 导入层写入,引擎层只读
pub struct SalesRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SalesRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入销售事实(INSERT OR REPLACE)
    ///
    /// # 说明
    /// - 唯一键: (store_code, cat_code, subcat_code, spu_code, period)
    /// - Option 销量字段按 NULL 落库,保持"未定义"语义
    pub fn batch_insert(&self, records: Vec<SalesRecord>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for r in records {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO sales_fact (
                    store_code, cat_code, subcat_code, spu_code, period,
                    sales_amt, total_qty, base_qty, promo_qty, ship_qty
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    r.store_code,
                    r.cat_code,
                    r.subcat_code,
                    r.spu_code,
                    r.period,
                    r.sales_amt,
                    r.total_qty,
                    r.base_qty,
                    r.promo_qty,
                    r.ship_qty,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 加载指定报告期的全部销售事实
    ///
    /// # 说明
    /// - 排序完全限定(store/cat/subcat/spu),保证逐次运行输出一致
    /// - 表缺失 ⇒ MissingInputTable(结构性错误)
    pub fn load_by_period(&self, period: &str) -> RepositoryResult<Vec<SalesRecord>> {
        let conn = self.get_conn()?;

        if !table_exists(&conn, "sales_fact")? {
            return Err(RepositoryError::MissingInputTable {
                table: "sales_fact".to_string(),
            });
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT store_code, cat_code, subcat_code, spu_code, period,
                   sales_amt, total_qty, base_qty, promo_qty, ship_qty
            FROM sales_fact
            WHERE period = ?1
            ORDER BY store_code ASC, cat_code ASC,
                     ifnull(subcat_code,'') ASC, ifnull(spu_code,'') ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![period], |row| {
                Ok(SalesRecord {
                    store_code: row.get(0)?,
                    cat_code: row.get(1)?,
                    subcat_code: row.get(2)?,
                    spu_code: row.get(3)?,
                    period: row.get(4)?,
                    sales_amt: row.get(5)?,
                    total_qty: row.get(6)?,
                    base_qty: row.get(7)?,
                    promo_qty: row.get(8)?,
                    ship_qty: row.get(9)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }

    /// 指定报告期的事实行数
    pub fn count_by_period(&self, period: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sales_fact WHERE period = ?1",
            params![period],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 加载指定报告期的季节因子
    ///
    /// # 返回
    /// - Ok(None): seasonal_factor 表不存在(可选增强源,调用方降级继续)
    /// - Ok(Some(map)): cat_code → factor(可能为空 map)
    pub fn load_seasonal_factors(
        &self,
        period: &str,
    ) -> RepositoryResult<Option<BTreeMap<String, f64>>> {
        let conn = self.get_conn()?;

        if !table_exists(&conn, "seasonal_factor")? {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT cat_code, factor FROM seasonal_factor WHERE period = ?1 ORDER BY cat_code ASC",
        )?;

        let mut factors = BTreeMap::new();
        let rows = stmt.query_map(params![period], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (cat, factor) = row?;
            factors.insert(cat, factor);
        }

        Ok(Some(factors))
    }

    /// 写入季节因子(测试与夹具使用)
    pub fn upsert_seasonal_factor(
        &self,
        cat_code: &str,
        period: &str,
        factor: f64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO seasonal_factor (cat_code, period, factor)
            VALUES (?1, ?2, ?3)
            "#,
            params![cat_code, period, factor],
        )?;
        Ok(())
    }
}
