// ==========================================
// 门店聚类对标推荐系统 - 配置管理器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 11. 配置项全集
// ==========================================
// 职责: 参数加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 键方案: reco/<段>/<字段>,段 ∈ {shared, missing, imbalance,
//         below_min, overcap, missed_opp, perf_gap, gate}
// ==========================================

use crate::config::param_reader::ParamReader;
use crate::config::params::{
    BelowMinimumParams, GateParams, ImbalanceParams, MissedOpportunityParams,
    MissingAssortmentParams, OvercapacityParams, PerformanceGapParams, RecoParams, SharedPolicy,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::{Granularity, JoinMode};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT; CLI 覆写与测试使用）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    // ===== 分段键读取辅助(键方案 reco/<段>/<字段>) =====

    fn read_string(&self, section: &str, field: &str, default: &str) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(&cfg_key(section, field), default)
    }

    fn read_f64(&self, section: &str, field: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        let value = self.read_string(section, field, &default.to_string())?;
        Ok(value.parse::<f64>().unwrap_or(default))
    }

    fn read_i64(&self, section: &str, field: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        let value = self.read_string(section, field, &default.to_string())?;
        Ok(value.parse::<i64>().unwrap_or(default))
    }

    fn read_usize(&self, section: &str, field: &str, default: usize) -> Result<usize, Box<dyn Error>> {
        let value = self.read_string(section, field, &default.to_string())?;
        Ok(value.parse::<usize>().unwrap_or(default))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 在每次运行时记入 run_log.config_snapshot_json
    /// - 保证运行结果可追溯到当时参数
    fn config_snapshot_impl(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn
            .prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// ParamReader Trait 实现
// ==========================================
#[async_trait]
impl ParamReader for ConfigManager {
    async fn load_params(&self) -> Result<RecoParams, Box<dyn Error>> {
        let d = RecoParams::default();

        Ok(RecoParams {
            shared: SharedPolicy {
                min_cluster_stores: self.read_usize(
                    sections::SHARED,
                    "min_cluster_stores",
                    d.shared.min_cluster_stores,
                )?,
                min_sales_amt: self.read_f64(sections::SHARED, "min_sales_amt", d.shared.min_sales_amt)?,
                min_qty_change: self.read_i64(sections::SHARED, "min_qty_change", d.shared.min_qty_change)?,
                default_margin_rate: self.read_f64(
                    sections::SHARED,
                    "default_margin_rate",
                    d.shared.default_margin_rate,
                )?,
                join_mode: JoinMode::from_str(&self.read_string(
                    sections::SHARED,
                    "join_mode",
                    &d.shared.join_mode.to_string(),
                )?),
                granularity: Granularity::from_str(&self.read_string(
                    sections::SHARED,
                    "granularity",
                    &d.shared.granularity.to_string(),
                )?),
            },
            missing_assortment: MissingAssortmentParams {
                adoption_rate_threshold: self.read_f64(
                    sections::MISSING,
                    "adoption_rate_threshold",
                    d.missing_assortment.adoption_rate_threshold,
                )?,
                volume_scale: self.read_f64(
                    sections::MISSING,
                    "volume_scale",
                    d.missing_assortment.volume_scale,
                )?,
                severity_high_adoption: self.read_f64(
                    sections::MISSING,
                    "severity_high_adoption",
                    d.missing_assortment.severity_high_adoption,
                )?,
                severity_medium_adoption: self.read_f64(
                    sections::MISSING,
                    "severity_medium_adoption",
                    d.missing_assortment.severity_medium_adoption,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::MISSING,
                    "max_reco_per_store",
                    d.missing_assortment.max_reco_per_store,
                )?,
            },
            imbalance: ImbalanceParams {
                z_entry: self.read_f64(sections::IMBALANCE, "z_entry", d.imbalance.z_entry)?,
                severity_high_z: self.read_f64(
                    sections::IMBALANCE,
                    "severity_high_z",
                    d.imbalance.severity_high_z,
                )?,
                severity_medium_z: self.read_f64(
                    sections::IMBALANCE,
                    "severity_medium_z",
                    d.imbalance.severity_medium_z,
                )?,
                max_adjust_pct: self.read_f64(
                    sections::IMBALANCE,
                    "max_adjust_pct",
                    d.imbalance.max_adjust_pct,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::IMBALANCE,
                    "max_reco_per_store",
                    d.imbalance.max_reco_per_store,
                )?,
            },
            below_minimum: BelowMinimumParams {
                min_monthly_units: self.read_f64(
                    sections::BELOW_MIN,
                    "min_monthly_units",
                    d.below_minimum.min_monthly_units,
                )?,
                severity_high_ratio: self.read_f64(
                    sections::BELOW_MIN,
                    "severity_high_ratio",
                    d.below_minimum.severity_high_ratio,
                )?,
                severity_medium_ratio: self.read_f64(
                    sections::BELOW_MIN,
                    "severity_medium_ratio",
                    d.below_minimum.severity_medium_ratio,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::BELOW_MIN,
                    "max_reco_per_store",
                    d.below_minimum.max_reco_per_store,
                )?,
            },
            overcapacity: OvercapacityParams {
                max_reduction_pct: self.read_f64(
                    sections::OVERCAP,
                    "max_reduction_pct",
                    d.overcapacity.max_reduction_pct,
                )?,
                severity_high_excess: self.read_f64(
                    sections::OVERCAP,
                    "severity_high_excess",
                    d.overcapacity.severity_high_excess,
                )?,
                severity_medium_excess: self.read_f64(
                    sections::OVERCAP,
                    "severity_medium_excess",
                    d.overcapacity.severity_medium_excess,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::OVERCAP,
                    "max_reco_per_store",
                    d.overcapacity.max_reco_per_store,
                )?,
            },
            missed_opportunity: MissedOpportunityParams {
                top_percentile: self.read_f64(
                    sections::MISSED_OPP,
                    "top_percentile",
                    d.missed_opportunity.top_percentile,
                )?,
                severity_high_gap: self.read_f64(
                    sections::MISSED_OPP,
                    "severity_high_gap",
                    d.missed_opportunity.severity_high_gap,
                )?,
                severity_medium_gap: self.read_f64(
                    sections::MISSED_OPP,
                    "severity_medium_gap",
                    d.missed_opportunity.severity_medium_gap,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::MISSED_OPP,
                    "max_reco_per_store",
                    d.missed_opportunity.max_reco_per_store,
                )?,
            },
            performance_gap: PerformanceGapParams {
                top_quartile_pct: self.read_f64(
                    sections::PERF_GAP,
                    "top_quartile_pct",
                    d.performance_gap.top_quartile_pct,
                )?,
                z_confirm: self.read_f64(sections::PERF_GAP, "z_confirm", d.performance_gap.z_confirm)?,
                max_increase_pct: self.read_f64(
                    sections::PERF_GAP,
                    "max_increase_pct",
                    d.performance_gap.max_increase_pct,
                )?,
                severity_high_gap: self.read_f64(
                    sections::PERF_GAP,
                    "severity_high_gap",
                    d.performance_gap.severity_high_gap,
                )?,
                severity_medium_gap: self.read_f64(
                    sections::PERF_GAP,
                    "severity_medium_gap",
                    d.performance_gap.severity_medium_gap,
                )?,
                max_reco_per_store: self.read_usize(
                    sections::PERF_GAP,
                    "max_reco_per_store",
                    d.performance_gap.max_reco_per_store,
                )?,
            },
            gate: GateParams {
                approve_threshold: self.read_f64(
                    sections::GATE,
                    "approve_threshold",
                    d.gate.approve_threshold,
                )?,
                change_dampening: self.read_f64(
                    sections::GATE,
                    "change_dampening",
                    d.gate.change_dampening,
                )?,
                min_sample_size: self.read_i64(sections::GATE, "min_sample_size", d.gate.min_sample_size)?,
            },
        })
    }

    async fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        self.config_snapshot_impl()
    }
}

// ==========================================
// 配置键方案
// ==========================================

/// 组装配置键: reco/<段>/<字段>
fn cfg_key(section: &str, field: &str) -> String {
    format!("reco/{}/{}", section, field)
}

/// 配置段名常量
pub mod sections {
    pub const SHARED: &str = "shared";
    pub const MISSING: &str = "missing";
    pub const IMBALANCE: &str = "imbalance";
    pub const BELOW_MIN: &str = "below_min";
    pub const OVERCAP: &str = "overcap";
    pub const MISSED_OPP: &str = "missed_opp";
    pub const PERF_GAP: &str = "perf_gap";
    pub const GATE: &str = "gate";
}
