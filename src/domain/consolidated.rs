// ==========================================
// 门店聚类对标推荐系统 - 合并结果领域模型
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.6 合并阶段
// 红线: (store, line_key) 去重后不得重复; 品类级金额不得与
// 同门类单品级金额重复计入
// ==========================================

use crate::domain::types::{DetectorKind, SeverityTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ConsolidatedLineItem - 合并明细行
// ==========================================
// 六类检测器异构输出标准化后的统一行结构
// 对齐: schema_v0.1.sql consolidated_detail 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedLineItem {
    pub store_code: String,
    pub line_key: String,             // 去重行键(SPU 或 "CAT::<品类>" 占位键)
    pub cat_code: String,
    pub subcat_code: Option<String>,  // 左连接补齐,无匹配 ⇒ None
    pub spu_code: Option<String>,     // 品类级行为 None
    pub cluster_id: Option<String>,   // 左连接补齐,无匹配 ⇒ None
    pub period: String,

    pub delta_qty: i64,               // 合并后变化量(有符号)
    pub invest_amt: Option<f64>,      // 合并后投资(未定义 ⇒ None,不按 0 计)
    pub severity: SeverityTier,       // 合并行的最高严重程度
    pub detector_flags: BTreeSet<DetectorKind>, // 命中检测器并集(有序,保证输出稳定)
}

impl ConsolidatedLineItem {
    /// 是否单品粒度行
    pub fn is_item_level(&self) -> bool {
        self.spu_code.is_some()
    }

    /// 检测器标志列,分号拼接(数据库/导出使用)
    pub fn flags_str(&self) -> String {
        self.detector_flags
            .iter()
            .map(|d| d.to_db_str())
            .collect::<Vec<_>>()
            .join(";")
    }
}

// ==========================================
// StoreRollup - 门店层汇总
// ==========================================
// 对齐: schema_v0.1.sql consolidated_store 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRollup {
    pub store_code: String,
    pub cluster_id: Option<String>,
    pub period: String,

    pub line_count: u32,               // 明细行数
    pub increase_lines: u32,           // 加铺行数(delta > 0)
    pub decrease_lines: u32,           // 减配行数(delta < 0)
    pub total_delta_qty: i64,          // 变化量净合计
    pub total_invest_amt: Option<f64>, // 投资合计(全部未定义 ⇒ None)
    pub undefined_invest_lines: u32,   // 投资未定义行数
}
