// ==========================================
// 门店聚类对标推荐系统 - 销售领域模型
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 字段映射规范
// 依据: data_dictionary_v0.1.md - 数据字典
// ==========================================

use crate::domain::quantity::{Quantity, QuantityResolver};
use crate::domain::types::Granularity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// CategoryKey - 对标分组键
// ==========================================
// 品类族检测器工作在 品类/子类 粒度,单品族检测器工作在 SPU 粒度,
// 两族共用同一个键结构
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryKey {
    pub cat_code: String,            // 品类编码
    pub subcat_code: Option<String>, // 子类编码
    pub spu_code: Option<String>,    // 单品编码(SPU)
}

impl CategoryKey {
    pub fn category(cat_code: impl Into<String>) -> Self {
        CategoryKey {
            cat_code: cat_code.into(),
            subcat_code: None,
            spu_code: None,
        }
    }

    pub fn item(
        cat_code: impl Into<String>,
        subcat_code: Option<String>,
        spu_code: impl Into<String>,
    ) -> Self {
        CategoryKey {
            cat_code: cat_code.into(),
            subcat_code,
            spu_code: Some(spu_code.into()),
        }
    }

    /// 是否单品粒度(SPU 级)
    pub fn is_item_level(&self) -> bool {
        self.spu_code.is_some()
    }

    /// 品类族检测器的分组编码
    ///
    /// # 规则
    /// - Category 粒度 → cat_code
    /// - Subcategory 粒度 → subcat_code,缺失时回落 cat_code
    pub fn group_code(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Category => &self.cat_code,
            Granularity::Subcategory => self
                .subcat_code
                .as_deref()
                .unwrap_or(self.cat_code.as_str()),
        }
    }

    /// 合并去重用的行键
    ///
    /// # 规则
    /// - 单品级 → spu_code
    /// - 品类级 → "CAT::<cat_code>" 占位键(与真实 SPU 编码空间隔离),
    ///   子类粒度行追加子类段,避免同品类不同子类互相吞并
    pub fn line_key(&self) -> String {
        match &self.spu_code {
            Some(spu) => spu.clone(),
            None => match &self.subcat_code {
                Some(subcat) => format!("CAT::{}::{}", self.cat_code, subcat),
                None => format!("CAT::{}", self.cat_code),
            },
        }
    }
}

// ==========================================
// SalesRecord - 销售事实记录
// ==========================================
// 红线: 四个销量源字段全部可缺失,缺失即 NULL,不得以 0 落库
// 用途: 导入层写入,引擎层只读
// 对齐: schema_v0.1.sql sales_fact 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub store_code: String,          // 门店编码
    pub cat_code: String,            // 品类编码
    pub subcat_code: Option<String>, // 子类编码
    pub spu_code: Option<String>,    // 单品编码(品类汇总行为 NULL)
    pub period: String,              // 报告期(YYYYMM)
    pub sales_amt: f64,              // 销售额(元)

    // ===== 销量源字段(解析顺序见 QuantityResolver) =====
    pub total_qty: Option<f64>, // 综合销量
    pub base_qty: Option<f64>,  // 正价销量
    pub promo_qty: Option<f64>, // 促销销量
    pub ship_qty: Option<f64>,  // 出库销量
}

impl SalesRecord {
    /// 真实单位销量(委托 QuantityResolver,解析顺序固定)
    pub fn resolved_qty(&self) -> Quantity {
        QuantityResolver::resolve(self)
    }

    /// 真实单价(销量未解析或为 0 ⇒ None)
    pub fn unit_price(&self) -> Option<f64> {
        QuantityResolver::unit_price(self)
    }

    /// 对标分组键
    pub fn category_key(&self) -> CategoryKey {
        CategoryKey {
            cat_code: self.cat_code.clone(),
            subcat_code: self.subcat_code.clone(),
            spu_code: self.spu_code.clone(),
        }
    }

    /// 品类族检测器的分组编码(口径同 CategoryKey::group_code)
    pub fn group_code(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Category => &self.cat_code,
            Granularity::Subcategory => self
                .subcat_code
                .as_deref()
                .unwrap_or(self.cat_code.as_str()),
        }
    }
}

// ==========================================
// RawSalesRecord - 销售导入中间结构体
// ==========================================
// 用途: 导入管道中间产物(文件解析 → 字段映射 → 此结构)
// 生命周期: 仅在导入流程内
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSalesRecord {
    // 源字段(已类型转换)
    pub store_code: Option<String>,
    pub cat_code: Option<String>,
    pub subcat_code: Option<String>,
    pub spu_code: Option<String>,
    pub period: Option<String>,
    pub sales_amt: Option<f64>,
    pub total_qty: Option<f64>,
    pub base_qty: Option<f64>,
    pub promo_qty: Option<f64>,
    pub ship_qty: Option<f64>,

    // 元信息
    pub row_number: usize, // 原始文件行号(用于 DQ 报告)
}

// ==========================================
// RawClusterRecord - 聚类分配导入中间结构体
// ==========================================
// 红线: cluster_id 与 group_id 是同一概念的两个历史列名,
// 任一存在时派生另一个,绝不因缺列丢弃
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClusterRecord {
    pub store_code: Option<String>,
    pub cluster_id: Option<String>, // 聚类编号(首选列名)
    pub group_id: Option<String>,   // 店群编号(遗留列名)
    pub period: Option<String>,

    pub row_number: usize,
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
// 用途: 记录导入批次元信息
// 对齐: v0.2_importer_schema.sql import_batch 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,                   // 批次 ID(UUID)
    pub file_name: Option<String>,          // 源文件名
    pub total_rows: i32,                    // 总行数
    pub success_rows: i32,                  // 成功导入行数
    pub blocked_rows: i32,                  // 阻断行数(DQ ERROR)
    pub warning_rows: i32,                  // 警告行数(DQ WARNING)
    pub imported_at: Option<DateTime<Utc>>, // 导入时间
    pub elapsed_ms: Option<i32>,            // 导入耗时(毫秒)
    pub dq_report_json: Option<String>,     // DQ 报告 JSON
}

// ==========================================
// DqLevel - 数据质量级别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DqLevel {
    Error,   // 错误(阻断该行导入)
    Warning, // 警告(允许导入)
    Info,    // 提示(仅记录)
}

// ==========================================
// DqViolation - 数据质量违规记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqViolation {
    pub row_number: usize,           // 原始文件行号
    pub store_code: Option<String>,  // 门店编码(如果可解析)
    pub level: DqLevel,              // 违规级别
    pub field: String,               // 违规字段
    pub message: String,             // 违规描述
}

// ==========================================
// DqReport - 数据质量报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqReport {
    pub batch_id: String,             // 批次 ID
    pub summary: DqSummary,           // 汇总统计
    pub violations: Vec<DqViolation>, // 违规明细
}

// ==========================================
// DqSummary - 数据质量汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqSummary {
    pub total_rows: usize, // 总行数
    pub success: usize,    // 成功导入
    pub blocked: usize,    // 阻断(ERROR)
    pub warning: usize,    // 警告(WARNING)
}

// ==========================================
// ImportResult - 导入结果
// ==========================================
// 用途: 导入接口返回值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub batch: ImportBatch,                // 批次信息
    pub summary: DqSummary,                // 汇总统计
    pub violations: Vec<DqViolation>,      // 违规明细
    pub elapsed_time: std::time::Duration, // 导入耗时
}
