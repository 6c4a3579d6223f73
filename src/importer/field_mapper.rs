// ==========================================
// 门店聚类对标推荐系统 - 字段映射器
// ==========================================
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 标准字段映射表
// 职责: 源字段 → 标准字段映射 + 类型转换
// 红线: 销量四源字段缺失即 None,不得补 0
// ==========================================

use crate::domain::sales::{RawClusterRecord, RawSalesRecord};
use crate::importer::error::{ImportError, ImporterResult};
use std::collections::HashMap;

// ==========================================
// SalesFieldMapper - 销售行映射器
// ==========================================
pub struct SalesFieldMapper;

impl SalesFieldMapper {
    /// 将原始行记录映射为 RawSalesRecord
    ///
    /// # 参数
    /// - row: 原始行记录（HashMap<列名, 值>）
    /// - row_number: 数据行号（用于 DQ 报告,从 1 计）
    ///
    /// # 返回
    /// - Ok(RawSalesRecord): 映射后的中间结构体
    /// - Err: 类型转换错误(该行在 DQ 报告中按 ERROR 阻断)
    pub fn map_to_raw_sales(
        &self,
        row: HashMap<String, String>,
        row_number: usize,
    ) -> ImporterResult<RawSalesRecord> {
        Ok(RawSalesRecord {
            store_code: get_string(&row, "门店编码"),
            cat_code: get_string(&row, "品类编码"),
            subcat_code: get_string(&row, "子类编码"),
            spu_code: get_string(&row, "单品编码"),
            period: parse_period(&row, "报告期", row_number)?,
            sales_amt: parse_f64(&row, "销售额", row_number)?,
            total_qty: parse_f64(&row, "综合销量", row_number)?,
            base_qty: parse_f64(&row, "正价销量", row_number)?,
            promo_qty: parse_f64(&row, "促销销量", row_number)?,
            ship_qty: parse_f64(&row, "出库销量", row_number)?,
            row_number,
        })
    }
}

// ==========================================
// ClusterFieldMapper - 聚类分配行映射器
// ==========================================
// 红线: 聚类编号/店群编号是同一概念的两个历史列名,
// 各自独立提取,缺一不弃行(派生在导入器内完成)
pub struct ClusterFieldMapper;

impl ClusterFieldMapper {
    pub fn map_to_raw_cluster(
        &self,
        row: HashMap<String, String>,
        row_number: usize,
    ) -> ImporterResult<RawClusterRecord> {
        Ok(RawClusterRecord {
            store_code: get_string(&row, "门店编码"),
            cluster_id: get_string(&row, "聚类编号"),
            group_id: get_string(&row, "店群编号"),
            period: parse_period(&row, "报告期", row_number)?,
            row_number,
        })
    }
}

// ==========================================
// 列名别名与取值辅助
// ==========================================

/// 提取字符串字段（返回 Option），支持多个可能的列名（别名）
fn get_string(row: &HashMap<String, String>, key: &str) -> Option<String> {
    // 定义列名别名映射(历史系统导出列名不统一)
    let aliases: Vec<&str> = match key {
        "门店编码" => vec!["门店编码", "门店代码", "店铺编码"],
        "品类编码" => vec!["品类编码", "品类代码", "大类编码"],
        "子类编码" => vec!["子类编码", "小类编码"],
        "单品编码" => vec!["单品编码", "SPU编码", "商品编码"],
        "报告期" => vec!["报告期", "年月", "期间"],
        "销售额" => vec!["销售额", "销售金额"],
        "综合销量" => vec!["综合销量", "总销量"],
        "正价销量" => vec!["正价销量"],
        "促销销量" => vec!["促销销量", "特价销量"],
        "出库销量" => vec!["出库销量", "发货销量"],
        "聚类编号" => vec!["聚类编号", "聚类ID"],
        "店群编号" => vec!["店群编号", "店群ID"],
        _ => vec![key],
    };

    // 尝试所有可能的列名
    for alias in aliases {
        if let Some(v) = row.get(alias) {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// 解析浮点数
fn parse_f64(
    row: &HashMap<String, String>,
    key: &str,
    row_number: usize,
) -> ImporterResult<Option<f64>> {
    match get_string(row, key) {
        None => Ok(None),
        Some(value) => {
            // 零售导出常带千分位逗号
            let normalized = value.replace(',', "");
            normalized
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ImportError::TypeConversionError {
                    row: row_number,
                    field: key.to_string(),
                    message: format!("无法解析为浮点数: {}", value),
                })
        }
    }
}

/// 解析报告期并归一为 YYYYMM
///
/// # 规则
/// - 接受 "202506" / "2025-06" / "2025/06"
/// - 归一后必须是 6 位数字且月份 01-12
fn parse_period(
    row: &HashMap<String, String>,
    key: &str,
    row_number: usize,
) -> ImporterResult<Option<String>> {
    match get_string(row, key) {
        None => Ok(None),
        Some(value) => {
            let normalized: String = value.chars().filter(|c| c.is_ascii_digit()).collect();

            let valid = normalized.len() == 6 && {
                let month: u32 = normalized[4..6].parse().unwrap_or(0);
                (1..=12).contains(&month)
            };

            if !valid {
                return Err(ImportError::PeriodFormatError {
                    row: row_number,
                    value,
                });
            }
            Ok(Some(normalized))
        }
    }
}
