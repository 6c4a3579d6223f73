// ==========================================
// 门店聚类对标推荐系统 - 数据质量校验器
// ==========================================
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 6. 数据质量规则
// 职责: 键完整性/重复/数值合法性校验 + DQ 报告生成
// ==========================================

use crate::domain::sales::{DqLevel, DqReport, DqSummary, DqViolation, RawClusterRecord, RawSalesRecord};
use std::collections::HashSet;

// 综合销量与分量和允许的浮点误差
const QTY_CONSISTENCY_EPS: f64 = 1e-6;

// ==========================================
// SalesDqValidator - 销售行校验器
// ==========================================
pub struct SalesDqValidator;

impl SalesDqValidator {
    /// 校验键完整性（store/cat/period/sales_amt 必填）
    pub fn validate_keys(&self, record: &RawSalesRecord) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        if record.store_code.is_none() {
            violations.push(self.error(record, "store_code", "门店编码缺失"));
        }
        if record.cat_code.is_none() {
            violations.push(self.error(record, "cat_code", "品类编码缺失"));
        }
        if record.period.is_none() {
            violations.push(self.error(record, "period", "报告期缺失"));
        }
        if record.sales_amt.is_none() {
            violations.push(self.error(record, "sales_amt", "销售额缺失"));
        }

        violations
    }

    /// 校验同批次内重复行
    ///
    /// # 规则
    /// - 重复键: (门店, 品类, 子类, 单品, 报告期),与落库唯一索引同口径
    /// - 后出现的行记为 ERROR,首行保留
    pub fn validate_duplicates(&self, records: &[RawSalesRecord]) -> Vec<DqViolation> {
        let mut violations = Vec::new();
        let mut seen_keys = HashSet::new();

        for record in records {
            let key = (
                record.store_code.clone(),
                record.cat_code.clone(),
                record.subcat_code.clone(),
                record.spu_code.clone(),
                record.period.clone(),
            );

            // 键不完整的行由 validate_keys 阻断,此处不重复报
            if key.0.is_none() || key.1.is_none() || key.4.is_none() {
                continue;
            }

            if !seen_keys.insert(key) {
                violations.push(self.error(record, "store_code,cat_code,spu_code,period", "同批次内重复行"));
            }
        }

        violations
    }

    /// 校验数值合法性
    ///
    /// # 规则
    /// - 销售额 < 0 → ERROR
    /// - 任一销量源 < 0 → ERROR(负销量属上游退货口径混入,拒绝落库)
    /// - 综合销量 ≠ 正价 + 促销(两分量均在时) → WARNING(允许导入)
    pub fn validate_values(&self, record: &RawSalesRecord) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        if let Some(amt) = record.sales_amt {
            if amt < 0.0 {
                violations.push(self.error(record, "sales_amt", &format!("销售额为负: {:.2}", amt)));
            }
        }

        let qty_fields: [(&str, Option<f64>); 4] = [
            ("total_qty", record.total_qty),
            ("base_qty", record.base_qty),
            ("promo_qty", record.promo_qty),
            ("ship_qty", record.ship_qty),
        ];
        for (field, value) in qty_fields {
            if let Some(qty) = value {
                if qty < 0.0 {
                    violations.push(self.error(record, field, &format!("销量为负: {:.2}", qty)));
                }
            }
        }

        if let (Some(total), Some(base), Some(promo)) =
            (record.total_qty, record.base_qty, record.promo_qty)
        {
            if (total - (base + promo)).abs() > QTY_CONSISTENCY_EPS {
                violations.push(DqViolation {
                    row_number: record.row_number,
                    store_code: record.store_code.clone(),
                    level: DqLevel::Warning,
                    field: "total_qty".to_string(),
                    message: format!(
                        "综合销量 {:.2} ≠ 正价 {:.2} + 促销 {:.2}",
                        total, base, promo
                    ),
                });
            }
        }

        violations
    }

    fn error(&self, record: &RawSalesRecord, field: &str, message: &str) -> DqViolation {
        DqViolation {
            row_number: record.row_number,
            store_code: record.store_code.clone(),
            level: DqLevel::Error,
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

// ==========================================
// ClusterDqValidator - 聚类分配行校验器
// ==========================================
pub struct ClusterDqValidator;

impl ClusterDqValidator {
    /// 校验键完整性
    ///
    /// # 红线
    /// - 聚类编号与店群编号互为别名,齐缺才算缺失
    pub fn validate_keys(&self, record: &RawClusterRecord) -> Vec<DqViolation> {
        let mut violations = Vec::new();

        if record.store_code.is_none() {
            violations.push(self.error(record, "store_code", "门店编码缺失"));
        }
        if record.cluster_id.is_none() && record.group_id.is_none() {
            violations.push(self.error(record, "cluster_id,group_id", "聚类编号与店群编号均缺失"));
        }
        if record.period.is_none() {
            violations.push(self.error(record, "period", "报告期缺失"));
        }

        violations
    }

    /// 校验同批次内重复 (门店, 报告期)
    pub fn validate_duplicates(&self, records: &[RawClusterRecord]) -> Vec<DqViolation> {
        let mut violations = Vec::new();
        let mut seen_keys = HashSet::new();

        for record in records {
            let key = (record.store_code.clone(), record.period.clone());
            if key.0.is_none() || key.1.is_none() {
                continue;
            }

            if !seen_keys.insert(key) {
                violations.push(self.error(record, "store_code,period", "同批次内重复门店分配"));
            }
        }

        violations
    }

    fn error(&self, record: &RawClusterRecord, field: &str, message: &str) -> DqViolation {
        DqViolation {
            row_number: record.row_number,
            store_code: record.store_code.clone(),
            level: DqLevel::Error,
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

// ==========================================
// DQ 报告生成
// ==========================================

/// 由违规明细生成 DQ 报告（total_rows/success 由导入器回填）
pub fn generate_dq_report(batch_id: String, violations: Vec<DqViolation>) -> DqReport {
    let blocked_rows: HashSet<usize> = violations
        .iter()
        .filter(|v| v.level == DqLevel::Error)
        .map(|v| v.row_number)
        .collect();
    let warning_count = violations
        .iter()
        .filter(|v| v.level == DqLevel::Warning)
        .count();

    DqReport {
        batch_id,
        summary: DqSummary {
            total_rows: 0, // 外部填充
            success: 0,    // 外部填充
            blocked: blocked_rows.len(),
            warning: warning_count,
        },
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_raw_sales(store: Option<&str>, row_number: usize) -> RawSalesRecord {
        RawSalesRecord {
            store_code: store.map(|s| s.to_string()),
            cat_code: Some("C10".to_string()),
            subcat_code: None,
            spu_code: Some("SPU001".to_string()),
            period: Some("202506".to_string()),
            sales_amt: Some(1250.5),
            total_qty: Some(42.0),
            base_qty: None,
            promo_qty: None,
            ship_qty: None,
            row_number,
        }
    }

    #[test]
    fn test_validate_keys_missing_store() {
        let validator = SalesDqValidator;
        let record = make_raw_sales(None, 1);

        let violations = validator.validate_keys(&record);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, DqLevel::Error);
        assert_eq!(violations[0].field, "store_code");
    }

    #[test]
    fn test_validate_duplicates_same_key() {
        let validator = SalesDqValidator;
        let records = vec![make_raw_sales(Some("S001"), 1), make_raw_sales(Some("S001"), 2)];

        let violations = validator.validate_duplicates(&records);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].row_number, 2);
    }

    #[test]
    fn test_validate_values_negative_qty() {
        let validator = SalesDqValidator;
        let mut record = make_raw_sales(Some("S001"), 1);
        record.total_qty = Some(-3.0);

        let violations = validator.validate_values(&record);

        assert!(violations
            .iter()
            .any(|v| v.field == "total_qty" && v.level == DqLevel::Error));
    }

    #[test]
    fn test_validate_values_qty_consistency_warning() {
        let validator = SalesDqValidator;
        let mut record = make_raw_sales(Some("S001"), 1);
        record.total_qty = Some(10.0);
        record.base_qty = Some(6.0);
        record.promo_qty = Some(3.0); // 6+3 ≠ 10

        let violations = validator.validate_values(&record);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, DqLevel::Warning);
    }

    #[test]
    fn test_cluster_dual_column_either_suffices() {
        let validator = ClusterDqValidator;
        let record = RawClusterRecord {
            store_code: Some("S001".to_string()),
            cluster_id: None,
            group_id: Some("CL-03".to_string()),
            period: Some("202506".to_string()),
            row_number: 1,
        };

        assert!(validator.validate_keys(&record).is_empty());
    }

    #[test]
    fn test_dq_report_counts_blocked_rows_not_violations() {
        // 同一行两条 ERROR 只算一个阻断行
        let violations = vec![
            DqViolation {
                row_number: 1,
                store_code: None,
                level: DqLevel::Error,
                field: "store_code".to_string(),
                message: "门店编码缺失".to_string(),
            },
            DqViolation {
                row_number: 1,
                store_code: None,
                level: DqLevel::Error,
                field: "period".to_string(),
                message: "报告期缺失".to_string(),
            },
        ];

        let report = generate_dq_report("batch-1".to_string(), violations);
        assert_eq!(report.summary.blocked, 1);
    }
}
