// ==========================================
// 门店聚类对标推荐系统 - 销售数据导入器
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 导入管道
// ==========================================
// 职责: 整合销售导入流程,从文件到数据库
// 流程: 解析 → 映射 → 结构校验 → DQ 校验 → 阻断过滤 → 落库
// ==========================================

use crate::domain::sales::{
    DqLevel, DqViolation, ImportBatch, ImportResult, RawSalesRecord, SalesRecord,
};
use crate::importer::dq_validator::{generate_dq_report, SalesDqValidator};
use crate::importer::error::ImportError;
use crate::importer::field_mapper::SalesFieldMapper;
use crate::importer::file_parser::{FileParser, UniversalFileParser};
use crate::repository::{ImportBatchRepository, SalesRepository};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// SalesImporter - 销售数据导入器
// ==========================================
pub struct SalesImporter {
    sales_repo: SalesRepository,
    batch_repo: ImportBatchRepository,
    file_parser: Box<dyn FileParser>,
    field_mapper: SalesFieldMapper,
    dq_validator: SalesDqValidator,
}

impl SalesImporter {
    /// 创建新的 SalesImporter 实例(与仓储共享同一连接)
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            sales_repo: SalesRepository::from_connection(conn.clone()),
            batch_repo: ImportBatchRepository::from_connection(conn),
            file_parser: Box::new(UniversalFileParser),
            field_mapper: SalesFieldMapper,
            dq_validator: SalesDqValidator,
        }
    }

    /// 从文件导入销售数据（CSV / Excel 按扩展名自动识别）
    ///
    /// # 返回
    /// - Ok(ImportResult): 导入结果（批次信息、DQ 报告、汇总统计）
    /// - Err: 文件错误、结构性错误（必需表头缺失）、数据库错误
    #[instrument(skip(self, file_path), fields(batch_id))]
    pub async fn import_from_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<ImportResult, Box<dyn Error>> {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();

        let file_path_str = file_path.as_ref().to_str().unwrap_or("unknown");
        info!(batch_id = %batch_id, file_path = %file_path_str, "开始导入销售数据");

        // === 步骤 1: 解析文件 ===
        debug!("步骤 1: 解析文件");
        let raw_rows = self
            .file_parser
            .parse_to_raw_records(file_path.as_ref())
            .map_err(|e| {
                error!(error = %e, "文件解析失败");
                format!("文件解析失败: {}", e)
            })?;

        let total_rows = raw_rows.len();
        info!(total_rows = total_rows, "文件解析完成");

        // === 步骤 2: 字段映射 ===
        debug!("步骤 2: 字段映射");
        let mut records = Vec::new();
        let mut violations: Vec<DqViolation> = Vec::new();
        for (idx, row) in raw_rows.into_iter().enumerate() {
            match self.field_mapper.map_to_raw_sales(row, idx + 1) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(row_number = idx + 1, error = %e, "字段映射失败");
                    violations.push(DqViolation {
                        row_number: idx + 1,
                        store_code: None,
                        level: DqLevel::Error,
                        field: "-".to_string(),
                        message: format!("字段映射失败: {}", e),
                    });
                }
            }
        }
        info!(
            success = records.len(),
            failed = violations.len(),
            "字段映射完成"
        );

        // === 步骤 3: 结构校验(必需表头整体缺失 → 文件级拒绝) ===
        debug!("步骤 3: 结构校验");
        if total_rows > 0 {
            check_required_sales_headers(&records)?;
        }

        // === 步骤 4: DQ 校验 ===
        debug!("步骤 4: DQ 校验");
        for record in &records {
            violations.extend(self.dq_validator.validate_keys(record));
        }
        violations.extend(self.dq_validator.validate_duplicates(&records));
        for record in &records {
            violations.extend(self.dq_validator.validate_values(record));
        }
        info!(violations = violations.len(), "DQ 校验完成");

        // === 步骤 5: 阻断过滤(ERROR 级违规的行整行不落库) ===
        let blocked_rows: HashSet<usize> = violations
            .iter()
            .filter(|v| v.level == DqLevel::Error)
            .map(|v| v.row_number)
            .collect();
        let valid_records: Vec<RawSalesRecord> = records
            .into_iter()
            .filter(|r| !blocked_rows.contains(&r.row_number))
            .collect();

        // === 步骤 6: 转换为 SalesRecord 并事务落库 ===
        debug!("步骤 6: 落库");
        let sales: Vec<SalesRecord> = valid_records.into_iter().map(to_sales_record).collect();
        let success_count = self.sales_repo.batch_insert(sales)?;
        info!(count = success_count, "销售事实插入完成");

        // === 步骤 7: 批次记录 + DQ 报告 ===
        let mut dq_report = generate_dq_report(batch_id.clone(), violations);
        dq_report.summary.total_rows = total_rows;
        dq_report.summary.success = success_count;

        let elapsed_time = start_time.elapsed();
        let batch = ImportBatch {
            batch_id: batch_id.clone(),
            file_name: Some(
                Path::new(file_path_str)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            total_rows: total_rows as i32,
            success_rows: success_count as i32,
            blocked_rows: dq_report.summary.blocked as i32,
            warning_rows: dq_report.summary.warning as i32,
            imported_at: Some(Utc::now()),
            elapsed_ms: Some(elapsed_time.as_millis() as i32),
            dq_report_json: Some(serde_json::to_string(&dq_report)?),
        };
        self.batch_repo.insert_batch(&batch)?;

        info!(
            batch_id = %batch_id,
            total = total_rows,
            success = success_count,
            blocked = dq_report.summary.blocked,
            elapsed_ms = elapsed_time.as_millis(),
            "销售数据导入完成"
        );

        Ok(ImportResult {
            batch,
            summary: dq_report.summary.clone(),
            violations: dq_report.violations,
            elapsed_time,
        })
    }

    /// 批量导入多个文件（并发执行）
    ///
    /// # 说明
    /// - 每个文件的导入是独立的,单文件失败不影响其他文件
    pub async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
    ) -> Result<Vec<Result<ImportResult, String>>, Box<dyn Error>> {
        use futures::future::join_all;

        info!(count = file_paths.len(), "开始批量导入销售文件");

        let import_tasks = file_paths.into_iter().map(|path| {
            let path_str = path.display().to_string();
            async move {
                match self.import_from_file(&path).await {
                    Ok(result) => {
                        info!(file = %path_str, success = result.summary.success, "文件导入成功");
                        Ok(result)
                    }
                    Err(e) => {
                        error!(file = %path_str, error = %e, "文件导入失败");
                        Err(format!("文件 {} 导入失败: {}", path_str, e))
                    }
                }
            }
        });

        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );

        Ok(results)
    }
}

/// 必需表头整体缺失检查
///
/// 表头缺失时该列在所有行上都映射为 None,与个别行留空可区分
fn check_required_sales_headers(records: &[RawSalesRecord]) -> Result<(), ImportError> {
    let checks: [(&str, fn(&RawSalesRecord) -> bool); 4] = [
        ("门店编码", |r| r.store_code.is_some()),
        ("品类编码", |r| r.cat_code.is_some()),
        ("报告期", |r| r.period.is_some()),
        ("销售额", |r| r.sales_amt.is_some()),
    ];

    for (header, present) in checks {
        if !records.iter().any(present) {
            return Err(ImportError::MissingRequiredHeader(header.to_string()));
        }
    }
    Ok(())
}

/// RawSalesRecord → SalesRecord(键字段已由 DQ 校验保证非空)
fn to_sales_record(record: RawSalesRecord) -> SalesRecord {
    SalesRecord {
        store_code: record.store_code.unwrap_or_default(),
        cat_code: record.cat_code.unwrap_or_default(),
        subcat_code: record.subcat_code,
        spu_code: record.spu_code,
        period: record.period.unwrap_or_default(),
        sales_amt: record.sales_amt.unwrap_or_default(),
        total_qty: record.total_qty,
        base_qty: record.base_qty,
        promo_qty: record.promo_qty,
        ship_qty: record.ship_qty,
    }
}
