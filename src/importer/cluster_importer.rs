// ==========================================
// 门店聚类对标推荐系统 - 聚类分配导入器
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 红线: 聚类编号/店群编号双列互derive,任一在即视为分配有效,
// 绝不因缺某一列而丢弃门店
// ==========================================

use crate::domain::sales::{DqLevel, DqViolation, ImportBatch, ImportResult, RawClusterRecord};
use crate::importer::dq_validator::{generate_dq_report, ClusterDqValidator};
use crate::importer::error::ImportError;
use crate::importer::field_mapper::ClusterFieldMapper;
use crate::importer::file_parser::{FileParser, UniversalFileParser};
use crate::repository::{ClusterAssignmentRow, ClusterRepository, ImportBatchRepository};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashSet;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

// ==========================================
// ClusterImporter - 聚类分配导入器
// ==========================================
pub struct ClusterImporter {
    cluster_repo: ClusterRepository,
    batch_repo: ImportBatchRepository,
    file_parser: Box<dyn FileParser>,
    field_mapper: ClusterFieldMapper,
    dq_validator: ClusterDqValidator,
}

impl ClusterImporter {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            cluster_repo: ClusterRepository::from_connection(conn.clone()),
            batch_repo: ImportBatchRepository::from_connection(conn),
            file_parser: Box::new(UniversalFileParser),
            field_mapper: ClusterFieldMapper,
            dq_validator: ClusterDqValidator,
        }
    }

    /// 从文件导入聚类分配
    ///
    /// # 流程
    /// 解析 → 映射 → 结构校验 → DQ 校验 → 双列派生 → 落库
    #[instrument(skip(self, file_path), fields(batch_id))]
    pub async fn import_from_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<ImportResult, Box<dyn Error>> {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();

        let file_path_str = file_path.as_ref().to_str().unwrap_or("unknown");
        info!(batch_id = %batch_id, file_path = %file_path_str, "开始导入聚类分配");

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

        // === 步骤 2: 字段映射 ===
        debug!("步骤 2: 字段映射");
        let mut records = Vec::new();
        let mut violations: Vec<DqViolation> = Vec::new();
        for (idx, row) in raw_rows.into_iter().enumerate() {
            match self.field_mapper.map_to_raw_cluster(row, idx + 1) {
                Ok(record) => records.push(record),
                Err(e) => {
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

        // === 步骤 3: 结构校验 ===
        debug!("步骤 3: 结构校验");
        if total_rows > 0 {
            check_required_cluster_headers(&records)?;
        }

        // === 步骤 4: DQ 校验 ===
        debug!("步骤 4: DQ 校验");
        for record in &records {
            violations.extend(self.dq_validator.validate_keys(record));
        }
        violations.extend(self.dq_validator.validate_duplicates(&records));

        // === 步骤 5: 阻断过滤 + 双列派生 ===
        let blocked_rows: HashSet<usize> = violations
            .iter()
            .filter(|v| v.level == DqLevel::Error)
            .map(|v| v.row_number)
            .collect();
        let rows: Vec<ClusterAssignmentRow> = records
            .into_iter()
            .filter(|r| !blocked_rows.contains(&r.row_number))
            .map(to_assignment_row)
            .collect();

        // === 步骤 6: 事务落库 ===
        debug!("步骤 6: 落库");
        let success_count = self.cluster_repo.batch_insert(rows)?;
        info!(count = success_count, "聚类分配插入完成");

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
            "聚类分配导入完成"
        );

        Ok(ImportResult {
            batch,
            summary: dq_report.summary.clone(),
            violations: dq_report.violations,
            elapsed_time,
        })
    }
}

/// 必需表头整体缺失检查(聚类编号/店群编号联合判定)
fn check_required_cluster_headers(records: &[RawClusterRecord]) -> Result<(), ImportError> {
    if !records.iter().any(|r| r.store_code.is_some()) {
        return Err(ImportError::MissingRequiredHeader("门店编码".to_string()));
    }
    if !records
        .iter()
        .any(|r| r.cluster_id.is_some() || r.group_id.is_some())
    {
        return Err(ImportError::MissingRequiredHeader(
            "聚类编号/店群编号".to_string(),
        ));
    }
    if !records.iter().any(|r| r.period.is_some()) {
        return Err(ImportError::MissingRequiredHeader("报告期".to_string()));
    }
    Ok(())
}

/// RawClusterRecord → ClusterAssignmentRow
///
/// # 规则
/// - 任一列在,另一列由其派生,落库后双列恒齐备
fn to_assignment_row(record: RawClusterRecord) -> ClusterAssignmentRow {
    let cluster_id = record
        .cluster_id
        .clone()
        .or_else(|| record.group_id.clone())
        .unwrap_or_default();
    let group_id = record
        .group_id
        .or(record.cluster_id)
        .unwrap_or_else(|| cluster_id.clone());

    ClusterAssignmentRow {
        store_code: record.store_code.unwrap_or_default(),
        cluster_id,
        group_id,
        period: record.period.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_assignment_row_derives_missing_column() {
        // 仅店群编号在 → 聚类编号由其派生
        let record = RawClusterRecord {
            store_code: Some("S001".to_string()),
            cluster_id: None,
            group_id: Some("CL-03".to_string()),
            period: Some("202506".to_string()),
            row_number: 1,
        };

        let row = to_assignment_row(record);
        assert_eq!(row.cluster_id, "CL-03");
        assert_eq!(row.group_id, "CL-03");

        // 仅聚类编号在 → 店群编号由其派生
        let record = RawClusterRecord {
            store_code: Some("S002".to_string()),
            cluster_id: Some("CL-07".to_string()),
            group_id: None,
            period: Some("202506".to_string()),
            row_number: 2,
        };

        let row = to_assignment_row(record);
        assert_eq!(row.cluster_id, "CL-07");
        assert_eq!(row.group_id, "CL-07");
    }
}
