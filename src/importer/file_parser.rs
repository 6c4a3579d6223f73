// ==========================================
// 门店聚类对标推荐系统 - 文件解析器
// ==========================================
// 依据: Field_Mapping_Spec_v0.2_Integrated.md - 阶段 0: 文件读取与解析
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// ==========================================

use crate::importer::error::ImportError;
use calamine::{open_workbook, Reader, Xlsx};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::path::Path;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口(阶段 0)
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录（HashMap<列名, 值>）
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(Vec<HashMap<String, String>>): 行记录列表(已去除全空行)
    /// - Err: 文件读取错误、格式错误
    fn parse_to_raw_records(
        &self,
        file_path: &Path,
    ) -> Result<Vec<HashMap<String, String>>, Box<dyn Error>>;
}

/// 表头清洗: TRIM + 去除 UTF-8 BOM
///
/// 零售口径的 CSV 多由 Excel 另存导出,首列表头常带 BOM 前缀,
/// 不剥离会导致"门店编码"等中文表头匹配失败
fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

/// 由表头与单元格序列组装行记录,全空行返回 None
fn assemble_row(headers: &[String], cells: Vec<String>) -> Option<HashMap<String, String>> {
    let mut row_map = HashMap::new();
    for (col_idx, value) in cells.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            row_map.insert(header.clone(), value.trim().to_string());
        }
    }

    if row_map.values().all(|v| v.is_empty()) {
        return None;
    }
    Some(row_map)
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_records(
        &self,
        file_path: &Path,
    ) -> Result<Vec<HashMap<String, String>>, Box<dyn Error>> {
        if !file_path.exists() {
            return Err(Box::new(ImportError::FileNotFound(
                file_path.display().to_string(),
            )));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            let cells: Vec<String> = record.iter().map(|v| v.to_string()).collect();
            if let Some(row_map) = assemble_row(&headers, cells) {
                records.push(row_map);
            }
        }

        Ok(records)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_records(
        &self,
        file_path: &Path,
    ) -> Result<Vec<HashMap<String, String>>, Box<dyn Error>> {
        if !file_path.exists() {
            return Err(Box::new(ImportError::FileNotFound(
                file_path.display().to_string(),
            )));
        }

        let mut workbook: Xlsx<_> = open_workbook(file_path)
            .map_err(|e: calamine::XlsxError| ImportError::ExcelParseError(e.to_string()))?;

        // 只读第一个 sheet(零售导出约定单 sheet)
        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(Box::new(ImportError::ExcelParseError(
                "Excel 文件无工作表".to_string(),
            )));
        }

        let sheet_name = sheet_names[0].clone();
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| clean_header(&cell.to_string()))
            .collect();

        let mut records = Vec::new();
        for data_row in rows {
            let cells: Vec<String> = data_row.iter().map(|cell| cell.to_string()).collect();
            if let Some(row_map) = assemble_row(&headers, cells) {
                records.push(row_map);
            }
        }

        Ok(records)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(
        &self,
        file_path: &Path,
    ) -> Result<Vec<HashMap<String, String>>, Box<dyn Error>> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_to_raw_records(file_path),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_records(file_path),
            _ => Err(Box::new(ImportError::UnsupportedFormat(ext))),
        }
    }
}
