// ==========================================
// 门店聚类对标推荐系统 - 违规与推荐领域模型
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 依据: Detector_Specs_v0.2_Integrated.md - 4.3 检测器输出口径
// ==========================================

use crate::domain::quantity::Quantity;
use crate::domain::sales::CategoryKey;
use crate::domain::types::{ComplianceStatus, DetectorKind, SeverityTier};
use serde::{Deserialize, Serialize};

// ==========================================
// Violation - 对标违规记录
// ==========================================
// 红线: delta_qty 符号必须符合检测器语义(正=加铺,负=减配),
// 禁止输出会伪造销售历史的变化量
// 用途: 检测器输出,经闸门与截断后晋升为 Recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub store_code: String,       // 门店编码
    pub cluster_id: String,       // 所属聚类
    pub key: CategoryKey,         // 对标分组键
    pub detector: DetectorKind,   // 检测器类型
    pub period: String,           // 报告期(YYYYMM)

    // ===== 数量口径 =====
    pub current_qty: Quantity,    // 当前真实销量/件数
    pub benchmark_qty: Quantity,  // 同群基准量
    pub delta_qty: i64,           // 建议变化量(有符号整数,增量向上取整/减量向下取整)

    // ===== 金额口径 =====
    pub unit_price: Option<f64>,  // 真实单价(销量未解析 ⇒ None)
    pub invest_amt: Option<f64>,  // 投资估算(负=成本; 单价或毛利率未定义 ⇒ None)

    // ===== 分级与合规 =====
    pub severity: SeverityTier,          // 严重程度
    pub compliance: ComplianceStatus,    // 合规闸门结论
    pub predicted_rate: Option<f64>,     // 闸门预测执行率(不可用 ⇒ None)

    // ===== 可解释性 =====
    pub reason: String,           // 违规原因(运行报告用)
}

// ==========================================
// Recommendation - 最终推荐
// ==========================================
// 违规记录经闸门评估与门店截断后晋升; 一次运行内不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub violation: Violation,
    pub rank_in_store: u32, // 门店内优先级序号(1 起,截断排序后赋值)
}

// ==========================================
// StoreSummary - 门店汇总
// ==========================================
// 红线: 投资合计只对已定义投资求和,未定义行单独计数,不得按 0 参与求和
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub store_code: String,
    pub cluster_id: String,
    pub detector: DetectorKind,
    pub period: String,

    pub reco_count: u32,                 // 推荐条数
    pub total_delta_qty: i64,            // 变化量合计(有符号)
    pub total_invest_amt: Option<f64>,   // 投资合计(全部未定义 ⇒ None)
    pub undefined_invest_count: u32,     // 投资未定义条数
}

// ==========================================
// RunDiagnostics - 运行诊断
// ==========================================
// 用途: 区分"没有机会"与"数据没连上",逐检测器产出
// 对应运行报告的输入行数/连接率/排除计数各栏
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub detector: DetectorKind,
    pub period: String,

    // ===== 输入与连接 =====
    pub input_rows: u32,      // 销售事实输入行数
    pub matched_rows: u32,    // 与聚类分配连接成功行数
    pub unmatched_rows: u32,  // 未匹配行数(Inclusive 模式保留,Strict 模式剔除)

    // ===== 排除计数 =====
    pub undefined_qty_rows: u32,   // 销量未定义被排除行数
    pub small_cluster_skips: u32,  // 小聚类整体跳过的分组数
    pub candidates: u32,           // 识别出的候选数
    pub delta_skips: u32,          // 差量计算返回空的候选数
    pub below_min_change_skips: u32, // 低于最小变化量被过滤数

    // ===== 闸门与截断 =====
    pub gate_rejected: u32,     // 闸门判不可执行数
    pub gate_unavailable: u32,  // 闸门不可用(Unknown)数
    pub capped_out: u32,        // 门店截断丢弃数
    pub emitted: u32,           // 最终产出推荐数
}

impl RunDiagnostics {
    pub fn new(detector: DetectorKind, period: &str) -> Self {
        RunDiagnostics {
            detector,
            period: period.to_string(),
            input_rows: 0,
            matched_rows: 0,
            unmatched_rows: 0,
            undefined_qty_rows: 0,
            small_cluster_skips: 0,
            candidates: 0,
            delta_skips: 0,
            below_min_change_skips: 0,
            gate_rejected: 0,
            gate_unavailable: 0,
            capped_out: 0,
            emitted: 0,
        }
    }

    /// 连接匹配率(无输入 ⇒ 0.0)
    pub fn join_match_rate(&self) -> f64 {
        if self.input_rows == 0 {
            return 0.0;
        }
        self.matched_rows as f64 / self.input_rows as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_match_rate() {
        let mut diag = RunDiagnostics::new(DetectorKind::MissingAssortment, "202501");
        assert_eq!(diag.join_match_rate(), 0.0);

        diag.input_rows = 100;
        diag.matched_rows = 80;
        diag.unmatched_rows = 20;
        assert!((diag.join_match_rate() - 0.8).abs() < 1e-9);
    }
}
