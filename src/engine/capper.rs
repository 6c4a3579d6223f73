// ==========================================
// 门店聚类对标推荐系统 - 门店截断器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.5 PerStoreCapper
// ==========================================
// 职责: 门店内候选排序 + 截断到上限 + 赋优先级序号
// 红线: 排序键必须全列,同输入重复运行必须逐字节一致
// ==========================================

use crate::domain::types::ComplianceStatus;
use crate::domain::violation::{Recommendation, Violation};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ==========================================
// PerStoreCapper - 门店截断器
// ==========================================
pub struct PerStoreCapper {
    // 无状态引擎,不需要注入依赖
}

impl PerStoreCapper {
    pub fn new() -> Self {
        Self {}
    }

    /// 截断候选到门店上限
    ///
    /// 排序键 (依据 Detector_Specs 4.5):
    /// 1) 闸门通过优先(通过 > 未知 > 不通过)
    /// 2) 预测执行率降序
    /// 3) 严重程度降序
    /// 4) |变化量| 降序
    /// 5) 品类/子类/单品编码升序 (稳定尾键)
    ///
    /// # 参数
    /// - violations: 闸门评估后的候选列表
    /// - max_per_store: 门店上限(检测器各自配置)
    ///
    /// # 返回
    /// - (最终推荐, 截断丢弃数)
    pub fn cap(
        &self,
        violations: Vec<Violation>,
        max_per_store: usize,
    ) -> (Vec<Recommendation>, u32) {
        // 按门店分组(BTreeMap 保证门店遍历次序稳定)
        let mut by_store: BTreeMap<String, Vec<Violation>> = BTreeMap::new();
        for violation in violations {
            by_store
                .entry(violation.store_code.clone())
                .or_default()
                .push(violation);
        }

        let mut recommendations = Vec::new();
        let mut capped_out = 0u32;

        for (_store, mut candidates) in by_store {
            candidates.sort_by(|a, b| self.compare(a, b));

            if candidates.len() > max_per_store {
                capped_out += (candidates.len() - max_per_store) as u32;
                candidates.truncate(max_per_store);
            }

            for (idx, violation) in candidates.into_iter().enumerate() {
                recommendations.push(Recommendation {
                    violation,
                    rank_in_store: (idx + 1) as u32,
                });
            }
        }

        (recommendations, capped_out)
    }

    /// 比较两个候选的优先级(Less 表示 a 优先)
    fn compare(&self, a: &Violation, b: &Violation) -> Ordering {
        // 1. 闸门结论(通过 > 未知 > 不通过)
        match compliance_rank(a.compliance).cmp(&compliance_rank(b.compliance)) {
            Ordering::Equal => {}
            other => return other,
        }

        // 2. 预测执行率降序(未知按最低)
        let rate_a = a.predicted_rate.unwrap_or(f64::NEG_INFINITY);
        let rate_b = b.predicted_rate.unwrap_or(f64::NEG_INFINITY);
        match rate_b.partial_cmp(&rate_a) {
            Some(Ordering::Equal) | None => {}
            Some(other) => return other,
        }

        // 3. 严重程度降序
        match b.severity.cmp(&a.severity) {
            Ordering::Equal => {}
            other => return other,
        }

        // 4. |变化量| 降序
        match b.delta_qty.abs().cmp(&a.delta_qty.abs()) {
            Ordering::Equal => {}
            other => return other,
        }

        // 5. 分组键升序(全列尾键,保证全序)
        a.key.cmp(&b.key)
    }
}

impl Default for PerStoreCapper {
    fn default() -> Self {
        Self::new()
    }
}

fn compliance_rank(status: ComplianceStatus) -> u8 {
    match status {
        ComplianceStatus::Approved => 0,
        ComplianceStatus::Unknown => 1,
        ComplianceStatus::Rejected => 2,
    }
}
