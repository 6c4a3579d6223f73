// ==========================================
// 门店聚类对标推荐系统 - 真实销量解析
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART A2 红线(真实数据口径)
// 依据: Detector_Specs_v0.2_Integrated.md - 4.1 销量解析器
// 红线: 销量只能来自真实销量字段,禁止用销售额反推
// ==========================================

use crate::domain::sales::SalesRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Quantity - 真实单位销量
// ==========================================
// 红线: 未定义就是未定义,不是 0,不做估算
// 所有下游按单位的计算(单价/投资额)必须对 Undefined 显式分支
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Resolved(f64), // 已解析的真实销量(≥0)
    Undefined,     // 源字段全部缺失或非法
}

impl Quantity {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Quantity::Resolved(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Quantity::Undefined)
    }

    /// 取已解析值,未定义返回 None
    pub fn value(&self) -> Option<f64> {
        match self {
            Quantity::Resolved(v) => Some(*v),
            Quantity::Undefined => None,
        }
    }

    /// 两侧均已解析才相加,任一侧未定义 ⇒ Undefined
    pub fn add(self, other: Quantity) -> Quantity {
        match (self, other) {
            (Quantity::Resolved(a), Quantity::Resolved(b)) => Quantity::Resolved(a + b),
            _ => Quantity::Undefined,
        }
    }
}

impl From<Option<f64>> for Quantity {
    /// 数据库 NULL 列 → Undefined
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(x) => Quantity::Resolved(x),
            None => Quantity::Undefined,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Resolved(v) => write!(f, "{:.2}", v),
            Quantity::Undefined => write!(f, "NA"),
        }
    }
}

// ==========================================
// QuantityResolver - 销量解析器
// ==========================================
// 解析顺序固定,禁止重排:
//   (1) total_qty 综合销量
//   (2) base_qty + promo_qty (两者齐备)
//   (3) ship_qty 出库销量
//   (4) Undefined
// 负值在导入层按 DQ 阻断; 命中字段为负时此处按未定义兜底,
// 不回落到下一字段(回落等价于重排解析顺序)
pub struct QuantityResolver;

impl QuantityResolver {
    /// 解析一条销售记录的真实单位销量
    ///
    /// # 返回
    /// - `Quantity::Resolved(v)` v ≥ 0
    /// - `Quantity::Undefined` 全部源字段缺失,或命中字段为负
    pub fn resolve(record: &SalesRecord) -> Quantity {
        // (1) 综合销量
        if let Some(total) = record.total_qty {
            return Self::non_negative(total);
        }

        // (2) 正价销量 + 促销销量(两者齐备才可用,单边缺失不得当 0 补)
        if let (Some(base), Some(promo)) = (record.base_qty, record.promo_qty) {
            return Self::non_negative(base + promo);
        }

        // (3) 出库销量
        if let Some(ship) = record.ship_qty {
            return Self::non_negative(ship);
        }

        // (4) 全部缺失
        Quantity::Undefined
    }

    /// 从真实销量派生单价
    ///
    /// # 规则
    /// - 仅当销量已解析且 > 0 时: sales_amt / qty
    /// - 销量未定义或为 0 ⇒ None(禁止用销售额除以假设价格反推销量)
    pub fn unit_price(record: &SalesRecord) -> Option<f64> {
        match Self::resolve(record) {
            Quantity::Resolved(qty) if qty > 0.0 => Some(record.sales_amt / qty),
            _ => None,
        }
    }

    fn non_negative(v: f64) -> Quantity {
        if v >= 0.0 && v.is_finite() {
            Quantity::Resolved(v)
        } else {
            Quantity::Undefined
        }
    }
}
