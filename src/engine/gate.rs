// ==========================================
// 门店聚类对标推荐系统 - 合规闸门
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.4 合规闸门契约
// ==========================================
// 职责: 评估建议量变更的可执行性(尽力而为)
// 红线: 闸门不可用 ⇒ 结论记"未知",绝不中断运行,绝不伪造通过
// ==========================================

use crate::config::params::GateParams;
use crate::repository::compliance_repo::ComplianceRepository;
use std::error::Error;
use tracing::debug;

// ==========================================
// GateDecision - 闸门结论
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// 有历史依据的结论
    Decided { approved: bool, predicted_rate: f64 },
    /// 无历史或样本不足,闸门放弃表态
    Unavailable,
}

// ==========================================
// ComplianceGate Trait
// ==========================================
// 用途: 检测器只依赖此接口,不关心闸门是否真实在线
// 实现者: HistoryComplianceGate, NullComplianceGate
pub trait ComplianceGate: Send + Sync {
    /// 评估一条建议量变更
    ///
    /// # 参数
    /// - store_code: 门店编码
    /// - item_key: 条目键(单品编码或品类占位键)
    /// - current_qty: 当前量
    /// - proposed_qty: 建议后的量
    ///
    /// # 返回
    /// - Ok(Decided): 执行率预测与批准信号
    /// - Ok(Unavailable): 闸门无法表态(调用方记"未知")
    /// - Err: 闸门故障(调用方同样记"未知",绝不中断)
    fn evaluate(
        &self,
        store_code: &str,
        item_key: &str,
        current_qty: f64,
        proposed_qty: f64,
    ) -> Result<GateDecision, Box<dyn Error>>;
}

// ==========================================
// HistoryComplianceGate - 历史执行率闸门
// ==========================================
// 依据: 门店历史执行率 × 变更幅度阻尼
pub struct HistoryComplianceGate {
    repo: ComplianceRepository,
    params: GateParams,
}

impl HistoryComplianceGate {
    pub fn new(repo: ComplianceRepository, params: GateParams) -> Self {
        Self { repo, params }
    }
}

impl ComplianceGate for HistoryComplianceGate {
    fn evaluate(
        &self,
        store_code: &str,
        item_key: &str,
        current_qty: f64,
        proposed_qty: f64,
    ) -> Result<GateDecision, Box<dyn Error>> {
        // 表缺失 → Err(MissingInputTable),由调用方降级为"未知"
        let history = self.repo.find_by_store(store_code)?;

        let history = match history {
            Some(h) if h.sample_size >= self.params.min_sample_size => h,
            Some(h) => {
                debug!(
                    store_code,
                    item_key,
                    sample_size = h.sample_size,
                    "历史样本不足,闸门放弃表态"
                );
                return Ok(GateDecision::Unavailable);
            }
            None => {
                debug!(store_code, item_key, "无历史执行率记录,闸门放弃表态");
                return Ok(GateDecision::Unavailable);
            }
        };

        // 变更幅度越大,预测执行率越低(相对变化阻尼,封顶 100%)
        let rel_change = if current_qty > 0.0 {
            ((proposed_qty - current_qty).abs() / current_qty).min(1.0)
        } else {
            1.0
        };
        let predicted_rate =
            (history.exec_rate * (1.0 - self.params.change_dampening * rel_change)).clamp(0.0, 1.0);

        Ok(GateDecision::Decided {
            approved: predicted_rate >= self.params.approve_threshold,
            predicted_rate,
        })
    }
}

// ==========================================
// NullComplianceGate - 空闸门
// ==========================================
/// 恒返回"无法表态"
///
/// 用于闸门未配置的运行与单元测试,调用方一律得到"未知"
#[derive(Debug, Clone, Default)]
pub struct NullComplianceGate;

impl ComplianceGate for NullComplianceGate {
    fn evaluate(
        &self,
        store_code: &str,
        item_key: &str,
        _current_qty: f64,
        _proposed_qty: f64,
    ) -> Result<GateDecision, Box<dyn Error>> {
        debug!(store_code, item_key, "NullComplianceGate: 跳过闸门评估");
        Ok(GateDecision::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::schema::init_schema;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn make_gate(exec_rate: Option<(f64, i64)>) -> HistoryComplianceGate {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = ComplianceRepository::from_connection(conn);
        if let Some((rate, sample)) = exec_rate {
            repo.upsert("S001", rate, sample).unwrap();
        }
        HistoryComplianceGate::new(repo, GateParams::default())
    }

    #[test]
    fn test_null_gate_is_unavailable() {
        let gate = NullComplianceGate;
        let decision = gate.evaluate("S001", "SPU001", 10.0, 14.0).unwrap();
        assert_eq!(decision, GateDecision::Unavailable);
    }

    #[test]
    fn test_history_gate_no_record_is_unavailable() {
        let gate = make_gate(None);
        let decision = gate.evaluate("S001", "SPU001", 10.0, 14.0).unwrap();
        assert_eq!(decision, GateDecision::Unavailable);
    }

    #[test]
    fn test_history_gate_small_sample_is_unavailable() {
        // 样本量 2 < 默认下限 3
        let gate = make_gate(Some((0.9, 2)));
        let decision = gate.evaluate("S001", "SPU001", 10.0, 14.0).unwrap();
        assert_eq!(decision, GateDecision::Unavailable);
    }

    #[test]
    fn test_history_gate_approves_small_change() {
        let gate = make_gate(Some((0.9, 10)));
        // 变化 10% → 预测 0.9 * (1 - 0.5*0.1) = 0.855 ≥ 0.6
        let decision = gate.evaluate("S001", "SPU001", 10.0, 11.0).unwrap();
        match decision {
            GateDecision::Decided {
                approved,
                predicted_rate,
            } => {
                assert!(approved);
                assert!((predicted_rate - 0.855).abs() < 1e-9);
            }
            GateDecision::Unavailable => panic!("应有结论"),
        }
    }

    #[test]
    fn test_history_gate_rejects_large_change_with_low_history() {
        let gate = make_gate(Some((0.7, 10)));
        // 当前 0 → 相对变化按 1.0: 预测 0.7 * 0.5 = 0.35 < 0.6
        let decision = gate.evaluate("S001", "SPU001", 0.0, 8.0).unwrap();
        match decision {
            GateDecision::Decided {
                approved,
                predicted_rate,
            } => {
                assert!(!approved);
                assert!((predicted_rate - 0.35).abs() < 1e-9);
            }
            GateDecision::Unavailable => panic!("应有结论"),
        }
    }
}
