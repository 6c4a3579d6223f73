// ==========================================
// 门店聚类对标推荐系统 - 结果合并引擎
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 7. 合并器
// ==========================================
// 职责: 六检测器输出 → 规整 → 去重 → 防重计 → 左连接补齐 → 双表产出
// 输入面: reco_detail 首选,某检测器无行则回落 reco_result 遗留面,
//         两面皆空记跳过,不视为错误
// 红线: (store, line_key) 去重后不得重复;单品级权威,品类级
//       金额不得把已按单品计入的部分再计一次;左连接无匹配保留 None
// ==========================================

use crate::domain::consolidated::{ConsolidatedLineItem, StoreRollup};
use crate::domain::sales::CategoryKey;
use crate::domain::store::ClusterLookup;
use crate::domain::types::{DetectorKind, SeverityTier};
use crate::repository::consolidated_repo::ConsolidatedRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::reco_repo::{LegacyRecoRow, RecoRepository};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ==========================================
// CanonicalRow - 规整后的中间行
// ==========================================
// 两个输入面列名不同,先统一到同一列族再合并
struct CanonicalRow {
    store_code: String,
    cat_code: String,
    subcat_code: Option<String>,
    spu_code: Option<String>,
    cluster_id: Option<String>,
    line_key: String,
    delta_qty: i64,
    invest_amt: Option<f64>,
    severity: SeverityTier,
    detector: DetectorKind,
}

// ==========================================
// ResultConsolidator - 结果合并引擎
// ==========================================
pub struct ResultConsolidator {
    reco_repo: RecoRepository,
    consolidated_repo: ConsolidatedRepository,
}

impl ResultConsolidator {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            reco_repo: RecoRepository::from_connection(Arc::clone(&conn)),
            consolidated_repo: ConsolidatedRepository::from_connection(conn),
        }
    }

    /// 合并某报告期的全部检测器输出并落库
    ///
    /// # 参数
    /// - clusters: 聚类查找表(左连接补齐聚类字段)
    /// - subcat_lookup: 单品 → 子类(左连接补齐子类字段)
    ///
    /// # 返回
    /// - (合并明细, 门店汇总),两者都已按键排序落库
    pub fn consolidate(
        &self,
        period: &str,
        clusters: &ClusterLookup,
        subcat_lookup: &BTreeMap<String, String>,
    ) -> RepositoryResult<(Vec<ConsolidatedLineItem>, Vec<StoreRollup>)> {
        // 步骤 1: 逐检测器取行并规整列名
        let rows = self.load_canonical_rows(period)?;
        info!(period = %period, rows = rows.len(), "合并输入行规整完成");

        // 步骤 2: (store, line_key) 去重合并
        let mut merged = merge_same_key(rows);

        // 步骤 3: 品类级防重计(单品级权威)
        reduce_category_double_count(&mut merged);

        // 步骤 4: 左连接补齐聚类/子类
        let lines: Vec<ConsolidatedLineItem> = merged
            .into_iter()
            .map(|((store_code, line_key), row)| {
                let cluster_id = row
                    .cluster_id
                    .or_else(|| clusters.cluster_of(&store_code).map(|c| c.to_string()));
                let subcat_code = row.subcat_code.or_else(|| {
                    row.spu_code
                        .as_ref()
                        .and_then(|spu| subcat_lookup.get(spu).cloned())
                });
                ConsolidatedLineItem {
                    store_code,
                    line_key,
                    cat_code: row.cat_code,
                    subcat_code,
                    spu_code: row.spu_code,
                    cluster_id,
                    period: period.to_string(),
                    delta_qty: row.delta_qty,
                    invest_amt: row.invest_amt,
                    severity: row.severity,
                    detector_flags: row.detector_flags,
                }
            })
            .collect();

        // 步骤 5: 门店层汇总
        let rollups = rollup_by_store(&lines, period);

        // 步骤 6: 落库(幂等重跑)
        self.consolidated_repo.replace_detail(period, &lines)?;
        self.consolidated_repo.replace_store(period, &rollups)?;

        info!(
            period = %period,
            lines = lines.len(),
            stores = rollups.len(),
            "合并完成"
        );
        Ok((lines, rollups))
    }

    /// 逐检测器取行: 首选面 → 遗留面 → 跳过
    fn load_canonical_rows(&self, period: &str) -> RepositoryResult<Vec<CanonicalRow>> {
        let mut rows = Vec::new();

        for detector in DetectorKind::all() {
            if self.reco_repo.has_detail_rows(detector, period)? {
                let recos = self.reco_repo.load_detail(detector, period)?;
                debug!(detector = %detector, rows = recos.len(), "取首选面明细");
                for reco in recos {
                    let v = reco.violation;
                    rows.push(CanonicalRow {
                        line_key: v.key.line_key(),
                        store_code: v.store_code,
                        cat_code: v.key.cat_code,
                        subcat_code: v.key.subcat_code,
                        spu_code: v.key.spu_code,
                        cluster_id: if v.cluster_id.is_empty() {
                            None
                        } else {
                            Some(v.cluster_id)
                        },
                        delta_qty: v.delta_qty,
                        invest_amt: v.invest_amt,
                        severity: v.severity,
                        detector,
                    });
                }
                continue;
            }

            let legacy = self.reco_repo.load_legacy_result(detector, period)?;
            if !legacy.is_empty() {
                debug!(detector = %detector, rows = legacy.len(), "首选面无行,回落遗留面");
                for row in legacy {
                    rows.push(canonical_from_legacy(row));
                }
                continue;
            }

            info!(detector = %detector, period = %period, "两个输入面皆无行,跳过该检测器");
        }

        Ok(rows)
    }
}

/// 遗留面行规整(品类级,无单品列)
fn canonical_from_legacy(row: LegacyRecoRow) -> CanonicalRow {
    let key = CategoryKey {
        cat_code: row.cat_code.clone(),
        subcat_code: row.subcat_code.clone(),
        spu_code: None,
    };
    CanonicalRow {
        line_key: key.line_key(),
        store_code: row.store_code,
        cat_code: row.cat_code,
        subcat_code: row.subcat_code,
        spu_code: None,
        cluster_id: if row.cluster_id.is_empty() {
            None
        } else {
            Some(row.cluster_id)
        },
        delta_qty: row.delta_qty,
        invest_amt: row.invest_amt,
        severity: row.severity,
        detector: row.detector,
    }
}

/// 合并后的行(尚未补齐连接字段)
struct MergedLine {
    cat_code: String,
    subcat_code: Option<String>,
    spu_code: Option<String>,
    cluster_id: Option<String>,
    delta_qty: i64,
    invest_amt: Option<f64>,
    severity: SeverityTier,
    detector_flags: BTreeSet<DetectorKind>,
}

/// (store, line_key) 去重合并
///
/// # 规则
/// - 变化量求和,投资只累加已定义部分(全部未定义 ⇒ None)
/// - 严重程度取最高,检测器标志取并集
fn merge_same_key(rows: Vec<CanonicalRow>) -> BTreeMap<(String, String), MergedLine> {
    let mut merged: BTreeMap<(String, String), MergedLine> = BTreeMap::new();

    for row in rows {
        let key = (row.store_code.clone(), row.line_key.clone());
        match merged.get_mut(&key) {
            Some(line) => {
                line.delta_qty += row.delta_qty;
                if let Some(amt) = row.invest_amt {
                    line.invest_amt = Some(line.invest_amt.unwrap_or(0.0) + amt);
                }
                line.severity = line.severity.max(row.severity);
                line.detector_flags.insert(row.detector);
                if line.cluster_id.is_none() {
                    line.cluster_id = row.cluster_id;
                }
                if line.subcat_code.is_none() {
                    line.subcat_code = row.subcat_code;
                }
            }
            None => {
                let mut flags = BTreeSet::new();
                flags.insert(row.detector);
                merged.insert(
                    key,
                    MergedLine {
                        cat_code: row.cat_code,
                        subcat_code: row.subcat_code,
                        spu_code: row.spu_code,
                        cluster_id: row.cluster_id,
                        delta_qty: row.delta_qty,
                        invest_amt: row.invest_amt,
                        severity: row.severity,
                        detector_flags: flags,
                    },
                );
            }
        }
    }

    merged
}

/// 品类级防重计
///
/// 同店同上级行键(品类或子类)已有单品级行时,上级行的同号变化量
/// 属于重复口径: 余量 = 上级变化量 − 同号单品变化量合计,越过零则
/// 整行删除,投资按余量占比同步缩减
fn reduce_category_double_count(merged: &mut BTreeMap<(String, String), MergedLine>) {
    // (store, 上级行键, 方向) → 单品变化量合计
    // 单品行必归属品类键;子类键仅在单品行自带子类时归属,缺子类不猜
    let mut item_sums: BTreeMap<(String, String, bool), i64> = BTreeMap::new();
    for ((store, _), line) in merged.iter() {
        if line.spu_code.is_none() || line.delta_qty == 0 {
            continue;
        }
        let positive = line.delta_qty > 0;
        let cat_parent = CategoryKey::category(line.cat_code.clone()).line_key();
        *item_sums
            .entry((store.clone(), cat_parent, positive))
            .or_insert(0) += line.delta_qty;
        if line.subcat_code.is_some() {
            let subcat_parent = CategoryKey {
                cat_code: line.cat_code.clone(),
                subcat_code: line.subcat_code.clone(),
                spu_code: None,
            }
            .line_key();
            *item_sums
                .entry((store.clone(), subcat_parent, positive))
                .or_insert(0) += line.delta_qty;
        }
    }

    let mut to_drop = Vec::new();
    for ((store, line_key), line) in merged.iter_mut() {
        // 正负合并抵净(如补最低量 + 超容量同件对冲)的零变化行无动作意义,单品行同样删除
        if line.delta_qty == 0 {
            debug!(store = %store, line = %line_key, "合并后变化量为零,删除空行");
            to_drop.push((store.clone(), line_key.clone()));
            continue;
        }
        if line.spu_code.is_some() {
            continue;
        }

        let positive = line.delta_qty > 0;
        let item_sum = item_sums
            .get(&(store.clone(), line_key.clone(), positive))
            .copied()
            .unwrap_or(0);
        if item_sum == 0 {
            continue;
        }

        let residual = line.delta_qty - item_sum;
        if residual == 0 || (residual > 0) != positive {
            debug!(
                store = %store,
                line = %line_key,
                line_delta = line.delta_qty,
                item_sum,
                "上级量已被单品级完全覆盖,删除上级行"
            );
            to_drop.push((store.clone(), line_key.clone()));
            continue;
        }

        let ratio = residual as f64 / line.delta_qty as f64;
        debug!(
            store = %store,
            line = %line_key,
            line_delta = line.delta_qty,
            item_sum,
            residual,
            "上级量扣除单品已计部分"
        );
        line.delta_qty = residual;
        line.invest_amt = line.invest_amt.map(|amt| amt * ratio);
    }

    for key in to_drop {
        merged.remove(&key);
    }
}

/// 门店层汇总
fn rollup_by_store(lines: &[ConsolidatedLineItem], period: &str) -> Vec<StoreRollup> {
    let mut rollups: BTreeMap<String, StoreRollup> = BTreeMap::new();

    for line in lines {
        let entry = rollups
            .entry(line.store_code.clone())
            .or_insert_with(|| StoreRollup {
                store_code: line.store_code.clone(),
                cluster_id: line.cluster_id.clone(),
                period: period.to_string(),
                line_count: 0,
                increase_lines: 0,
                decrease_lines: 0,
                total_delta_qty: 0,
                total_invest_amt: None,
                undefined_invest_lines: 0,
            });

        entry.line_count += 1;
        entry.total_delta_qty += line.delta_qty;
        if line.delta_qty > 0 {
            entry.increase_lines += 1;
        } else if line.delta_qty < 0 {
            entry.decrease_lines += 1;
        }
        match line.invest_amt {
            Some(amt) => {
                entry.total_invest_amt = Some(entry.total_invest_amt.unwrap_or(0.0) + amt);
            }
            None => entry.undefined_invest_lines += 1,
        }
        if entry.cluster_id.is_none() {
            entry.cluster_id = line.cluster_id.clone();
        }
    }

    rollups.into_values().collect()
}
