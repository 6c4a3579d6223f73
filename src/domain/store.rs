// ==========================================
// 门店聚类对标推荐系统 - 门店与聚类领域模型
// ==========================================
// 依据: Reco_Dev_Master_Spec.md - PART C 数据与口径体系
// 红线: 聚类分配是上游产物,本系统只读; 未分配门店保持未分配,
// 禁止伪造聚类编号
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// ClusterAssignment - 门店聚类分配
// ==========================================
// 对齐: schema_v0.1.sql cluster_assignment 表
// (表内 cluster_id/group_id 双列恒齐备,读取时 COALESCE,领域层只留一个)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub store_code: String, // 门店编码
    pub cluster_id: String, // 聚类编号
    pub period: String,     // 报告期(YYYYMM)
}

// ==========================================
// ClusterLookup - 聚类只读查找表
// ==========================================
// 用途: 引擎层按门店查聚类、按聚类查成员规模
// 确定性: BTreeMap 保证遍历顺序稳定
#[derive(Debug, Clone, Default)]
pub struct ClusterLookup {
    by_store: BTreeMap<String, String>,            // store_code → cluster_id
    members: BTreeMap<String, BTreeSet<String>>,   // cluster_id → 成员门店集
}

impl ClusterLookup {
    pub fn new(assignments: Vec<ClusterAssignment>) -> Self {
        let mut by_store = BTreeMap::new();
        let mut members: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for a in assignments {
            members
                .entry(a.cluster_id.clone())
                .or_default()
                .insert(a.store_code.clone());
            by_store.insert(a.store_code, a.cluster_id);
        }
        ClusterLookup { by_store, members }
    }

    /// 门店所属聚类(未分配 ⇒ None,绝不兜底)
    pub fn cluster_of(&self, store_code: &str) -> Option<&str> {
        self.by_store.get(store_code).map(|s| s.as_str())
    }

    /// 聚类成员门店数(未知聚类 ⇒ 0)
    pub fn cluster_size(&self, cluster_id: &str) -> usize {
        self.members.get(cluster_id).map_or(0, |s| s.len())
    }

    /// 聚类成员门店集
    pub fn members_of(&self, cluster_id: &str) -> Option<&BTreeSet<String>> {
        self.members.get(cluster_id)
    }

    /// 全部聚类编号,按编号升序
    pub fn cluster_ids(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(|s| s.as_str())
    }

    /// 已分配门店总数
    pub fn store_count(&self) -> usize {
        self.by_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_store.is_empty()
    }
}
