// ==========================================
// 门店聚类对标推荐系统 - 同群基准计算器
// ==========================================
// 依据: Detector_Specs_v0.2_Integrated.md - 4.2 PeerBenchmarkCalculator
// ==========================================
// 职责: 四种统计口径(采纳率/z分/百分位/固定底线)
// 红线: 分母有效性必须可区分, 算不出(None)与真 0 是两回事
// ==========================================

use statrs::statistics::Statistics;
use tracing::debug;

// ==========================================
// PeerBenchmarkCalculator - 同群基准计算器
// ==========================================
pub struct PeerBenchmarkCalculator {
    // 无状态引擎,不需要注入依赖
}

impl PeerBenchmarkCalculator {
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 采纳率模式
    // ==========================================

    /// 聚类内铺货门店占比
    ///
    /// # 参数
    /// - carriers: 销售额过门槛的门店数
    /// - cluster_size: 聚类门店总数(来自分配表,不是销售表)
    ///
    /// # 返回
    /// - Some(rate): 0.0 - 1.0
    /// - None: 聚类为空,分母无效
    pub fn adoption_rate(&self, carriers: usize, cluster_size: usize) -> Option<f64> {
        if cluster_size == 0 {
            debug!(carriers, "采纳率分母无效: 聚类门店数为 0");
            return None;
        }
        Some(carriers as f64 / cluster_size as f64)
    }

    // ==========================================
    // z 分模式
    // ==========================================

    /// 样本均值与样本标准差(ddof=1)
    ///
    /// # 返回
    /// - Some((mean, std)): 样本量 ≥ 2
    /// - None: 样本量 < 2,无法估计离散度(与零方差可区分)
    pub fn mean_and_std(&self, values: &[f64]) -> Option<(f64, f64)> {
        if values.len() < 2 {
            debug!(n = values.len(), "z 分分母无效: 样本量不足");
            return None;
        }
        let mean = values.mean();
        let std = values.std_dev();
        Some((mean, std))
    }

    /// 标准分
    ///
    /// # 规则
    /// - 零方差组 z = 0(同群完全一致即无偏离),不做除零
    pub fn z_score(&self, value: f64, mean: f64, std: f64) -> f64 {
        if std <= 0.0 {
            debug!(value, mean, "零方差组,z 记 0");
            return 0.0;
        }
        (value - mean) / std
    }

    // ==========================================
    // 百分位模式
    // ==========================================

    /// 头部门店均值(降序前 top_pct 比例,至少 1 家)
    ///
    /// # 返回
    /// - Some((top_mean, top_n)): 头部均值与头部门店数
    /// - None: 组为空
    ///
    /// # 说明
    /// 并列值按排序位次截断,排序键含次序稳定性由调用方保证
    pub fn top_performer_mean(&self, values: &[f64], top_pct: f64) -> Option<(f64, usize)> {
        if values.is_empty() {
            debug!("头部均值分母无效: 组为空");
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let top_n = ((sorted.len() as f64 * top_pct).ceil() as usize).max(1);
        let top = &sorted[..top_n.min(sorted.len())];
        Some((top.mean(), top.len()))
    }

    /// 值在组内的百分位排名(0.0 - 1.0,严格小于该值的占比)
    pub fn percentile_rank(&self, values: &[f64], value: f64) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let below = values.iter().filter(|v| **v < value).count();
        Some(below as f64 / values.len() as f64)
    }

    // ==========================================
    // 固定底线模式
    // ==========================================

    /// 固定月销底线缺口(observed 距底线的差,≤0 表示达标)
    ///
    /// 底线不来自同群,对每家有动销的门店直接比
    pub fn minimum_rate_gap(&self, observed: f64, minimum: f64) -> f64 {
        minimum - observed
    }
}

impl Default for PeerBenchmarkCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adoption_rate_zero_cluster_is_none() {
        let calc = PeerBenchmarkCalculator::new();
        assert_eq!(calc.adoption_rate(3, 0), None);
        assert_eq!(calc.adoption_rate(4, 5), Some(0.8));
    }

    #[test]
    fn test_mean_and_std_small_sample_is_none() {
        let calc = PeerBenchmarkCalculator::new();
        // 单店组不能算离散度, 必须与零方差区分
        assert_eq!(calc.mean_and_std(&[10.0]), None);

        let (mean, std) = calc.mean_and_std(&[10.0, 14.0, 12.0]).unwrap();
        assert!((mean - 12.0).abs() < 1e-9);
        // 样本标准差 ddof=1: sqrt(((-2)^2 + 2^2 + 0) / 2) = 2
        assert!((std - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_z_score_zero_variance() {
        let calc = PeerBenchmarkCalculator::new();
        assert_eq!(calc.z_score(10.0, 10.0, 0.0), 0.0);
        assert!((calc.z_score(14.0, 12.0, 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_performer_mean() {
        let calc = PeerBenchmarkCalculator::new();
        let values = [5.0, 20.0, 8.0, 30.0, 12.0];

        // 前 20% = 1 家(30.0)
        let (top_mean, top_n) = calc.top_performer_mean(&values, 0.2).unwrap();
        assert_eq!(top_n, 1);
        assert!((top_mean - 30.0).abs() < 1e-9);

        // 前 40% = 2 家(30.0, 20.0)
        let (top_mean, top_n) = calc.top_performer_mean(&values, 0.4).unwrap();
        assert_eq!(top_n, 2);
        assert!((top_mean - 25.0).abs() < 1e-9);

        assert_eq!(calc.top_performer_mean(&[], 0.2), None);
    }

    #[test]
    fn test_percentile_rank() {
        let calc = PeerBenchmarkCalculator::new();
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(calc.percentile_rank(&values, 3.0), Some(0.5));
        assert_eq!(calc.percentile_rank(&[], 3.0), None);
    }
}
