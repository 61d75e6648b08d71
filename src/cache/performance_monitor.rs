use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// 缓存性能监控器
#[derive(Clone, Default)]
pub struct CachePerformanceMonitor {
    metrics: Arc<CacheMetrics>,
}

/// 缓存指标
#[derive(Default)]
pub struct CacheMetrics {
    /// 缓存命中次数
    pub cache_hits: AtomicUsize,
    /// 缓存未命中次数
    pub cache_misses: AtomicUsize,
    /// 缓存写入次数
    pub cache_writes: AtomicUsize,
    /// 缓存错误次数
    pub cache_errors: AtomicUsize,
    /// 分类统计数据
    pub category_metrics: RwLock<HashMap<String, CategoryMetrics>>,
}

/// 分类指标数据
#[derive(Default, Clone, Copy)]
pub struct CategoryMetrics {
    pub hits: usize,
    pub misses: usize,
}

/// 缓存性能报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePerformanceReport {
    /// 缓存命中率
    pub hit_rate: f64,
    /// 总查询次数
    pub total_lookups: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_writes: usize,
    pub cache_errors: usize,
    /// 分类统计
    pub category_stats: BTreeMap<String, CategoryPerformanceStats>,
}

/// 分类性能统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPerformanceStats {
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
}

fn rate(hits: usize, misses: usize) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

impl CachePerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_category(&self, category: &str, f: impl FnOnce(&mut CategoryMetrics)) {
        // 锁中毒时跳过本次统计
        if let Ok(mut map) = self.metrics.category_metrics.write() {
            f(map.entry(category.to_string()).or_default());
        }
    }

    /// 记录缓存命中
    pub fn record_cache_hit(&self, category: &str) {
        self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.hits += 1);
        tracing::debug!(category, "缓存命中");
    }

    /// 记录缓存未命中
    pub fn record_cache_miss(&self, category: &str) {
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.update_category(category, |m| m.misses += 1);
        tracing::debug!(category, "缓存未命中");
    }

    /// 记录缓存写入
    pub fn record_cache_write(&self, category: &str) {
        self.metrics.cache_writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(category, "缓存写入");
    }

    /// 记录缓存错误
    pub fn record_cache_error(&self, category: &str, error: &str) {
        self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(category, "缓存错误: {}", error);
    }

    /// 生成性能报告
    pub fn generate_report(&self) -> CachePerformanceReport {
        let hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let misses = self.metrics.cache_misses.load(Ordering::Relaxed);

        let category_stats = self
            .metrics
            .category_metrics
            .read()
            .map(|map| {
                map.iter()
                    .map(|(name, m)| {
                        (
                            name.clone(),
                            CategoryPerformanceStats {
                                hits: m.hits,
                                misses: m.misses,
                                hit_rate: rate(m.hits, m.misses),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        CachePerformanceReport {
            hit_rate: rate(hits, misses),
            total_lookups: hits + misses,
            cache_hits: hits,
            cache_misses: misses,
            cache_writes: self.metrics.cache_writes.load(Ordering::Relaxed),
            cache_errors: self.metrics.cache_errors.load(Ordering::Relaxed),
            category_stats,
        }
    }
}
