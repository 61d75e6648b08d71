//! 来源去重登记表

use std::collections::HashSet;
use url::Url;

/// 需要剔除的追踪类查询参数
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref"];
const TRACKING_PREFIXES: &[&str] = &["utm_"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str())
        || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// 收敛所需的最多规范化次数
const MAX_NORMALIZE_PASSES: usize = 8;

/// 规范化来源标识，结果满足 normalize(normalize(x)) == normalize(x)
///
/// 不透明标识去掉尾部噪声后可能变成合法 URL（如 `HTTP://X.com /`），
/// 因此反复规范化直到结果不再变化。
pub fn normalize(source_id: &str) -> String {
    let mut current = normalize_once(source_id);
    for _ in 0..MAX_NORMALIZE_PASSES {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn normalize_once(source_id: &str) -> String {
    match Url::parse(source_id.trim()) {
        Ok(url) if url.host_str().is_some() => normalize_url(&url),
        _ => normalize_opaque(source_id),
    }
}

fn normalize_url(url: &Url) -> String {
    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(&url.scheme().to_ascii_lowercase());
    out.push_str("://");
    if let Some(host) = url.host_str() {
        out.push_str(&host.to_ascii_lowercase());
    }
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path().trim_end_matches('/'));

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept.iter())
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    out
}

fn normalize_opaque(source_id: &str) -> String {
    let without_fragment = source_id.split('#').next().unwrap_or_default();
    without_fragment
        .trim_start()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace())
        .to_string()
}

/// 单个研究会话内的来源登记表，只增不减，不跨会话共享
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    seen: HashSet<String>,
    /// 按首次登记顺序保存，便于稳定输出
    order: Vec<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回尚未登记的候选来源（规范化形式，批内去重，保持首次出现顺序），不修改登记表
    pub fn filter_new<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = HashSet::new();
        candidates
            .into_iter()
            .map(|c| normalize(c.as_ref()))
            .filter(|n| !n.is_empty())
            .filter(|n| !self.seen.contains(n) && batch.insert(n.clone()))
            .collect()
    }

    /// 登记来源，重复登记无副作用
    pub fn record<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let normalized = normalize(id.as_ref());
            if normalized.is_empty() {
                continue;
            }
            if self.seen.insert(normalized.clone()) {
                self.order.push(normalized);
            }
        }
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.seen.contains(&normalize(source_id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 已登记来源，按登记顺序
    pub fn sources(&self) -> &[String] {
        &self.order
    }
}
