//! Cluster ID recognition in free text

use crate::metrics::Metrics;
use regex::Regex;
use std::sync::LazyLock;

/// UUID-shaped cluster ID: hyphens optional, version nibble 4, RFC 4122 variant.
static CLUSTER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-f0-9]{8}-?[a-f0-9]{4}-?4[a-f0-9]{3}-?[89ab][a-f0-9]{3}-?[a-f0-9]{12}")
        .expect("cluster id pattern is valid")
});

/// Cluster ID named by `text`, as written.
///
/// Only the first line is searched, and when it holds several IDs the last
/// one wins.
pub fn find_cluster_id(text: &str) -> Option<&str> {
    let first_line = text.split('\n').next()?;
    CLUSTER_ID_RE.find_iter(first_line).last().map(|m| m.as_str())
}

/// Counts a mention of the cluster ID found in `text`, if any.
pub fn observe_mention(text: &str, metrics: &Metrics) -> Option<String> {
    let cluster = find_cluster_id(text)?;
    metrics.record_mention(cluster);
    Some(cluster.to_string())
}
