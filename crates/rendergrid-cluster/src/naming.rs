//! Pool and node naming scheme.
//!
//! Pool names are `<prefix><ordinal>` with ordinals starting at 1. The set
//! of live ordinals may have gaps (scale-down removes the highest, recycle
//! briefly removes any); the next ordinal is always max + 1.

/// Prefix shared by every pool name.
pub const POOL_PREFIX: &str = "render-pool-";

/// Index of the coordinator node within a pool.
pub const COORDINATOR_INDEX: u32 = 0;

/// Build the pool name for an ordinal.
pub fn pool_name(ordinal: u32) -> String {
    format!("{POOL_PREFIX}{ordinal}")
}

/// Parse the ordinal out of a pool name. `None` for foreign names.
pub fn pool_ordinal(name: &str) -> Option<u32> {
    name.strip_prefix(POOL_PREFIX)?.parse().ok()
}

/// Next ordinal to provision: max existing + 1, or 1 when none exist.
///
/// Gap-tolerant: `{1, 2, 5}` yields 6.
pub fn next_ordinal<'a>(names: impl IntoIterator<Item = &'a str>) -> u32 {
    names
        .into_iter()
        .filter_map(pool_ordinal)
        .max()
        .map_or(1, |max| max + 1)
}

/// The highest-ordinal pool name, if any. This is the scale-down victim.
pub fn highest_pool<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    names
        .into_iter()
        .filter_map(pool_ordinal)
        .max()
        .map(pool_name)
}

/// Name of a node within a pool.
pub fn node_name(pool: &str, index: u32) -> String {
    format!("{pool}-node-{index}")
}

/// Stable DNS-style address of a node within a pool.
pub fn node_address(pool: &str, index: u32) -> String {
    format!("{}.{pool}.svc.cluster.local", node_name(pool, index))
}

/// Name of a pool's coordinator node.
pub fn coordinator_name(pool: &str) -> String {
    node_name(pool, COORDINATOR_INDEX)
}
