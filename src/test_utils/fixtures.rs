//! Common test data.

/// Exposition text with two gauge families, `foo` (two points) and `bar`
/// (one point).
pub const MIXED_FAMILIES: &str = "# HELP foo A test family.\n\
# TYPE foo gauge\n\
foo{a=\"x\"} 1.0\n\
foo{a=\"y\"} 2.0\n\
# HELP bar Another family.\n\
# TYPE bar gauge\n\
bar{b=\"z\"} 3.0\n";

/// A small single-family exposition payload.
pub const SINGLE_GAUGE: &str = "# TYPE node_memory_usage_bytes gauge\n\
node_memory_usage_bytes{instance=\"node-1\"} 1048576\n";
