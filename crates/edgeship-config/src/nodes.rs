// Helpers for extracting values from KDL nodes.

use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use std::collections::BTreeMap;
use std::time::Duration;

pub(crate) fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// First positional argument as a non-negative integer.
pub(crate) fn first_u64_arg(node: &KdlNode) -> ConfigResult<Option<u64>> {
    let Some(entry) = node.entries().iter().find(|e| e.name().is_none()) else {
        return Ok(None);
    };
    let field = node.name().value();
    let value = entry
        .value()
        .as_integer()
        .ok_or_else(|| ConfigError::invalid(field, "expected an integer"))?;
    u64::try_from(value)
        .map(Some)
        .map_err(|_| ConfigError::invalid(field, "must not be negative"))
}

pub(crate) fn seconds_arg(node: &KdlNode) -> ConfigResult<Option<Duration>> {
    Ok(first_u64_arg(node)?.map(Duration::from_secs))
}

/// Required string argument of a child node.
pub(crate) fn required_string(node: &KdlNode, what: &str) -> ConfigResult<String> {
    first_string_arg(node)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingField(what.to_string()))
}

/// `env { KEY "value" }` blocks.
pub(crate) fn string_map(node: &KdlNode) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            if let Some(val) = first_string_arg(child) {
                map.insert(key, val);
            }
        }
    }
    map
}
