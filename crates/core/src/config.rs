// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration fingerprinting (spec.md §6).
//!
//! Each agent hands the bus two things: its full configuration as a
//! [`serde_json::Value`] object, and the subset of keys that influence its
//! outputs. Both get turned into a byte-stable fingerprint by recursively
//! sorting object keys before serializing — `serde_json`'s `Map` iterates in
//! insertion order by default, so this step is what makes the fingerprint
//! independent of how the agent happened to build the value.

use serde_json::{Map, Value};

/// Canonicalize a JSON value by recursively sorting object keys, then
/// render it compactly. Stable across runs given the same logical value.
pub fn fingerprint(value: &Value) -> String {
    canonical(value).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                // `map[key]` panics only if the key is absent, which cannot
                // happen since `keys` was just collected from `map`.
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonical(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Compute the fingerprint of the subset of `config` named by
/// `output_altering_keys`. When `output_altering_keys` is `None`, every key
/// except `operationmode` is considered output-altering (spec.md §3).
pub fn output_altering_fingerprint(config: &Value, output_altering_keys: Option<&[String]>) -> String {
    let Value::Object(map) = config else {
        return fingerprint(config);
    };

    let mut subset = Map::new();
    match output_altering_keys {
        Some(keys) => {
            for key in keys {
                if let Some(v) = map.get(key) {
                    subset.insert(key.clone(), v.clone());
                }
            }
        }
        None => {
            for (key, v) in map {
                if key != "operationmode" {
                    subset.insert(key.clone(), v.clone());
                }
            }
        }
    }
    fingerprint(&Value::Object(subset))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
