//! dhk-config
//!
//! Layered YAML configuration for the bridge.
//!
//! Documents are merged in order (later documents override earlier ones,
//! objects merge key by key, everything else is replaced). The merged
//! document is canonicalised to JSON and hashed so the daemon can log a
//! stable `config_hash` without printing credentials.

mod bridge;
mod sample;

pub use bridge::{BridgeConfig, SchedulerSettings, SystemConfig};
pub use sample::{render_sample, SAMPLE_PASSWORD_ENV};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Load, merge and validate in one step.
pub fn load_bridge_config(paths: &[&str]) -> Result<(LoadedConfig, BridgeConfig)> {
    let loaded = load_layered_yaml(paths)?;
    let bridge = BridgeConfig::from_json(&loaded.config_json)?;
    Ok((loaded, bridge))
}

fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(prev) => deep_merge(prev, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Object(base_map)
        }
        // An empty YAML layer parses as null and changes nothing.
        (base, Value::Null) => base,
        (_, other) => other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_merges_objects_and_replaces_lists() {
        let base = json!({"scheduler": {"update_interval_secs": 30, "cooldown_secs": 1}, "systems": [1, 2]});
        let overlay = json!({"scheduler": {"update_interval_secs": 10}, "systems": [3]});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"scheduler": {"update_interval_secs": 10, "cooldown_secs": 1}, "systems": [3]})
        );
    }

    #[test]
    fn empty_layer_is_a_no_op() {
        let a = load_layered_yaml_from_strings(&["scheduler:\n  cooldown_secs: 2\n"]).unwrap();
        let b = load_layered_yaml_from_strings(&["scheduler:\n  cooldown_secs: 2\n", ""]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn hash_is_hex_sha256() {
        let c = load_layered_yaml_from_strings(&["a: 1"]).unwrap();
        assert_eq!(c.config_hash.len(), 64);
        assert!(c.config_hash.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(c.canonical_json, r#"{"a":1}"#);
    }
}
