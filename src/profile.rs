//! Clash profile I/O
//!
//! Loads the node/group YAML document, merges quality annotations into node
//! names and group member references, and writes the result back out. The
//! document is kept as an order-preserving [`serde_yaml::Mapping`] so that
//! unrelated fields round-trip untouched.

use crate::Result;
use anyhow::Context;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Load a Clash profile document
pub fn load(path: &Path) -> Result<Mapping> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {:?}", path))?;
    let doc: Mapping = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse YAML in {:?}", path))?;
    Ok(doc)
}

/// List the node names under `proxies`
pub fn proxy_names(doc: &Mapping) -> Vec<String> {
    match doc.get("proxies").and_then(Value::as_sequence) {
        Some(seq) => seq
            .iter()
            .filter_map(|proxy| proxy.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Append annotations to node names and propagate the renames into every
/// group's member list
///
/// Nodes absent from the annotation map keep their names, so merging with an
/// empty map leaves the document unchanged.
pub fn merge_annotations(doc: &mut Mapping, annotations: &HashMap<String, String>) {
    let mut renames: HashMap<String, String> = HashMap::new();

    if let Some(proxies) = doc.get_mut("proxies").and_then(Value::as_sequence_mut) {
        for proxy in proxies.iter_mut() {
            let name = match proxy.get("name").and_then(Value::as_str) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if let Some(annotation) = annotations.get(&name) {
                let new_name = format!("{} {}", name, annotation);
                if let Some(map) = proxy.as_mapping_mut() {
                    map.insert(Value::from("name"), Value::from(new_name.clone()));
                    renames.insert(name, new_name);
                }
            }
        }
    }

    if let Some(groups) = doc.get_mut("proxy-groups").and_then(Value::as_sequence_mut) {
        for group in groups.iter_mut() {
            let members = match group.get_mut("proxies").and_then(Value::as_sequence_mut) {
                Some(m) => m,
                None => continue,
            };
            for member in members.iter_mut() {
                let renamed = member
                    .as_str()
                    .and_then(|n| renames.get(n))
                    .map(|n| n.to_string());
                if let Some(new_name) = renamed {
                    *member = Value::from(new_name);
                }
            }
        }
    }
}

/// Derive the output file name: `<stem><suffix><ext>` of the input basename,
/// placed in the current working directory
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config");
    match input.extension().and_then(|s| s.to_str()) {
        Some(ext) => PathBuf::from(format!("{}{}.{}", stem, suffix, ext)),
        None => PathBuf::from(format!("{}{}", stem, suffix)),
    }
}

/// Serialize the document and write it out
pub fn save(doc: &Mapping, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(doc)
        .context("Failed to serialize annotated profile")?;
    fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PROFILE: &str = r#"
port: 7890
mode: rule
proxies:
  - name: US-1
    type: ss
    server: us.example.com
    port: 443
  - name: HK-2
    type: vmess
    server: hk.example.com
proxy-groups:
  - name: AUTO
    type: select
    proxies:
      - US-1
      - HK-2
      - DIRECT
  - name: FALLBACK
    type: fallback
    proxies:
      - US-1
"#;

    fn sample_doc() -> Mapping {
        serde_yaml::from_str(SAMPLE_PROFILE).unwrap()
    }

    #[test]
    fn test_proxy_names() {
        let doc = sample_doc();
        assert_eq!(proxy_names(&doc), vec!["US-1", "HK-2"]);
    }

    #[test]
    fn test_merge_renames_node_and_groups() {
        let mut doc = sample_doc();
        let mut annotations = HashMap::new();
        annotations.insert("US-1".to_string(), "【🟢⚪ 机房|广播】".to_string());

        merge_annotations(&mut doc, &annotations);

        assert_eq!(
            proxy_names(&doc),
            vec!["US-1 【🟢⚪ 机房|广播】", "HK-2"]
        );

        let groups = doc.get("proxy-groups").and_then(Value::as_sequence).unwrap();
        let auto_members = groups[0].get("proxies").and_then(Value::as_sequence).unwrap();
        assert_eq!(auto_members[0].as_str(), Some("US-1 【🟢⚪ 机房|广播】"));
        assert_eq!(auto_members[1].as_str(), Some("HK-2"));
        assert_eq!(auto_members[2].as_str(), Some("DIRECT"));

        let fallback_members = groups[1].get("proxies").and_then(Value::as_sequence).unwrap();
        assert_eq!(fallback_members[0].as_str(), Some("US-1 【🟢⚪ 机房|广播】"));
    }

    #[test]
    fn test_merge_preserves_other_fields() {
        let mut doc = sample_doc();
        let mut annotations = HashMap::new();
        annotations.insert("US-1".to_string(), "【❌ Error】".to_string());

        merge_annotations(&mut doc, &annotations);

        let proxies = doc.get("proxies").and_then(Value::as_sequence).unwrap();
        assert_eq!(proxies[0].get("server").and_then(Value::as_str), Some("us.example.com"));
        assert_eq!(proxies[0].get("port").and_then(Value::as_u64), Some(443));
        assert_eq!(doc.get("mode").and_then(Value::as_str), Some("rule"));
    }

    #[test]
    fn test_merge_with_empty_map_is_identity() {
        let mut doc = sample_doc();
        let before = serde_yaml::to_string(&doc).unwrap();
        merge_annotations(&mut doc, &HashMap::new());
        let after = serde_yaml::to_string(&doc).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_round_trip_preserves_key_order_and_unicode() {
        let doc = sample_doc();
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let port_pos = yaml.find("port:").unwrap();
        let mode_pos = yaml.find("mode:").unwrap();
        let proxies_pos = yaml.find("proxies:").unwrap();
        assert!(port_pos < mode_pos && mode_pos < proxies_pos);

        let mut annotated = sample_doc();
        let mut annotations = HashMap::new();
        annotations.insert("HK-2".to_string(), "【⚪⚪ 未知】".to_string());
        merge_annotations(&mut annotated, &annotations);
        let yaml = serde_yaml::to_string(&annotated).unwrap();
        // Unicode written as-is, never escaped
        assert!(yaml.contains("【⚪⚪ 未知】"));
    }

    #[test]
    fn test_output_path_inserts_suffix_before_extension() {
        let path = output_path(Path::new("/home/user/config.yaml"), "_checked");
        assert_eq!(path, PathBuf::from("config_checked.yaml"));
    }

    #[test]
    fn test_output_path_without_extension() {
        let path = output_path(Path::new("nodes"), "_checked");
        assert_eq!(path, PathBuf::from("nodes_checked"));
    }
}
