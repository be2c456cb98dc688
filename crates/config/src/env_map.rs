use crate::{Error, Result};

use std::collections::BTreeMap;
use std::collections::btree_map::{Iter, Keys};
use std::fmt::Write as _;

use serde_yaml::Value;

/// Characters that are backslash-escaped inside a double-quoted kube.env value.
const ESCAPED_CHARS: [char; 5] = ['"', '\'', '`', '\\', '$'];

/// Flat `KEY -> value` view of the configuration.
///
/// This is the format shared with the phase scripts: it is rendered as a
/// shell-sourceable kube.env file and as a YAML mapping. Keys are kept sorted
/// so every rendering is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvMap(BTreeMap<String, String>);

impl EnvMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a value, returning the previous one for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Removes `key` from the map.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Keys<'_, String, String> {
        self.0.keys()
    }

    /// Entries in key order.
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.0.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies every entry of `other` into this map, overriding existing keys.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Renders the map as kube.env: one `export KEY="VALUE"` line per key.
    #[must_use]
    pub fn to_kube_env(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.0 {
            let _ = writeln!(out, "export {}=\"{}\"", key.trim(), escape_value(value));
        }
        out
    }

    /// Parses the kube.env format produced by [`EnvMap::to_kube_env`].
    ///
    /// Blank lines and `#` comments are skipped. The `export ` prefix and
    /// surrounding double quotes are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a line has no `=` separator or an empty key.
    pub fn from_kube_env(contents: &str) -> Result<Self> {
        let mut map = Self::new();
        for (number, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::KubeEnvSyntax(number + 1, raw.to_string()));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::KubeEnvSyntax(number + 1, raw.to_string()));
            }
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            map.insert(key, unescape_value(value));
        }
        Ok(map)
    }

    /// Renders the map as a YAML mapping of strings.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Parses a YAML mapping into a map.
    ///
    /// Scalars are stringified the way the kube.env view expects (`true`,
    /// `40`, ...); an empty document yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML or not a mapping.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(contents)?;
        let mut map = Self::new();
        match value {
            Value::Null => {}
            Value::Mapping(mapping) => {
                for (key, value) in mapping {
                    map.insert(scalar_to_string(&key)?, scalar_to_string(&value)?);
                }
            }
            other => {
                return Err(Error::InvalidValue {
                    key: "<document>".to_string(),
                    value: format!("{other:?}"),
                });
            }
        }
        Ok(map)
    }
}

impl FromIterator<(String, String)> for EnvMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EnvMap {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Weak boolean decoding used for every boolean key.
///
/// Accepts `true`/`false` in any case plus `1`/`0`, `yes`/`no`, `on`/`off`;
/// the empty string is `false`.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "f" | "" => Some(false),
        _ => None,
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if ESCAPED_CHARS.contains(&c) {
            out.push('\\');
            out.push(c);
        } else if c == '\n' {
            out.push_str("\\n");
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(next) => out.push(next),
            None => out.push('\\'),
        }
    }
    out
}

fn scalar_to_string(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
            serde_yaml::to_string(value)?.trim_end().to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_kube_env_is_sorted_and_quoted() {
        let mut map = EnvMap::new();
        map.insert("ROLE", "master");
        map.insert("CLUSTER_ID", "abc");

        assert_eq!(
            map.to_kube_env(),
            "export CLUSTER_ID=\"abc\"\nexport ROLE=\"master\"\n"
        );
    }

    #[test]
    fn test_kube_env_escapes_shell_characters() {
        let mut map = EnvMap::new();
        map.insert("EXTRA_OPTS", "--flag=\"$HOME\" `id` 'x' \\");

        assert_eq!(
            map.to_kube_env(),
            "export EXTRA_OPTS=\"--flag=\\\"\\$HOME\\\" \\`id\\` \\'x\\' \\\\\"\n"
        );
    }

    #[test]
    fn test_multiline_values_survive_kube_env() {
        let mut map = EnvMap::new();
        map.insert("KUBELET_CLOUD_CONFIG", "[Global]\nauth-url=\"x\"\n");
        map.insert("LITERAL", "a\\nb");

        let parsed = EnvMap::from_kube_env(&map.to_kube_env()).unwrap();

        assert_eq!(parsed, map);
    }

    #[test]
    fn test_from_kube_env_skips_comments_and_header() {
        let contents = "# Generated by Nodelet. DO NOT EDIT.\n\nexport A=\"1\"\nB=2\n";

        let parsed = EnvMap::from_kube_env(contents).unwrap();

        assert_eq!(parsed.get("A"), Some("1"));
        assert_eq!(parsed.get("B"), Some("2"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_from_kube_env_rejects_garbage() {
        assert!(matches!(
            EnvMap::from_kube_env("export NOPE\n"),
            Err(Error::KubeEnvSyntax(1, _))
        ));
    }

    #[test]
    fn test_yaml_scalars_are_stringified() {
        let contents = "ROLE: worker\nDEBUG: true\nCPU_LIMIT: 40\nMTU_SIZE: 1440.5\nEMPTY:\n";

        let map = EnvMap::from_yaml(contents).unwrap();

        assert_eq!(map.get("ROLE"), Some("worker"));
        assert_eq!(map.get("DEBUG"), Some("true"));
        assert_eq!(map.get("CPU_LIMIT"), Some("40"));
        assert_eq!(map.get("MTU_SIZE"), Some("1440.5"));
        assert_eq!(map.get("EMPTY"), Some(""));
    }

    #[test]
    fn test_yaml_round_trip_keeps_strings() {
        let mut map = EnvMap::new();
        map.insert("DEBUG", "true");
        map.insert("MULTI", "line one\nline two");

        let parsed = EnvMap::from_yaml(&map.to_yaml().unwrap()).unwrap();

        assert_eq!(parsed, map);
    }

    #[test]
    fn test_empty_yaml_document() {
        assert!(EnvMap::from_yaml("").unwrap().is_empty());
        assert!(EnvMap::from_yaml("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    proptest! {
        #[test]
        fn kube_env_round_trips_any_value(value in ".*", multiline in "[a-z$`'\"\\\\\n]{0,16}") {
            let mut map = EnvMap::new();
            map.insert("PLAIN", value.clone());
            map.insert("MIXED", multiline.clone());

            let parsed = EnvMap::from_kube_env(&map.to_kube_env()).unwrap();

            prop_assert_eq!(parsed, map);
        }
    }
}
