//! Schema: the typed configuration a session is built from.
//!
//! The core reads a TOML rendering of the schema with the same key
//! structure the host's schema files use: `schema/*`, `speller/*`,
//! `translator/*`, `engine/*`, `key_binder/*`, `menu/*`.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ALPHABET: &str = "zyxwvutsrqponmlkjihgfedcba";

fn default_alphabet() -> String {
    DEFAULT_ALPHABET.to_string()
}

fn default_delimiter() -> String {
    " '".to_string()
}

fn default_page_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_processors() -> Vec<String> {
    vec!["key_binder".to_string(), "fluency_editor".to_string()]
}

fn default_segmentors() -> Vec<String> {
    vec!["abc_segmentor".to_string()]
}

fn default_translators() -> Vec<String> {
    vec!["r10n_translator".to_string()]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaInfo {
    #[serde(default)]
    pub schema_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpellerConfig {
    #[serde(default = "default_alphabet")]
    pub alphabet: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for SpellerConfig {
    fn default() -> Self {
        SpellerConfig {
            alphabet: default_alphabet(),
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub dictionary: String,
    #[serde(default = "default_true")]
    pub enable_user_dict: bool,
    #[serde(default = "default_true")]
    pub enable_completion: bool,
    /// Rewrite rules applied to rendered preedit, `"xform/<from>/<to>/"`.
    #[serde(default)]
    pub preedit_format: Vec<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            dictionary: String::new(),
            enable_user_dict: true,
            enable_completion: true,
            preedit_format: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_processors")]
    pub processors: Vec<String>,
    #[serde(default = "default_segmentors")]
    pub segmentors: Vec<String>,
    #[serde(default = "default_translators")]
    pub translators: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            processors: default_processors(),
            segmentors: default_segmentors(),
            translators: default_translators(),
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeyBindingConfig {
    pub when: String,
    pub accept: String,
    pub send: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeyBinderConfig {
    #[serde(default)]
    pub bindings: Vec<KeyBindingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MenuConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MenuConfig {
    fn default() -> Self {
        MenuConfig {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Schema {
    #[serde(default)]
    pub schema: SchemaInfo,
    #[serde(default)]
    pub speller: SpellerConfig,
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub key_binder: KeyBinderConfig,
    #[serde(default)]
    pub menu: MenuConfig,
}

impl Schema {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Schema> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let schema: Schema = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            schema_id = %schema.schema.schema_id,
            "loaded schema"
        );
        Ok(schema)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Schema> {
        Ok(toml::from_str(content)?)
    }

    pub fn schema_id(&self) -> &str {
        &self.schema.schema_id
    }

    pub fn schema_name(&self) -> &str {
        &self.schema.name
    }

    pub fn page_size(&self) -> usize {
        self.menu.page_size.max(1)
    }
}

/// Apply `"xform/<from>/<to>/"` rewrite rules to a rendered preedit.
pub fn apply_preedit_format(rules: &[String], preedit: &str) -> String {
    let mut result = preedit.to_string();
    for rule in rules {
        let body = match rule.strip_prefix("xform") {
            Some(body) => body,
            None => continue,
        };
        let mut chars = body.chars();
        let separator = match chars.next() {
            Some(separator) => separator,
            None => continue,
        };
        let parts: Vec<&str> = chars.as_str().split(separator).collect();
        if parts.len() < 2 {
            tracing::warn!(rule, "malformed preedit format rule");
            continue;
        }
        result = result.replace(parts[0], parts[1]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_a_minimal_schema() {
        let schema = Schema::from_toml_str(
            r#"
            [schema]
            schema_id = "r10n_test"
            name = "Test"

            [translator]
            dictionary = "sample"
            "#,
        )
        .unwrap();
        assert_eq!(schema.schema_id(), "r10n_test");
        assert_eq!(schema.translator.dictionary, "sample");
        assert!(schema.translator.enable_user_dict);
        assert_eq!(schema.speller.delimiter, " '");
        assert_eq!(schema.page_size(), 5);
        assert_eq!(
            schema.engine.processors,
            vec!["key_binder".to_string(), "fluency_editor".to_string()]
        );
    }

    #[test]
    fn bindings_deserialize_from_tables() {
        let schema = Schema::from_toml_str(
            r#"
            [[key_binder.bindings]]
            when = "paging"
            accept = "-"
            send = "Page_Up"
            "#,
        )
        .unwrap();
        assert_eq!(schema.key_binder.bindings.len(), 1);
        assert_eq!(schema.key_binder.bindings[0].send, "Page_Up");
    }

    #[test]
    fn preedit_format_rewrites_literally() {
        let rules = vec!["xform/a/A/".to_string(), "not-a-rule".to_string()];
        assert_eq!(apply_preedit_format(&rules, "hao ma"), "hAo mA");
    }
}
