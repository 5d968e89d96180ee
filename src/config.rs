use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SanitizerError, SanitizerResult};
use crate::layout::{MediaDimensions, StaticAttachmentMetadata};

pub const CONTENT_MAX_WIDTH: &str = "content_max_width";
pub const REQUIRE_HTTPS_SRC: &str = "require_https_src";
pub const DISABLE_INVALID_REMOVAL: &str = "disable_invalid_removal";
pub const USE_DOCUMENT_ELEMENT: &str = "use_document_element";

/// A scalar configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// Render the value the way it would appear in a markup attribute.
    pub fn to_attribute_string(&self) -> String {
        match self {
            ConfigValue::Null => String::new(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Number(n) => format_number(*n),
            ConfigValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => f.write_str("null"),
            other => f.write_str(&other.to_attribute_string()),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Number(n)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

/// Whole numbers render without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Caller-supplied overrides for one sanitizer.
pub type ArgMap = BTreeMap<String, ConfigValue>;

/// Defaults every sanitizer declares.
pub fn general_defaults() -> Vec<(&'static str, ConfigValue)> {
    vec![
        (CONTENT_MAX_WIDTH, ConfigValue::Null),
        (REQUIRE_HTTPS_SRC, ConfigValue::Bool(false)),
        (DISABLE_INVALID_REMOVAL, ConfigValue::Bool(false)),
        (USE_DOCUMENT_ELEMENT, ConfigValue::Bool(false)),
    ]
}

/// Sealed, merged arguments of one sanitizer instance.
///
/// Only declared keys exist; asking for anything else is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizerArgs {
    sanitizer: String,
    values: BTreeMap<String, ConfigValue>,
}

impl SanitizerArgs {
    /// Merge `overrides` over `defaults`. Unknown override keys fail.
    pub fn merge(
        sanitizer: &str,
        defaults: Vec<(&'static str, ConfigValue)>,
        overrides: &ArgMap,
    ) -> SanitizerResult<Self> {
        let mut values: BTreeMap<String, ConfigValue> = defaults
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        for (key, value) in overrides {
            match values.get_mut(key) {
                Some(slot) => *slot = value.clone(),
                None => {
                    return Err(SanitizerError::UnknownArg {
                        sanitizer: sanitizer.to_string(),
                        key: key.clone(),
                        declared: values.keys().cloned().collect::<Vec<_>>().join(", "),
                    })
                }
            }
        }

        Ok(Self {
            sanitizer: sanitizer.to_string(),
            values,
        })
    }

    pub fn sanitizer(&self) -> &str {
        &self.sanitizer
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> SanitizerResult<&ConfigValue> {
        self.values
            .get(key)
            .ok_or_else(|| SanitizerError::UndeclaredArg {
                sanitizer: self.sanitizer.clone(),
                key: key.to_string(),
            })
    }

    pub fn get_bool(&self, key: &str) -> SanitizerResult<bool> {
        self.get(key)?
            .as_bool()
            .ok_or_else(|| SanitizerError::InvalidArgType {
                key: key.to_string(),
                expected: "a boolean".to_string(),
            })
    }

    /// `Ok(None)` when the declared value is null.
    pub fn get_f64(&self, key: &str) -> SanitizerResult<Option<f64>> {
        let value = self.get(key)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SanitizerError::InvalidArgType {
                key: key.to_string(),
                expected: "a number or null".to_string(),
            })
    }

    pub fn get_str(&self, key: &str) -> SanitizerResult<&str> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| SanitizerError::InvalidArgType {
                key: key.to_string(),
                expected: "a string".to_string(),
            })
    }

    /// Check that every declared general argument has the expected type.
    pub(crate) fn validate_general(&self) -> SanitizerResult<()> {
        self.get_f64(CONTENT_MAX_WIDTH)?;
        self.get_bool(REQUIRE_HTTPS_SRC)?;
        self.get_bool(DISABLE_INVALID_REMOVAL)?;
        self.get_bool(USE_DOCUMENT_ELEMENT)?;
        Ok(())
    }
}

const SECTIONS: &[&str] = &["all", "media", "layout", "scripts", "styles", "attachments"];

/// Pipeline-level configuration, one optional section per sanitizer.
///
/// ```yaml
/// media:
///   require_https_src: true
/// styles:
///   inline_class_prefix: "inline"
/// attachments:
///   photo: { width: 1200, height: 800 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Applied to every sanitizer before its own section
    pub all: ArgMap,
    pub media: ArgMap,
    pub layout: ArgMap,
    pub scripts: ArgMap,
    pub styles: ArgMap,
    /// Attachment dimensions keyed by file name without extension
    pub attachments: BTreeMap<String, MediaDimensions>,
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> SanitizerResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        if let serde_yaml::Value::Mapping(ref sections) = value {
            for key in sections.keys() {
                let name = key.as_str().unwrap_or_default();
                if !SECTIONS.contains(&name) {
                    return Err(SanitizerError::UnknownSanitizer {
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Overrides for the named sanitizer: the `all` section, then its own.
    pub fn overrides_for(&self, sanitizer: &str) -> SanitizerResult<ArgMap> {
        let section = match sanitizer {
            "media" => &self.media,
            "layout" => &self.layout,
            "scripts" => &self.scripts,
            "styles" => &self.styles,
            other => {
                return Err(SanitizerError::UnknownSanitizer {
                    name: other.to_string(),
                })
            }
        };
        let mut merged = self.all.clone();
        merged.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(merged)
    }

    pub fn attachment_metadata(&self) -> StaticAttachmentMetadata {
        self.attachments
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
