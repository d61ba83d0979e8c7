//! Reader and writer configuration.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    convert::NarrowPolicy,
    grammar::{self, GrammarError, DEFAULT_NUMERIC_PATTERN},
};

/// Configuration options for reading and writing image stacks.
///
/// A [`Config`] is a plain value: it is passed explicitly to the reader, writer and [`AxisGrouper`](crate::grouping::AxisGrouper), and can be loaded from and saved to JSON.
///
/// ## Group By Name
/// > default: [`true`]
///
/// If enabled, [`read_store`](crate::reader::read_store) groups datasets into a hyperstack by matching their names against the [template](#template).
///
/// ## Show Unmatched Names
/// > default: [`true`]
///
/// A hint for callers to present dataset names which do not match the template separately.
///
/// ## Template Group
/// > default: `/hints`
///
/// The path of a dataset which may hold a template overriding the configured one, see [`template_override`](crate::reader::template_override).
///
/// ## Template
/// > default: `/t$T/channel$C`
///
/// The dataset naming template, see [`grammar`].
///
/// ## Numeric Pattern
/// > default: `[0-9]+`
///
/// The regular expression recognising the frame and channel indices in dataset names.
///
/// ## Narrow Policy
/// > default: [`NarrowPolicy::ToFloat32`]
///
/// How elements without an image plane representation are narrowed, see [`narrow`](crate::convert::narrow).
///
/// ## Eager Memory Limit
/// > default: [`None`]
///
/// The maximum number of bytes an eager read may decode.
/// Larger reads fail with [`ReadError::OutOfMemory`](crate::reader::ReadError::OutOfMemory).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    group_by_name: bool,
    show_unmatched_names: bool,
    template_group: String,
    template: String,
    numeric_pattern: String,
    narrow_policy: NarrowPolicy,
    eager_memory_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_by_name: true,
            show_unmatched_names: true,
            template_group: "/hints".to_string(),
            template: "/t$T/channel$C".to_string(),
            numeric_pattern: DEFAULT_NUMERIC_PATTERN.to_string(),
            narrow_policy: NarrowPolicy::default(),
            eager_memory_limit: None,
        }
    }
}

/// A configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The template or numeric pattern is invalid.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// The configuration could not be serialised or deserialised.
    #[error(transparent)]
    InvalidJSON(#[from] serde_json::Error),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An argument has an invalid value.
    #[error("invalid value {value} for argument {key}")]
    InvalidArgument {
        /// The argument key.
        key: String,
        /// The argument value.
        value: String,
    },
}

impl Config {
    /// Get the [group by name](#group-by-name) configuration.
    #[must_use]
    pub fn group_by_name(&self) -> bool {
        self.group_by_name
    }

    /// Set the [group by name](#group-by-name) configuration.
    pub fn set_group_by_name(&mut self, group_by_name: bool) {
        self.group_by_name = group_by_name;
    }

    /// Get the [show unmatched names](#show-unmatched-names) configuration.
    #[must_use]
    pub fn show_unmatched_names(&self) -> bool {
        self.show_unmatched_names
    }

    /// Set the [show unmatched names](#show-unmatched-names) configuration.
    pub fn set_show_unmatched_names(&mut self, show_unmatched_names: bool) {
        self.show_unmatched_names = show_unmatched_names;
    }

    /// Get the [template group](#template-group) configuration.
    #[must_use]
    pub fn template_group(&self) -> &str {
        &self.template_group
    }

    /// Set the [template group](#template-group) configuration.
    pub fn set_template_group(&mut self, template_group: String) {
        self.template_group = template_group;
    }

    /// Get the [template](#template) configuration.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Set the [template](#template) configuration.
    pub fn set_template(&mut self, template: String) {
        self.template = template;
    }

    /// Get the [numeric pattern](#numeric-pattern) configuration.
    #[must_use]
    pub fn numeric_pattern(&self) -> &str {
        &self.numeric_pattern
    }

    /// Set the [numeric pattern](#numeric-pattern) configuration.
    pub fn set_numeric_pattern(&mut self, numeric_pattern: String) {
        self.numeric_pattern = numeric_pattern;
    }

    /// Get the [narrow policy](#narrow-policy) configuration.
    #[must_use]
    pub fn narrow_policy(&self) -> NarrowPolicy {
        self.narrow_policy
    }

    /// Set the [narrow policy](#narrow-policy) configuration.
    pub fn set_narrow_policy(&mut self, narrow_policy: NarrowPolicy) {
        self.narrow_policy = narrow_policy;
    }

    /// Get the [eager memory limit](#eager-memory-limit) configuration.
    #[must_use]
    pub fn eager_memory_limit(&self) -> Option<u64> {
        self.eager_memory_limit
    }

    /// Set the [eager memory limit](#eager-memory-limit) configuration.
    pub fn set_eager_memory_limit(&mut self, eager_memory_limit: Option<u64>) {
        self.eager_memory_limit = eager_memory_limit;
    }

    /// Check that the template and numeric pattern compile.
    ///
    /// # Errors
    /// Returns [`ConfigError::Grammar`] if they do not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        grammar::compile(&self.template)?.pattern(&self.numeric_pattern)?;
        Ok(())
    }

    /// Read a configuration from a JSON file.
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, is not a valid configuration, or fails [`Config::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(&std::fs::read(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a JSON file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Update the configuration from `key=value` arguments, see [`parse_arguments`].
    ///
    /// Recognised keys are the configuration field names.
    /// Unrecognised keys are ignored.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidArgument`] if a value cannot be parsed, or a [`ConfigError::Grammar`] if the result fails [`Config::validate`].
    /// The configuration is unchanged on error.
    pub fn apply_arguments(&mut self, arguments: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let mut candidate = self.clone();
        candidate.apply_arguments_unchecked(arguments)?;
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    fn apply_arguments_unchecked(&mut self, arguments: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        for (key, value) in arguments {
            let invalid = || ConfigError::InvalidArgument {
                key: key.clone(),
                value: value.clone(),
            };
            match key.as_str() {
                "group_by_name" => self.group_by_name = value.parse().map_err(|_| invalid())?,
                "show_unmatched_names" => {
                    self.show_unmatched_names = value.parse().map_err(|_| invalid())?;
                }
                "template_group" => self.template_group.clone_from(value),
                "template" => self.template.clone_from(value),
                "numeric_pattern" => self.numeric_pattern.clone_from(value),
                "narrow_policy" => {
                    self.narrow_policy =
                        serde_json::from_value(serde_json::Value::String(value.clone()))
                            .map_err(|_| invalid())?;
                }
                "eager_memory_limit" => {
                    self.eager_memory_limit = Some(value.parse().map_err(|_| invalid())?);
                }
                _ => log::debug!("ignoring argument {key}={value}"),
            }
        }
        Ok(())
    }
}

/// Split a macro style argument string into a map.
///
/// Arguments are whitespace separated `key=value` pairs, and runs of whitespace are ignored.
/// A value may be enclosed in square brackets to hold whitespace, as in `template=[/t $T/c $C]`.
/// Arguments without `=` map to an empty value.
#[must_use]
pub fn parse_arguments(arguments: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut rest = arguments.trim_start();
    while !rest.is_empty() {
        let end = match rest.find("=[") {
            Some(open) if !rest[..open].contains(char::is_whitespace) => rest[open..]
                .find(']')
                .map_or(rest.len(), |close| open + close + 1),
            _ => rest.find(char::is_whitespace).unwrap_or(rest.len()),
        };
        let (argument, remainder) = rest.split_at(end);
        let (key, value) = argument.split_once('=').unwrap_or((argument, ""));
        let value = value
            .strip_prefix('[')
            .and_then(|value| value.strip_suffix(']'))
            .unwrap_or(value);
        map.insert(key.to_string(), value.to_string());
        rest = remainder.trim_start();
    }
    map
}
