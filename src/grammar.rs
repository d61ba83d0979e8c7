//! The dataset naming template grammar.
//!
//! A template is a dataset name with two placeholders: a frame placeholder (`$T`, or its alias `$F`) followed by a channel placeholder (`$C`), e.g. `/t$T/channel$C`.
//! Compiling a template splits it into [`TemplateTokens`]: the literal prefix, middle and optional suffix around the placeholders.
//! The tokens both recognise dataset names (with [`TemplateTokens::pattern`]) and synthesise them (with [`TemplateTokens::name_for`]).

use regex::Regex;
use thiserror::Error;

/// The frame placeholder.
pub const FRAME_PLACEHOLDER: &str = "$T";

/// An alias of the frame placeholder.
pub const FRAME_PLACEHOLDER_ALIAS: &str = "$F";

/// The channel placeholder.
pub const CHANNEL_PLACEHOLDER: &str = "$C";

/// The default numeric sub-pattern, one or more decimal digits.
pub const DEFAULT_NUMERIC_PATTERN: &str = "[0-9]+";

/// A template grammar error.
#[derive(Clone, Debug, Error)]
pub enum GrammarError {
    /// The template does not hold exactly one frame placeholder followed by one channel placeholder.
    #[error("missing or misordered axis placeholders in template {0}")]
    MissingPlaceholders(String),
    /// The placeholders are not separated by a literal.
    #[error("axis placeholders must be separated in template {0}")]
    AdjacentPlaceholders(String),
    /// The pattern built from the template and the numeric sub-pattern is not a valid regular expression.
    #[error("invalid pattern {pattern}: {message}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// The regular expression error.
        message: String,
    },
}

/// The literal tokens of a compiled template.
///
/// There are two tokens (prefix and middle) or three when the template has a suffix after the channel placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TemplateTokens {
    template: String,
    tokens: Vec<String>,
}

/// Compile a `template` into [`TemplateTokens`].
///
/// # Errors
/// Returns [`GrammarError`] if the template does not have exactly one frame placeholder followed by one channel placeholder, separated by a literal.
pub fn compile(template: &str) -> Result<TemplateTokens, GrammarError> {
    let placeholders: Vec<(usize, &str)> = [FRAME_PLACEHOLDER, FRAME_PLACEHOLDER_ALIAS, CHANNEL_PLACEHOLDER]
        .iter()
        .flat_map(|placeholder| template.match_indices(placeholder))
        .collect();
    let missing = || GrammarError::MissingPlaceholders(template.to_string());
    let [first, second] = placeholders.as_slice() else {
        return Err(missing());
    };
    let (&(frame_index, frame), &(channel_index, channel)) = if first.0 < second.0 {
        (first, second)
    } else {
        (second, first)
    };
    if frame == CHANNEL_PLACEHOLDER || channel != CHANNEL_PLACEHOLDER {
        return Err(missing());
    }
    let frame_end = frame_index + frame.len();
    if frame_end == channel_index {
        return Err(GrammarError::AdjacentPlaceholders(template.to_string()));
    }

    let mut tokens = vec![
        template[..frame_index].to_string(),
        template[frame_end..channel_index].to_string(),
    ];
    let suffix = &template[channel_index + CHANNEL_PLACEHOLDER.len()..];
    if !suffix.is_empty() {
        tokens.push(suffix.to_string());
    }
    Ok(TemplateTokens {
        template: template.to_string(),
        tokens,
    })
}

impl TemplateTokens {
    /// Returns the template the tokens were compiled from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the tokens: prefix, middle, and optional suffix.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns the literal before the frame placeholder.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.tokens[0]
    }

    /// Returns the literal between the frame and channel placeholders.
    #[must_use]
    pub fn middle(&self) -> &str {
        &self.tokens[1]
    }

    /// Returns the literal after the channel placeholder, if any.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.tokens.get(2).map(String::as_str)
    }

    /// Build the anchored pattern matching dataset names of this template.
    ///
    /// Both placeholders are replaced by `numeric`, captured as the `frame` and `channel` groups.
    ///
    /// # Errors
    /// Returns [`GrammarError::InvalidPattern`] if `numeric` does not form a valid regular expression.
    pub fn pattern(&self, numeric: &str) -> Result<Regex, GrammarError> {
        let pattern = format!(
            "^{}(?P<frame>(?:{numeric})){}(?P<channel>(?:{numeric})){}$",
            regex::escape(self.prefix()),
            regex::escape(self.middle()),
            regex::escape(self.suffix().unwrap_or_default()),
        );
        Regex::new(&pattern).map_err(|err| GrammarError::InvalidPattern {
            pattern,
            message: err.to_string(),
        })
    }

    /// Returns the dataset name for `frame` and `channel`.
    #[must_use]
    pub fn name_for(&self, frame: u64, channel: u64) -> String {
        format!(
            "{}{frame}{}{channel}{}",
            self.prefix(),
            self.middle(),
            self.suffix().unwrap_or_default()
        )
    }
}

impl std::fmt::Display for TemplateTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}
