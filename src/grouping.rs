//! Grouping of dataset names into frames and channels.
//!
//! An [`AxisGrouper`] matches a flat list of dataset names against a naming template (see [`grammar`](crate::grammar)).
//! Matching names are parsed into a `(frame, channel)` index space held by a [`GroupingResult`].

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use regex::Regex;
use thiserror::Error;

use crate::{
    config::Config,
    grammar::{self, GrammarError, TemplateTokens, DEFAULT_NUMERIC_PATTERN},
    path::{DatasetPath, DatasetPathError},
};

/// A dataset name matched the template but an index field could not be parsed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("dataset name {name} matched the template but its {axis} field {field} is not an index")]
pub struct ParseError {
    name: String,
    axis: &'static str,
    field: String,
}

impl ParseError {
    /// Returns the dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A grouping error.
#[derive(Clone, Debug, Error)]
pub enum GroupingError {
    /// The template or numeric pattern is invalid.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// A matching name could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A frame and the channels found for it.
///
/// Equality and ordering consider the frame index only.
#[derive(Clone, Debug)]
pub struct FrameEntry {
    frame_index: u64,
    channels: BTreeSet<u64>,
}

impl FrameEntry {
    /// Create a new frame entry without channels.
    #[must_use]
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            channels: BTreeSet::new(),
        }
    }

    /// Create a new frame entry with `channels`.
    #[must_use]
    pub fn with_channels(frame_index: u64, channels: impl IntoIterator<Item = u64>) -> Self {
        Self {
            frame_index,
            channels: channels.into_iter().collect(),
        }
    }

    /// Add a channel. Duplicate channels are ignored.
    pub fn add_channel(&mut self, channel: u64) {
        self.channels.insert(channel);
    }

    /// Returns the frame index.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Returns the channel indices in ascending order.
    #[must_use]
    pub fn channel_indices(&self) -> Vec<u64> {
        self.channels.iter().copied().collect()
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the frame has `channel`.
    #[must_use]
    pub fn has_channel(&self, channel: u64) -> bool {
        self.channels.contains(&channel)
    }
}

impl PartialEq for FrameEntry {
    fn eq(&self, other: &Self) -> bool {
        self.frame_index == other.frame_index
    }
}

impl Eq for FrameEntry {}

impl PartialOrd for FrameEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.frame_index.cmp(&other.frame_index)
    }
}

impl std::fmt::Display for FrameEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame {}: {} channels [{}]",
            self.frame_index,
            self.channels.len(),
            self.channels.iter().join(", ")
        )
    }
}

/// The frames and channels discovered in a list of dataset names.
///
/// `frames` is sorted by frame index.
/// A result is never mutated: [`apply_range`](crate::range::apply_range) returns a new one.
#[derive(Clone, Debug)]
pub struct GroupingResult {
    frames: Vec<FrameEntry>,
    matched_names: Vec<String>,
    unmatched_names: Vec<String>,
    tokens: TemplateTokens,
    parse_errors: Vec<ParseError>,
    skipped_frames: Vec<u64>,
    skipped_frame_count: u64,
    channel_count: Option<u64>,
}

impl GroupingResult {
    /// Returns a result with the same names and template as this one and new `frames`.
    pub(crate) fn with_frames(
        &self,
        frames: Vec<FrameEntry>,
        skipped_frames: Vec<u64>,
        skipped_frame_count: u64,
        channel_count: u64,
    ) -> Self {
        Self {
            frames,
            matched_names: self.matched_names.clone(),
            unmatched_names: self.unmatched_names.clone(),
            tokens: self.tokens.clone(),
            parse_errors: self.parse_errors.clone(),
            skipped_frames,
            skipped_frame_count,
            channel_count: Some(channel_count),
        }
    }

    /// Returns the frames, sorted by frame index.
    #[must_use]
    pub fn frames(&self) -> &[FrameEntry] {
        &self.frames
    }

    /// Returns the frame at position `i`, or [`None`] if out of range.
    #[must_use]
    pub fn frame(&self, i: usize) -> Option<&FrameEntry> {
        self.frames.get(i)
    }

    /// Returns the number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no name matched the template.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the names which matched the template, in input order.
    #[must_use]
    pub fn matched_names(&self) -> &[String] {
        &self.matched_names
    }

    /// Returns the names which did not match the template, in input order and including duplicates.
    ///
    /// Names which matched the template but could not be parsed are included.
    #[must_use]
    pub fn unmatched_names(&self) -> &[String] {
        &self.unmatched_names
    }

    /// Returns the template tokens.
    #[must_use]
    pub fn template_tokens(&self) -> &TemplateTokens {
        &self.tokens
    }

    /// Returns the errors of names which matched the template but could not be parsed.
    #[must_use]
    pub fn parse_errors(&self) -> &[ParseError] {
        &self.parse_errors
    }

    /// Returns the frames of a sparse range which had no data and were skipped by [`apply_range`](crate::range::apply_range).
    ///
    /// At most [`MAX_LISTED_SKIPPED_FRAMES`](crate::range::MAX_LISTED_SKIPPED_FRAMES) frames are listed, see [`skipped_frame_count`](Self::skipped_frame_count).
    #[must_use]
    pub fn skipped_frames(&self) -> &[u64] {
        &self.skipped_frames
    }

    /// Returns the number of frames skipped by [`apply_range`](crate::range::apply_range), including those not listed by [`skipped_frames`](Self::skipped_frames).
    #[must_use]
    pub const fn skipped_frame_count(&self) -> u64 {
        self.skipped_frame_count
    }

    /// Returns the minimum frame index.
    #[must_use]
    pub fn min_frame_index(&self) -> Option<u64> {
        self.frames.first().map(FrameEntry::frame_index)
    }

    /// Returns the maximum frame index.
    #[must_use]
    pub fn max_frame_index(&self) -> Option<u64> {
        self.frames.last().map(FrameEntry::frame_index)
    }

    /// Returns the minimum channel index over all frames.
    #[must_use]
    pub fn min_channel_index(&self) -> Option<u64> {
        self.frames
            .iter()
            .filter_map(|frame| frame.channels.first())
            .min()
            .copied()
    }

    /// Returns the maximum channel index over all frames.
    #[must_use]
    pub fn max_channel_index(&self) -> Option<u64> {
        self.frames
            .iter()
            .filter_map(|frame| frame.channels.last())
            .max()
            .copied()
    }

    /// Returns the number of channels of the hyperstack.
    ///
    /// This is `max - min + 1` of the channel indices, or the length of the channel range once a range is applied.
    #[must_use]
    pub fn channel_count(&self) -> u64 {
        self.channel_count.unwrap_or_else(|| {
            match (self.min_channel_index(), self.max_channel_index()) {
                (Some(min), Some(max)) => (max - min).saturating_add(1),
                _ => 0,
            }
        })
    }

    /// Returns true if every frame index between the minimum and maximum is present.
    ///
    /// An empty result does not have a contiguous frame range.
    #[must_use]
    pub fn has_contiguous_frame_range(&self) -> bool {
        match (self.min_frame_index(), self.max_frame_index()) {
            (Some(min), Some(max)) => self.frames.len() as u64 - 1 == max - min,
            _ => false,
        }
    }

    /// Returns the path of the dataset for `frame` and `channel`.
    ///
    /// # Errors
    /// Returns [`DatasetPathError`] if the name built from the template is not a valid path.
    pub fn dataset_path(&self, frame: u64, channel: u64) -> Result<DatasetPath, DatasetPathError> {
        DatasetPath::new(&self.tokens.name_for(frame, channel))
    }
}

impl std::fmt::Display for GroupingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = |index: Option<u64>| index.map_or_else(|| "-".to_string(), |i| i.to_string());
        writeln!(f, "template: {}", self.tokens)?;
        writeln!(
            f,
            "frames: {} (min {}, max {}, contiguous: {})",
            self.frames.len(),
            index(self.min_frame_index()),
            index(self.max_frame_index()),
            self.has_contiguous_frame_range()
        )?;
        writeln!(
            f,
            "channels: {} (min {}, max {})",
            self.channel_count(),
            index(self.min_channel_index()),
            index(self.max_channel_index())
        )?;
        for frame in &self.frames {
            writeln!(f, "{frame}")?;
        }
        write!(f, "unmatched names: {}", self.unmatched_names.len())
    }
}

/// Groups dataset names by a naming template.
#[derive(Clone, Debug)]
pub struct AxisGrouper {
    tokens: TemplateTokens,
    pattern: Regex,
}

impl AxisGrouper {
    /// Create a new grouper for `tokens`, recognising indices with the `numeric` sub-pattern.
    ///
    /// # Errors
    /// Returns [`GrammarError::InvalidPattern`] if `numeric` is not a valid regular expression.
    pub fn new(tokens: TemplateTokens, numeric: &str) -> Result<Self, GrammarError> {
        let pattern = tokens.pattern(numeric)?;
        Ok(Self { tokens, pattern })
    }

    /// Create a new grouper from the [template](Config#template) and [numeric pattern](Config#numeric-pattern) of `config`.
    ///
    /// # Errors
    /// Returns a [`GrammarError`] if the template or numeric pattern is invalid.
    pub fn from_config(config: &Config) -> Result<Self, GrammarError> {
        Self::new(grammar::compile(config.template())?, config.numeric_pattern())
    }

    /// Returns the template tokens.
    #[must_use]
    pub fn tokens(&self) -> &TemplateTokens {
        &self.tokens
    }

    fn parse(&self, name: &str) -> Option<Result<(u64, u64), ParseError>> {
        let captures = self.pattern.captures(name)?;
        let field = |axis: &'static str| {
            let field = &captures[axis];
            field.parse::<u64>().map_err(|_| ParseError {
                name: name.to_string(),
                axis,
                field: field.to_string(),
            })
        };
        Some(field("frame").and_then(|frame| Ok((frame, field("channel")?))))
    }

    /// Group `names` into frames and channels.
    ///
    /// Names which do not match the template are kept as unmatched names.
    /// Names which match but cannot be parsed are also kept as unmatched names, and their errors are recorded in [`GroupingResult::parse_errors`].
    pub fn group<S: AsRef<str>>(&self, names: &[S]) -> GroupingResult {
        let mut frames: BTreeMap<u64, FrameEntry> = BTreeMap::new();
        let mut matched_names = Vec::new();
        let mut unmatched_names = Vec::new();
        let mut parse_errors = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.parse(name) {
                Some(Ok((frame, channel))) => {
                    matched_names.push(name.to_string());
                    frames
                        .entry(frame)
                        .or_insert_with(|| FrameEntry::new(frame))
                        .add_channel(channel);
                }
                Some(Err(err)) => {
                    log::warn!("{err}");
                    unmatched_names.push(name.to_string());
                    parse_errors.push(err);
                }
                None => unmatched_names.push(name.to_string()),
            }
        }
        let result = GroupingResult {
            frames: frames.into_values().collect(),
            matched_names,
            unmatched_names,
            tokens: self.tokens.clone(),
            parse_errors,
            skipped_frames: Vec::new(),
            skipped_frame_count: 0,
            channel_count: None,
        };
        log::info!(
            "grouped {} names by {}: {} frames, {} unmatched",
            names.len(),
            self.tokens,
            result.frame_count(),
            result.unmatched_names.len()
        );
        result
    }

    /// Group `names` into frames and channels, failing on the first name which matches the template but cannot be parsed.
    ///
    /// # Errors
    /// Returns [`GroupingError::Parse`] for a matching name which cannot be parsed.
    pub fn group_strict<S: AsRef<str>>(&self, names: &[S]) -> Result<GroupingResult, GroupingError> {
        let result = self.group(names);
        match result.parse_errors.first() {
            Some(err) => Err(err.clone().into()),
            None => Ok(result),
        }
    }
}

/// Group `names` into frames and channels by `tokens`, recognising indices as decimal digits.
///
/// See [`AxisGrouper::group`].
///
/// # Errors
/// Returns a [`GroupingError`] if the pattern of `tokens` cannot be built.
pub fn group<S: AsRef<str>>(
    names: &[S],
    tokens: &TemplateTokens,
) -> Result<GroupingResult, GroupingError> {
    Ok(AxisGrouper::new(tokens.clone(), DEFAULT_NUMERIC_PATTERN)?.group(names))
}
