//! Frame and channel range selection.
//!
//! A [`Range`] is written `N`, `A:B`, or `A:S:B` (start, step, inclusive end).
//! [`apply_range`] projects a [`GroupingResult`] onto a frame range and a channel range.

use std::{collections::BTreeSet, str::FromStr};

use itertools::Itertools;
use thiserror::Error;

use crate::grouping::{FrameEntry, GroupingResult};

/// A range error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    /// The text is not of the form `N`, `A:B`, or `A:S:B` with non-negative integers.
    #[error("invalid range {0}, expected N, A:B or A:S:B")]
    InvalidSyntax(String),
    /// The step is zero.
    #[error("invalid range {0}, the step must be at least 1")]
    InvalidStep(String),
    /// The start is greater than the end.
    #[error("invalid range {0}, the start must not exceed the end")]
    Reversed(String),
    /// The end of a frame range indexes beyond the frames.
    #[error("frame index out of bounds: {end} exceeds the last of {len} frames")]
    FrameIndexOutOfBounds {
        /// The end of the range.
        end: u64,
        /// The number of frames.
        len: usize,
    },
    /// A channel range selects more channels than are present.
    #[error("channel range {range} selects more than the {available} channels present")]
    TooManyChannels {
        /// The channel range.
        range: Range,
        /// The number of distinct channels present.
        available: usize,
    },
}

/// An inclusive range of indices with a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    start: u64,
    step: u64,
    end: u64,
}

impl Range {
    /// Create a new range.
    ///
    /// # Errors
    /// Returns [`RangeError`] if `step` is zero or `start` exceeds `end`.
    pub fn new(start: u64, step: u64, end: u64) -> Result<Self, RangeError> {
        let text = || format!("{start}:{step}:{end}");
        if step == 0 {
            Err(RangeError::InvalidStep(text()))
        } else if start > end {
            Err(RangeError::Reversed(text()))
        } else {
            Ok(Self { start, step, end })
        }
    }

    /// Create a range holding only `index`.
    #[must_use]
    pub const fn single(index: u64) -> Self {
        Self {
            start: index,
            step: 1,
            end: index,
        }
    }

    /// Returns the start of the range.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Returns the step of the range.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Returns the inclusive end of the range.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Returns the number of indices in the range, or [`None`] if it exceeds [`u64::MAX`].
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        ((self.end - self.start) / self.step).checked_add(1)
    }

    /// Returns false, a range holds at least one index.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if `index` is in the stride sequence of the range.
    #[must_use]
    pub const fn contains(&self, index: u64) -> bool {
        index >= self.start && index <= self.end && (index - self.start) % self.step == 0
    }

    /// Returns the first index of the range not less than `index`, or [`None`] if there is none.
    #[must_use]
    pub const fn first_from(&self, index: u64) -> Option<u64> {
        if index <= self.start {
            return Some(self.start);
        }
        let offset = index - self.start;
        let steps = offset / self.step + if offset % self.step == 0 { 0 } else { 1 };
        match steps.checked_mul(self.step) {
            Some(offset) => match self.start.checked_add(offset) {
                Some(first) if first <= self.end => Some(first),
                _ => None,
            },
            None => None,
        }
    }

    /// Returns an iterator over the indices of the range.
    pub fn iter(&self) -> impl Iterator<Item = u64> {
        let step = self.step;
        std::iter::successors(Some(self.start), move |index| index.checked_add(step))
            .take_while({
                let end = self.end;
                move |index| *index <= end
            })
    }
}

/// Parse a range from `text`, see [`Range`].
///
/// # Errors
/// Returns [`RangeError`] if `text` is not a valid range.
pub fn parse(text: &str) -> Result<Range, RangeError> {
    let invalid = || RangeError::InvalidSyntax(text.to_string());
    let fields = text
        .split(':')
        .map(|field| field.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    match fields.as_slice() {
        [index] => Ok(Range::single(*index)),
        [start, end] => Range::new(*start, 1, *end),
        [start, step, end] => Range::new(*start, *step, *end),
        _ => Err(invalid()),
    }
}

impl FromStr for Range {
    type Err = RangeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse(text)
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.step, self.end)
    }
}

/// Returns the default frame range of `result`, or [`None`] if it has no frames.
///
/// This is every position `0:1:len-1` for a contiguous frame range, otherwise every index `min:1:max`.
#[must_use]
pub fn default_frame_range(result: &GroupingResult) -> Option<Range> {
    if result.has_contiguous_frame_range() {
        Some(Range::single(0).with_end(result.frame_count() as u64 - 1))
    } else {
        Some(Range::single(result.min_frame_index()?).with_end(result.max_frame_index()?))
    }
}

/// Returns the default channel range of `result`, `min:1:max` of the channel indices, or [`None`] if it has no channels.
#[must_use]
pub fn default_channel_range(result: &GroupingResult) -> Option<Range> {
    Some(Range::single(result.min_channel_index()?).with_end(result.max_channel_index()?))
}

impl Range {
    const fn with_end(self, end: u64) -> Self {
        Self { end, ..self }
    }

    const fn with_step(self, step: u64) -> Self {
        Self { step, ..self }
    }
}

/// The most skipped frames listed by [`GroupingResult::skipped_frames`].
pub const MAX_LISTED_SKIPPED_FRAMES: usize = 1024;

/// Project `result` onto `frame_range` and `channel_range`, returning a new result.
///
/// If `result` has a contiguous frame range, `frame_range` indexes the frames by position.
/// Otherwise, `frame_range` selects frames by frame index: indices in the range between the minimum and maximum frame index without data are skipped, logged, and reported by [`GroupingResult::skipped_frames`].
/// In both cases the channels of every selected frame are replaced by the indices of `channel_range`.
///
/// # Errors
/// Returns a [`RangeError`] if
///  - the frame range is contiguous and the end of `frame_range` is not less than the number of frames, or
///  - `result` has frames and `channel_range` holds more indices than there are distinct channels in `result`.
pub fn apply_range(
    result: &GroupingResult,
    frame_range: &Range,
    channel_range: &Range,
) -> Result<GroupingResult, RangeError> {
    log::info!("applying frame range {frame_range} and channel range {channel_range}");
    let mut selected = Vec::new();
    let mut skipped_frames = Vec::new();
    let mut skipped_frame_count = 0;
    if result.has_contiguous_frame_range() {
        let len = result.frame_count();
        if frame_range.end() >= len as u64 {
            return Err(RangeError::FrameIndexOutOfBounds {
                end: frame_range.end(),
                len,
            });
        }
        for position in frame_range.iter() {
            #[allow(clippy::cast_possible_truncation)]
            let frame = &result.frames()[position as usize];
            selected.push(frame.frame_index());
        }
    } else {
        selected.extend(
            result
                .frames()
                .iter()
                .map(FrameEntry::frame_index)
                .filter(|frame_index| frame_range.contains(*frame_index)),
        );
        if let (Some(min), Some(max)) = (result.min_frame_index(), result.max_frame_index()) {
            if let Some(first) = frame_range.first_from(min) {
                let last = frame_range.end().min(max);
                if first <= last {
                    let in_span = Range::single(first).with_step(frame_range.step()).with_end(last);
                    skipped_frame_count = in_span.len().unwrap_or(u64::MAX) - selected.len() as u64;
                    skipped_frames.extend(
                        in_span
                            .iter()
                            .filter(|frame_index| {
                                result
                                    .frames()
                                    .binary_search(&FrameEntry::new(*frame_index))
                                    .is_err()
                            })
                            .take(MAX_LISTED_SKIPPED_FRAMES),
                    );
                }
            }
        }
        if skipped_frame_count > 0 {
            log::warn!(
                "{skipped_frame_count} frames of {frame_range} are missing, skipping [{}{}]",
                skipped_frames.iter().join(", "),
                if skipped_frame_count > skipped_frames.len() as u64 { ", ..." } else { "" }
            );
        }
    }

    let channel_count = if result.is_empty() {
        channel_range.len().unwrap_or(u64::MAX)
    } else {
        let available = result
            .frames()
            .iter()
            .flat_map(FrameEntry::channel_indices)
            .collect::<BTreeSet<_>>()
            .len();
        match channel_range.len() {
            Some(len) if len <= available as u64 => len,
            _ => {
                return Err(RangeError::TooManyChannels {
                    range: *channel_range,
                    available,
                })
            }
        }
    };
    let frames = selected
        .into_iter()
        .map(|frame_index| FrameEntry::with_channels(frame_index, channel_range.iter()))
        .collect();
    Ok(result.with_frames(frames, skipped_frames, skipped_frame_count, channel_count))
}
