//! Segment specifications and the editable segment list.

use serde::{Deserialize, Serialize};

use st_core::{parse_timestamp, Error, Result};

/// One requested extraction: `[start, end]` in seconds of the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    /// Zero-based position; outputs are numbered `index + 1`.
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl SegmentSpec {
    pub fn new(index: usize, start: f64, end: f64) -> Self {
        Self { index, start, end }
    }

    /// A `{0, 0}` placeholder.
    pub fn placeholder(index: usize) -> Self {
        Self::new(index, 0.0, 0.0)
    }

    /// Requested clip length. Negative when `end < start`.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// 1-based output number.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Both bounds clamped into `[0, duration]`.
    pub fn clamped(&self, duration: f64) -> Self {
        Self {
            index: self.index,
            start: clamp(self.start, Some(duration)),
            end: clamp(self.end, Some(duration)),
        }
    }

    /// Stream-copy trim of `input` into `output`.
    ///
    /// The range is passed through as-is; an inverted range yields a
    /// negative `-t` that the engine rejects.
    pub fn trim_args(&self, input: &str, output: &str) -> Vec<String> {
        vec![
            "-i".into(),
            input.into(),
            "-ss".into(),
            self.start.to_string(),
            "-t".into(),
            self.duration().to_string(),
            "-c".into(),
            "copy".into(),
            output.into(),
        ]
    }

    /// Parse a `START-END` (or `START,END`) range. Each bound is plain
    /// seconds or a clock value such as `1:05.5`.
    pub fn parse(index: usize, s: &str) -> Result<Self> {
        let (start, end) = s
            .split_once(',')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| Error::Validation(format!("segment {s:?} must look like START-END")))?;
        let bound = |raw: &str| {
            parse_timestamp(raw)
                .ok_or_else(|| Error::Validation(format!("invalid time {raw:?} in segment {s:?}")))
        };
        Ok(Self::new(index, bound(start)?, bound(end)?))
    }
}

impl std::fmt::Display for SegmentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} [{} - {}]",
            self.number(),
            st_core::format_time(self.start),
            st_core::format_time(self.end)
        )
    }
}

fn clamp(value: f64, duration: Option<f64>) -> f64 {
    let value = value.max(0.0);
    match duration {
        Some(d) => value.min(d),
        None => value,
    }
}

/// Editable, ordered list of segment specs.
///
/// Edits are clamped into `[0, duration]` once the duration is known.
/// Before that, bounds are only kept non-negative. Setting the duration
/// re-clamps every spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentList {
    specs: Vec<SegmentSpec>,
    duration: Option<f64>,
}

impl SegmentList {
    /// `count` placeholder specs and an unknown duration.
    pub fn placeholders(count: usize) -> Self {
        Self {
            specs: (0..count).map(SegmentSpec::placeholder).collect(),
            duration: None,
        }
    }

    /// Build a list from existing specs, renumbering them by position.
    pub fn from_specs(specs: impl IntoIterator<Item = SegmentSpec>) -> Self {
        let mut list = Self {
            specs: specs.into_iter().collect(),
            duration: None,
        };
        list.renumber();
        list
    }

    pub fn specs(&self) -> &[SegmentSpec] {
        &self.specs
    }

    pub fn get(&self, index: usize) -> Option<&SegmentSpec> {
        self.specs.get(index)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Record the source duration and clamp every spec into it.
    pub fn set_duration(&mut self, duration: f64) -> Result<()> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::Validation(format!(
                "duration must be a finite, non-negative number of seconds (got {duration})"
            )));
        }
        self.duration = Some(duration);
        for spec in &mut self.specs {
            *spec = spec.clamped(duration);
        }
        Ok(())
    }

    /// Forget the duration, e.g. when a new source is selected.
    pub fn clear_duration(&mut self) {
        self.duration = None;
    }

    /// Set the start of `index` from seconds.
    pub fn set_start(&mut self, index: usize, seconds: f64) -> Result<()> {
        let duration = self.duration;
        let spec = self.spec_mut(index)?;
        spec.start = clamp(finite(seconds)?, duration);
        Ok(())
    }

    /// Set the end of `index` from seconds.
    pub fn set_end(&mut self, index: usize, seconds: f64) -> Result<()> {
        let duration = self.duration;
        let spec = self.spec_mut(index)?;
        spec.end = clamp(finite(seconds)?, duration);
        Ok(())
    }

    /// Set the start of `index` from user input. Unparseable input leaves
    /// the segment unchanged.
    pub fn edit_start(&mut self, index: usize, raw: &str) -> Result<()> {
        self.set_start(index, parse_edit(raw)?)
    }

    /// Set the end of `index` from user input. Unparseable input leaves the
    /// spec unchanged.
    pub fn edit_end(&mut self, index: usize, raw: &str) -> Result<()> {
        self.set_end(index, parse_edit(raw)?)
    }

    /// Replace every spec, keeping the known duration and clamping to it.
    pub fn replace(&mut self, specs: impl IntoIterator<Item = SegmentSpec>) {
        let duration = self.duration;
        *self = Self::from_specs(specs);
        self.duration = duration;
        for spec in &mut self.specs {
            spec.start = clamp(spec.start, duration);
            spec.end = clamp(spec.end, duration);
        }
    }

    /// Append a placeholder spec and return its index.
    pub fn add(&mut self) -> usize {
        let index = self.specs.len();
        self.specs.push(SegmentSpec::placeholder(index));
        index
    }

    /// Remove the spec at `index`; later specs shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<SegmentSpec> {
        if index >= self.specs.len() {
            return Err(Error::not_found("segment", index + 1));
        }
        let removed = self.specs.remove(index);
        self.renumber();
        Ok(removed)
    }

    /// Back to `count` placeholders with an unknown duration.
    pub fn reset(&mut self, count: usize) {
        *self = Self::placeholders(count);
    }

    fn spec_mut(&mut self, index: usize) -> Result<&mut SegmentSpec> {
        self.specs
            .get_mut(index)
            .ok_or_else(|| Error::not_found("segment", index + 1))
    }

    fn renumber(&mut self) {
        for (i, spec) in self.specs.iter_mut().enumerate() {
            spec.index = i;
        }
    }
}

fn finite(seconds: f64) -> Result<f64> {
    if seconds.is_finite() {
        Ok(seconds)
    } else {
        Err(Error::Validation(format!("{seconds} is not a time")))
    }
}

/// Edits accept plain (possibly negative) seconds or a clock value.
fn parse_edit(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .or_else(|| parse_timestamp(trimmed))
        .ok_or_else(|| Error::Validation(format!("{raw:?} is not a time")))
}
