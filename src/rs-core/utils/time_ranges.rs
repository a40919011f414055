use std::{ops::Index, slice::Iter};

/// Represent a range of time, from a start to an end, generally in seconds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    start: f64,
    end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Returns the start time of the range
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Returns the end time of the range
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Returns `true` if `pos` is inside that range, its end excluded.
    pub fn contains(&self, pos: f64) -> bool {
        pos >= self.start && pos < self.end
    }
}

/// Abstracts non-contiguous chronological ranges of time, generally expressed in seconds.
///
/// This is the form under which media buffers report what they have buffered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    /// Create a new empty `TimeRanges` object
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `TimeRanges` object from a list of `(start, end)` tuples, which do not need
    /// to be sorted nor merged.
    pub fn from_ranges(ranges: &[(f64, f64)]) -> Self {
        let mut time_ranges = Self::new();
        for (start, end) in ranges {
            time_ranges.add(*start, *end);
        }
        time_ranges
    }

    /// Add a range of time to that `TimeRanges` object, merging it with the ranges that are
    /// already there.
    ///
    /// Empty or inverted ranges are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if !(start < end) {
            return;
        }
        let first_overlapping_idx = self.ranges.iter().position(|r| r.end >= start);
        let first_idx = match first_overlapping_idx {
            None => {
                self.ranges.push(TimeRange { start, end });
                return;
            }
            Some(idx) => idx,
        };
        if end < self.ranges[first_idx].start {
            self.ranges.insert(first_idx, TimeRange { start, end });
            return;
        }

        let mut last_idx = first_idx;
        while last_idx + 1 < self.ranges.len() && self.ranges[last_idx + 1].start <= end {
            last_idx += 1;
        }
        let merged = TimeRange {
            start: f64::min(start, self.ranges[first_idx].start),
            end: f64::max(end, self.ranges[last_idx].end),
        };
        self.ranges.drain(first_idx + 1..=last_idx);
        self.ranges[first_idx] = merged;
    }

    /// Returns the number of non-contiguous ranges in this `TimeRanges` object
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the starting time of the range whose index is given in argument.
    ///
    /// Returns `None` if the given index is superior or equal to the number of actual ranges.
    pub fn start(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.start)
    }

    /// Returns the ending time of the range whose index is given in argument.
    ///
    /// Returns `None` if the given index is superior or equal to the number of actual ranges.
    pub fn end(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.end)
    }

    /// Returns the range containing the given position.
    ///
    /// Returns `None` if no range in this `TimeRanges` object contains it.
    pub fn range_for(&self, pos: f64) -> Option<&TimeRange> {
        for range in self.into_iter() {
            if pos < range.end {
                return if pos >= range.start {
                    Some(range)
                } else {
                    None
                };
            }
        }
        None
    }

    /// Returns the amount of time, in seconds, buffered after `pos` in the range containing it.
    ///
    /// Returns `f64::INFINITY` if no range contains `pos`, as no limit can be known in that
    /// case.
    pub fn left_size_of_range(&self, pos: f64) -> f64 {
        match self.range_for(pos) {
            Some(range) => range.end - pos,
            None => f64::INFINITY,
        }
    }

    /// Returns both the range containing `pos` (if one) and all the other ranges.
    pub fn split_around(&self, pos: f64) -> (Option<TimeRange>, Vec<TimeRange>) {
        let mut inner = None;
        let mut outer = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            if inner.is_none() && range.contains(pos) {
                inner = Some(*range);
            } else {
                outer.push(*range);
            }
        }
        (inner, outer)
    }

    pub fn clear(&mut self) {
        self.ranges.clear()
    }
}

impl Index<usize> for TimeRanges {
    type Output = TimeRange;
    fn index(&self, index: usize) -> &Self::Output {
        &self.ranges[index]
    }
}

impl<'a> IntoIterator for &'a TimeRanges {
    type Item = &'a TimeRange;

    type IntoIter = Iter<'a, TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}
