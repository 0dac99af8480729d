use super::floor_index;

/// `[begin, end)` intervals carrying a base offset, so that `lookup(x)`
/// returns `x - begin + base_offset`.
///
/// Used for p2o (physical → file offset), o2p (file offset → physical), and
/// v2o (virtual → file offset). Construction fuses runs that are both
/// virtually adjacent *and* offset-contiguous (`prev_offset + (prev_end -
/// prev_begin) == cur_offset`) — a gap in the backing offsets breaks the
/// fusion even if the keys themselves are adjacent.
#[derive(Debug, Clone, Default)]
pub struct WithOffset {
    keys: Vec<u64>,
    values: Vec<(u64, u64)>,
}

/// One contiguous fragment of a multi-segment range read: starts at `x`,
/// covers `len` bytes, backed at `offset` in the target space.
pub type Segment = (u64, u64, u64);

impl WithOffset {
    pub fn new(mut intervals: Vec<(u64, u64, u64)>) -> Self {
        intervals.sort_by_key(|i| i.0);

        let mut keys = Vec::with_capacity(intervals.len());
        let mut values: Vec<(u64, u64)> = Vec::with_capacity(intervals.len());
        for (begin, end, offset) in intervals {
            match (keys.last(), values.last_mut()) {
                (Some(&prev_begin), Some((prev_end, prev_offset)))
                    if *prev_end == begin && *prev_offset + (*prev_end - prev_begin) == offset =>
                {
                    *prev_end = end;
                }
                _ => {
                    keys.push(begin);
                    values.push((end, offset));
                }
            }
        }

        WithOffset { keys, values }
    }

    pub fn lookup(&self, x: u64) -> Option<u64> {
        let idx = floor_index(&self.keys, x)?;
        let (begin, (end, offset)) = (self.keys[idx], &self.values[idx]);
        (begin <= x && x < *end).then_some(x - begin + offset)
    }

    /// Walks forward across virtually-contiguous intervals, returning the
    /// achieved size (which may fall short of `size` if the span crosses a
    /// hole or a non-contiguous jump) and the list of backing segments
    /// covering what was achieved.
    pub fn contains(&self, x: u64, size: u64) -> (u64, Vec<Segment>) {
        let Some(mut idx) = floor_index(&self.keys, x) else {
            return (0, Vec::new());
        };
        let (begin, (end, offset)) = (self.keys[idx], self.values[idx]);
        if !(begin <= x && x < end) {
            return (0, Vec::new());
        }

        let first_len = (end - x).min(size);
        let mut segments = vec![(x, first_len, x - begin + offset)];
        if end - x >= size {
            return (size, segments);
        }

        let mut achieved = first_len;
        let mut next_start = end;
        idx += 1;
        while achieved < size && idx < self.keys.len() {
            let begin = self.keys[idx];
            if begin != next_start {
                break;
            }
            let (end, offset) = self.values[idx];
            let remaining = size - achieved;
            let take = (end - begin).min(remaining);
            segments.push((next_start, take, offset));
            achieved += take;
            next_start += take;
            idx += 1;
        }

        (achieved, segments)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, u64)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .map(|(&begin, &(end, offset))| (begin, end, offset))
    }

    pub fn extremes(&self) -> Option<(u64, u64)> {
        Some((*self.keys.first()?, self.values.last()?.0))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuses_virtually_and_offset_contiguous_runs() {
        let m = WithOffset::new(vec![(0, 0x1000, 0x5000), (0x1000, 0x2000, 0x6000)]);
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![(0, 0x2000, 0x5000)]);
    }

    #[test]
    fn does_not_fuse_when_offset_jumps() {
        let m = WithOffset::new(vec![(0, 0x1000, 0x5000), (0x1000, 0x2000, 0x9000)]);
        assert_eq!(m.iter().count(), 2);
    }

    #[test]
    fn lookup_translates_through_base_offset() {
        let m = WithOffset::new(vec![(0x1000, 0x2000, 0x8000)]);
        assert_eq!(m.lookup(0x1010), Some(0x8010));
    }

    #[test]
    fn contains_single_interval_full_size() {
        let m = WithOffset::new(vec![(0x1000, 0x3000, 0x8000)]);
        let (size, segs) = m.contains(0x1000, 0x2000);
        assert_eq!(size, 0x2000);
        assert_eq!(segs, vec![(0x1000, 0x2000, 0x8000)]);
    }

    #[test]
    fn contains_falls_short_across_a_hole() {
        let m = WithOffset::new(vec![(0x1000, 0x2000, 0x8000), (0x3000, 0x4000, 0x9000)]);
        let (size, segs) = m.contains(0x1800, 0x1000);
        assert_eq!(size, 0x800);
        assert_eq!(segs, vec![(0x1800, 0x800, 0x8800)]);
    }

    #[test]
    fn contains_spans_multiple_contiguous_intervals() {
        // two separately-stored but virtually contiguous intervals with
        // non-contiguous offsets: must stop, since contains() (unlike the
        // constructor) requires virtual contiguity only, not offset
        // contiguity, to keep walking -- but the achieved size still
        // reflects the real, non-fused backing offset per segment.
        let m = WithOffset::new(vec![(0x1000, 0x2000, 0x8000), (0x2000, 0x3000, 0x20000)]);
        let (size, segs) = m.contains(0x1800, 0x1000);
        assert_eq!(size, 0x1000);
        assert_eq!(segs, vec![(0x1800, 0x800, 0x8800), (0x2000, 0x800, 0x20000)]);
    }

    #[test]
    fn empty_input_is_empty_map() {
        let m = WithOffset::new(vec![]);
        assert!(m.is_empty());
        assert_eq!(m.lookup(0), None);
        assert_eq!(m.contains(0, 1), (0, vec![]));
    }
}
