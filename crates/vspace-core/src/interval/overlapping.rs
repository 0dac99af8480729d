use std::collections::{BTreeMap, HashMap, HashSet};

/// Overlapping `[begin, end)` intervals, each carrying a list of base
/// addresses, answering "what addresses correspond to offset x" when many
/// virtual pages alias one physical page.
///
/// Built with a sweep over interval endpoints ("limits"): for each limit we
/// precompute the list of base addresses active in the bucket ending there,
/// each incremented by however far the bucket has moved since the address's
/// interval started. A lookup then only needs to find the bucket and add
/// the remaining offset within it.
#[derive(Debug, Clone, Default)]
pub struct Overlapping {
    limits: Vec<u64>,
    /// `results[i]` is the active base-address list for the bucket
    /// `(limits[i - 1], limits[i]]`; `results[0]` is always empty (before
    /// the first limit, nothing is active).
    results: Vec<Vec<u64>>,
}

impl Overlapping {
    /// `intervals` is `(begin, end, addrs)` triples; `begin < end` for each.
    pub fn new(intervals: Vec<(u64, u64, Vec<u64>)>) -> Self {
        if intervals.is_empty() {
            return Overlapping { limits: Vec::new(), results: vec![Vec::new()] };
        }

        let addrs: Vec<Vec<u64>> = intervals.iter().map(|(_, _, v)| v.clone()).collect();
        let mut limit_events: BTreeMap<u64, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for (id, (begin, end, _)) in intervals.iter().enumerate() {
            assert!(begin < end, "interval begin must precede end");
            limit_events.entry(*begin).or_default().0.push(id);
            limit_events.entry(*end).or_default().1.push(id);
        }

        let limits: Vec<u64> = limit_events.keys().copied().collect();
        let changes: Vec<(Vec<usize>, Vec<usize>)> = limit_events.into_values().collect();

        let mut results = vec![Vec::new()];
        let mut active: HashSet<usize> = HashSet::new();
        let mut cumulative: HashMap<usize, u64> = HashMap::new();

        for (idx, (arrivals, departures)) in changes.iter().enumerate() {
            for id in departures {
                active.remove(id);
                cumulative.remove(id);
            }
            if idx > 0 {
                let delta = limits[idx] - limits[idx - 1];
                for id in &active {
                    *cumulative.get_mut(id).unwrap() += delta;
                }
            }
            for &id in arrivals {
                active.insert(id);
                cumulative.insert(id, 0);
            }

            let mut ids: Vec<usize> = active.iter().copied().collect();
            ids.sort_unstable();
            let mut bucket = Vec::new();
            for id in ids {
                let base = cumulative[&id];
                bucket.extend(addrs[id].iter().map(|&a| a + base));
            }
            results.push(bucket);
        }

        Overlapping { limits, results }
    }

    /// Addresses corresponding to offset `x`, empty if `x` lies outside
    /// every interval.
    pub fn lookup(&self, x: u64) -> Vec<u64> {
        // Equivalent to Python's bisect_right: index of the first limit
        // strictly greater than x.
        let idx = match self.limits.binary_search(&x) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        if idx == 0 {
            return Vec::new();
        }
        let k = x - self.limits[idx - 1];
        self.results[idx].iter().map(|&p| k + p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_interval_no_overlap() {
        let m = Overlapping::new(vec![(0x1000, 0x2000, vec![0x400000])]);
        assert_eq!(m.lookup(0x1000), vec![0x400000]);
        assert_eq!(m.lookup(0x1100), vec![0x400100]);
        assert_eq!(m.lookup(0x2000), Vec::<u64>::new());
    }

    #[test]
    fn aliased_offset_returns_both_addresses() {
        // Two distinct physical pages at 0x1000 and 0x2000 both alias to
        // addresses 0x400000 and 0x500000 respectively, but here we model
        // one physical page (interval [0x1000,0x2000)) mapped by two VAs.
        let m = Overlapping::new(vec![(0x1000, 0x2000, vec![0x400000, 0x500000])]);
        let mut got = m.lookup(0x1010);
        got.sort_unstable();
        assert_eq!(got, vec![0x400010, 0x500010]);
    }

    #[test]
    fn out_of_range_is_empty() {
        let m = Overlapping::new(vec![(0x1000, 0x2000, vec![0x400000])]);
        assert_eq!(m.lookup(0x500), Vec::<u64>::new());
        assert_eq!(m.lookup(0x2500), Vec::<u64>::new());
    }

    #[test]
    fn empty_input_is_empty_map() {
        let m = Overlapping::new(vec![]);
        assert_eq!(m.lookup(0), Vec::<u64>::new());
    }
}
