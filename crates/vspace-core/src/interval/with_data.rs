use super::floor_index;

/// `[begin, end)` intervals carrying a cloneable, comparable payload.
///
/// Construction fuses adjacent runs whose payload compares equal — this is
/// how the permission map collapses consecutive pages that share a
/// permission key into a single run.
#[derive(Debug, Clone, Default)]
pub struct WithData<T> {
    keys: Vec<u64>,
    values: Vec<(u64, T)>,
}

impl<T: Clone + PartialEq> WithData<T> {
    /// `intervals` need not be pre-sorted; sorted by `begin` internally.
    pub fn new(mut intervals: Vec<(u64, u64, T)>) -> Self {
        intervals.sort_by_key(|i| i.0);

        let mut keys = Vec::with_capacity(intervals.len());
        let mut values: Vec<(u64, T)> = Vec::with_capacity(intervals.len());
        for (begin, end, data) in intervals {
            match values.last_mut() {
                Some((last_end, last_data)) if *last_end == begin && *last_data == data => {
                    *last_end = end;
                }
                _ => {
                    keys.push(begin);
                    values.push((end, data));
                }
            }
        }

        WithData { keys, values }
    }

    pub fn lookup(&self, x: u64) -> Option<T> {
        let idx = floor_index(&self.keys, x)?;
        let (begin, (end, data)) = (self.keys[idx], &self.values[idx]);
        (begin <= x && x < *end).then(|| data.clone())
    }

    /// Strict `>=` boundary rule: a request reaching exactly `end` misses.
    pub fn contains(&self, x: u64, size: u64) -> Option<T> {
        let idx = floor_index(&self.keys, x)?;
        let (begin, (end, data)) = (self.keys[idx], &self.values[idx]);
        (begin <= x && x < *end && x + size < *end).then(|| data.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, &T)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .map(|(&begin, (end, data))| (begin, *end, data))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
