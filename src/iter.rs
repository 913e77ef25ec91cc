use crate::Mark;
use crate::checkpoint::MarkRecord;

/// Iterator over a pool's marks, from the top mark down to the bottom mark.
///
/// Follows each mark's link to the mark below it. Created by
/// [`Pool::marks`](crate::Pool::marks).
pub struct MarkChain<'a> {
    records: &'a [MarkRecord],
    pool: u64,
    next: Option<usize>,
    steps: usize,
}

impl<'a> MarkChain<'a> {
    pub(crate) fn new(records: &'a [MarkRecord], pool: u64) -> Self {
        Self {
            records,
            pool,
            next: records.len().checked_sub(1),
            steps: 0,
        }
    }

    /// Yields the next record together with its depth.
    ///
    /// Stops on a dangling link, and after visiting as many records as the
    /// stack holds, so a corrupted chain cannot loop forever.
    pub(crate) fn next_record(&mut self) -> Option<(usize, &'a MarkRecord)> {
        let depth = self.next.take()?;
        if self.steps >= self.records.len() {
            return None;
        }
        let record = self.records.get(depth)?;
        self.steps += 1;
        self.next = record.previous;
        Some((depth, record))
    }
}

impl Iterator for MarkChain<'_> {
    type Item = Mark;

    fn next(&mut self) -> Option<Self::Item> {
        let pool = self.pool;
        self.next_record()
            .map(|(depth, record)| Mark::new(pool, depth, record.serial))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.records.len() - self.steps))
    }
}

impl std::fmt::Debug for MarkChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkChain")
            .field("next", &self.next)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
