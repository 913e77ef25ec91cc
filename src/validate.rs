use crate::Pool;
use crate::align::ALIGN;
use crate::checkpoint::{MarkRecord, MarkStamp};
use crate::chunk::ChunkHeader;
use crate::error::{PoolError, PoolResult};

impl Pool {
    /// Walks the mark chain from the top mark to the bottom mark and checks
    /// its structural invariants.
    ///
    /// Checks that every mark belongs to this pool and links to the mark
    /// directly below it, that its bump pointer lies inside its chunk, that
    /// its last allocation lies inside its chunk or is its newest big block,
    /// that its footprint stamp is intact, and that the bottom mark ends the
    /// chain exactly once. Meant for tests and debugging.
    ///
    /// # Errors
    ///
    /// [`PoolError::StructuralInvalid`] naming the first broken invariant.
    pub fn validate(&self) -> PoolResult<()> {
        let mut chain = self.marks();
        let mut visited = 0;
        let mut bottom_seen = false;

        while let Some((depth, record)) = chain.next_record() {
            visited += 1;
            match (depth, record.previous) {
                (0, None) => bottom_seen = true,
                (0, Some(_)) => {
                    return Err(PoolError::structural(0, "bottom mark links below itself"));
                }
                (_, None) => {
                    return Err(PoolError::structural(depth, "chain ends above the bottom mark"));
                }
                (_, Some(previous)) if previous + 1 != depth => {
                    return Err(PoolError::structural(depth, "mark does not link to the mark below it"));
                }
                _ => {}
            }
            self.check_record(depth, record)?;
        }

        if !bottom_seen {
            return Err(PoolError::structural(self.depth(), "bottom mark not reached"));
        }
        if visited != self.marks.len() {
            return Err(PoolError::structural(self.depth(), "marks unreachable from the top"));
        }
        Ok(())
    }

    fn check_record(&self, depth: usize, record: &MarkRecord) -> PoolResult<()> {
        if record.owner != self.id {
            return Err(PoolError::structural(depth, "mark belongs to another pool"));
        }

        // SAFETY: every mark on the stack references live chunks.
        let (data, end) = unsafe {
            (
                ChunkHeader::data_start(record.chunk).addr(),
                (*record.chunk).end.addr(),
            )
        };
        let free = record.free.addr();
        if free < data || free > end {
            return Err(PoolError::structural(depth, "bump pointer outside current chunk"));
        }
        if free % ALIGN != 0 {
            return Err(PoolError::structural(depth, "bump pointer misaligned"));
        }

        if let Some(last) = record.last {
            let in_chunk = (data..=free).contains(&last.as_ptr().addr());
            if !in_chunk && record.big_block_data() != Some(last) {
                return Err(PoolError::structural(
                    depth,
                    "last allocation outside current chunk and big block",
                ));
            }
        }

        // SAFETY: footprints of marks still on the stack are never released.
        let stamp = unsafe { MarkStamp::read(record.footprint) };
        if stamp != (MarkStamp { owner: self.id, depth }) {
            return Err(PoolError::structural(depth, "mark footprint overwritten"));
        }
        Ok(())
    }
}
