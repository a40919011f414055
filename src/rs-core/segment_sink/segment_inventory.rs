use std::rc::Rc;

use thiserror::Error;

use crate::{
    configuration::Configuration,
    content::{ChunkContext, MediaType},
    utils::{clock::Clock, logger::Logger, time_ranges::TimeRanges},
};

use super::buffered_history::{BufferedHistory, BufferedHistoryEntry, BufferedRange};

/// Status of a `BufferedChunk` in the inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
    /// At least one chunk of that segment has been pushed, but we're not sure yet that all of
    /// them were.
    PartiallyPushed,

    /// Every chunk of that segment has been pushed.
    Complete,

    /// Pushing that chunk failed. It may still be partially present in the buffer.
    Failed,
}

/// Information on a single chunk, present in the buffer at least partially.
#[derive(Clone, Debug)]
pub struct BufferedChunk {
    /// Supposed start, in seconds, the chunk is thought to have in the buffer.
    ///
    /// Initially set to the start announced by the Manifest, it can be corrected once the real
    /// buffered start has been checked.
    pub start: f64,

    /// Supposed end, in seconds, the chunk is thought to have in the buffer.
    ///
    /// Initially set to the end announced by the Manifest, it can be corrected once the real
    /// buffered end has been checked.
    pub end: f64,

    /// Last seen start of the chunk in the buffer, in seconds.
    ///
    /// `None` until it could be deduced from the buffered ranges. It can be different than
    /// `start` due to garbage collection or to imprecise boundaries.
    pub buffered_start: Option<f64>,

    /// Last seen end of the chunk in the buffer, in seconds.
    ///
    /// `None` until it could be deduced from the buffered ranges. It can be different than
    /// `end` due to garbage collection or to imprecise boundaries.
    pub buffered_end: Option<f64>,

    /// If `true`, `start` has been checked against the buffer and can be trusted.
    pub precize_start: bool,

    /// If `true`, `end` has been checked against the buffer and can be trusted.
    pub precize_end: bool,

    pub status: ChunkStatus,

    /// If `true`, that segment is present at several places in the inventory, generally because
    /// another segment has been pushed in the middle of it.
    pub splitted: bool,

    /// Size, in bytes, of the data pushed for that chunk, if known.
    pub chunk_size: Option<u64>,

    /// Monotonic timestamp, in milliseconds, at which the chunk was pushed.
    pub insertion_ts: f64,

    /// The segment this chunk is a part of.
    pub infos: ChunkContext,
}

impl BufferedChunk {
    fn buffered_start_or_start(&self) -> f64 {
        self.buffered_start.unwrap_or(self.start)
    }

    fn buffered_end_or_end(&self) -> f64 {
        self.buffered_end.unwrap_or(self.end)
    }

    fn media_type(&self) -> MediaType {
        self.infos.media_type()
    }
}

/// Information on a chunk which has just been pushed to the buffer.
#[derive(Clone, Debug)]
pub struct InsertedChunkInfos {
    /// The segment this chunk is a part of.
    pub infos: ChunkContext,

    /// Start time, in seconds, at which the chunk was supposed to be pushed.
    pub start: f64,

    /// End time, in seconds, at which the chunk was supposed to be pushed.
    pub end: f64,

    /// Size of the chunk's data, in bytes, if known.
    pub chunk_size: Option<u64>,
}

/// Error returned by the `SegmentInventory`.
#[derive(Error, Debug, PartialEq)]
pub enum InventoryError {
    #[error("Completed {0} segment \"{1}\" not found in the inventory")]
    CompletedSegmentNotFound(MediaType, String),
}

/// Thresholds used when reconciling the inventory with the buffered ranges.
#[derive(Clone, Copy, Debug)]
struct SyncTolerances {
    minimum_segment_size: f64,
    max_start_end_difference: f64,
    max_duration_difference: f64,
}

/// Information kept on the last chunk deleted while synchronizing, to help with guessing the
/// start of the next one.
struct DeletedChunkInfo {
    end: f64,
    precize_end: bool,
}

/// Keeps track of every chunk pushed to a single buffer, and of where they actually are in it.
///
/// Chunks are kept sorted by `start` and never overlap.
///
/// The `SegmentInventory` has to be synchronized regularly, through `synchronize_buffered`,
/// with the buffered time ranges actually reported by the buffer, so it can detect chunks that
/// have been garbage collected and refine the boundaries of the other ones.
///
/// It should only be mutated by the component owning the corresponding buffer.
pub struct SegmentInventory {
    inventory: Vec<BufferedChunk>,
    buffered_history: BufferedHistory,
    tolerances: SyncTolerances,
    logger: Logger,
}

impl SegmentInventory {
    pub fn new(config: &Configuration, clock: Rc<dyn Clock>, logger: Logger) -> Self {
        Self {
            inventory: vec![],
            buffered_history: BufferedHistory::new(
                config.buffered_history_retention_time,
                config.buffered_history_maximum_entries,
                clock,
            ),
            tolerances: SyncTolerances {
                minimum_segment_size: config.minimum_segment_size,
                max_start_end_difference: config.max_manifest_buffered_start_end_difference,
                max_duration_difference: config.max_manifest_buffered_duration_difference,
            },
            logger,
        }
    }

    /// Empty the inventory. The buffered history is kept.
    pub fn reset(&mut self) {
        self.inventory.clear();
    }

    /// Returns the whole inventory.
    ///
    /// To get a list synchronized with what the buffer actually contains, you might want to call
    /// `synchronize_buffered` before calling this method.
    pub fn get_inventory(&self) -> &[BufferedChunk] {
        self.inventory.as_slice()
    }

    /// Returns the buffering history known for the segment described by `context`.
    pub fn get_history_for(&self, context: &ChunkContext) -> Vec<&BufferedHistoryEntry> {
        self.buffered_history.get_history_for(context)
    }

    /// Add a newly-pushed chunk to the inventory.
    ///
    /// Chunks already in the inventory overlapping with the new one are trimmed, split or
    /// removed so the new one takes their place. Initialization segments are ignored.
    ///
    /// # Arguments
    ///
    /// * `chunk` - Information on the chunk pushed.
    ///
    /// * `succeeded` - If `false`, pushing that chunk failed.
    ///
    /// * `insertion_ts` - Monotonic timestamp, in milliseconds, at which the chunk was pushed.
    pub fn insert_chunk(&mut self, chunk: InsertedChunkInfos, succeeded: bool, insertion_ts: f64) {
        if chunk.infos.segment.is_init {
            return;
        }
        let media_type = chunk.infos.media_type();
        let (start, end) = (chunk.start, chunk.end);
        if !(start < end) {
            self.logger.warn(&format!(
                "SI: Invalid chunked inserted: starts before it ends ({}, s:{}, e:{})",
                media_type, start, end
            ));
            return;
        }
        let new_chunk = BufferedChunk {
            start,
            end,
            buffered_start: None,
            buffered_end: None,
            precize_start: false,
            precize_end: false,
            status: if succeeded {
                ChunkStatus::PartiallyPushed
            } else {
                ChunkStatus::Failed
            },
            splitted: false,
            chunk_size: chunk.chunk_size,
            insertion_ts,
            infos: chunk.infos,
        };

        // Begin by the end, as new chunks are most often pushed after the previous ones
        let base_idx = self.inventory.iter().rposition(|c| c.start <= start);
        let base_idx = match base_idx {
            Some(idx) => idx,
            None => {
                self.insert_before_all(new_chunk);
                return;
            }
        };

        let base_chunk = &self.inventory[base_idx];
        if base_chunk.end <= start {
            // Case 1:
            //   base_chunk    : |------|
            //   new_chunk     :        |======|
            //   ===>          : |------|======|
            //
            // Case 2:
            //   base_chunk    : |------|
            //   new_chunk     :          |======|
            //   ===>          : |------| |======|
            self.logger.debug(&format!(
                "SI: Pushing {} chunk strictly after previous one (s:{}, e:{}, pe:{})",
                media_type, start, end, base_chunk.end
            ));
            self.inventory.insert(base_idx + 1, new_chunk);
            self.trim_following_chunks(base_idx + 2, end);
        } else if base_chunk.start == start {
            if base_chunk.end <= end {
                // Case 1:
                //  base_chunk    : |-------|
                //  new_chunk     : |=======|
                //  ===>          : |=======|
                //
                // Case 2:
                //  base_chunk    : |-------|
                //  new_chunk     : |==========|
                //  ===>          : |==========|
                self.logger.debug(&format!(
                    "SI: {} chunk pushed replaces another one (s:{}, e:{}, pe:{})",
                    media_type, start, end, base_chunk.end
                ));
                self.inventory[base_idx] = new_chunk;
                self.trim_following_chunks(base_idx + 1, end);
            } else {
                // The previous chunk starts at the same time but finishes after the new one.
                // Update its start and put the new chunk before it.
                //
                // Case 1:
                //  base_chunk    : |------------|
                //  new_chunk     : |==========|
                //  ===>          : |==========|-|
                self.logger.debug(&format!(
                    "SI: {} chunk pushed ends before another with the same start (s:{}, e:{}, pe:{})",
                    media_type, start, end, base_chunk.end
                ));
                let base_chunk = &mut self.inventory[base_idx];
                base_chunk.start = end;
                base_chunk.buffered_start = None;
                base_chunk.precize_start = base_chunk.precize_start && new_chunk.precize_end;
                self.inventory.insert(base_idx, new_chunk);
            }
        } else if base_chunk.end <= end {
            // Case 1:
            //  base_chunk    : |-------|
            //  new_chunk     :    |======|
            //  ===>          : |--|======|
            //
            // Case 2:
            //  base_chunk    : |-------|
            //  new_chunk     :    |====|
            //  ===>          : |--|====|
            self.logger.debug(&format!(
                "SI: {} chunk pushed updates end of previous one (s:{}, e:{}, ps:{}, pe:{})",
                media_type, start, end, base_chunk.start, base_chunk.end
            ));
            let base_chunk = &mut self.inventory[base_idx];
            base_chunk.end = start;
            base_chunk.buffered_end = None;
            base_chunk.precize_end = base_chunk.precize_end && new_chunk.precize_start;
            self.inventory.insert(base_idx + 1, new_chunk);
            self.trim_following_chunks(base_idx + 2, end);
        } else {
            // The previous chunk completely recovers the new one.
            // Split the previous chunk into two chunks, before and after the new one.
            //
            // Case 1:
            //  base_chunk    : |---------|
            //  new_chunk     :    |====|
            //  ===>          : |--|====|-|
            self.logger.warn(&format!(
                "SI: {} chunk pushed is contained in a previous one (s:{}, e:{}, ps:{}, pe:{})",
                media_type, start, end, base_chunk.start, base_chunk.end
            ));
            // This means we're doing as if that segment is present two times.
            // Thankfully, this scenario should be fairly rare.
            let next_chunk = BufferedChunk {
                start: end,
                end: base_chunk.end,
                buffered_start: None,
                buffered_end: Some(base_chunk.end),
                precize_start: base_chunk.precize_start
                    && base_chunk.precize_end
                    && new_chunk.precize_end,
                precize_end: base_chunk.precize_end,
                status: base_chunk.status,
                splitted: true,
                chunk_size: base_chunk.chunk_size,
                insertion_ts: base_chunk.insertion_ts,
                infos: base_chunk.infos.clone(),
            };
            let base_chunk = &mut self.inventory[base_idx];
            base_chunk.end = start;
            base_chunk.splitted = true;
            base_chunk.buffered_end = None;
            base_chunk.precize_end = base_chunk.precize_end && new_chunk.precize_start;
            self.inventory.insert(base_idx + 1, new_chunk);
            self.inventory.insert(base_idx + 2, next_chunk);
        }
    }

    /// Insert a chunk starting before every chunk of the inventory.
    fn insert_before_all(&mut self, new_chunk: BufferedChunk) {
        let media_type = new_chunk.media_type();
        let (start, end) = (new_chunk.start, new_chunk.end);
        let first_chunk = match self.inventory.first_mut() {
            Some(first_chunk) => first_chunk,
            None => {
                self.logger.debug(&format!(
                    "SI: first {} chunk pushed (s:{}, e:{})",
                    media_type, start, end
                ));
                self.inventory.push(new_chunk);
                return;
            }
        };
        if first_chunk.start >= end {
            // Case 1:
            //  first_chunk   :      |----|
            //  new_chunk     : |====|
            //  ===>          : |====|----|
            //
            // Case 2:
            //  first_chunk   :        |----|
            //  new_chunk     : |====|
            //  ===>          : |====| |----|
            self.logger.debug(&format!(
                "SI: {} chunk pushed comes before all previous ones (s:{}, e:{}, fs:{})",
                media_type, start, end, first_chunk.start
            ));
            self.inventory.insert(0, new_chunk);
        } else if first_chunk.end <= end {
            // Case 1:
            //  first_chunk   :   |---|
            //  new_chunk     : |=======|
            //  ===>          : |=======|
            //
            // Case 2:
            //  first_chunk   :   |-----|
            //  new_chunk     : |=======|
            //  ===>          : |=======|
            self.logger.debug(&format!(
                "SI: {} chunk pushed starts before and completely recovers the previous first one (s:{}, e:{}, fs:{}, fe:{})",
                media_type, start, end, first_chunk.start, first_chunk.end
            ));
            self.inventory[0] = new_chunk;
            self.trim_following_chunks(1, end);
        } else {
            // Case 1:
            //  first_chunk   :    |------|
            //  new_chunk     : |======|
            //  ===>          : |======|--|
            self.logger.debug(&format!(
                "SI: {} chunk pushed updates the start of the next one (s:{}, e:{}, ns:{}, ne:{})",
                media_type, start, end, first_chunk.start, first_chunk.end
            ));
            first_chunk.start = end;
            first_chunk.buffered_start = None;
            first_chunk.precize_start = new_chunk.precize_end;
            self.inventory.insert(0, new_chunk);
        }
    }

    /// Trim or remove the chunks, starting at index `from`, which begin before `new_end`.
    fn trim_following_chunks(&mut self, from: usize, new_end: f64) {
        while let Some(next_chunk) = self.inventory.get_mut(from) {
            if next_chunk.start >= new_end {
                return;
            }
            if next_chunk.end > new_end {
                // Case 1:
                //  next_chunk    :   |------|
                //  new_chunk     : |====|
                //  ===>          : |====|---|
                self.logger.debug(&format!(
                    "SI: {} chunk pushed updates the start of the next one (e:{}, ns:{}, ne:{})",
                    next_chunk.media_type(),
                    new_end,
                    next_chunk.start,
                    next_chunk.end
                ));
                next_chunk.start = new_end;
                next_chunk.buffered_start = None;
                // The end of the new chunk has not been checked yet
                next_chunk.precize_start = false;
                return;
            }
            // Case 1:
            //  next_chunk    :   |---|
            //  new_chunk     : |=======|
            //  ===>          : |=======|
            self.logger.debug(&format!(
                "SI: {} chunk pushed removes a following one (e:{}, ns:{}, ne:{})",
                next_chunk.media_type(),
                new_end,
                next_chunk.start,
                next_chunk.end
            ));
            self.inventory.remove(from);
        }
    }

    /// Indicate that every chunk of the segment described by `content` has been pushed.
    ///
    /// Contiguous chunks of that segment are merged into one, then the inventory is synchronized
    /// with `buffered`, the current buffered time ranges, and the resulting position of the
    /// segment is logged in the buffered history.
    pub fn complete_segment(
        &mut self,
        content: &ChunkContext,
        buffered: &TimeRanges,
    ) -> Result<(), InventoryError> {
        if content.segment.is_init {
            return Ok(());
        }

        let mut group_starts: Vec<usize> = vec![];
        let mut idx = 0;
        while idx < self.inventory.len() {
            if !self.inventory[idx].infos.is_same_content(content) {
                idx += 1;
                continue;
            }
            let first_idx = idx;
            let mut segment_size = self.inventory[idx].chunk_size;
            idx += 1;
            while idx < self.inventory.len() && self.inventory[idx].infos.is_same_content(content)
            {
                segment_size = match (segment_size, self.inventory[idx].chunk_size) {
                    (Some(total), Some(size)) => Some(total + size),
                    _ => None,
                };
                idx += 1;
            }
            let last_idx = idx - 1;
            let last_end = self.inventory[last_idx].end;
            let last_buffered_end = self.inventory[last_idx].buffered_end;
            if last_idx > first_idx {
                self.inventory.drain(first_idx + 1..=last_idx);
                idx = first_idx + 1;
            }
            let merged = &mut self.inventory[first_idx];
            if merged.status == ChunkStatus::PartiallyPushed {
                merged.status = ChunkStatus::Complete;
            }
            merged.chunk_size = segment_size;
            merged.end = last_end;
            merged.buffered_end = last_buffered_end;
            group_starts.push(first_idx);
        }

        if group_starts.is_empty() {
            let err = InventoryError::CompletedSegmentNotFound(
                content.media_type(),
                content.segment.id.clone(),
            );
            self.logger.warn(&format!("SI: {}", err));
            return Err(err);
        }

        let splitted = group_starts.len() > 1;
        if splitted {
            self.logger.warn(&format!(
                "SI: {} segment {} is splitted",
                content.media_type(),
                content.segment.id
            ));
        }
        for chunk_idx in group_starts {
            self.inventory[chunk_idx].splitted = splitted;
        }

        self.synchronize_buffered(buffered);

        let mut to_record: Vec<(ChunkContext, BufferedRange)> = vec![];
        for chunk in self
            .inventory
            .iter()
            .filter(|c| c.infos.is_same_content(content))
        {
            match (chunk.buffered_start, chunk.buffered_end) {
                (Some(start), Some(end)) => {
                    if chunk.status != ChunkStatus::Failed {
                        to_record.push((chunk.infos.clone(), BufferedRange { start, end }));
                    }
                }
                _ => {
                    self.logger.debug(&format!(
                        "SI: buffered range not known after sync. Skipping history ({}, s:{}, e:{})",
                        chunk.media_type(),
                        chunk.start,
                        chunk.end
                    ));
                }
            }
        }
        for (context, range) in to_record {
            self.buffered_history
                .add_buffered_segment(&context, Some(range));
        }
        Ok(())
    }

    /// Reconcile the inventory with the time ranges actually buffered.
    ///
    /// Chunks which are not buffered anymore are removed, and the buffered start and end of the
    /// other ones are refined.
    ///
    /// `buffered` should be a complete and up-to-date snapshot of the buffered time ranges.
    pub fn synchronize_buffered(&mut self, buffered: &TimeRanges) {
        let tolerances = self.tolerances;
        let min_size = tolerances.minimum_segment_size;
        let mut idx = 0;

        for (range_idx, range) in buffered.into_iter().enumerate() {
            if idx >= self.inventory.len() {
                break;
            }
            let (range_start, range_end) = (range.start(), range.end());
            if range_end - range_start < min_size {
                self.logger.warn(&format!(
                    "SI: skipped TimeRange when synchronizing because it was too small (s:{}, e:{})",
                    range_start, range_end
                ));
                continue;
            }

            // Chunks ending before that range have been garbage collected
            let index_before = idx;
            while idx < self.inventory.len()
                && self.inventory[idx].buffered_end_or_end() - range_start < min_size
            {
                idx += 1;
            }
            let mut last_deleted: Option<DeletedChunkInfo> = None;
            if idx > index_before {
                let last_deleted_chunk = &self.inventory[idx - 1];
                last_deleted = Some(DeletedChunkInfo {
                    end: last_deleted_chunk.buffered_end_or_end(),
                    precize_end: last_deleted_chunk.precize_end,
                });
                self.logger.debug(&format!(
                    "SI: {} {} chunks GCed.",
                    idx - index_before,
                    last_deleted_chunk.media_type()
                ));
                let removed: Vec<BufferedChunk> = self.inventory.drain(index_before..idx).collect();
                self.record_garbage_collected(removed);
                idx = index_before;
            }

            let first_in_range = match self.inventory.get_mut(idx) {
                Some(chunk) => chunk,
                None => break,
            };

            // That chunk is completely outside that range, it should be in a following one
            if range_end - first_in_range.buffered_start_or_start() < min_size {
                continue;
            }

            guess_buffered_start_from_range_start(
                first_in_range,
                range_start,
                last_deleted.as_ref(),
                &tolerances,
                &self.logger,
            );

            if idx == self.inventory.len() - 1 {
                // Last chunk of the inventory, its end should be this range's end
                guess_buffered_end_from_range_end(
                    &mut self.inventory[idx],
                    range_end,
                    &tolerances,
                    &self.logger,
                );
                idx += 1;
                break;
            }

            // Make chunks contiguous until the first one outside that range
            idx += 1;
            let next_range_start = buffered.start(range_idx + 1);
            while let Some(current) = self.inventory.get(idx) {
                let current_start = current.buffered_start_or_start();
                let current_end = current.buffered_end_or_end();
                if range_end - current_start < min_size {
                    break;
                }
                if let Some(next_range_start) = next_range_start {
                    // It has more media in the next range than in that one
                    if range_end - current_start < current_end - next_range_start {
                        break;
                    }
                }
                let current_precize_start = current.precize_start;
                let current_nominal_start = current.start;

                let previous = &mut self.inventory[idx - 1];
                let previous_buffered_end = match previous.buffered_end {
                    Some(buffered_end) => buffered_end,
                    None => {
                        // Contiguous chunks: we have no way to infer the real end
                        let buffered_end = if current_precize_start {
                            current_nominal_start
                        } else {
                            previous.end
                        };
                        self.logger.debug(&format!(
                            "SI: calculating buffered end of contiguous {} chunk (be:{}, e:{})",
                            previous.media_type(),
                            buffered_end,
                            previous.end
                        ));
                        previous.buffered_end = Some(buffered_end);
                        buffered_end
                    }
                };
                self.inventory[idx].buffered_start = Some(previous_buffered_end);
                idx += 1;
            }

            guess_buffered_end_from_range_end(
                &mut self.inventory[idx - 1],
                range_end,
                &tolerances,
                &self.logger,
            );
        }

        // Remaining chunks are not linked to any range, they have been garbage collected
        if idx < self.inventory.len() {
            self.logger.debug(&format!(
                "SI: last {} chunks have been GCed (i:{}, l:{})",
                self.inventory[idx].media_type(),
                idx,
                self.inventory.len()
            ));
            let removed: Vec<BufferedChunk> = self.inventory.drain(idx..).collect();
            self.record_garbage_collected(removed);
        }

        self.logger.lazy_debug(&|| {
            let timeline_str = self
                .inventory
                .iter()
                .map(|c| {
                    format!(
                        "{}-{} ({}:{})",
                        c.buffered_start_or_start(),
                        c.buffered_end_or_end(),
                        c.infos.representation.id,
                        c.infos.segment.id
                    )
                })
                .collect::<Vec<String>>()
                .join(" / ");
            format!("SI: synchronized timeline: {}", timeline_str)
        });
    }

    /// Record in the buffered history the removed chunks which were never seen in the buffer.
    fn record_garbage_collected(&mut self, removed: Vec<BufferedChunk>) {
        for chunk in removed {
            if chunk.buffered_start.is_none()
                && chunk.buffered_end.is_none()
                && chunk.status != ChunkStatus::Failed
            {
                self.buffered_history
                    .add_buffered_segment(&chunk.infos, None);
            }
        }
    }
}

/// Evaluate the buffered start of the given chunk from the start of the range it is the first
/// chunk in.
fn guess_buffered_start_from_range_start(
    chunk: &mut BufferedChunk,
    range_start: f64,
    last_deleted: Option<&DeletedChunkInfo>,
    tolerances: &SyncTolerances,
    logger: &Logger,
) {
    let media_type = chunk.media_type();
    if let Some(buffered_start) = chunk.buffered_start {
        if buffered_start < range_start {
            logger.debug(&format!(
                "SI: {} chunk partially GCed at the start (pbs:{}, nbs:{})",
                media_type, buffered_start, range_start
            ));
            chunk.buffered_start = Some(range_start);
        }
        if !chunk.precize_start && buffered_start_looks_coherent(chunk, tolerances) {
            if let Some(buffered_start) = chunk.buffered_start {
                chunk.start = buffered_start;
                chunk.precize_start = true;
            }
        }
    } else if chunk.precize_start {
        logger.debug(&format!(
            "SI: {} buffered start is precize start (s:{})",
            media_type, chunk.start
        ));
        chunk.buffered_start = Some(chunk.start);
    } else if let Some(deleted) = last_deleted.filter(|d| {
        d.end > range_start
            && (d.precize_end || chunk.start - d.end <= tolerances.max_start_end_difference)
    }) {
        logger.debug(&format!(
            "SI: {} buffered start is end of previous chunk (s:{}, pe:{})",
            media_type, chunk.start, deleted.end
        ));
        chunk.buffered_start = Some(deleted.end);
        if buffered_start_looks_coherent(chunk, tolerances) {
            chunk.start = deleted.end;
            chunk.precize_start = true;
        }
    } else if f64::abs(chunk.start - range_start) <= tolerances.max_start_end_difference {
        logger.debug(&format!(
            "SI: found true {} buffered start (s:{}, rs:{})",
            media_type, chunk.start, range_start
        ));
        chunk.buffered_start = Some(range_start);
        if buffered_start_looks_coherent(chunk, tolerances) {
            chunk.start = range_start;
            chunk.precize_start = true;
        }
    } else if range_start < chunk.start {
        logger.debug(&format!(
            "SI: {} range start too far from expected start (rs:{}, s:{})",
            media_type, range_start, chunk.start
        ));
        chunk.buffered_start = Some(chunk.start);
    } else {
        logger.debug(&format!(
            "SI: {} chunk appears immediately garbage collected at the start (rs:{}, s:{})",
            media_type, range_start, chunk.start
        ));
        chunk.buffered_start = Some(range_start);
    }
}

/// Evaluate the buffered end of the given chunk from the end of the range it is the last chunk
/// in.
fn guess_buffered_end_from_range_end(
    chunk: &mut BufferedChunk,
    range_end: f64,
    tolerances: &SyncTolerances,
    logger: &Logger,
) {
    let media_type = chunk.media_type();
    if let Some(buffered_end) = chunk.buffered_end {
        if buffered_end > range_end {
            logger.debug(&format!(
                "SI: {} chunk partially GCed at the end (pbe:{}, nbe:{})",
                media_type, buffered_end, range_end
            ));
            chunk.buffered_end = Some(range_end);
        }
        if !chunk.precize_end
            && range_end - chunk.end <= tolerances.max_start_end_difference
            && buffered_end_looks_coherent(chunk, tolerances)
        {
            chunk.precize_end = true;
            chunk.end = range_end;
        }
    } else if chunk.precize_end {
        logger.debug(&format!(
            "SI: {} buffered end is precize end (e:{})",
            media_type, chunk.end
        ));
        chunk.buffered_end = Some(chunk.end);
    } else if f64::abs(range_end - chunk.end) <= tolerances.max_start_end_difference {
        logger.debug(&format!(
            "SI: found true {} buffered end (e:{}, re:{})",
            media_type, chunk.end, range_end
        ));
        chunk.buffered_end = Some(range_end);
        if buffered_end_looks_coherent(chunk, tolerances) {
            chunk.end = range_end;
            chunk.precize_end = true;
        }
    } else if range_end > chunk.end {
        logger.debug(&format!(
            "SI: {} range end too far from expected end (re:{}, e:{})",
            media_type, range_end, chunk.end
        ));
        chunk.buffered_end = Some(chunk.end);
    } else {
        logger.debug(&format!(
            "SI: {} chunk appears immediately garbage collected at the end (re:{}, e:{})",
            media_type, range_end, chunk.end
        ));
        chunk.buffered_end = Some(range_end);
    }
}

/// Returns `true` if the buffered start of the given chunk looks coherent enough relatively to
/// what was announced for it.
fn buffered_start_looks_coherent(chunk: &BufferedChunk, tolerances: &SyncTolerances) -> bool {
    let buffered_start = match chunk.buffered_start {
        Some(buffered_start) => buffered_start,
        None => return false,
    };
    if chunk.status != ChunkStatus::Complete || !chunk.infos.segment.complete {
        return false;
    }
    let duration = chunk.end - chunk.start;
    if f64::abs(chunk.start - buffered_start) > tolerances.max_start_end_difference {
        return false;
    }
    match chunk.buffered_end {
        None => true,
        Some(buffered_end) => {
            buffered_end > buffered_start
                && f64::abs(buffered_end - buffered_start - duration)
                    <= f64::min(tolerances.max_duration_difference, duration / 3.)
        }
    }
}

/// Returns `true` if the buffered end of the given chunk looks coherent enough relatively to
/// what was announced for it.
fn buffered_end_looks_coherent(chunk: &BufferedChunk, tolerances: &SyncTolerances) -> bool {
    let (buffered_start, buffered_end) = match (chunk.buffered_start, chunk.buffered_end) {
        (Some(buffered_start), Some(buffered_end)) => (buffered_start, buffered_end),
        _ => return false,
    };
    if chunk.status != ChunkStatus::Complete || !chunk.infos.segment.complete {
        return false;
    }
    let duration = chunk.end - chunk.start;
    f64::abs(chunk.end - buffered_end) <= tolerances.max_start_end_difference
        && buffered_end > buffered_start
        && f64::abs(buffered_end - buffered_start - duration)
            <= f64::min(tolerances.max_duration_difference, duration / 3.)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{test_utils::video_context, Representation, Segment},
        utils::clock::ManualClock,
    };

    fn new_inventory() -> (SegmentInventory, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0.));
        let inventory = SegmentInventory::new(
            &Configuration::default(),
            clock.clone(),
            Logger::default(),
        );
        (inventory, clock)
    }

    fn context(rep_id: &str, start: f64, end: f64) -> ChunkContext {
        let representation = Representation::new(rep_id, 1_000_000.);
        let segment = Segment::media(format!("{}-{}", rep_id, start), start, end - start);
        video_context(&representation, segment)
    }

    fn chunk(rep_id: &str, start: f64, end: f64) -> InsertedChunkInfos {
        InsertedChunkInfos {
            infos: context(rep_id, start, end),
            start,
            end,
            chunk_size: Some(1000),
        }
    }

    fn bounds(inventory: &SegmentInventory) -> Vec<(String, f64, f64)> {
        inventory
            .get_inventory()
            .iter()
            .map(|c| (c.infos.representation.id.clone(), c.start, c.end))
            .collect()
    }

    fn b(rep_id: &str, start: f64, end: f64) -> (String, f64, f64) {
        (rep_id.to_owned(), start, end)
    }

    #[test]
    fn test_insert_sorted() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 4., 6.), true, 0.);
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory.insert_chunk(chunk("a", 8., 10.), true, 0.);
        inventory.insert_chunk(chunk("a", 2., 4.), true, 0.);
        assert_eq!(
            bounds(&inventory),
            vec![
                b("a", 0., 2.),
                b("a", 2., 4.),
                b("a", 4., 6.),
                b("a", 8., 10.)
            ]
        );
        assert!(inventory
            .get_inventory()
            .iter()
            .all(|c| c.status == ChunkStatus::PartiallyPushed));
    }

    #[test]
    fn test_ignored_chunks() {
        let (mut inventory, _) = new_inventory();
        let representation = Representation::new("a", 1_000_000.);
        inventory.insert_chunk(
            InsertedChunkInfos {
                infos: video_context(&representation, Segment::init("init")),
                start: 0.,
                end: 2.,
                chunk_size: None,
            },
            true,
            0.,
        );
        inventory.insert_chunk(chunk("a", 4., 4.), true, 0.);
        inventory.insert_chunk(chunk("a", 6., 5.), true, 0.);
        assert!(inventory.get_inventory().is_empty());
    }

    #[test]
    fn test_exact_overlap_replaces() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory.insert_chunk(chunk("a", 2., 4.), true, 0.);
        inventory.insert_chunk(chunk("b", 2., 4.), false, 10.);
        assert_eq!(bounds(&inventory), vec![b("a", 0., 2.), b("b", 2., 4.)]);
        let replaced = &inventory.get_inventory()[1];
        assert_eq!(replaced.status, ChunkStatus::Failed);
        assert_eq!(replaced.insertion_ts, 10.);
    }

    #[test]
    fn test_contained_chunk_splits() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 10.), true, 0.);
        inventory.insert_chunk(chunk("b", 3., 5.), true, 0.);
        assert_eq!(
            bounds(&inventory),
            vec![b("a", 0., 3.), b("b", 3., 5.), b("a", 5., 10.)]
        );
        let chunks = inventory.get_inventory();
        assert!(chunks[0].splitted);
        assert!(!chunks[1].splitted);
        assert!(chunks[2].splitted);
        assert!(chunks[0].infos.is_same_content(&chunks[2].infos));
    }

    #[test]
    fn test_overlapping_inserts_trim_neighbours() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory.insert_chunk(chunk("a", 2., 4.), true, 0.);
        inventory.insert_chunk(chunk("a", 4., 6.), true, 0.);
        inventory.insert_chunk(chunk("a", 6., 8.), true, 0.);

        // Ends in the middle of a following chunk, covers another completely
        inventory.insert_chunk(chunk("b", 1., 5.), true, 0.);
        assert_eq!(
            bounds(&inventory),
            vec![b("a", 0., 1.), b("b", 1., 5.), b("a", 5., 6.), b("a", 6., 8.)]
        );

        // Same start, shorter
        inventory.insert_chunk(chunk("c", 6., 7.), true, 0.);
        assert_eq!(
            bounds(&inventory),
            vec![
                b("a", 0., 1.),
                b("b", 1., 5.),
                b("a", 5., 6.),
                b("c", 6., 7.),
                b("a", 7., 8.)
            ]
        );

        // Before every chunk, overlapping the first
        inventory.insert_chunk(chunk("d", -1., 0.5), true, 0.);
        assert_eq!(bounds(&inventory)[0], b("d", -1., 0.5));
        assert_eq!(bounds(&inventory)[1], b("a", 0.5, 1.));

        // Before every chunk, covering several of them
        inventory.insert_chunk(chunk("e", -2., 5.5), true, 0.);
        assert_eq!(
            bounds(&inventory),
            vec![
                b("e", -2., 5.5),
                b("a", 5.5, 6.),
                b("c", 6., 7.),
                b("a", 7., 8.)
            ]
        );
        let trimmed = &inventory.get_inventory()[1];
        assert!(trimmed.buffered_start.is_none());
        assert!(!trimmed.precize_start);
    }

    #[test]
    fn test_inventory_never_overlaps() {
        let (mut inventory, _) = new_inventory();
        let pushes = [
            (0., 4.),
            (8., 12.),
            (2., 9.),
            (3., 3.5),
            (-1., 1.),
            (11., 15.),
            (5., 6.),
            (4.5, 11.5),
            (-3., 20.),
            (19., 21.),
        ];
        for (i, (start, end)) in pushes.iter().enumerate() {
            inventory.insert_chunk(chunk(&format!("r{}", i), *start, *end), true, 0.);
            let chunks = inventory.get_inventory();
            for pair in chunks.windows(2) {
                assert!(pair[0].start < pair[0].end);
                assert!(pair[0].end <= pair[1].start);
            }
        }
        assert_eq!(bounds(&inventory), vec![b("r8", -3., 19.), b("r9", 19., 21.)]);
    }

    #[test]
    fn test_complete_segment_merges_chunks() {
        let (mut inventory, _) = new_inventory();
        let content = context("a", 0., 4.);
        for (start, end, size) in [(0., 1., 100), (1., 3., 200), (3., 4., 300)] {
            inventory.insert_chunk(
                InsertedChunkInfos {
                    infos: content.clone(),
                    start,
                    end,
                    chunk_size: Some(size),
                },
                true,
                0.,
            );
        }
        assert_eq!(inventory.get_inventory().len(), 3);
        inventory
            .complete_segment(&content, &TimeRanges::from_ranges(&[(0., 4.)]))
            .unwrap();

        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0.);
        assert_eq!(chunks[0].end, 4.);
        assert_eq!(chunks[0].chunk_size, Some(600));
        assert_eq!(chunks[0].status, ChunkStatus::Complete);
        assert!(!chunks[0].splitted);
        assert_eq!(chunks[0].buffered_start, Some(0.));
        assert_eq!(chunks[0].buffered_end, Some(4.));

        let history = inventory.get_history_for(&content);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].buffered, Some(BufferedRange { start: 0., end: 4. }));
    }

    #[test]
    fn test_complete_segment_unknown_sizes_and_split() {
        let (mut inventory, _) = new_inventory();
        let content = context("a", 0., 10.);
        inventory.insert_chunk(
            InsertedChunkInfos {
                infos: content.clone(),
                start: 0.,
                end: 10.,
                chunk_size: None,
            },
            true,
            0.,
        );
        inventory.insert_chunk(chunk("b", 4., 6.), true, 0.);
        inventory
            .complete_segment(&content, &TimeRanges::from_ranges(&[(0., 10.)]))
            .unwrap();
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].splitted);
        assert!(chunks[2].splitted);
        assert_eq!(chunks[0].status, ChunkStatus::Complete);
        assert_eq!(chunks[2].status, ChunkStatus::Complete);
        assert_eq!(chunks[0].chunk_size, None);
    }

    #[test]
    fn test_complete_unknown_segment() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        let err = inventory
            .complete_segment(&context("a", 2., 4.), &TimeRanges::from_ranges(&[(0., 2.)]))
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::CompletedSegmentNotFound(MediaType::Video, "a-2".to_owned())
        );
    }

    #[test]
    fn test_failed_segment_not_in_history() {
        let (mut inventory, _) = new_inventory();
        let content = context("a", 0., 2.);
        inventory.insert_chunk(chunk("a", 0., 2.), false, 0.);
        inventory
            .complete_segment(&content, &TimeRanges::from_ranges(&[(0., 2.)]))
            .unwrap();
        assert_eq!(inventory.get_inventory()[0].status, ChunkStatus::Failed);
        assert!(inventory.get_history_for(&content).is_empty());
    }

    #[test]
    fn test_synchronize_converges() {
        let (mut inventory, _) = new_inventory();
        let segments = [(0., 2.), (2., 4.), (4., 6.), (6., 8.)];
        for (start, end) in segments {
            inventory.insert_chunk(chunk("a", start, end), true, 0.);
            inventory
                .complete_segment(
                    &context("a", start, end),
                    &TimeRanges::from_ranges(&[(0.001, end - 0.002)]),
                )
                .unwrap();
        }
        inventory.synchronize_buffered(&TimeRanges::from_ranges(&[(0.001, 7.998)]));

        let min_size = Configuration::default().minimum_segment_size;
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), segments.len());
        for (chunk, (start, end)) in chunks.iter().zip(segments) {
            let buffered_start = chunk.buffered_start.unwrap();
            let buffered_end = chunk.buffered_end.unwrap();
            assert!(f64::abs(buffered_start - start) <= min_size);
            assert!(f64::abs(buffered_end - end) <= min_size);
        }
    }

    #[test]
    fn test_synchronize_removes_garbage_collected_chunks() {
        let (mut inventory, _) = new_inventory();
        for (start, end) in [(0., 2.), (2., 4.), (4., 6.), (6., 8.), (8., 10.)] {
            inventory.insert_chunk(chunk("a", start, end), true, 0.);
        }

        // Beginning and end garbage collected
        inventory.synchronize_buffered(&TimeRanges::from_ranges(&[(4., 8.)]));
        assert_eq!(bounds(&inventory), vec![b("a", 4., 6.), b("a", 6., 8.)]);
        let chunks = inventory.get_inventory();
        assert_eq!(chunks[0].buffered_start, Some(4.));
        assert_eq!(chunks[1].buffered_end, Some(8.));

        // Never-measured removed chunks are logged with no buffered range
        let history = inventory.get_history_for(&context("a", 0., 2.));
        assert_eq!(history.len(), 1);
        assert!(history[0].buffered.is_none());
        assert_eq!(inventory.get_history_for(&context("a", 8., 10.)).len(), 1);

        // Partially garbage collected at the start
        inventory.synchronize_buffered(&TimeRanges::from_ranges(&[(5., 8.)]));
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].buffered_start, Some(5.));

        inventory.synchronize_buffered(&TimeRanges::new());
        assert!(inventory.get_inventory().is_empty());
        // Those had been measured, no new history entry
        assert_eq!(inventory.get_history_for(&context("a", 4., 6.)).len(), 0);
    }

    #[test]
    fn test_buffered_start_from_previous_deleted_chunk() {
        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory.insert_chunk(chunk("a", 2.2, 4.), true, 0.);
        inventory.synchronize_buffered(&TimeRanges::from_ranges(&[(1.998, 4.)]));
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].buffered_start, Some(2.));
        // Not complete yet, its start cannot be trusted
        assert_eq!(chunks[0].start, 2.2);
        assert!(!chunks[0].precize_start);

        let (mut inventory, _) = new_inventory();
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory.insert_chunk(chunk("a", 2.2, 4.), true, 0.);
        inventory
            .complete_segment(
                &context("a", 2.2, 4.),
                &TimeRanges::from_ranges(&[(1.998, 4.)]),
            )
            .unwrap();
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].buffered_start, Some(2.));
        assert_eq!(chunks[0].start, 2.);
        assert!(chunks[0].precize_start);
    }

    #[test]
    fn test_synchronize_multiple_ranges() {
        let (mut inventory, _) = new_inventory();
        for (start, end) in [(0., 2.), (2., 4.), (10., 12.), (12., 14.)] {
            inventory.insert_chunk(chunk("a", start, end), true, 0.);
        }
        inventory.synchronize_buffered(&TimeRanges::from_ranges(&[
            (0., 4.),
            (6., 6.001),
            (10., 14.),
        ]));
        let chunks = inventory.get_inventory();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].buffered_start, Some(0.));
        assert_eq!(chunks[0].buffered_end, Some(2.));
        assert_eq!(chunks[1].buffered_start, Some(2.));
        assert_eq!(chunks[1].buffered_end, Some(4.));
        assert_eq!(chunks[2].buffered_start, Some(10.));
        assert_eq!(chunks[2].buffered_end, Some(12.));
        assert_eq!(chunks[3].buffered_start, Some(12.));
        assert_eq!(chunks[3].buffered_end, Some(14.));
    }

    #[test]
    fn test_reset() {
        let (mut inventory, _) = new_inventory();
        let content = context("a", 0., 2.);
        inventory.insert_chunk(chunk("a", 0., 2.), true, 0.);
        inventory
            .complete_segment(&content, &TimeRanges::from_ranges(&[(0., 2.)]))
            .unwrap();
        inventory.reset();
        assert!(inventory.get_inventory().is_empty());
        assert_eq!(inventory.get_history_for(&content).len(), 1);
    }
}
