use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::{
    bindings::{jsAppendBuffer, jsRemoveBuffer},
    content::{ChunkContext, MediaType},
    utils::{
        clock::Clock, invariant::report_invariant_violation, logger::Logger,
        time_ranges::TimeRanges,
    },
};

use super::{
    segment_inventory::{BufferedChunk, SegmentInventory},
    PushChunkData, PushChunkError, RemoveBufferError, SegmentSink, SinkOperation,
};

/// Error returned by a `MediaBuffer` when an operation could not be started.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaBufferError {
    /// The buffer has no room left for new data.
    QuotaExceeded,

    /// Any other error, with a message describing it.
    Other(String),
}

/// Lower-level media buffer, such as the Media Source Extension's `SourceBuffer`.
///
/// Operations are performed asynchronously and in order by the buffer. The end of each of them
/// has to be reported to the `SourceBufferSink` using it, through `on_operation_end` or
/// `on_operation_error`.
pub trait MediaBuffer {
    /// Begin to push `data` to the buffer.
    fn append(&mut self, data: &[u8]) -> Result<(), MediaBufferError>;

    /// Begin to remove the data between `start` and `end`, in seconds.
    fn remove(&mut self, start: f64, end: f64) -> Result<(), MediaBufferError>;
}

/// `MediaBuffer` implementation relying on a JavaScript `SourceBuffer`, for the WebAssembly
/// build.
pub struct JsMediaBuffer {
    /// Identifier allowing the JavaScript side to know which `SourceBuffer` is concerned.
    id: u32,
}

impl JsMediaBuffer {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    fn to_media_buffer_error(err_name: String) -> MediaBufferError {
        if err_name == "QuotaExceededError" {
            MediaBufferError::QuotaExceeded
        } else {
            MediaBufferError::Other(err_name)
        }
    }
}

impl MediaBuffer for JsMediaBuffer {
    fn append(&mut self, data: &[u8]) -> Result<(), MediaBufferError> {
        match jsAppendBuffer(self.id, data) {
            None => Ok(()),
            Some(err) => Err(Self::to_media_buffer_error(err)),
        }
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), MediaBufferError> {
        match jsRemoveBuffer(self.id, start, end) {
            None => Ok(()),
            Some(err) => Err(Self::to_media_buffer_error(err)),
        }
    }
}

/// `SegmentSink` implementation keeping a queue of the operations performed on a `MediaBuffer`.
///
/// Pushed chunks are only added to the inventory once the `MediaBuffer` reported the end of
/// the corresponding operation. Segment completion signals wait for every operation scheduled
/// before them.
pub struct SourceBufferSink<B: MediaBuffer> {
    /// The type of media pushed to that buffer.
    media_type: MediaType,

    /// The underlying buffer.
    buffer: B,

    /// The current queue of operations being performed on the buffer.
    ///
    /// From the most imminent to the least.
    queue: VecDeque<SinkOperation>,

    /// Inventory of the buffer's content, owned by whoever created that sink.
    inventory: Rc<RefCell<SegmentInventory>>,

    /// Last buffered time ranges communicated to the sink.
    last_buffered: TimeRanges,

    /// Set to `true` once `dispose` has been called.
    is_disposed: bool,

    clock: Rc<dyn Clock>,
    logger: Logger,
}

impl<B: MediaBuffer> SourceBufferSink<B> {
    /// Create a new `SourceBufferSink` for the given `MediaType`.
    ///
    /// # Arguments
    ///
    /// * `media_type` - The `MediaType` of the media pushed through that sink.
    ///
    /// * `buffer` - The lower-level buffer on which operations are performed.
    ///
    /// * `inventory` - The `SegmentInventory` linked to that buffer. It should not be updated by
    ///   anything else than this sink.
    pub fn new(
        media_type: MediaType,
        buffer: B,
        inventory: Rc<RefCell<SegmentInventory>>,
        clock: Rc<dyn Clock>,
        logger: Logger,
    ) -> Self {
        logger.info(&format!("SB: Creating new {} sink", media_type));
        Self {
            media_type,
            buffer,
            queue: VecDeque::new(),
            inventory,
            last_buffered: TimeRanges::new(),
            is_disposed: false,
            clock,
            logger,
        }
    }

    /// Returns `true` if there is at least one pending operation that isn't finished yet.
    pub fn has_operations_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// To call once the oldest pending `MediaBuffer` operation has been finished with success.
    ///
    /// `buffered` are the time ranges buffered once that operation is over.
    pub fn on_operation_end(&mut self, buffered: &TimeRanges) {
        self.last_buffered = buffered.clone();
        self.finish_operation(true);
    }

    /// To call once the oldest pending `MediaBuffer` operation has failed.
    pub fn on_operation_error(&mut self) {
        self.finish_operation(false);
    }

    fn finish_operation(&mut self, succeeded: bool) {
        if self.is_disposed {
            return;
        }
        match self.queue.pop_front() {
            Some(SinkOperation::Push {
                infos,
                insertion_ts,
            }) => {
                if !succeeded {
                    self.logger.warn(&format!(
                        "SB: Failed to push {} chunk (s:{}, e:{})",
                        self.media_type, infos.start, infos.end
                    ));
                }
                self.inventory
                    .borrow_mut()
                    .insert_chunk(infos, succeeded, insertion_ts);
            }
            Some(SinkOperation::Remove { start, end }) => {
                if !succeeded {
                    self.logger.warn(&format!(
                        "SB: Failed to remove {} data (s:{}, e:{})",
                        self.media_type, start, end
                    ));
                }
            }
            Some(SinkOperation::SignalSegmentComplete(_)) | None => {
                self.logger
                    .error("SB: operation ended while none were pending");
            }
        }
        self.inventory
            .borrow_mut()
            .synchronize_buffered(&self.last_buffered);
        self.process_completion_signals();
    }

    /// Consider complete every segment whose completion signal is now at the front of the queue.
    fn process_completion_signals(&mut self) {
        while matches!(
            self.queue.front(),
            Some(SinkOperation::SignalSegmentComplete(_))
        ) {
            if let Some(SinkOperation::SignalSegmentComplete(content)) = self.queue.pop_front() {
                self.complete_segment(&content);
            }
        }
    }

    fn complete_segment(&self, content: &ChunkContext) {
        let res = self
            .inventory
            .borrow_mut()
            .complete_segment(content, &self.last_buffered);
        if let Err(err) = res {
            report_invariant_violation(&self.logger, &err);
        }
    }
}

impl<B: MediaBuffer> SegmentSink for SourceBufferSink<B> {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn push_chunk(&mut self, chunk: PushChunkData) -> Result<(), PushChunkError> {
        if self.is_disposed {
            return Err(PushChunkError::Disposed(self.media_type));
        }
        let insertion_ts = self.clock.now_ms();
        self.logger.debug(&format!(
            "SB: Pushing {} chunk (s:{}, e:{})",
            self.media_type, chunk.inventory_infos.start, chunk.inventory_infos.end
        ));
        match self.buffer.append(&chunk.data) {
            Ok(()) => {
                self.queue.push_back(SinkOperation::Push {
                    infos: chunk.inventory_infos,
                    insertion_ts,
                });
                Ok(())
            }
            Err(err) => {
                // Part of it might still have been pushed
                self.inventory
                    .borrow_mut()
                    .insert_chunk(chunk.inventory_infos, false, insertion_ts);
                Err(match err {
                    MediaBufferError::QuotaExceeded => {
                        PushChunkError::QuotaExceeded(self.media_type)
                    }
                    MediaBufferError::Other(message) => {
                        PushChunkError::UnknownError(self.media_type, message)
                    }
                })
            }
        }
    }

    fn remove_buffer(&mut self, start: f64, end: f64) -> Result<(), RemoveBufferError> {
        if self.is_disposed {
            return Err(RemoveBufferError::Disposed(self.media_type));
        }
        self.logger.debug(&format!(
            "SB: Removing {} data (s:{}, e:{})",
            self.media_type, start, end
        ));
        match self.buffer.remove(start, end) {
            Ok(()) => {
                self.queue.push_back(SinkOperation::Remove { start, end });
                Ok(())
            }
            Err(MediaBufferError::QuotaExceeded) => Err(RemoveBufferError::UnknownError(
                self.media_type,
                "QuotaExceededError".to_owned(),
            )),
            Err(MediaBufferError::Other(message)) => {
                Err(RemoveBufferError::UnknownError(self.media_type, message))
            }
        }
    }

    fn signal_segment_complete(&mut self, content: ChunkContext) {
        if self.is_disposed {
            return;
        }
        if self.queue.is_empty() {
            self.complete_segment(&content);
        } else {
            self.queue
                .push_back(SinkOperation::SignalSegmentComplete(content));
        }
    }

    fn synchronize_inventory(&mut self, buffered: &TimeRanges) {
        if self.is_disposed {
            return;
        }
        self.last_buffered = buffered.clone();
        self.inventory.borrow_mut().synchronize_buffered(buffered);
    }

    fn get_last_known_inventory(&self) -> Vec<BufferedChunk> {
        self.inventory.borrow().get_inventory().to_vec()
    }

    fn get_pending_operations(&self) -> Vec<&SinkOperation> {
        self.queue.iter().collect()
    }

    fn dispose(&mut self) {
        if self.is_disposed {
            return;
        }
        self.logger.info(&format!(
            "SB: Disposing {} sink, clearing {} pending operations.",
            self.media_type,
            self.queue.len()
        ));
        self.is_disposed = true;
        self.queue.clear();
        self.inventory.borrow_mut().reset();
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::{FakeMediaBuffer, FakeOperation};
    use super::*;
    use crate::{
        configuration::Configuration,
        content::{test_utils::video_context, Representation, Segment},
        segment_sink::{ChunkStatus, InsertedChunkInfos},
        utils::{
            clock::ManualClock,
            logger::{test_utils::MemorySink, LoggerLevel},
        },
    };

    struct TestSink {
        sink: SourceBufferSink<FakeMediaBuffer>,
        buffer: FakeMediaBuffer,
        clock: Rc<ManualClock>,
    }

    fn new_sink() -> TestSink {
        let clock = Rc::new(ManualClock::new(1000.));
        let inventory = Rc::new(RefCell::new(SegmentInventory::new(
            &Configuration::default(),
            clock.clone(),
            Logger::default(),
        )));
        let buffer = FakeMediaBuffer::default();
        let sink = SourceBufferSink::new(
            MediaType::Video,
            buffer.clone(),
            inventory,
            clock.clone(),
            Logger::default(),
        );
        TestSink {
            sink,
            buffer,
            clock,
        }
    }

    fn context(start: f64, end: f64) -> ChunkContext {
        video_context(
            &Representation::new("r1", 1_000_000.),
            Segment::media(format!("s{}", start), start, end - start),
        )
    }

    fn push_data(start: f64, end: f64) -> PushChunkData {
        PushChunkData {
            data: vec![0; 10],
            inventory_infos: InsertedChunkInfos {
                infos: context(start, end),
                start,
                end,
                chunk_size: Some(10),
            },
        }
    }

    #[test]
    fn test_push_added_to_inventory_on_operation_end() {
        let mut setup = new_sink();
        setup.sink.push_chunk(push_data(0., 2.)).unwrap();
        assert_eq!(*setup.buffer.operations.borrow(), vec![FakeOperation::Append(10)]);
        assert!(setup.sink.get_last_known_inventory().is_empty());
        assert_eq!(setup.sink.get_pending_operations().len(), 1);

        setup.clock.advance(50.);
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 2.)]));
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].insertion_ts, 1000.);
        assert_eq!(inventory[0].status, ChunkStatus::PartiallyPushed);
        assert_eq!(inventory[0].buffered_start, Some(0.));
        assert!(!setup.sink.has_operations_pending());
    }

    #[test]
    fn test_completion_waits_for_pending_pushes() {
        let mut setup = new_sink();
        setup.sink.push_chunk(push_data(0., 2.)).unwrap();
        setup.sink.signal_segment_complete(context(0., 2.));
        setup.sink.push_chunk(push_data(2., 4.)).unwrap();
        assert_eq!(setup.sink.get_pending_operations().len(), 3);

        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 2.)]));
        assert_eq!(setup.sink.get_pending_operations().len(), 1);
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory[0].status, ChunkStatus::Complete);
        assert!(inventory[0].precize_start);

        setup.sink.signal_segment_complete(context(2., 4.));
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 4.)]));
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory[1].status, ChunkStatus::Complete);
        assert!(setup.sink.get_pending_operations().is_empty());
    }

    #[test]
    fn test_failed_operations() {
        let mut setup = new_sink();
        setup.sink.push_chunk(push_data(0., 2.)).unwrap();
        setup.sink.on_operation_error();
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory.len(), 0);

        *setup.buffer.next_error.borrow_mut() = Some(MediaBufferError::QuotaExceeded);
        let err = setup.sink.push_chunk(push_data(4., 6.)).unwrap_err();
        assert_eq!(err, PushChunkError::QuotaExceeded(MediaType::Video));
        assert_eq!(err.media_type(), MediaType::Video);
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].status, ChunkStatus::Failed);
        assert!(setup.sink.get_pending_operations().is_empty());
    }

    #[test]
    fn test_remove_and_synchronize() {
        let mut setup = new_sink();
        setup.sink.push_chunk(push_data(0., 2.)).unwrap();
        setup.sink.push_chunk(push_data(2., 4.)).unwrap();
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 2.)]));
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 4.)]));
        setup.sink.remove_buffer(0., 2.).unwrap();
        assert_eq!(
            setup.buffer.operations.borrow().last(),
            Some(&FakeOperation::Remove(0., 2.))
        );
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(2., 4.)]));
        let inventory = setup.sink.get_last_known_inventory();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].start, 2.);

        setup.sink.synchronize_inventory(&TimeRanges::new());
        assert!(setup.sink.get_last_known_inventory().is_empty());
    }

    #[test]
    fn test_completion_of_unknown_segment_is_reported() {
        let clock = Rc::new(ManualClock::new(1000.));
        let inventory = Rc::new(RefCell::new(SegmentInventory::new(
            &Configuration::default(),
            clock.clone(),
            Logger::default(),
        )));
        let log_sink = Rc::new(MemorySink::default());
        let mut sink = SourceBufferSink::new(
            MediaType::Video,
            FakeMediaBuffer::default(),
            inventory,
            clock,
            Logger::new(log_sink.clone(), LoggerLevel::Error),
        );
        sink.push_chunk(push_data(0., 2.)).unwrap();
        sink.on_operation_end(&TimeRanges::from_ranges(&[(0., 2.)]));

        sink.signal_segment_complete(context(2., 4.));
        let logs = log_sink.logs.borrow();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, LoggerLevel::Error);
        assert!(logs[0].1.starts_with("Invariant violation:"));
        assert!(logs[0].1.contains("\"s2\" not found"));
        assert_eq!(sink.get_last_known_inventory().len(), 1);
    }

    #[test]
    fn test_dispose() {
        let mut setup = new_sink();
        setup.sink.push_chunk(push_data(0., 2.)).unwrap();
        setup.sink.dispose();
        assert!(setup.sink.get_pending_operations().is_empty());
        assert_eq!(
            setup.sink.push_chunk(push_data(2., 4.)).unwrap_err(),
            PushChunkError::Disposed(MediaType::Video)
        );
        assert_eq!(
            setup.sink.remove_buffer(0., 2.).unwrap_err(),
            RemoveBufferError::Disposed(MediaType::Video)
        );
        setup
            .sink
            .on_operation_end(&TimeRanges::from_ranges(&[(0., 2.)]));
        assert!(setup.sink.get_last_known_inventory().is_empty());
    }
}
