// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Moves capture blocks from the device callback to the analysis thread
// without allocating on the callback thread.
//
// Architecture:
// - DATA queue: capture callback pushes filled buffers, analysis thread consumes
// - POOL queue: analysis thread returns empty buffers, capture callback recycles
//
// Buffer flow:
// 1. Capture callback pops an empty buffer from the pool queue
// 2. Capture callback fills it (mono f32) and pushes it to the data queue
// 3. Analysis thread pops it, runs the detector, pushes it back to the pool
//
// When the pool is exhausted the callback drops the block; the detector sees
// a gap rather than the callback blocking.

use rtrb::{Consumer, Producer};

pub const DEFAULT_BUFFER_COUNT: usize = 16;
/// Samples per pooled buffer
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Both queue ends, before being split between threads
pub struct BufferPoolChannels {
    /// Producer for sending filled audio buffers to analysis thread
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled audio buffers in analysis thread
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning empty buffers from analysis thread
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers in the capture callback
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Queue ends owned by the capture callback
pub struct CaptureChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Queue ends owned by the analysis thread
pub struct AnalysisChannels {
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
}

impl BufferPoolChannels {
    pub fn split(self) -> (CaptureChannels, AnalysisChannels) {
        (
            CaptureChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            AnalysisChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

impl CaptureChannels {
    /// Copy one capture block into a pooled buffer and queue it
    ///
    /// Interleaved input is reduced to its first channel; `convert` maps each
    /// device sample to f32. Input beyond the buffer capacity is truncated.
    /// Returns false when no pooled buffer was free.
    #[inline]
    pub fn push_block<T: Copy, F: Fn(T) -> f32>(
        &mut self,
        data: &[T],
        channels: usize,
        convert: F,
    ) -> bool {
        let Ok(mut buffer) = self.pool_consumer.pop() else {
            return false;
        };
        buffer.clear();
        let capacity = buffer.capacity();
        buffer.extend(
            data.iter()
                .step_by(channels.max(1))
                .take(capacity)
                .map(|&s| convert(s)),
        );
        self.data_producer.push(buffer).is_ok()
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// All heap allocations happen in [`BufferPool::new`].
///
/// # Example
/// ```ignore
/// let (mut capture, mut analysis) = BufferPool::new(16, 4096).split();
///
/// // In the capture callback:
/// capture.push_block(data, 1, |s| s);
///
/// // In the analysis thread:
/// if let Ok(buffer) = analysis.data_consumer.pop() {
///     detector.process_samples(&buffer);
///     analysis.pool_producer.push(buffer).ok();
/// }
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create channels holding `buffer_count` buffers of `buffer_size` samples
    ///
    /// Zero counts or sizes are raised to 1.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        let buffer_count = buffer_count.max(1);
        let buffer_size = buffer_size.max(1);

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // The pool queue has room for every buffer, so no push can fail here.
        for _ in 0..buffer_count {
            if pool_producer.push(vec![0.0_f32; buffer_size]).is_err() {
                break;
            }
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
