// Audio module - frame plumbing between capture and analysis, plus the
// metronome collaborator

pub mod buffer_pool;
pub mod frame;
pub mod metronome;

pub use buffer_pool::{
    AnalysisChannels, AudioBuffer, BufferPool, BufferPoolChannels, CaptureChannels,
    DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE,
};
pub use frame::{i16_to_f32, rms, FrameChunker};
pub use metronome::{generate_click_sample, BeatSource, GridMetronome};
