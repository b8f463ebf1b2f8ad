//! Gainstage infrastructure: audio devices and live streaming

pub mod audio;

pub use audio::{
    BlockRunner, CpalEnumerator, DuplexStream, SampleQueue, StatsSnapshot, StreamStats,
};
