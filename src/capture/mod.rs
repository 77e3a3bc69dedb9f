//! 音声チャンクソース
//!
//! マイク等のキャプチャデバイスを包み、固定周期で不透明なバイナリ
//! チャンクを産出します。デバイスは高々1つのアクティブなソースが
//! 排他的に保持します。
mod device;
mod error;
mod source;

pub use device::{CaptureDevice, ScriptedDevice, SilenceDevice};
pub use error::CaptureError;
pub use source::{AudioChunk, ChunkSource};
