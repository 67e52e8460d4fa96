pub mod backend;
pub mod chunk;
pub mod codec;
pub mod file;

pub use backend::{
    CaptureConstraints, DisplayCapture, MediaStream, RecorderEvent, RecorderHandle,
};
pub use chunk::{Artifact, Assembled, ChunkAssembler};
pub use codec::{extension_for, select_mime_type};
pub use file::FileReplayCapture;
