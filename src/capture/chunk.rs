use bytes::{Bytes, BytesMut};
use tracing::debug;

/// One finished recording: the concatenated fragments and their content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub content_type: String,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of finalizing a chunk buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Artifact(Artifact),
    /// Nothing was captured; skip persistence and upload
    Empty,
}

/// Accumulates recorder fragments in arrival order
///
/// Recorders legitimately emit zero-length fragments while the captured
/// surface is idle; those are dropped on `append`.
#[derive(Debug)]
pub struct ChunkAssembler {
    content_type: String,
    fragments: Vec<Bytes>,
    buffered_bytes: usize,
}

impl ChunkAssembler {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            fragments: Vec::new(),
            buffered_bytes: 0,
        }
    }

    pub fn append(&mut self, fragment: Bytes) {
        if fragment.is_empty() {
            debug!("Dropping empty fragment");
            return;
        }

        self.buffered_bytes += fragment.len();
        self.fragments.push(fragment);
    }

    /// Concatenate everything appended so far and clear the buffer
    pub fn finalize(&mut self) -> Assembled {
        if self.is_empty() {
            return Assembled::Empty;
        }

        let fragments = std::mem::take(&mut self.fragments);
        let total = std::mem::take(&mut self.buffered_bytes);

        let mut bytes = BytesMut::with_capacity(total);
        for fragment in &fragments {
            bytes.extend_from_slice(fragment);
        }

        Assembled::Artifact(Artifact {
            bytes: bytes.freeze(),
            content_type: self.content_type.clone(),
        })
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
