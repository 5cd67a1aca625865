use std::collections::HashMap;
use std::io::{self, Write};

use tracing::{debug, trace};

use crate::error::StoreError;
use crate::source::UnitKind;

#[derive(Debug)]
pub struct CompiledArtifact {
    name: String,
    bytes: Vec<u8>,
    writing: bool,
}

impl CompiledArtifact {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bytes: Vec::new(),
            writing: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UnitKind {
        UnitKind::Output
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_complete(&self) -> bool {
        !self.writing
    }
}

/// Append-only sink for one artifact. Dropping it completes the artifact.
pub struct ArtifactSink<'a> {
    artifact: &'a mut CompiledArtifact,
}

impl ArtifactSink<'_> {
    pub fn name(&self) -> &str {
        &self.artifact.name
    }
}

impl Write for ArtifactSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.artifact.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ArtifactSink<'_> {
    fn drop(&mut self) {
        self.artifact.writing = false;
        trace!(
            name = %self.artifact.name,
            bytes = self.artifact.bytes.len(),
            "Artifact complete"
        );
    }
}

/// Compiled output of a single compilation, kept in memory only.
#[derive(Debug, Default)]
pub struct OutputStore {
    artifacts: HashMap<String, CompiledArtifact>,
    sealed: bool,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening a name again before sealing starts that artifact over.
    pub fn open_output(&mut self, name: &str) -> Result<ArtifactSink<'_>, StoreError> {
        if self.sealed {
            return Err(StoreError::Sealed {
                name: name.to_string(),
            });
        }
        debug!(name, "Opening in-memory output");
        let artifact = self
            .artifacts
            .entry(name.to_string())
            .or_insert_with(|| CompiledArtifact::new(name));
        *artifact = CompiledArtifact::new(name);
        Ok(ArtifactSink { artifact })
    }

    pub fn artifact(&self, name: &str) -> Option<&CompiledArtifact> {
        self.artifacts.get(name)
    }

    /// Completed bytes for `name`, or `None` if it was never written or is still being written.
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.artifacts
            .get(name)
            .filter(|artifact| artifact.is_complete())
            .map(CompiledArtifact::bytes)
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
