use std::io::{self, Seek, SeekFrom, Write};
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument, warn};

use crate::diagnostic::{Diagnostic, parse_diagnostics};
use crate::error::ToolchainError;
use crate::scratch::{self, OutputTarget, ScratchMode};
use crate::source::{SourceUnit, UnitKind};
use crate::store::OutputStore;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn has_errors(&self) -> bool {
        !self.success
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Drives the C toolchain for one source unit at a time.
#[derive(Debug, Clone)]
pub struct Compiler {
    toolchain: Toolchain,
    scratch: ScratchMode,
}

impl Compiler {
    pub fn new(toolchain: Toolchain) -> Self {
        Self {
            toolchain,
            scratch: ScratchMode::default(),
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchMode) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn scratch(&self) -> ScratchMode {
        self.scratch
    }

    /// Compiles `unit` into a shared object stored under the unit's name, then seals `store`.
    ///
    /// A failed compilation is not an `Err`: it is reported through
    /// [`CompilationResult::success`] and the diagnostics, and nothing is stored.
    #[instrument(
        skip(self, unit, store),
        fields(
            unit = unit.name(),
            program = %self.toolchain.program().display(),
            source_len = unit.text().len()
        )
    )]
    pub fn compile(
        &self,
        unit: &SourceUnit,
        store: &mut OutputStore,
    ) -> Result<CompilationResult, ToolchainError> {
        let file_name = unit.file_name();
        let scratch_err = |source: io::Error| ToolchainError::Scratch {
            name: file_name.clone(),
            source,
        };

        let input = self.stage_input(unit, &file_name).map_err(scratch_err)?;
        let output_name = format!("{}.{}", unit.name(), UnitKind::Output.extension());
        let target = OutputTarget::new(&output_name, self.scratch).map_err(scratch_err)?;

        let mut command = Command::new(self.toolchain.program());
        command
            .args(["-x", "c", "-shared", "-fPIC", "-pipe", "-fdiagnostics-color=never"])
            .arg("-o")
            .arg(target.output_arg())
            .arg("-")
            .args(self.toolchain.flags())
            .env("LC_ALL", "C")
            .stdin(Stdio::from(input))
            .stdout(target.child_stdout().map_err(scratch_err)?)
            .stderr(Stdio::piped());
        if cfg!(target_os = "linux") {
            command.arg("-Wl,--no-undefined");
        }

        debug!(?command, "Invoking toolchain");
        let output = command.output().map_err(|source| ToolchainError::Spawn {
            program: self.toolchain.program().to_path_buf(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = parse_diagnostics(&stderr);
        let reported_error = diagnostics.iter().any(Diagnostic::is_error);

        if !output.status.success() && !reported_error {
            let detail = stderr.trim();
            diagnostics.push(Diagnostic::error(if detail.is_empty() {
                format!("toolchain {}", output.status)
            } else {
                detail.to_string()
            }));
        }

        let mut success = output.status.success() && !reported_error;

        if success {
            let mut bytes = Vec::new();
            target.drain_into(&mut bytes).map_err(scratch_err)?;
            if bytes.is_empty() {
                diagnostics.push(Diagnostic::error("toolchain produced no output"));
                success = false;
            } else {
                let mut sink = store.open_output(unit.name())?;
                sink.write_all(&bytes).map_err(scratch_err)?;
                drop(sink);
                info!(bytes = bytes.len(), warnings = diagnostics.len(), "Compilation successful");
            }
        }

        if !success {
            warn!(
                error_count = diagnostics.iter().filter(|d| d.is_error()).count(),
                status = %output.status,
                "Compilation failed with errors"
            );
        }

        store.seal();

        Ok(CompilationResult {
            success,
            diagnostics,
        })
    }

    /// Writes the unit into an anonymous file the child reads as stdin.
    fn stage_input(&self, unit: &SourceUnit, file_name: &str) -> io::Result<std::fs::File> {
        let mut input = scratch::anonymous_file(file_name, self.scratch)?;
        writeln!(input, "#line 1 \"{}\"", file_name)?;
        input.write_all(unit.text().as_bytes())?;
        input.flush()?;
        input.seek(SeekFrom::Start(0))?;
        Ok(input)
    }
}
