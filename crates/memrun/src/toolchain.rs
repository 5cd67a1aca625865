use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::ToolchainError;

const CANDIDATES: [&str; 3] = ["cc", "gcc", "clang"];

/// A C compiler driver found on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    program: PathBuf,
    flags: Vec<String>,
}

impl Toolchain {
    /// An explicit `compiler` wins; otherwise `cc`, `gcc` and `clang` are tried on `PATH`.
    #[instrument(skip(flags))]
    pub fn discover(compiler: Option<&Path>, flags: Vec<String>) -> Result<Self, ToolchainError> {
        let path_var = env::var_os("PATH").unwrap_or_default();
        let dirs: Vec<PathBuf> = env::split_paths(&path_var).collect();

        let searched: Vec<String> = match compiler {
            Some(compiler) => vec![compiler.display().to_string()],
            None => CANDIDATES.iter().map(|c| c.to_string()).collect(),
        };

        for name in &searched {
            if let Some(program) = locate(Path::new(name), &dirs) {
                debug!(program = %program.display(), "Found C toolchain");
                return Ok(Self { program, flags });
            }
        }

        Err(ToolchainError::Unavailable { searched })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }
}

fn locate(name: &Path, dirs: &[PathBuf]) -> Option<PathBuf> {
    if name.components().count() > 1 {
        return is_executable(name).then(|| name.to_path_buf());
    }
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
