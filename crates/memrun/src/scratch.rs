//! Scratch files the pipeline hands to the toolchain and the dynamic loader.
//!
//! In memory mode every file is an anonymous `memfd` that exists only in RAM and
//! is reachable by path through `/proc/self/fd`. Platforms without that fall back
//! to a private temporary directory that lives exactly as long as its owner.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScratchMode {
    #[default]
    Auto,
    Memory,
    PrivateDir,
}

impl ScratchMode {
    pub fn resolve(self) -> ScratchMode {
        match self {
            ScratchMode::Auto if memory_supported() => ScratchMode::Memory,
            ScratchMode::Auto => ScratchMode::PrivateDir,
            ScratchMode::Memory if !memory_supported() => {
                warn!("Memory files are not supported here, using a private directory");
                ScratchMode::PrivateDir
            }
            mode => mode,
        }
    }
}

pub fn memory_supported() -> bool {
    cfg!(target_os = "linux") && Path::new("/proc/self/fd").is_dir()
}

/// An unnamed read/write file: a `memfd` in memory mode, an unlinked temp file otherwise.
pub fn anonymous_file(label: &str, mode: ScratchMode) -> io::Result<File> {
    match mode.resolve() {
        ScratchMode::Memory => memory_file(label),
        _ => tempfile::tempfile(),
    }
}

#[cfg(target_os = "linux")]
fn memory_file(label: &str) -> io::Result<File> {
    use std::ffi::CString;
    use std::os::fd::FromRawFd;

    let name = CString::new(label).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` was just returned by memfd_create and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(not(target_os = "linux"))]
fn memory_file(_label: &str) -> io::Result<File> {
    tempfile::tempfile()
}

#[cfg(target_os = "linux")]
fn fd_path(file: &File) -> PathBuf {
    use std::os::fd::AsRawFd;
    PathBuf::from(format!("/proc/self/fd/{}", file.as_raw_fd()))
}

#[cfg(not(target_os = "linux"))]
fn fd_path(_file: &File) -> PathBuf {
    PathBuf::new()
}

fn private_dir() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("memrun-").tempdir()
}

/// Output path for memory mode. Each process in the toolchain resolves it to its own
/// inherited stdout, and the driver's cleanup of a failed link cannot unlink it.
pub const MEMORY_OUTPUT: &str = "/proc/self/fd/1";

/// Where the toolchain writes the artifact it produces.
pub enum OutputTarget {
    /// The child's stdout is a memory file and the toolchain writes to [`MEMORY_OUTPUT`].
    Memory(File),
    Private { _dir: TempDir, path: PathBuf },
}

impl OutputTarget {
    pub fn new(file_name: &str, mode: ScratchMode) -> io::Result<Self> {
        match mode.resolve() {
            ScratchMode::Memory => Ok(OutputTarget::Memory(memory_file(file_name)?)),
            _ => {
                let dir = private_dir()?;
                let path = dir.path().join(file_name);
                Ok(OutputTarget::Private { _dir: dir, path })
            }
        }
    }

    pub fn output_arg(&self) -> &Path {
        match self {
            OutputTarget::Memory(_) => Path::new(MEMORY_OUTPUT),
            OutputTarget::Private { path, .. } => path,
        }
    }

    pub fn child_stdout(&self) -> io::Result<Stdio> {
        match self {
            OutputTarget::Memory(file) => Ok(Stdio::from(file.try_clone()?)),
            OutputTarget::Private { .. } => Ok(Stdio::null()),
        }
    }

    /// Copies everything the toolchain produced into `sink`, then discards the scratch file.
    pub fn drain_into<W: Write>(self, sink: &mut W) -> io::Result<u64> {
        match self {
            OutputTarget::Memory(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                io::copy(&mut file, sink)
            }
            OutputTarget::Private { _dir, path } => match File::open(&path) {
                Ok(mut file) => io::copy(&mut file, sink),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e),
            },
        }
    }
}

/// The storage a loaded unit was defined from. Must outlive the library handle.
#[derive(Debug)]
pub enum Backing {
    Memory(File),
    Private { _dir: TempDir, path: PathBuf },
}

impl Backing {
    pub fn write(name: &str, bytes: &[u8], mode: ScratchMode) -> io::Result<Self> {
        let file_name = format!("{}.{}", name, std::env::consts::DLL_EXTENSION);
        match mode.resolve() {
            ScratchMode::Memory => {
                let mut file = memory_file(&file_name)?;
                file.write_all(bytes)?;
                file.flush()?;
                Ok(Backing::Memory(file))
            }
            _ => {
                let dir = private_dir()?;
                let path = dir.path().join(file_name);
                std::fs::write(&path, bytes)?;
                Ok(Backing::Private { _dir: dir, path })
            }
        }
    }

    pub fn path(&self) -> PathBuf {
        match self {
            Backing::Memory(file) => fd_path(file),
            Backing::Private { path, .. } => path.clone(),
        }
    }
}
