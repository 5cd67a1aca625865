//! Compile a fragment of C statements in memory and run it in-process.
//!
//! The fragment is spliced into a skeleton that defines `int Main_main(int argc, char **args)`,
//! compiled by the host C toolchain into a shared object that is captured in an
//! [`OutputStore`], defined straight from those bytes inside a [`LoaderScope`], and invoked.
//!
//! ```no_run
//! use memrun::{Launcher, LauncherConfig, Outcome};
//!
//! let launcher = Launcher::new(LauncherConfig::from_env())?;
//! match launcher.run(r#"printf("%d args\n", argc);"#, &["a".to_string()])? {
//!     Outcome::Completed => {}
//!     Outcome::CompilationFailed(diagnostics) => {
//!         for diagnostic in diagnostics {
//!             println!("{diagnostic}");
//!         }
//!     }
//! }
//! # Ok::<(), memrun::LaunchError>(())
//! ```

pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod invoke;
pub mod launcher;
pub mod loader;
pub mod scratch;
pub mod source;
pub mod store;
pub mod template;
pub mod toolchain;

pub use compiler::{CompilationResult, Compiler};
pub use config::LauncherConfig;
pub use diagnostic::{Diagnostic, Severity};
pub use error::{ConfigError, InvokeError, LaunchError, LoaderError, ToolchainError};
pub use invoke::{EntryPoint, invoke};
pub use launcher::{Compiled, Launcher, Outcome};
pub use loader::{HostUnits, LoadedUnit, LoaderScope, Origin, Resolver};
pub use scratch::ScratchMode;
pub use source::SourceUnit;
pub use store::OutputStore;
pub use template::Skeleton;
pub use toolchain::Toolchain;
