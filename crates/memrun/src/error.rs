use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read template '{path}'")]
    #[diagnostic(
        code(memrun::config::template_unreadable),
        help("Check the template path, or unset it to use the bundled skeleton.")
    )]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Template contains an unsupported format sequence '%{found}' at byte {offset}")]
    #[diagnostic(
        code(memrun::config::malformed_template),
        help("Only '%s' (the statement placeholder) and '%%' (a literal '%') are recognized.")
    )]
    MalformedTemplate { found: char, offset: usize },

    #[error("Template must contain exactly one '%s' placeholder, found {found}")]
    #[diagnostic(code(memrun::config::placeholder_count))]
    PlaceholderCount { found: usize },
}

#[derive(Debug, Error, Diagnostic)]
pub enum ToolchainError {
    #[error("No C compiler found (searched: {})", searched.join(", "))]
    #[diagnostic(
        code(memrun::toolchain::unavailable),
        help("Install a C toolchain or point MEMRUN_CC / CC at one.")
    )]
    Unavailable { searched: Vec<String> },

    #[error("Failed to run compiler '{}'", program.display())]
    #[diagnostic(code(memrun::toolchain::spawn))]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare in-memory scratch file for '{name}'")]
    #[diagnostic(code(memrun::toolchain::scratch))]
    Scratch {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(memrun::toolchain::store))]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Output store is sealed, cannot open '{name}' for writing")]
    #[diagnostic(code(memrun::store::sealed))]
    Sealed { name: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("Loader scope is closed, cannot resolve '{name}'")]
    #[diagnostic(code(memrun::loader::closed))]
    Closed { name: String },

    #[error("Unit '{name}' not found")]
    #[diagnostic(code(memrun::loader::not_found))]
    NotFound { name: String },

    #[error("Unit '{name}' is still being written")]
    #[diagnostic(code(memrun::loader::incomplete))]
    Incomplete { name: String },

    #[error("Failed to define unit '{name}'")]
    #[diagnostic(code(memrun::loader::define))]
    Define {
        name: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Failed to back unit '{name}' with memory")]
    #[diagnostic(code(memrun::loader::backing))]
    Backing {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
#[error("exited with status {status}")]
pub struct AbnormalExit {
    pub status: i32,
}

#[derive(Debug, Error, Diagnostic)]
pub enum InvokeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Loader(#[from] LoaderError),

    #[error("Entry function '{symbol}' not found in unit '{unit}'")]
    #[diagnostic(
        code(memrun::invoke::function_not_found),
        help("The skeleton must define the entry function the launcher looks up.")
    )]
    FunctionNotFound {
        unit: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Argument {index} contains an interior NUL byte")]
    #[diagnostic(code(memrun::invoke::invalid_argument))]
    InvalidArgument { index: usize },

    #[error("Too many arguments ({count})")]
    #[diagnostic(code(memrun::invoke::too_many_arguments))]
    TooManyArguments { count: usize },

    #[error("Entry function '{symbol}' failed")]
    #[diagnostic(code(memrun::invoke::failed))]
    Failed {
        symbol: String,
        #[source]
        cause: AbnormalExit,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum LaunchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Invoke(InvokeError),
}

/// Loader failures surface as [`LaunchError::Loader`] even when they happen while invoking.
impl From<InvokeError> for LaunchError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Loader(error) => LaunchError::Loader(error),
            other => LaunchError::Invoke(other),
        }
    }
}

impl LaunchError {
    pub fn is_toolchain_unavailable(&self) -> bool {
        matches!(
            self,
            LaunchError::Toolchain(ToolchainError::Unavailable { .. })
        )
    }
}
