use std::env;
use std::path::PathBuf;

use crate::invoke::EntryPoint;
use crate::scratch::ScratchMode;

pub const ENV_CC: &str = "MEMRUN_CC";
pub const ENV_CFLAGS: &str = "MEMRUN_CFLAGS";
pub const ENV_TEMPLATE: &str = "MEMRUN_TEMPLATE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LauncherConfig {
    pub compiler: Option<PathBuf>,
    pub flags: Vec<String>,
    pub template: Option<PathBuf>,
    pub entry: EntryPoint,
    pub scratch: ScratchMode,
}

impl LauncherConfig {
    /// Reads `MEMRUN_CC` (or `CC`), `MEMRUN_CFLAGS` and `MEMRUN_TEMPLATE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            compiler: non_empty(ENV_CC).or_else(|| non_empty("CC")).map(PathBuf::from),
            flags: non_empty(ENV_CFLAGS)
                .map(|flags| flags.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            template: non_empty(ENV_TEMPLATE).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_compiler(mut self, compiler: impl Into<PathBuf>) -> Self {
        self.compiler = Some(compiler.into());
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_entry(mut self, entry: EntryPoint) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_scratch(mut self, scratch: ScratchMode) -> Self {
        self.scratch = scratch;
        self
    }
}
