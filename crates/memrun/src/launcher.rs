use tracing::{debug, info, instrument};

use crate::compiler::{CompilationResult, Compiler};
use crate::config::LauncherConfig;
use crate::diagnostic::Diagnostic;
use crate::error::LaunchError;
use crate::invoke::{EntryPoint, invoke};
use crate::loader::{HostUnits, LoaderScope};
use crate::source::SourceUnit;
use crate::store::OutputStore;
use crate::template::Skeleton;
use crate::toolchain::Toolchain;

#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// The toolchain rejected the unit; nothing was loaded or run.
    CompilationFailed(Vec<Diagnostic>),
}

/// Everything `Launcher::compile` produced, for callers that resolve units themselves.
#[derive(Debug)]
pub struct Compiled {
    pub unit: SourceUnit,
    pub store: OutputStore,
    pub result: CompilationResult,
}

pub struct Launcher {
    compiler: Compiler,
    skeleton: Skeleton,
    entry: EntryPoint,
    host: HostUnits,
}

impl Launcher {
    #[instrument(skip_all)]
    pub fn new(config: LauncherConfig) -> Result<Self, LaunchError> {
        let toolchain = Toolchain::discover(config.compiler.as_deref(), config.flags)?;
        let skeleton = match &config.template {
            Some(path) => Skeleton::from_path(&config.entry.unit, path)?,
            None => Skeleton::bundled_for(&config.entry.unit)?,
        };

        Ok(Self {
            compiler: Compiler::new(toolchain).with_scratch(config.scratch),
            skeleton,
            entry: config.entry,
            host: HostUnits::new(),
        })
    }

    pub fn from_env() -> Result<Self, LaunchError> {
        Self::new(LauncherConfig::from_env())
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Fallback units consulted when a name is not in the output store.
    pub fn host_units(&self) -> &HostUnits {
        &self.host
    }

    pub fn host_units_mut(&mut self) -> &mut HostUnits {
        &mut self.host
    }

    /// The source unit `statements` expand to. Deterministic, so diagnostics from
    /// [`Outcome::CompilationFailed`] can be rendered against it afterwards.
    pub fn expand(&self, statements: &str) -> SourceUnit {
        self.skeleton.expand(statements)
    }

    #[instrument(skip(self, statements), fields(fragment_len = statements.len()))]
    pub fn compile(&self, statements: &str) -> Result<Compiled, LaunchError> {
        let unit = self.expand(statements);
        let mut store = OutputStore::new();
        let result = self.compiler.compile(&unit, &mut store)?;
        Ok(Compiled {
            unit,
            store,
            result,
        })
    }

    /// Expands, compiles and runs `statements` with `args`.
    #[instrument(skip(self, statements, args), fields(fragment_len = statements.len(), argc = args.len()))]
    pub fn run(&self, statements: &str, args: &[String]) -> Result<Outcome, LaunchError> {
        let Compiled { store, result, .. } = self.compile(statements)?;

        if !result.success {
            debug!(
                diagnostics = result.diagnostics.len(),
                "Skipping execution after failed compilation"
            );
            return Ok(Outcome::CompilationFailed(result.diagnostics));
        }

        let mut scope = LoaderScope::open(&store, &self.host).with_scratch(self.compiler.scratch());
        let invoked = invoke(&scope, &self.entry, args);
        scope.close();
        invoked?;

        info!(entry = %self.entry, "Invocation complete");
        Ok(Outcome::Completed)
    }
}
