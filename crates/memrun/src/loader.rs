use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, instrument, trace};

use crate::error::LoaderError;
use crate::scratch::{Backing, ScratchMode};
use crate::store::OutputStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Defined from the output store of the current scope.
    Compiled,
    /// Already loaded by the host before the scope existed.
    Host,
}

/// A shared object made callable in this process.
#[derive(Debug)]
pub struct LoadedUnit {
    name: String,
    origin: Origin,
    // Declared before `backing` so the library is closed before its file goes away.
    library: Library,
    _backing: Option<Backing>,
}

impl LoadedUnit {
    /// Defines `bytes` as an executable unit without writing them to a named file.
    #[instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn define(name: &str, bytes: &[u8], scratch: ScratchMode) -> Result<Self, LoaderError> {
        let backing = Backing::write(name, bytes, scratch).map_err(|source| LoaderError::Backing {
            name: name.to_string(),
            source,
        })?;

        // SAFETY: loading runs the object's initializers; the bytes come from the
        // toolchain and run with the host's privileges by contract.
        let library = unsafe { Library::new(backing.path()) }.map_err(|source| {
            LoaderError::Define {
                name: name.to_string(),
                source,
            }
        })?;

        debug!(name, "Defined unit from memory");
        Ok(Self {
            name: name.to_string(),
            origin: Origin::Compiled,
            library,
            _backing: Some(backing),
        })
    }

    /// Loads a shared object the host already has on disk.
    pub fn open(name: &str, path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        // SAFETY: same contract as `define`.
        let library = unsafe { Library::new(path.as_ref()) }.map_err(|source| {
            LoaderError::Define {
                name: name.to_string(),
                source,
            }
        })?;

        Ok(Self {
            name: name.to_string(),
            origin: Origin::Host,
            library,
            _backing: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Copies a symbol's value out of the library.
    ///
    /// # Safety
    /// `T` must match the symbol's real type, and the value must not be used after
    /// this unit is dropped.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, libloading::Error> {
        unsafe { self.library.get::<T>(symbol.as_bytes()).map(|sym| *sym) }
    }
}

/// Resolution tier consulted when the output store has no unit of the requested name.
pub trait Resolver {
    fn resolve(&self, name: &str) -> Option<Arc<LoadedUnit>>;
}

/// Units the host has loaded on its own.
#[derive(Debug, Default)]
pub struct HostUnits {
    units: HashMap<String, Arc<LoadedUnit>>,
}

impl HostUnits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, unit: Arc<LoadedUnit>) {
        self.units.insert(unit.name().to_string(), unit);
    }

    pub fn load(&mut self, name: &str, path: impl AsRef<Path>) -> Result<Arc<LoadedUnit>, LoaderError> {
        let unit = Arc::new(LoadedUnit::open(name, path)?);
        self.register(Arc::clone(&unit));
        Ok(unit)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }
}

impl Resolver for HostUnits {
    fn resolve(&self, name: &str) -> Option<Arc<LoadedUnit>> {
        self.units.get(name).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Open,
    Closed,
}

/// Resolution boundary for the units of one invocation.
///
/// Names in the output store shadow the fallback. Closing (explicitly or on drop)
/// forgets every unit defined here; later resolutions fail.
pub struct LoaderScope<'a> {
    store: &'a OutputStore,
    fallback: &'a dyn Resolver,
    scratch: ScratchMode,
    state: ScopeState,
    defined: RefCell<HashMap<String, Arc<LoadedUnit>>>,
}

impl<'a> LoaderScope<'a> {
    pub fn open(store: &'a OutputStore, fallback: &'a dyn Resolver) -> Self {
        trace!(artifacts = store.len(), "Opening loader scope");
        Self {
            store,
            fallback,
            scratch: ScratchMode::default(),
            state: ScopeState::Open,
            defined: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchMode) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == ScopeState::Open
    }

    #[instrument(skip(self))]
    pub fn resolve(&self, name: &str) -> Result<Arc<LoadedUnit>, LoaderError> {
        if self.state == ScopeState::Closed {
            return Err(LoaderError::Closed {
                name: name.to_string(),
            });
        }

        if let Some(unit) = self.defined.borrow().get(name) {
            trace!("Resolved from scope cache");
            return Ok(Arc::clone(unit));
        }

        if let Some(artifact) = self.store.artifact(name) {
            if !artifact.is_complete() {
                return Err(LoaderError::Incomplete {
                    name: name.to_string(),
                });
            }
            let unit = Arc::new(LoadedUnit::define(name, artifact.bytes(), self.scratch)?);
            self.defined
                .borrow_mut()
                .insert(name.to_string(), Arc::clone(&unit));
            return Ok(unit);
        }

        if let Some(unit) = self.fallback.resolve(name) {
            trace!("Resolved via fallback");
            return Ok(unit);
        }

        debug!("No unit found");
        Err(LoaderError::NotFound {
            name: name.to_string(),
        })
    }

    /// Idempotent.
    pub fn close(&mut self) {
        if self.state == ScopeState::Closed {
            return;
        }
        let released = self.defined.get_mut().drain().count();
        self.state = ScopeState::Closed;
        debug!(released, "Closed loader scope");
    }
}

impl Drop for LoaderScope<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
