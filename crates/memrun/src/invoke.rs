use std::ffi::{CString, c_char, c_int};
use std::fmt;
use std::io::Write;

use tracing::{debug, instrument, warn};

use crate::error::{AbnormalExit, InvokeError};
use crate::loader::LoaderScope;

/// `int <unit>_<function>(int argc, char **args)`
pub type EntryFn = unsafe extern "C" fn(c_int, *const *const c_char) -> c_int;

/// The function the skeleton defines and the invoker calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub unit: String,
    pub function: String,
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self {
            unit: "Main".to_string(),
            function: "main".to_string(),
        }
    }
}

impl EntryPoint {
    pub fn new(unit: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            function: function.into(),
        }
    }

    pub fn symbol(&self) -> String {
        format!("{}_{}", self.unit, self.function)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.function)
    }
}

/// Calls `entry` inside `scope` with exactly `args` (no program name is prepended).
#[instrument(skip(scope, entry, args), fields(entry = %entry, argc = args.len()))]
pub fn invoke(scope: &LoaderScope<'_>, entry: &EntryPoint, args: &[String]) -> Result<(), InvokeError> {
    let unit = scope.resolve(&entry.unit)?;
    let symbol = entry.symbol();

    // SAFETY: the skeleton declares the entry symbol with the `EntryFn` signature.
    let function: EntryFn = unsafe { unit.get(&symbol) }.map_err(|source| {
        InvokeError::FunctionNotFound {
            unit: entry.unit.clone(),
            symbol: symbol.clone(),
            source,
        }
    })?;

    let owned = args
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            CString::new(arg.as_str()).map_err(|_| InvokeError::InvalidArgument { index })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let argc = c_int::try_from(owned.len())
        .map_err(|_| InvokeError::TooManyArguments { count: owned.len() })?;
    let mut argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());

    flush_host_output(&mut std::io::stdout());
    debug!(unit = unit.name(), origin = ?unit.origin(), "Invoking entry function");

    // SAFETY: `argv` is NUL-terminated, each element points into `owned`, and both
    // outlive the call; `unit` keeps the library loaded until after it returns.
    let status = unsafe {
        let status = function(argc, argv.as_ptr());
        libc::fflush(std::ptr::null_mut());
        status
    };

    if status != 0 {
        return Err(InvokeError::Failed {
            symbol,
            cause: AbnormalExit { status },
        });
    }
    Ok(())
}

/// Host output buffered so far must land before the fragment's. Returns whether it did.
fn flush_host_output(out: &mut impl Write) -> bool {
    match out.flush() {
        Ok(()) => true,
        Err(error) => {
            warn!(%error, "Failed to flush host output before invoking");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::error::LoaderError;
    use crate::loader::HostUnits;
    use crate::store::OutputStore;
    use crate::template::Skeleton;
    use crate::toolchain::Toolchain;
    use std::error::Error;
    use tempfile::TempDir;

    fn compile(statements: &str) -> Option<OutputStore> {
        let toolchain = Toolchain::discover(None, vec![]).ok()?;
        let unit = Skeleton::bundled().unwrap().expand(statements);
        let mut store = OutputStore::new();
        let result = Compiler::new(toolchain).compile(&unit, &mut store).unwrap();
        assert!(result.success, "unexpected diagnostics: {:?}", result.diagnostics);
        Some(store)
    }

    fn c_string(path: &std::path::Path) -> String {
        format!("{:?}", path.display().to_string())
    }

    #[test]
    fn test_entry_symbol() {
        let entry = EntryPoint::default();
        assert_eq!(entry.symbol(), "Main_main");
        assert_eq!(entry.to_string(), "Main.main");
    }

    #[test]
    fn test_arguments_arrive_in_order() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("args.txt");
        let fragment = format!(
            r#"FILE *out = fopen({}, "w");
fprintf(out, "%d:", argc);
for (int i = 0; i < argc; i++) fprintf(out, "%s%s", i ? "," : "", args[i]);
fprintf(out, "|%s", args[argc] == NULL ? "null" : "set");
fclose(out);"#,
            c_string(&out)
        );
        let Some(store) = compile(&fragment) else {
            return;
        };

        let host = HostUnits::new();
        let scope = LoaderScope::open(&store, &host);
        invoke(&scope, &EntryPoint::default(), &["a".to_string(), "b".to_string()]).unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "2:a,b|null");
    }

    #[test]
    fn test_nonzero_status_is_failure_with_cause() {
        let Some(store) = compile("return 3;") else {
            return;
        };
        let host = HostUnits::new();
        let scope = LoaderScope::open(&store, &host);

        let err = invoke(&scope, &EntryPoint::default(), &[]).unwrap_err();
        match &err {
            InvokeError::Failed { symbol, cause } => {
                assert_eq!(symbol, "Main_main");
                assert_eq!(cause.status, 3);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(err.source().unwrap().to_string(), "exited with status 3");
    }

    #[test]
    fn test_missing_function() {
        let Some(store) = compile("") else {
            return;
        };
        let host = HostUnits::new();
        let scope = LoaderScope::open(&store, &host);

        let err = invoke(&scope, &EntryPoint::new("Main", "start"), &[]).unwrap_err();
        assert!(matches!(err, InvokeError::FunctionNotFound { ref symbol, .. } if symbol == "Main_start"));
    }

    #[test]
    fn test_missing_unit() {
        let store = OutputStore::new();
        let host = HostUnits::new();
        let scope = LoaderScope::open(&store, &host);

        let err = invoke(&scope, &EntryPoint::default(), &[]).unwrap_err();
        assert!(matches!(err, InvokeError::Loader(LoaderError::NotFound { .. })));
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let Some(store) = compile("") else {
            return;
        };
        let host = HostUnits::new();
        let scope = LoaderScope::open(&store, &host);

        let args = vec!["ok".to_string(), "bad\0arg".to_string()];
        let err = invoke(&scope, &EntryPoint::default(), &args).unwrap_err();
        assert!(matches!(err, InvokeError::InvalidArgument { index: 1 }));
    }

    #[test]
    fn test_flush_failure_is_reported() {
        struct Broken;

        impl Write for Broken {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        assert!(!flush_host_output(&mut Broken));
        assert!(flush_host_output(&mut Vec::new()));
    }
}
