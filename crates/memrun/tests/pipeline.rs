use std::fs;
use std::path::Path;
use std::sync::Once;

use memrun::{
    Diagnostic, HostUnits, Launcher, LauncherConfig, LoaderError, LoaderScope, Origin, Outcome,
    ScratchMode, Severity,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

fn launcher_with(config: LauncherConfig) -> Option<Launcher> {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });

    match Launcher::new(config) {
        Ok(launcher) => Some(launcher),
        Err(e) if e.is_toolchain_unavailable() => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) => panic!("unexpected launcher error: {e}"),
    }
}

fn launcher() -> Option<Launcher> {
    launcher_with(LauncherConfig::default())
}

/// A C string literal naming `path`.
fn literal(path: &Path) -> String {
    format!("{:?}", path.display().to_string())
}

fn write_fragment(path: &Path, text: &str) -> String {
    format!(
        r#"FILE *out = fopen({}, "w"); fputs({:?}, out); fclose(out);"#,
        literal(path),
        text
    )
}

#[test]
fn test_fragment_runs_once_with_side_effects() {
    let Some(launcher) = launcher() else {
        return;
    };
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("hello.txt");
    let fragment = format!(
        r#"FILE *out = fopen({}, "a"); fputs("Hello", out); fclose(out);"#,
        literal(&out)
    );

    let outcome = launcher.run(&fragment, &[]).unwrap();

    assert!(matches!(outcome, Outcome::Completed));
    assert_eq!(fs::read_to_string(&out).unwrap(), "Hello");
}

#[test]
fn test_syntax_error_never_runs() {
    let Some(launcher) = launcher() else {
        return;
    };
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("never.txt");
    let fragment = format!("{}\nint broken = ;", write_fragment(&out, "ran"));

    match launcher.run(&fragment, &[]).unwrap() {
        Outcome::CompilationFailed(diagnostics) => {
            assert!(!diagnostics.is_empty());
            assert!(diagnostics.iter().any(|d| d.severity == Severity::Error));
        }
        Outcome::Completed => panic!("fragment with a syntax error was executed"),
    }
    assert!(!out.exists());
}

#[test]
fn test_diagnostics_follow_emission_order() {
    let Some(launcher) = launcher() else {
        return;
    };
    let Outcome::CompilationFailed(diagnostics) = launcher.run("int a = ;\n\n\nint b = ;", &[]).unwrap()
    else {
        panic!("expected compilation failure");
    };

    let lines: Vec<usize> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .filter_map(|d| d.line)
        .collect();
    assert!(lines.len() >= 2, "diagnostics: {:?}", diagnostics);
    assert!(lines.windows(2).all(|w| w[0] <= w[1]), "lines: {:?}", lines);
    assert_eq!(lines.first(), Some(&8));
    assert_eq!(lines.last(), Some(&11));
}

#[test]
fn test_arguments_are_delivered_exactly() {
    let Some(launcher) = launcher() else {
        return;
    };
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("args.txt");
    let fragment = format!(
        r#"FILE *out = fopen({}, "w");
fprintf(out, "%d", argc);
for (int i = 0; i < argc; i++) fprintf(out, " %s", args[i]);
fclose(out);"#,
        literal(&out)
    );

    launcher
        .run(&fragment, &["a".to_string(), "b".to_string()])
        .unwrap();

    assert_eq!(fs::read_to_string(&out).unwrap(), "2 a b");
}

#[test]
fn test_empty_fragment_is_a_no_op() {
    let Some(launcher) = launcher() else {
        return;
    };
    assert!(matches!(launcher.run("", &[]).unwrap(), Outcome::Completed));
}

#[test]
fn test_fresh_unit_shadows_host_unit() {
    let Some(mut launcher) = launcher() else {
        return;
    };
    let temp = TempDir::new().unwrap();

    let stale = launcher.compile("return 9;").unwrap();
    let stale_path = temp.path().join("Main.so");
    fs::write(&stale_path, stale.store.bytes("Main").unwrap()).unwrap();
    launcher.host_units_mut().load("Main", &stale_path).unwrap();

    assert!(matches!(launcher.run("return 0;", &[]).unwrap(), Outcome::Completed));

    let fresh = launcher.compile("return 0;").unwrap();
    let scope = LoaderScope::open(&fresh.store, launcher.host_units());
    assert_eq!(scope.resolve("Main").unwrap().origin(), Origin::Compiled);
}

#[test]
fn test_released_scope_refuses_resolution() {
    let Some(launcher) = launcher() else {
        return;
    };
    let compiled = launcher.compile("").unwrap();
    let host = HostUnits::new();
    let mut scope = LoaderScope::open(&compiled.store, &host);

    let unit = scope.resolve("Main").unwrap();
    assert!(std::sync::Arc::ptr_eq(&unit, &scope.resolve("Main").unwrap()));

    scope.close();
    scope.close();
    assert!(matches!(
        scope.resolve("Main"),
        Err(LoaderError::Closed { .. })
    ));
}

#[test]
fn test_private_directory_mode_runs() {
    let Some(launcher) = launcher_with(LauncherConfig::default().with_scratch(ScratchMode::PrivateDir))
    else {
        return;
    };
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("private.txt");

    launcher.run(&write_fragment(&out, "private"), &[]).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "private");
}

#[test]
fn test_undefined_symbol_fails_at_compile_time() {
    let Some(launcher) = launcher() else {
        return;
    };
    let outcome = launcher
        .run("extern int memrun_missing(void); return memrun_missing();", &[])
        .unwrap();

    if cfg!(target_os = "linux") {
        let Outcome::CompilationFailed(diagnostics) = outcome else {
            panic!("undefined symbol linked");
        };
        assert!(diagnostics.iter().any(Diagnostic::is_error));
    }

    // A failed link must not disturb the next compilation.
    let Outcome::Completed = launcher.run("", &[]).unwrap() else {
        panic!("empty fragment failed after a link error");
    };
}
