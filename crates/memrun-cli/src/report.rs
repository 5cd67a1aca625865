use console::{Emoji, style};
use memrun::{Diagnostic, Severity, SourceUnit};

static CROSS: Emoji<'_, '_> = Emoji("✖ ", "");

pub fn print_diagnostics(unit: &SourceUnit, diagnostics: &[Diagnostic], pretty: bool) {
    for diagnostic in diagnostics {
        if pretty {
            println!("{:?}", diagnostic.to_report(unit));
        } else {
            println!("{}", diagnostic);
        }
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    println!(
        "{}{} compiling {}: {} error(s)",
        CROSS,
        style("failed").bold().red(),
        style(unit.file_name()).cyan(),
        errors
    );
}
