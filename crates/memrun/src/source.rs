use miette::{NamedSource, SourceSpan};
use std::sync::Arc;

pub type MietteSource = Arc<NamedSource<Arc<String>>>;

pub const SOURCE_EXTENSION: &str = "c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Source,
    Output,
}

impl UnitKind {
    pub fn extension(self) -> &'static str {
        match self {
            UnitKind::Source => SOURCE_EXTENSION,
            UnitKind::Output => std::env::consts::DLL_EXTENSION,
        }
    }
}

/// Synthesized source text handed to the toolchain as its only input.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    name: String,
    text: Arc<String>,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Arc::new(text.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UnitKind {
        UnitKind::Source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `Main` -> `Main.c`; the name diagnostics refer to.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind().extension())
    }

    pub fn named_source(&self) -> MietteSource {
        Arc::new(NamedSource::new(self.file_name(), Arc::clone(&self.text)))
    }

    /// Byte span of a 1-based line/column position. A missing column covers the whole line.
    pub fn span_of(&self, line: usize, column: Option<usize>) -> Option<SourceSpan> {
        let mut offset = 0;
        for (index, text) in self.text.split_inclusive('\n').enumerate() {
            if index + 1 == line {
                let content = text.trim_end_matches(['\n', '\r']);
                return Some(match column {
                    Some(column) => {
                        let start = column.saturating_sub(1).min(content.len());
                        SourceSpan::new((offset + start).into(), 1.min(content.len() - start))
                    }
                    None => SourceSpan::new(offset.into(), content.len()),
                });
            }
            offset += text.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_uses_source_extension() {
        let unit = SourceUnit::new("Main", "int x;");
        assert_eq!(unit.file_name(), "Main.c");
        assert_eq!(unit.kind(), UnitKind::Source);
        assert_eq!(unit.named_source().name(), "Main.c");
    }

    #[test]
    fn test_span_of_line_and_column() {
        let unit = SourceUnit::new("Main", "int a;\nint bc = ;\n");

        let span = unit.span_of(2, Some(5)).unwrap();
        assert_eq!(span.offset(), 11);
        assert_eq!(span.len(), 1);

        let line = unit.span_of(2, None).unwrap();
        assert_eq!(line.offset(), 7);
        assert_eq!(line.len(), 10);

        assert!(unit.span_of(9, None).is_none());
    }
}
