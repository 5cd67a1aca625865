use std::fs;
use std::path::Path;

use tracing::{debug, instrument};

use crate::error::ConfigError;
use crate::source::SourceUnit;

const BUNDLED: &str = include_str!("../templates/Main.c.template");

/// A parsed skeleton: the text before and after its single `%s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    unit_name: String,
    prefix: String,
    suffix: String,
}

impl Skeleton {
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::bundled_for("Main")
    }

    /// The bundled skeleton, compiled as `unit_name`.
    pub fn bundled_for(unit_name: &str) -> Result<Self, ConfigError> {
        Self::parse(unit_name, BUNDLED)
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path(unit_name: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let template = fs::read_to_string(path).map_err(|source| ConfigError::TemplateUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(bytes = template.len(), "Loaded template");
        Self::parse(unit_name, &template)
    }

    pub fn parse(unit_name: &str, template: &str) -> Result<Self, ConfigError> {
        let mut prefix = String::with_capacity(template.len());
        let mut suffix = String::new();
        let mut placeholders = 0;

        let mut chars = template.char_indices();
        while let Some((offset, ch)) = chars.next() {
            let out = if placeholders == 0 { &mut prefix } else { &mut suffix };
            if ch != '%' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some((_, '%')) => out.push('%'),
                Some((_, 's')) => placeholders += 1,
                Some((_, found)) => return Err(ConfigError::MalformedTemplate { found, offset }),
                None => return Err(ConfigError::MalformedTemplate { found: ' ', offset }),
            }
        }

        if placeholders != 1 {
            return Err(ConfigError::PlaceholderCount {
                found: placeholders,
            });
        }

        Ok(Self {
            unit_name: unit_name.to_string(),
            prefix,
            suffix,
        })
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Splices the fragment in verbatim; nothing is escaped.
    #[instrument(skip_all, fields(unit = %self.unit_name, fragment_len = statements.len()))]
    pub fn expand(&self, statements: &str) -> SourceUnit {
        let mut text =
            String::with_capacity(self.prefix.len() + statements.len() + self.suffix.len());
        text.push_str(&self.prefix);
        text.push_str(statements);
        text.push_str(&self.suffix);
        SourceUnit::new(self.unit_name.clone(), text)
    }
}
