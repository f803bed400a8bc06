//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("config error on line {line}: {message}\n{snippet}")]
    Parse {
        line: usize,
        message: String,
        snippet: String,
    },

    #[error("table \"{0}\": {1}")]
    Table(String, String),

    #[error("relation id {0} is used by more than one table")]
    DuplicateRelation(u32),

    #[error("no workers configured")]
    NoWorkers,
}

impl Error {
    /// Build a parse error pointing at the offending line of the source file.
    pub fn config(source: &str, err: toml::de::Error) -> Self {
        let offset = err.span().map(|span| span.start).unwrap_or_default();
        let line = source[..offset.min(source.len())]
            .chars()
            .filter(|c| *c == '\n')
            .count();
        let snippet = source.lines().nth(line).unwrap_or_default().to_string();

        Self::Parse {
            line: line + 1,
            message: err.message().to_string(),
            snippet,
        }
    }

    pub fn table(name: &str, message: impl ToString) -> Self {
        Self::Table(name.to_string(), message.to_string())
    }
}
