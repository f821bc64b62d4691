use std::path::PathBuf;

use thiserror::Error;

/// Failure of a front-end stage.
///
/// The detailed message has already gone through the diagnostic engine by
/// the time one of these is returned; the variants only say which stage
/// stopped the run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lexical error in {}", path.display())]
    Lex { path: PathBuf },
    #[error("syntax error in {}", path.display())]
    Syntax { path: PathBuf },
    #[error("cannot import '{name}': {reason}")]
    Import { name: String, reason: String },
    #[error("import cycle: {}", chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },
    #[error("pass '{pass}' aborted compilation")]
    Pass { pass: &'static str },
    #[error("library directory was not found at {0}")]
    MissingLibraryRoot(PathBuf),
}
