use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("input file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("id column '{column}' not found in {input} file. Columns: {available:?}")]
    MissingIdColumn {
        input: InputKind,
        column: String,
        available: Vec<String>,
    },
    #[error("unsupported {input} extension: '{extension}'")]
    UnsupportedExtension { input: InputKind, extension: String },
    #[error("unsupported JSON prediction structure: expected an object or an array")]
    UnsupportedJsonStructure,
    #[error("workbook has no worksheets: {0}")]
    EmptyWorkbook(PathBuf),
    #[error("failed to parse JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read or write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which side of the comparison a file belongs to, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    GroundTruth,
    Predictions,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::GroundTruth => f.write_str("ground-truth"),
            InputKind::Predictions => f.write_str("predictions"),
        }
    }
}
