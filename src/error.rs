// Error types for parsing and the packed buffer codec.

use thiserror::Error;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("input ended inside a quoted field")]
    UnterminatedQuotedField,

    #[error("data after closing quote")]
    StrayDataAfterQuote,

    #[error("quote character inside unquoted field")]
    UnexpectedQuote,

    #[error("record exceeds max_row_size")]
    RowTooLarge,

    #[error("allocation failed")]
    OutOfMemory,
}

/// A structural parse error with its source position.
///
/// `line` is the 1-indexed physical line (newlines inside quoted fields
/// count); `column` is the 1-indexed byte offset within that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ErrorKind,
}

/// A detected error, recovered or not.
///
/// In relaxed mode these accumulate in the parser's warnings list; the
/// streaming parser also hands each one to the error callback at the point
/// of detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    pub line: usize,
    pub column: usize,
    pub kind: ErrorKind,
    pub recovered: bool,
}

impl ErrorRecord {
    pub(crate) fn recovered(err: ParseError) -> Self {
        ErrorRecord {
            line: err.line,
            column: err.column,
            kind: err.kind,
            recovered: true,
        }
    }

    pub(crate) fn fatal(err: ParseError) -> Self {
        ErrorRecord {
            line: err.line,
            column: err.column,
            kind: err.kind,
            recovered: false,
        }
    }
}

/// Errors from the packed buffer codec. Always fatal to the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("field {field} of row {row} is {len} bytes, exceeds u16 length prefix")]
    FieldTooLong { row: usize, field: usize, len: usize },

    #[error("row {row} has {found} fields, expected {expected}")]
    InconsistentFieldCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("malformed packed buffer: {0}")]
    MalformedBuffer(&'static str),

    #[error("packed buffer of {0} bytes cannot be indexed with u32 row offsets")]
    BufferTooLarge(u64),

    #[error("allocation failed")]
    OutOfMemory,
}
