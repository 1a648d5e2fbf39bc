// RFC 4180 state machine and the context that owns its output.
//
// The machine is written as an incremental `advance(data, eof)` pass so the
// whole-input parser and the streaming parser share one implementation. A
// call consumes as much of `data` as can be interpreted unambiguously; with
// `eof = false` an undecidable suffix (a trailing \r that may pair with a
// \n in the next chunk) is left unconsumed for the caller to carry over.
// Suspension inside a quoted field or after a quote needs no carryover:
// the state enum itself is the resumption record.

use std::borrow::Cow;

use tracing::warn;

use crate::config::Config;
use crate::core::{bulk_append_no_cr, find_any_special, find_byte};
use crate::error::{ErrorKind, ErrorRecord, ParseError};

/// Preallocated capacity of the field accumulator.
const FIELD_BUF_CAPACITY: usize = 1024;

/// One parsed record: fields in source order, raw bytes.
pub type Row = Vec<Vec<u8>>;

/// State of the machine between two input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Before the first byte of a field.
    #[default]
    FieldStart,
    /// Inside an unquoted field.
    InField,
    /// Inside a quoted field.
    InQuotedField,
    /// Saw a quote inside a quoted field; doubled quote or field close.
    QuoteInQuote,
    /// Field closed by a quote; awaiting delimiter or terminator.
    FieldEnd,
}

/// How a structural error was handled.
enum ErrAction {
    /// Relaxed mode: offending bytes become literal content.
    Recovered,
    /// skip_lines_with_error: the record is dropped, input skipped to \n.
    SkippedLine,
}

/// Owns the field accumulator, the current row, all completed rows, and the
/// machine state. Exclusive owner of every string in `rows`.
pub struct ParserContext {
    config: Config,
    state: ParseState,
    field_buf: Vec<u8>,
    row: Row,
    rows: Vec<Row>,
    warnings: Vec<ErrorRecord>,
    /// 1-indexed physical line; newlines inside quoted fields count.
    line: usize,
    /// 1-indexed column of the next byte to consume.
    column: usize,
    /// 1-indexed record number for the from_line/to_line window.
    /// Comment lines and error-skipped lines do not count.
    record_index: usize,
    /// Bytes accumulated in the current record, against max_row_size.
    row_bytes: usize,
    /// Current field began with an opening quote (exempt from trim).
    field_quoted: bool,
    /// Nothing of the current record consumed yet (comment eligibility).
    at_record_start: bool,
    /// Discarding input until the next \n (comment or error skip).
    skipping_line: bool,
    /// RowTooLarge already reported for the current record.
    row_overflow_noted: bool,
}

impl ParserContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        ParserContext {
            config,
            state: ParseState::FieldStart,
            field_buf: Vec::with_capacity(FIELD_BUF_CAPACITY),
            row: Vec::new(),
            rows: Vec::new(),
            warnings: Vec::new(),
            line: 1,
            column: 1,
            record_index: 0,
            row_bytes: 0,
            field_quoted: false,
            at_record_start: true,
            skipping_line: false,
            row_overflow_noted: false,
        }
    }

    /// Parse `data` in one call. Prior rows and warnings are released
    /// first. Returns the first error in strict mode; relaxed mode
    /// recovers and records warnings instead.
    pub fn parse(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.reset();
        let consumed = self.advance(data, true)?;
        debug_assert_eq!(consumed, data.len());
        self.finish()
    }

    /// Drop all parse output and return to the initial state. The config
    /// is preserved.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.row.clear();
        self.field_buf.clear();
        self.warnings.clear();
        self.state = ParseState::FieldStart;
        self.line = 1;
        self.column = 1;
        self.record_index = 0;
        self.row_bytes = 0;
        self.field_quoted = false;
        self.at_record_start = true;
        self.skipping_line = false;
        self.row_overflow_noted = false;
    }

    // -----------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of fields in row `row`, or None when out of range.
    pub fn field_count(&self, row: usize) -> Option<usize> {
        self.rows.get(row).map(|r| r.len())
    }

    /// Raw bytes of one field. The slice is invalidated by the next
    /// `parse` or by dropping the context.
    pub fn field(&self, row: usize, field: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(field).map(|f| f.as_slice())
    }

    /// Lossy UTF-8 view of one field.
    pub fn field_str(&self, row: usize, field: usize) -> Option<Cow<'_, str>> {
        self.field(row, field).map(String::from_utf8_lossy)
    }

    /// Current 1-indexed physical line number.
    pub fn line_number(&self) -> usize {
        self.line
    }

    /// Errors recovered (or noted before aborting) during the last parse.
    pub fn warnings(&self) -> &[ErrorRecord] {
        &self.warnings
    }

    /// Drain up to `max` completed rows, front first.
    pub(crate) fn drain_rows(&mut self, max: usize) -> Vec<Row> {
        let n = max.min(self.rows.len());
        self.rows.drain(..n).collect()
    }

    /// True when a field or row is mid-accumulation.
    pub(crate) fn has_pending(&self) -> bool {
        self.state != ParseState::FieldStart || !self.row.is_empty() || !self.field_buf.is_empty()
    }

    // -----------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------

    /// Run the machine over `data`, returning the number of bytes
    /// consumed. With `eof = false` a trailing \r outside quoted content
    /// is held back; everything else is always consumed.
    pub(crate) fn advance(&mut self, data: &[u8], eof: bool) -> Result<usize, ParseError> {
        let len = data.len();
        let delim = self.config.delimiter;
        let quote = self.config.quote;
        let mut pos = 0;

        while pos < len {
            if self.skipping_line {
                match find_byte(data, b'\n', pos) {
                    Some(nl) => {
                        pos = nl + 1;
                        self.new_line();
                        self.skipping_line = false;
                        self.at_record_start = true;
                    }
                    None => {
                        self.column += len - pos;
                        pos = len;
                    }
                }
                continue;
            }

            match self.state {
                ParseState::FieldStart => {
                    let b = data[pos];
                    if self.at_record_start && self.config.comment != 0 && b == self.config.comment
                    {
                        self.skipping_line = true;
                        self.column += 1;
                        pos += 1;
                    } else if b == quote {
                        self.state = ParseState::InQuotedField;
                        self.field_quoted = true;
                        self.at_record_start = false;
                        self.column += 1;
                        pos += 1;
                    } else if b == delim {
                        self.emit_field();
                        self.at_record_start = false;
                        self.column += 1;
                        pos += 1;
                    } else if b == b'\n' {
                        self.emit_field();
                        self.emit_row();
                        pos += 1;
                        self.new_line();
                    } else if b == b'\r' {
                        if pos + 1 < len {
                            self.emit_field();
                            self.emit_row();
                            pos += if data[pos + 1] == b'\n' { 2 } else { 1 };
                            self.new_line();
                        } else if eof {
                            self.emit_field();
                            self.emit_row();
                            pos += 1;
                            self.new_line();
                        } else {
                            // \r may pair with a \n in the next chunk
                            break;
                        }
                    } else {
                        self.state = ParseState::InField;
                        self.at_record_start = false;
                        // byte handled by the InField fast path
                    }
                }

                ParseState::InField => match find_any_special(data, delim, quote, pos) {
                    None => {
                        self.append_unquoted(data, pos, len)?;
                        self.column += len - pos;
                        pos = len;
                    }
                    Some((idx, b)) => {
                        self.append_unquoted(data, pos, idx)?;
                        self.column += idx - pos;
                        pos = idx;
                        if b == delim {
                            self.emit_field();
                            self.state = ParseState::FieldStart;
                            self.column += 1;
                            pos += 1;
                        } else if b == b'\n' {
                            self.emit_field();
                            self.emit_row();
                            pos += 1;
                            self.new_line();
                        } else {
                            match self.structural_error(ErrorKind::UnexpectedQuote)? {
                                ErrAction::Recovered => {
                                    self.push_field_byte(quote)?;
                                }
                                ErrAction::SkippedLine => {}
                            }
                            self.column += 1;
                            pos += 1;
                        }
                    }
                },

                ParseState::InQuotedField => match find_byte(data, quote, pos) {
                    None => {
                        self.append_quoted(data, pos, len)?;
                        self.track_quoted_lines(data, pos, len);
                        pos = len;
                    }
                    Some(idx) => {
                        self.append_quoted(data, pos, idx)?;
                        self.track_quoted_lines(data, pos, idx);
                        self.state = ParseState::QuoteInQuote;
                        self.column += 1;
                        pos = idx + 1;
                    }
                },

                ParseState::QuoteInQuote => {
                    if data[pos] == quote {
                        // doubled quote collapses to one literal quote
                        self.push_field_byte(quote)?;
                        self.state = ParseState::InQuotedField;
                        self.column += 1;
                        pos += 1;
                    } else {
                        // the previous quote closed the field
                        self.state = ParseState::FieldEnd;
                    }
                }

                ParseState::FieldEnd => {
                    let b = data[pos];
                    if b == delim {
                        self.emit_field();
                        self.state = ParseState::FieldStart;
                        self.column += 1;
                        pos += 1;
                    } else if b == b'\n' {
                        self.emit_field();
                        self.emit_row();
                        pos += 1;
                        self.new_line();
                    } else if b == b'\r' && pos + 1 < len && data[pos + 1] == b'\n' {
                        self.emit_field();
                        self.emit_row();
                        pos += 2;
                        self.new_line();
                    } else if b == b'\r' && pos + 1 == len && !eof {
                        // \r may pair with a \n in the next chunk
                        break;
                    } else if b.is_ascii_whitespace() && b != b'\r' && self.config.relaxed {
                        // relaxed: gap between closing quote and delimiter
                        self.column += 1;
                        pos += 1;
                    } else {
                        match self.structural_error(ErrorKind::StrayDataAfterQuote)? {
                            ErrAction::Recovered => {
                                self.push_field_byte(b)?;
                                self.state = ParseState::InField;
                            }
                            ErrAction::SkippedLine => {}
                        }
                        self.column += 1;
                        pos += 1;
                    }
                }
            }
        }

        Ok(pos)
    }

    /// End-of-input handling: finalize any pending field and row.
    pub(crate) fn finish(&mut self) -> Result<(), ParseError> {
        if self.skipping_line {
            self.skipping_line = false;
            self.at_record_start = true;
            self.state = ParseState::FieldStart;
            return Ok(());
        }
        match self.state {
            ParseState::FieldStart => {
                // "a," then end of input: the record has a pending empty field
                if !self.row.is_empty() {
                    self.emit_field();
                    self.emit_row();
                }
            }
            ParseState::InField => {
                self.emit_field();
                self.emit_row();
            }
            ParseState::InQuotedField => {
                match self.structural_error(ErrorKind::UnterminatedQuotedField)? {
                    ErrAction::Recovered => {
                        self.emit_field();
                        self.emit_row();
                    }
                    ErrAction::SkippedLine => {
                        self.skipping_line = false;
                        self.at_record_start = true;
                    }
                }
            }
            ParseState::QuoteInQuote | ParseState::FieldEnd => {
                // closing quote at end of input
                self.emit_field();
                self.emit_row();
            }
        }
        self.state = ParseState::FieldStart;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------

    fn emit_field(&mut self) {
        let mut start = 0;
        let mut end = self.field_buf.len();
        if self.config.trim && !self.field_quoted {
            while start < end && self.field_buf[start].is_ascii_whitespace() {
                start += 1;
            }
            while end > start && self.field_buf[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
        }
        self.row.push(self.field_buf[start..end].to_vec());
        self.field_buf.clear();
        self.field_quoted = false;
    }

    fn emit_row(&mut self) {
        let row = std::mem::take(&mut self.row);
        self.row_bytes = 0;
        self.row_overflow_noted = false;
        self.at_record_start = true;
        self.state = ParseState::FieldStart;
        self.record_index += 1;
        if self.config.skip_empty_lines && row.len() == 1 && row[0].is_empty() {
            return;
        }
        if !self.config.record_in_window(self.record_index) {
            return;
        }
        self.rows.push(row);
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    // -----------------------------------------------------------------
    // Accumulator
    // -----------------------------------------------------------------

    /// Unquoted content: bulk copy with \r filtered out.
    fn append_unquoted(&mut self, src: &[u8], start: usize, end: usize) -> Result<(), ParseError> {
        let before = self.field_buf.len();
        bulk_append_no_cr(&mut self.field_buf, src, start, end);
        self.row_bytes += self.field_buf.len() - before;
        self.check_row_size()
    }

    /// Quoted content: every byte preserved, \r included.
    fn append_quoted(&mut self, src: &[u8], start: usize, end: usize) -> Result<(), ParseError> {
        self.field_buf.extend_from_slice(&src[start..end]);
        self.row_bytes += end - start;
        self.check_row_size()
    }

    fn push_field_byte(&mut self, b: u8) -> Result<(), ParseError> {
        self.field_buf.push(b);
        self.row_bytes += 1;
        self.check_row_size()
    }

    /// Line/column bookkeeping for a quoted segment that may contain
    /// newlines.
    fn track_quoted_lines(&mut self, data: &[u8], start: usize, end: usize) {
        let mut pos = start;
        let mut last_nl = None;
        while let Some(nl) = find_byte(&data[..end], b'\n', pos) {
            self.line += 1;
            last_nl = Some(nl);
            pos = nl + 1;
        }
        match last_nl {
            Some(nl) => self.column = end - nl,
            None => self.column += end - start,
        }
    }

    fn check_row_size(&mut self) -> Result<(), ParseError> {
        if self.row_bytes > self.config.max_row_size && !self.row_overflow_noted {
            match self.structural_error(ErrorKind::RowTooLarge)? {
                ErrAction::Recovered => self.row_overflow_noted = true,
                ErrAction::SkippedLine => {}
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Error dispatch
    // -----------------------------------------------------------------

    /// Route a structural error: relaxed recovers in place,
    /// skip_lines_with_error drops the record, strict aborts.
    fn structural_error(&mut self, kind: ErrorKind) -> Result<ErrAction, ParseError> {
        let err = ParseError {
            line: self.line,
            column: self.column,
            kind,
        };
        if self.config.relaxed {
            self.warnings.push(ErrorRecord::recovered(err));
            warn!(line = err.line, column = err.column, kind = %err.kind, "recovered parse error");
            Ok(ErrAction::Recovered)
        } else if self.config.skip_lines_with_error {
            self.warnings.push(ErrorRecord::recovered(err));
            warn!(line = err.line, column = err.column, kind = %err.kind, "dropped record after parse error");
            self.begin_line_skip();
            Ok(ErrAction::SkippedLine)
        } else {
            self.warnings.push(ErrorRecord::fatal(err));
            Err(err)
        }
    }

    fn begin_line_skip(&mut self) {
        self.field_buf.clear();
        self.row.clear();
        self.row_bytes = 0;
        self.row_overflow_noted = false;
        self.field_quoted = false;
        self.state = ParseState::FieldStart;
        self.skipping_line = true;
    }
}

impl Default for ParserContext {
    fn default() -> Self {
        Self::new()
    }
}
