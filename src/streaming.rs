// Streaming chunked parser for bounded-memory processing.
//
// Wraps the incremental state machine in ParserContext. Because the
// machine itself suspends cleanly inside quoted fields and after quotes,
// the only bytes ever carried between chunks are a trailing \r whose
// pairing with \n cannot be decided yet. For any split of an input into
// chunks, process_chunk calls followed by finalize produce exactly the
// rows a single parse of the concatenation would.

use tracing::trace;

use crate::context::{ParserContext, Row};
use crate::error::{ErrorRecord, ParseError};
use crate::Config;

/// Callback invoked at the point an error is detected. Return `false` to
/// request termination; honored in strict mode only.
pub type ErrorCallback = Box<dyn FnMut(&ErrorRecord) -> bool + Send>;

/// Stateful chunked CSV parser.
pub struct StreamingParser {
    ctx: ParserContext,
    /// Undecidable tail of the previous chunk (at most a trailing \r).
    carry: Vec<u8>,
    on_error: Option<ErrorCallback>,
    /// Warnings already delivered to the callback.
    delivered: usize,
    /// Set once the stream has terminated on an error.
    last_error: Option<ParseError>,
}

impl StreamingParser {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        StreamingParser {
            ctx: ParserContext::with_config(config),
            carry: Vec::new(),
            on_error: None,
            delivered: 0,
            last_error: None,
        }
    }

    /// Install the error callback. Replaces any previous one.
    pub fn set_error_callback<F>(&mut self, f: F)
    where
        F: FnMut(&ErrorRecord) -> bool + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
    }

    /// Feed one chunk. Completed rows become available immediately via
    /// `take_rows`/`complete_rows`; rows already taken are never
    /// re-delivered.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<(), ParseError> {
        if let Some(err) = self.last_error {
            return Err(err);
        }

        let advanced = if self.carry.is_empty() {
            self.ctx.advance(chunk, false).map(|consumed| {
                self.carry.extend_from_slice(&chunk[consumed..]);
            })
        } else {
            self.carry.extend_from_slice(chunk);
            let buf = std::mem::take(&mut self.carry);
            self.ctx.advance(&buf, false).map(|consumed| {
                self.carry.extend_from_slice(&buf[consumed..]);
            })
        };
        if !self.carry.is_empty() {
            trace!(bytes = self.carry.len(), "retained undecidable chunk tail");
        }

        self.deliver_errors(advanced.err())
    }

    /// End of stream: resolve any carryover, emit the last pending row,
    /// fail on an unterminated quoted field in strict mode.
    pub fn finalize(&mut self) -> Result<(), ParseError> {
        if let Some(err) = self.last_error {
            return Err(err);
        }

        let carry = std::mem::take(&mut self.carry);
        let finished = self
            .ctx
            .advance(&carry, true)
            .and_then(|_| self.ctx.finish());
        self.deliver_errors(finished.err())
    }

    /// Number of completed rows waiting to be taken.
    pub fn available_rows(&self) -> usize {
        self.ctx.row_count()
    }

    /// Completed rows not yet cleared, oldest first.
    pub fn complete_rows(&self) -> &[Row] {
        self.ctx.rows()
    }

    /// Take up to `max` completed rows, oldest first.
    pub fn take_rows(&mut self, max: usize) -> Vec<Row> {
        self.ctx.drain_rows(max)
    }

    /// Drop all completed rows without returning them.
    pub fn clear_rows(&mut self) {
        self.ctx.drain_rows(usize::MAX);
    }

    /// True when buffered input has not yet produced a complete row.
    pub fn has_partial(&self) -> bool {
        !self.carry.is_empty() || self.ctx.has_pending()
    }

    /// Bytes held awaiting the next chunk.
    pub fn buffer_size(&self) -> usize {
        self.carry.len()
    }

    /// Current 1-indexed physical line number.
    pub fn line_number(&self) -> usize {
        self.ctx.line_number()
    }

    /// Errors detected so far (recovered and fatal).
    pub fn warnings(&self) -> &[ErrorRecord] {
        self.ctx.warnings()
    }

    /// Reset between unrelated streams. The config and callback are
    /// preserved.
    pub fn reset(&mut self) {
        self.ctx.reset();
        self.carry.clear();
        self.delivered = 0;
        self.last_error = None;
    }

    /// Push warnings the context accumulated since the last call into the
    /// error callback, then resolve the overall outcome: a fatal machine
    /// error, or a strict-mode stop requested by the callback.
    fn deliver_errors(&mut self, fatal: Option<ParseError>) -> Result<(), ParseError> {
        let mut stop_at: Option<ErrorRecord> = None;
        if let Some(cb) = self.on_error.as_mut() {
            for rec in &self.ctx.warnings()[self.delivered..] {
                if !cb(rec) && stop_at.is_none() {
                    stop_at = Some(*rec);
                }
            }
        }
        self.delivered = self.ctx.warnings().len();

        if let Some(err) = fatal {
            self.last_error = Some(err);
            return Err(err);
        }
        if let Some(rec) = stop_at {
            if !self.ctx.config().relaxed {
                let err = ParseError {
                    line: rec.line,
                    column: rec.column,
                    kind: rec.kind,
                };
                self.last_error = Some(err);
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn to_strings(rows: Vec<Row>) -> Vec<Vec<String>> {
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|f| String::from_utf8_lossy(&f).to_string())
                    .collect()
            })
            .collect()
    }

    /// Stream `input` split at every possible single boundary and compare
    /// against a whole-input parse.
    fn assert_all_splits_match(input: &[u8]) {
        let mut reference = ParserContext::new();
        reference.parse(input).unwrap();
        let expected = reference.rows().to_vec();

        for split in 0..=input.len() {
            let mut parser = StreamingParser::new();
            parser.process_chunk(&input[..split]).unwrap();
            parser.process_chunk(&input[split..]).unwrap();
            parser.finalize().unwrap();
            assert_eq!(
                parser.take_rows(usize::MAX),
                expected,
                "divergence at split {split}"
            );
        }
    }

    #[test]
    fn test_chunked_rows() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"a,b,").unwrap();
        assert_eq!(parser.available_rows(), 0);
        assert!(parser.has_partial());

        parser.process_chunk(b"c\n1,2,3\n").unwrap();
        assert_eq!(parser.available_rows(), 2);

        let rows = to_strings(parser.take_rows(usize::MAX));
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_rows_not_redelivered() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"a\nb\nc\nd\n").unwrap();
        assert_eq!(parser.take_rows(2).len(), 2);
        assert_eq!(parser.take_rows(usize::MAX).len(), 2);
        assert_eq!(parser.take_rows(usize::MAX).len(), 0);
    }

    #[test]
    fn test_quoted_field_across_chunks() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"\"hello\n").unwrap();
        assert_eq!(parser.available_rows(), 0);

        parser.process_chunk(b"world\",2").unwrap();
        parser.finalize().unwrap();

        let rows = to_strings(parser.take_rows(usize::MAX));
        assert_eq!(rows, vec![vec!["hello\nworld", "2"]]);
    }

    #[test]
    fn test_in_quote_newline_not_a_terminator_on_reentry() {
        assert_all_splits_match(b"\"x\ny\nz\",1\nq,2\n");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        assert_all_splits_match(b"a,b\r\nc,d\r\n");
    }

    #[test]
    fn test_doubled_quote_split_across_chunks() {
        assert_all_splits_match(b"\"a\"\"b\",c\n");
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        assert_all_splits_match("héllo,wörld\n日本,語\n".as_bytes());
    }

    #[test]
    fn test_comment_split_across_chunks() {
        assert_all_splits_match(b"# skip me\na,b\n");
    }

    #[test]
    fn test_one_byte_chunks() {
        let input = b"\"a, b\",\"c\"\"d\"\r\n1,2\n# c\nlast,row";
        let mut reference = ParserContext::new();
        reference.parse(input).unwrap();

        let mut parser = StreamingParser::new();
        for b in input {
            parser.process_chunk(std::slice::from_ref(b)).unwrap();
        }
        parser.finalize().unwrap();
        assert_eq!(parser.take_rows(usize::MAX), reference.rows());
    }

    #[test]
    fn test_finalize_emits_pending_row() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"a,b\n1,2").unwrap();
        assert_eq!(parser.take_rows(usize::MAX).len(), 1);

        parser.finalize().unwrap();
        let rows = to_strings(parser.take_rows(usize::MAX));
        assert_eq!(rows, vec![vec!["1", "2"]]);
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_finalize_unterminated_quote_strict() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"\"open").unwrap();
        let err = parser.finalize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedQuotedField);
    }

    #[test]
    fn test_error_callback_relaxed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);

        let mut parser = StreamingParser::with_config(Config::relaxed());
        parser.set_error_callback(move |rec| {
            assert!(rec.recovered);
            seen2.fetch_add(1, Ordering::SeqCst);
            true
        });
        parser.process_chunk(b"ab\"cd\n").unwrap();
        parser.finalize().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let rows = to_strings(parser.take_rows(usize::MAX));
        assert_eq!(rows, vec![vec!["ab\"cd"]]);
    }

    #[test]
    fn test_error_callback_sees_fatal_error() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);

        let mut parser = StreamingParser::new();
        parser.set_error_callback(move |rec| {
            assert!(!rec.recovered);
            seen2.fetch_add(1, Ordering::SeqCst);
            true
        });
        let err = parser.process_chunk(b"ab\"cd\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedQuote);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // the stream stays terminated
        assert!(parser.process_chunk(b"x\n").is_err());
        assert!(parser.finalize().is_err());
    }

    #[test]
    fn test_callback_stop_terminates_strict_stream() {
        let config = Config {
            skip_lines_with_error: true,
            ..Config::default()
        };
        let mut parser = StreamingParser::with_config(config);
        parser.set_error_callback(|_| false);
        // skip_lines_with_error recovers, but the callback asked to stop
        let err = parser.process_chunk(b"x\"y\nz\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedQuote);
    }

    #[test]
    fn test_reset_between_streams() {
        let mut parser = StreamingParser::new();
        parser.process_chunk(b"\"open").unwrap();
        assert!(parser.has_partial());

        parser.reset();
        assert!(!parser.has_partial());
        parser.process_chunk(b"a,b\n").unwrap();
        parser.finalize().unwrap();
        assert_eq!(
            to_strings(parser.take_rows(usize::MAX)),
            vec![vec!["a", "b"]]
        );
    }
}
