#![cfg_attr(feature = "simd", feature(portable_simd))]
// rapidcsv - RFC 4180 CSV engine with a SIMD byte scanner, a streaming
// chunked parser, and a packed binary interchange format for zero-copy
// cross-language transfer.
//
// FFI safety: no unwrap/expect in production code. Fallible paths use
// Result + early return.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//
// Layers:
//   core:      byte scanner (find_byte / find_any_special / bulk_append_no_cr)
//   context:   RFC 4180 state machine + ParserContext owning all output
//   streaming: chunked parser carrying state across chunk boundaries
//   packed:    binary interchange buffer (magic, row offsets, u16-prefixed fields)
//   ffi:       stable C-ABI exports

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod ffi;
pub mod packed;
pub mod streaming;

pub use config::Config;
pub use context::{ParseState, ParserContext, Row};
pub use error::{CodecError, ErrorKind, ErrorRecord, ParseError};
pub use packed::PackedReader;
pub use streaming::StreamingParser;

// Optional mimalloc global allocator; off by default so embedders keep
// their own allocator.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
