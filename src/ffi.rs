// Stable C-ABI surface over the engine.
//
// Conventions: integer return codes (0 success, -1 failure), raw pointers
// with explicit lengths, and no panic across the boundary. Field pointers
// handed out by get_field are NUL-terminated copies owned by the handle
// and stay valid until the next parse_string or parser_destroy.

use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

use crate::context::ParserContext;
use crate::packed;

/// Opaque handle behind every FFI call.
pub struct CsvParser {
    ctx: ParserContext,
    /// NUL-terminated field copies handed out by get_field.
    c_fields: Vec<Vec<u8>>,
}

/// Allocate a parser handle with the default config.
#[no_mangle]
pub extern "C" fn parser_create() -> *mut CsvParser {
    Box::into_raw(Box::new(CsvParser {
        ctx: ParserContext::new(),
        c_fields: Vec::new(),
    }))
}

/// Release a handle and everything it owns. Idempotent on null.
///
/// # Safety
/// `parser` must be null or a pointer returned by `parser_create` that has
/// not been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn parser_destroy(parser: *mut CsvParser) {
    if parser.is_null() {
        return;
    }
    drop(Box::from_raw(parser));
}

/// Parse `len` bytes at `data`. Returns 0 on success, -1 on any error.
/// A zero-length input is valid and yields zero rows.
///
/// # Safety
/// `parser` must be a live handle; `data` must point to `len` readable
/// bytes (it may be null when `len` is 0).
#[no_mangle]
pub unsafe extern "C" fn parse_string(parser: *mut CsvParser, data: *const u8, len: usize) -> i32 {
    if parser.is_null() || (data.is_null() && len != 0) {
        return -1;
    }
    let handle = &mut *parser;
    let input: &[u8] = if len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, len)
    };
    handle.c_fields.clear();
    match catch_unwind(AssertUnwindSafe(|| handle.ctx.parse(input))) {
        Ok(Ok(())) => 0,
        Ok(Err(_)) | Err(_) => -1,
    }
}

/// Number of parsed rows, or -1 on a null handle.
///
/// # Safety
/// `parser` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn get_row_count(parser: *const CsvParser) -> i32 {
    if parser.is_null() {
        return -1;
    }
    let handle = &*parser;
    i32::try_from(handle.ctx.row_count()).unwrap_or(i32::MAX)
}

/// Number of fields in row `row`, or -1 when out of range.
///
/// # Safety
/// `parser` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn get_field_count(parser: *const CsvParser, row: i32) -> i32 {
    if parser.is_null() || row < 0 {
        return -1;
    }
    let handle = &*parser;
    match handle.ctx.field_count(row as usize) {
        Some(n) => i32::try_from(n).unwrap_or(i32::MAX),
        None => -1,
    }
}

/// NUL-terminated copy of one field, or null when out of range. The
/// pointer is owned by the handle and is invalidated by the next
/// parse_string or parser_destroy.
///
/// # Safety
/// `parser` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn get_field(parser: *mut CsvParser, row: i32, field: i32) -> *const c_char {
    if parser.is_null() || row < 0 || field < 0 {
        return ptr::null();
    }
    let handle = &mut *parser;
    let Some(bytes) = handle.ctx.field(row as usize, field as usize) else {
        return ptr::null();
    };
    let mut copy = Vec::with_capacity(bytes.len() + 1);
    copy.extend_from_slice(bytes);
    copy.push(0);
    handle.c_fields.push(copy);
    match handle.c_fields.last() {
        Some(stored) => stored.as_ptr() as *const c_char,
        None => ptr::null(),
    }
}

/// Serialize the parsed rows into a packed buffer. On success writes the
/// byte count to `out_size` and returns the buffer pointer; ownership
/// transfers to the caller, who must release it with
/// `packed_buffer_destroy`. Returns null on failure.
///
/// # Safety
/// `parser` must be a live handle; `out_size` must point to a writable
/// usize.
#[no_mangle]
pub unsafe extern "C" fn rows_to_packed_buffer(
    parser: *const CsvParser,
    out_size: *mut usize,
) -> *mut u8 {
    if parser.is_null() || out_size.is_null() {
        return ptr::null_mut();
    }
    *out_size = 0;
    let handle = &*parser;
    match catch_unwind(AssertUnwindSafe(|| packed::serialize(handle.ctx.rows()))) {
        Ok(Ok(buf)) => {
            let boxed = buf.into_boxed_slice();
            *out_size = boxed.len();
            Box::into_raw(boxed) as *mut u8
        }
        Ok(Err(_)) | Err(_) => ptr::null_mut(),
    }
}

/// Release a buffer returned by `rows_to_packed_buffer`. Idempotent on
/// null.
///
/// # Safety
/// `ptr`/`size` must be exactly what `rows_to_packed_buffer` returned,
/// and the buffer must not have been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn packed_buffer_destroy(ptr: *mut u8, size: usize) {
    if ptr.is_null() {
        return;
    }
    drop(Box::from_raw(slice::from_raw_parts_mut(ptr, size)));
}
