// Byte scanner: structural-byte search and \r-filtered bulk copy.
//
// The scalar implementations here are the behavioral reference and are
// always compiled. With the `simd` feature, the vectorized variants in
// simd_scanner take over for inputs longer than one vector; the state
// machine must produce byte-identical rows either way.

/// First index `>= start` where `data[i] == target`.
#[inline]
pub fn find_byte(data: &[u8], target: u8, start: usize) -> Option<usize> {
    #[cfg(feature = "simd")]
    {
        super::simd_scanner::find_byte_simd(data, target, start)
    }
    #[cfg(not(feature = "simd"))]
    {
        find_byte_scalar(data, target, start)
    }
}

/// First index `>= start` holding the delimiter, the quote, or `\n`,
/// together with the byte that matched.
#[inline]
pub fn find_any_special(data: &[u8], delim: u8, quote: u8, start: usize) -> Option<(usize, u8)> {
    #[cfg(feature = "simd")]
    {
        super::simd_scanner::find_any_special_simd(data, delim, quote, start)
    }
    #[cfg(not(feature = "simd"))]
    {
        find_any_special_scalar(data, delim, quote, start)
    }
}

/// Append `src[start..end]` to `dest`, dropping every `\r`.
///
/// One `find_byte` scan detects whether the range is clean; the common
/// clean case is a single contiguous copy. This is the unquoted-field
/// fast path, so CRLF terminators never need special casing mid-field.
pub fn bulk_append_no_cr(dest: &mut Vec<u8>, src: &[u8], start: usize, end: usize) {
    if start >= end {
        return;
    }
    let src = &src[..end];
    let mut pos = start;
    while let Some(cr) = find_byte(src, b'\r', pos) {
        dest.extend_from_slice(&src[pos..cr]);
        pos = cr + 1;
    }
    dest.extend_from_slice(&src[pos..]);
}

/// Scalar `find_byte`. Correct on any architecture; also the tail handler
/// for the vectorized paths.
#[inline]
pub fn find_byte_scalar(data: &[u8], target: u8, start: usize) -> Option<usize> {
    if start >= data.len() {
        return None;
    }
    data[start..]
        .iter()
        .position(|&b| b == target)
        .map(|i| start + i)
}

/// Scalar three-way search for {delim, quote, `\n`}.
#[inline]
pub fn find_any_special_scalar(
    data: &[u8],
    delim: u8,
    quote: u8,
    start: usize,
) -> Option<(usize, u8)> {
    if start >= data.len() {
        return None;
    }
    data[start..]
        .iter()
        .position(|&b| b == delim || b == quote || b == b'\n')
        .map(|i| (start + i, data[start + i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_byte_basic() {
        assert_eq!(find_byte(b"a,b,c", b',', 0), Some(1));
        assert_eq!(find_byte(b"a,b,c", b',', 2), Some(3));
        assert_eq!(find_byte(b"a,b,c", b',', 4), None);
        assert_eq!(find_byte(b"abc", b'x', 0), None);
        assert_eq!(find_byte(b"", b',', 0), None);
    }

    #[test]
    fn test_find_byte_start_past_end() {
        assert_eq!(find_byte(b"abc", b'a', 3), None);
        assert_eq!(find_byte(b"abc", b'a', 100), None);
    }

    #[test]
    fn test_find_byte_long_input() {
        // Long enough to exercise the vectorized path when built with it.
        let mut data = vec![b'x'; 100];
        data[71] = b',';
        assert_eq!(find_byte(&data, b',', 0), Some(71));
        assert_eq!(find_byte(&data, b',', 72), None);
    }

    #[test]
    fn test_find_any_special() {
        assert_eq!(find_any_special(b"ab,cd", b',', b'"', 0), Some((2, b',')));
        assert_eq!(find_any_special(b"ab\"cd", b',', b'"', 0), Some((2, b'"')));
        assert_eq!(find_any_special(b"ab\ncd", b',', b'"', 0), Some((2, b'\n')));
        assert_eq!(find_any_special(b"abcd", b',', b'"', 0), None);
    }

    #[test]
    fn test_find_any_special_reports_first() {
        // Quote before delimiter: the earlier byte wins.
        assert_eq!(find_any_special(b"a\"b,c", b',', b'"', 0), Some((1, b'"')));
        assert_eq!(find_any_special(b"a\"b,c", b',', b'"', 2), Some((3, b',')));
    }

    #[test]
    fn test_bulk_append_clean_range() {
        let mut dest = Vec::new();
        bulk_append_no_cr(&mut dest, b"hello,world", 0, 5);
        assert_eq!(dest, b"hello");
    }

    #[test]
    fn test_bulk_append_filters_cr() {
        let mut dest = Vec::new();
        bulk_append_no_cr(&mut dest, b"a\rb\rc", 0, 5);
        assert_eq!(dest, b"abc");

        // \r at the edges of the range
        let mut dest = Vec::new();
        bulk_append_no_cr(&mut dest, b"\rab\r", 0, 4);
        assert_eq!(dest, b"ab");
    }

    #[test]
    fn test_bulk_append_ignores_cr_outside_range() {
        let mut dest = Vec::new();
        bulk_append_no_cr(&mut dest, b"ab\rcd", 0, 2);
        assert_eq!(dest, b"ab");
    }

    #[test]
    fn test_bulk_append_empty_and_degenerate() {
        let mut dest = Vec::new();
        bulk_append_no_cr(&mut dest, b"abc", 1, 1);
        bulk_append_no_cr(&mut dest, b"abc", 2, 1);
        assert!(dest.is_empty());
    }

    #[test]
    fn test_bulk_append_appends() {
        let mut dest = b"pre".to_vec();
        bulk_append_no_cr(&mut dest, b"fix", 0, 3);
        assert_eq!(dest, b"prefix");
    }
}
