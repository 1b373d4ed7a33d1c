use miette::SourceSpan;

/// Convert a byte offset into a 1-based `(line, column)` pair.
///
/// Offsets past the end of `src` are clamped.
pub fn byte_offset_to_line_col(src: &str, offset: usize) -> (usize, usize) {
    let clamped_offset = offset.min(src.len());

    let newline_count = src.as_bytes()[..clamped_offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count();
    let line = newline_count + 1;

    let last_nl = src.as_bytes()[..clamped_offset]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let column = clamped_offset - last_nl + 1; // 1-based

    (line, column)
}

/// Span from `offset` up to (not including) the end of its line.
pub fn span_to_line_end(src: &str, offset: usize) -> SourceSpan {
    let offset = offset.min(src.len());
    let end = src.as_bytes()[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| offset + i)
        .unwrap_or(src.len());
    SourceSpan::from(offset..end)
}

/// Smallest span covering both `start` and `end`.
pub fn join(start: SourceSpan, end: SourceSpan) -> SourceSpan {
    let from = start.offset().min(end.offset());
    let to = (start.offset() + start.len()).max(end.offset() + end.len());
    SourceSpan::from(from..to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let src = "a = 1\nprint(a)\n";
        assert_eq!(byte_offset_to_line_col(src, 0), (1, 1));
        assert_eq!(byte_offset_to_line_col(src, 4), (1, 5));
        assert_eq!(byte_offset_to_line_col(src, 6), (2, 1));
        assert_eq!(byte_offset_to_line_col(src, 12), (2, 7));
    }

    #[test]
    fn line_col_clamps_past_end() {
        assert_eq!(byte_offset_to_line_col("ab", 99), (1, 3));
    }

    #[test]
    fn span_to_line_end_stops_at_newline() {
        let span = span_to_line_end("x = 'abc\ny", 4);
        assert_eq!(span.offset(), 4);
        assert_eq!(span.len(), 4);
    }

    #[test]
    fn join_covers_both() {
        let span = join(SourceSpan::from(2..4), SourceSpan::from(7..9));
        assert_eq!(span.offset(), 2);
        assert_eq!(span.len(), 7);
    }
}
