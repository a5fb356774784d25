//! Source text handling: a forward byte cursor with one-position lookahead
//! and byte spans that can recover their surrounding line for diagnostics.

use std::fmt;
use std::ops;

/// Sentinel returned by the cursor past the end of the source.
pub const EOF_BYTE: u8 = 0;

/// A half-open byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// Zero-width span at a single offset.
    pub fn point(at: u32) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice the spanned fragment out of the source.
    pub fn fragment<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start as usize..self.end as usize]
    }

    /// The line containing the start of this span, without its trailing
    /// newline, together with the 1-based line number and the column of
    /// the span start within that line.
    pub fn surrounding_line<'a>(&self, text: &'a str) -> (&'a str, u32, u32) {
        let start = self.start as usize;
        let start = start.min(text.len());

        let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = text[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(text.len());

        let line_no = text[..line_start].matches('\n').count() as u32 + 1;
        let column = (start - line_start) as u32;

        (&text[line_start..line_end], line_no, column)
    }
}

impl ops::Add for Span {
    type Output = Span;

    fn add(self, rhs: Self) -> Self::Output {
        let start = u32::min(self.start, rhs.start);
        let end = u32::max(self.end, rhs.end);
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Sequential reader over the source bytes. The language is ASCII, so the
/// lexer works on raw bytes; offsets are byte offsets.
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    /// Absolute byte offset of the current position.
    pub fn offset(&self) -> u32 {
        self.pos as u32
    }

    /// Byte at the current position, or [`EOF_BYTE`] at the end.
    pub fn current(&self) -> u8 {
        self.src.as_bytes().get(self.pos).copied().unwrap_or(EOF_BYTE)
    }

    /// Byte one position ahead, without consuming anything.
    pub fn peek(&self) -> u8 {
        self.src
            .as_bytes()
            .get(self.pos + 1)
            .copied()
            .unwrap_or(EOF_BYTE)
    }

    /// Advance one byte.
    pub fn bump(&mut self) {
        if self.pos < self.src.len() {
            self.pos += 1;
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_fragment() {
        const CODE: &str = "x = 10;";
        assert_eq!(Span::new(0, 1).fragment(CODE), "x");
        assert_eq!(Span::new(4, 6).fragment(CODE), "10");
    }

    #[test]
    fn span_surrounding_line() {
        const CODE: &str = "first\nsecond line\nthird";
        let span = Span::new(13, 17); // "line"
        assert_eq!(span.fragment(CODE), "line");

        let (line, line_no, column) = span.surrounding_line(CODE);
        assert_eq!(line, "second line");
        assert_eq!(line_no, 2);
        assert_eq!(column, 7);
    }

    #[test]
    fn span_surrounding_line_single_line() {
        const CODE: &str = "abc def";
        let (line, line_no, column) = Span::new(4, 7).surrounding_line(CODE);
        assert_eq!(line, "abc def");
        assert_eq!(line_no, 1);
        assert_eq!(column, 4);
    }

    #[test]
    fn cursor_walk() {
        let mut cursor = Cursor::new("ab");
        assert_eq!(cursor.current(), b'a');
        assert_eq!(cursor.peek(), b'b');
        cursor.bump();
        assert_eq!(cursor.current(), b'b');
        assert_eq!(cursor.peek(), EOF_BYTE);
        cursor.bump();
        assert!(cursor.at_end());
        assert_eq!(cursor.current(), EOF_BYTE);
    }
}
