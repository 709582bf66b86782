use bstr::{BStr, ByteSlice};
use std::iter::Peekable;

/// Small line-oriented parser used by the patch normalizer and the series
/// store. Operates on byte-string lines so it never needs to assume UTF-8
/// up front (patch bodies can carry arbitrary bytes).
pub struct SimpleParser<'a> {
    lines: Peekable<bstr::Lines<'a>>,
    line_number: usize,
}
impl<'a> SimpleParser<'a> {
    pub fn new(s: &'a BStr) -> Self {
        SimpleParser {
            lines: s.lines().peekable(),
            line_number: 1,
        }
    }
    #[inline]
    pub fn line_number(&self) -> usize {
        self.line_number
    }
    #[inline]
    pub fn peek(&mut self) -> Result<&'a BStr, UnexpectedEof> {
        match self.lines.peek() {
            Some(&line) => Ok(BStr::new(line)),
            None => Err(UnexpectedEof),
        }
    }
    #[inline]
    pub fn pop(&mut self) -> Result<&'a BStr, UnexpectedEof> {
        let line = self.lines.next().ok_or(UnexpectedEof)?;
        self.line_number += 1;
        Ok(BStr::new(line))
    }
    pub fn take_while(
        &mut self,
        mut matcher: impl FnMut(&BStr) -> bool,
        mut handler: impl FnMut(&BStr),
    ) {
        while let Ok(line) = self.peek() {
            if matcher(line) {
                handler(self.pop().unwrap());
            } else {
                break;
            }
        }
    }
    pub fn skip_while<P: FnMut(&BStr) -> bool>(&mut self, matcher: P) {
        self.take_while(matcher, |_| {});
    }
    pub fn skip_whitespace(&mut self) {
        self.skip_while(|line| line.chars().all(|c| c.is_whitespace()));
    }
    pub fn take_until(
        &mut self,
        mut matcher: impl FnMut(&BStr) -> bool,
        mut handler: impl FnMut(&BStr),
    ) -> Result<&'a BStr, UnexpectedEof> {
        loop {
            let line = self.pop()?;
            if matcher(line) {
                return Ok(line);
            } else {
                handler(line);
            }
        }
    }
    /// Drain the remaining lines, newest-last.
    pub fn rest(&mut self) -> Vec<&'a BStr> {
        let mut out = Vec::new();
        while let Ok(line) = self.pop() {
            out.push(line);
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unexpected EOF")]
pub struct UnexpectedEof;
