//! Console input for `read`, `readln`, `eof` and `eoln`.
//!
//! Reading is byte-oriented over a buffered reader. Once a read finds no
//! more data the end-of-file flag stays set.

use std::io::{self, BufRead};

pub(crate) struct Input<'a> {
    reader: Box<dyn BufRead + 'a>,
    eof: bool,
}

impl<'a> Input<'a> {
    pub(crate) fn new(reader: Box<dyn BufRead + 'a>) -> Self {
        Self { reader, eof: false }
    }

    /// Next byte without consuming it.
    pub(crate) fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.eof {
            return Ok(None);
        }
        let next = self.reader.fill_buf()?.first().copied();
        if next.is_none() {
            self.eof = true;
        }
        Ok(next)
    }

    pub(crate) fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let next = self.peek()?;
        if next.is_some() {
            self.reader.consume(1);
        }
        Ok(next)
    }

    pub(crate) fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.peek()?.is_none())
    }

    pub(crate) fn at_eoln(&mut self) -> io::Result<bool> {
        Ok(matches!(self.peek()?, None | Some(b'\n')))
    }

    pub(crate) fn skip_whitespace(&mut self) -> io::Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.reader.consume(1);
        }
        Ok(())
    }

    /// Consume through the next newline.
    pub(crate) fn skip_line(&mut self) -> io::Result<()> {
        while let Some(b) = self.next_byte()? {
            if b == b'\n' {
                break;
            }
        }
        Ok(())
    }

    /// Leading whitespace, then an optionally signed number. Returns the
    /// text scanned, which is empty if no digit was found.
    pub(crate) fn scan_number(&mut self, real: bool) -> io::Result<String> {
        self.skip_whitespace()?;
        let mut text = String::new();
        if let Some(sign @ (b'+' | b'-')) = self.peek()? {
            text.push(char::from(sign));
            self.reader.consume(1);
        }
        let digits_from = text.len();
        self.scan_digits(&mut text)?;
        if text.len() == digits_from {
            return Ok(String::new());
        }
        if !real {
            return Ok(text);
        }
        if self.peek()? == Some(b'.') {
            text.push('.');
            self.reader.consume(1);
            self.scan_digits(&mut text)?;
        }
        if let Some(e @ (b'e' | b'E')) = self.peek()? {
            text.push(char::from(e));
            self.reader.consume(1);
            if let Some(sign @ (b'+' | b'-')) = self.peek()? {
                text.push(char::from(sign));
                self.reader.consume(1);
            }
            self.scan_digits(&mut text)?;
        }
        Ok(text)
    }

    fn scan_digits(&mut self, text: &mut String) -> io::Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_digit() {
                break;
            }
            text.push(char::from(b));
            self.reader.consume(1);
        }
        Ok(())
    }
}
