//! Incremental splitter for a top-level JSON array.
//!
//! Yields the raw bytes of each array element without parsing them, so a
//! malformed element can be reported on its own while the scan continues.
//! Only the array structure itself (brackets, braces, strings, separators)
//! is tracked here; damage to that structure is a stream error.

use crate::error::MigrationError;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    First,
    AfterElement,
    Done,
}

pub struct ArrayScanner<R> {
    reader: R,
    state: State,
    offset: u64,
}

impl<R: BufRead> ArrayScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            offset: 0,
        }
    }

    /// Bytes of the decoded stream consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next element of the array, or `None` after the closing `]`.
    pub fn next_element(&mut self) -> Result<Option<Vec<u8>>, MigrationError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Start => {
                    self.skip_bom()?;
                    match self.next_non_ws()? {
                        Some(b'[') => self.state = State::First,
                        Some(other) => {
                            return Err(MigrationError::malformed(
                                self.offset - 1,
                                format!("expected '[' but found '{}'", other as char),
                            ));
                        }
                        None => return Err(MigrationError::malformed(self.offset, "empty source")),
                    }
                }
                State::First => match self.peek_non_ws()? {
                    Some(b']') => {
                        self.bump();
                        self.state = State::Done;
                    }
                    Some(_) => {
                        let element = self.read_element()?;
                        self.state = State::AfterElement;
                        return Ok(Some(element));
                    }
                    None => return Err(self.unterminated()),
                },
                State::AfterElement => match self.next_non_ws()? {
                    Some(b',') => match self.peek_non_ws()? {
                        Some(_) => return self.read_element().map(Some),
                        None => return Err(self.unterminated()),
                    },
                    Some(b']') => self.state = State::Done,
                    Some(other) => {
                        return Err(MigrationError::malformed(
                            self.offset - 1,
                            format!("expected ',' or ']' but found '{}'", other as char),
                        ));
                    }
                    None => return Err(self.unterminated()),
                },
            }
        }
    }

    fn unterminated(&self) -> MigrationError {
        MigrationError::malformed(self.offset, "unterminated array")
    }

    fn peek(&mut self) -> Result<Option<u8>, MigrationError> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
        self.offset += 1;
    }

    fn peek_non_ws(&mut self) -> Result<Option<u8>, MigrationError> {
        while let Some(byte) = self.peek()? {
            if !byte.is_ascii_whitespace() {
                return Ok(Some(byte));
            }
            self.bump();
        }
        Ok(None)
    }

    fn next_non_ws(&mut self) -> Result<Option<u8>, MigrationError> {
        let byte = self.peek_non_ws()?;
        if byte.is_some() {
            self.bump();
        }
        Ok(byte)
    }

    fn skip_bom(&mut self) -> Result<(), MigrationError> {
        let buf = self.reader.fill_buf()?;
        if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.reader.consume(3);
            self.offset += 3;
        }
        Ok(())
    }

    /// Read one element starting at the current (non-whitespace) byte.
    fn read_element(&mut self) -> Result<Vec<u8>, MigrationError> {
        let start = self.offset;
        let mut element = Vec::with_capacity(128);
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let Some(byte) = self.peek()? else {
                return Err(MigrationError::malformed(
                    start,
                    "truncated element at end of source",
                ));
            };

            if in_string {
                self.bump();
                element.push(byte);
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' if depth == 0 => {
                    // Closing bracket of the enclosing array ends a scalar element
                    if element.is_empty() {
                        return Err(MigrationError::malformed(
                            self.offset,
                            format!("unexpected '{}'", byte as char),
                        ));
                    }
                    return Ok(element);
                }
                b'}' | b']' => depth -= 1,
                b',' if depth == 0 => return Ok(element),
                b if b.is_ascii_whitespace() && depth == 0 => return Ok(element),
                _ => {}
            }

            self.bump();
            element.push(byte);

            if depth == 0 && matches!(byte, b'}' | b']') {
                return Ok(element);
            }
        }
    }
}
