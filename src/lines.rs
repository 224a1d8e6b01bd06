use std::io::BufRead;

use crate::error::Error;

/// One physical line with surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based physical line number in the source.
    pub number: u32,
    pub text: String,
}

/// Iterator over the non-empty, non-comment lines of a dotenv source.
///
/// Created by [`valid_lines`]. Lines are read lazily, one `\n`-delimited
/// chunk at a time, so a read failure surfaces at the line where it happens.
#[derive(Debug)]
pub struct ValidLines<R> {
    reader: R,
    buf: Vec<u8>,
    number: u32,
}

/// Split `reader` into trimmed candidate lines, skipping blanks and `#` comments.
pub fn valid_lines<R: BufRead>(reader: R) -> ValidLines<R> {
    ValidLines {
        reader,
        buf: Vec::new(),
        number: 0,
    }
}

impl<R: BufRead> Iterator for ValidLines<R> {
    type Item = Result<RawLine, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(Error::Io(err))),
            }
            self.number += 1;

            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text.trim(),
                Err(err) => return Some(Err(Error::InvalidEncoding(err))),
            };
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            return Some(Ok(RawLine {
                number: self.number,
                text: text.to_owned(),
            }));
        }
    }
}
