//! A mechanism for splitting the content of pseudo-files into lines and fields
//!
//! The metadata provided by procfs pseudo-files often has a two-dimensional
//! inner structure. Lines of text represent different devices or categories of
//! information, whereas delimiter-separated columns are used to separate the
//! details of a single line (e.g. idle CPU time vs user-mode CPU time).
//!
//! Rust provides ways of dealing with this hierarchy (namely SplitWhitespace
//! and Lines), but these primitives are not fast enough for our demanding
//! application in practice. A naive line- and space- splitter based on
//! standard Rust iterators does many things which we do not need:
//!
//! - It treats "characters" in a Unicode-aware fashion, whereas we know that
//!   the Linux kernel will only send us ASCII text.
//! - It cannot collapse several kinds of delimiters at once, whereas files
//!   like /proc/meminfo ("MemFree:  1234 kB") or /proc/loadavg ("1/467") mix
//!   spaces with colons and slashes.
//! - It encourages building owned strings, whereas our parsers only need to
//!   look at the bytes in place.
//!
//! We thus provide a byte-oriented mechanism which never copies anything: a
//! Field is just a pair of offsets into the caller-owned readout buffer, and
//! the borrow checker guarantees that it cannot outlive that buffer, which
//! gets reused on the next readout.

use crate::error::ParseCause;
use std::time::Duration;


/// Set of bytes which separate the fields of a line
///
/// Newlines always terminate lines and need not be part of this set.
///
#[derive(Clone, Copy)]
pub struct Delimiters {
    /// Byte class table, indexed by byte value
    table: [bool; 256],
}
//
impl Delimiters {
    /// Plain space-separated columns (/proc/stat, /proc/diskstats...)
    pub const SPACE: Self = Self::new(b" \t");

    /// "Key: value" files (/proc/meminfo)
    pub const COLON: Self = Self::new(b" \t:");

    /// Files with "a/b" fields (/proc/loadavg)
    pub const SLASH: Self = Self::new(b" \t/");

    /// /proc/net/dev, whose header is a "|"-separated table and whose records
    /// look like "eth0: 1234 ..." or even "eth0:1234 ..." for large counters
    pub const NET_DEV: Self = Self::new(b" \t:|");

    /// Build a delimiter set from a list of bytes
    pub const fn new(bytes: &[u8]) -> Self {
        let mut table = [false; 256];
        let mut i = 0;
        while i < bytes.len() {
            table[bytes[i] as usize] = true;
            i += 1;
        }
        Self { table }
    }

    /// Truth that a byte is a delimiter
    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.table[byte as usize]
    }
}
//
impl std::fmt::Debug for Delimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes: Vec<u8> = (0..=255u8).filter(|&b| self.contains(b))
                                        .collect();
        write!(f, "Delimiters({:?})", String::from_utf8_lossy(&bytes))
    }
}


/// Lazy iterator over the non-empty lines of a buffer
///
/// Restarting iteration is as simple as building a new SplitLines on the same
/// buffer. A final line without a trailing newline is yielded normally.
///
pub struct SplitLines<'a> {
    /// Buffer which we are splitting
    buffer: &'a [u8],

    /// Byte offset of the next line
    position: usize,

    /// Number of the next line, counting empty lines too
    line_number: usize,

    /// Field delimiters handed down to every line
    delimiters: Delimiters,
}
//
impl<'a> SplitLines<'a> {
    /// Start splitting a buffer into lines
    pub fn new(buffer: &'a [u8], delimiters: Delimiters) -> Self {
        Self {
            buffer,
            position: 0,
            line_number: 0,
            delimiters,
        }
    }
}
//
impl<'a> Iterator for SplitLines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.buffer.len() {
            // Find the end of the current line
            let start = self.position;
            let end = self.buffer[start..].iter()
                                          .position(|&b| b == b'\n')
                                          .map_or(self.buffer.len(),
                                                  |len| start + len);

            // Move past it (and its newline, if any)
            self.position = end + 1;
            let number = self.line_number;
            self.line_number += 1;

            // Empty lines carry no information
            if start == end { continue; }
            return Some(Line {
                buffer: self.buffer,
                start,
                end,
                number,
                delimiters: self.delimiters,
            });
        }
        None
    }
}


/// One line of a pseudo-file
#[derive(Clone, Copy, Debug)]
pub struct Line<'a> {
    /// Buffer which the line belongs to
    buffer: &'a [u8],

    /// Byte offset of the first character of the line
    start: usize,

    /// Byte offset of the end of the line (newline excluded)
    end: usize,

    /// Position of the line in the file, starting at 0
    number: usize,

    /// How the line is split into fields
    delimiters: Delimiters,
}
//
impl<'a> Line<'a> {
    /// Position of the line in the file, starting at 0
    pub fn number(&self) -> usize {
        self.number
    }

    /// Raw bytes of the line, without the trailing newline
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buffer[self.start..self.end]
    }

    /// Iterate over the fields of the line
    pub fn columns(&self) -> SplitColumns<'a> {
        SplitColumns {
            buffer: self.buffer,
            position: self.start,
            end: self.end,
            delimiters: self.delimiters,
        }
    }
}


/// Iterator over the delimiter-separated fields of a line
///
/// Leading, trailing and repeated delimiters are collapsed: this iterator
/// never yields an empty field.
///
#[derive(Clone, Debug)]
pub struct SplitColumns<'a> {
    /// Buffer which the line belongs to
    buffer: &'a [u8],

    /// Byte offset of the next character to be examined
    position: usize,

    /// Byte offset of the end of the line
    end: usize,

    /// Which bytes separate fields
    delimiters: Delimiters,
}
//
impl<'a> SplitColumns<'a> {
    /// Fetch the next field, which the file grammar says should be there
    pub fn expect(&mut self) -> Result<Field<'a>, ParseCause> {
        self.next().ok_or(ParseCause::MissingField)
    }

    /// Count the remaining fields without consuming this iterator
    pub fn remaining(&self) -> usize {
        self.clone().count()
    }
}
//
impl<'a> Iterator for SplitColumns<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip delimiters until the start of the next field, if any
        while self.position < self.end
              && self.delimiters.contains(self.buffer[self.position]) {
            self.position += 1;
        }
        if self.position >= self.end { return None; }

        // Find the end of that field
        let start = self.position;
        while self.position < self.end
              && !self.delimiters.contains(self.buffer[self.position]) {
            self.position += 1;
        }
        Some(Field { buffer: self.buffer, start, end: self.position })
    }
}


/// A field of a pseudo-file, as a view into the readout buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field<'a> {
    /// Buffer which the field belongs to
    buffer: &'a [u8],

    /// Offset of the first byte of the field in the buffer
    start: usize,

    /// Offset past the last byte of the field in the buffer
    end: usize,
}
//
impl<'a> Field<'a> {
    /// Offset of the first byte of the field in the readout buffer
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset past the last byte of the field in the readout buffer
    pub fn end(&self) -> usize {
        self.end
    }

    /// Raw bytes of the field
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buffer[self.start..self.end]
    }

    /// Text of the field, which the kernel sends as ASCII
    pub fn as_str(&self) -> Result<&'a str, ParseCause> {
        std::str::from_utf8(self.as_bytes()).map_err(|_| {
            ParseCause::Unexpected(self.to_owned_string())
        })
    }

    /// Copy the field out of the readout buffer, e.g. to keep a device name
    pub fn to_owned_string(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// Decode the field as an unsigned decimal integer
    pub fn parse_u64(&self) -> Result<u64, ParseCause> {
        parse_u64(self.as_bytes())
    }

    /// Decode the field as an unsigned integer of some narrower type
    pub fn parse_uint<T: TryFrom<u64>>(&self) -> Result<T, ParseCause> {
        T::try_from(self.parse_u64()?).map_err(|_| ParseCause::Overflow)
    }

    /// Decode the field as an unsigned fixed-point decimal number
    pub fn parse_decimal(&self) -> Result<Decimal, ParseCause> {
        parse_decimal(self.as_bytes())
    }
}


/// Fast-path decoder for unsigned decimal integers
///
/// There is no locale, sign or exponent to care about in procfs counters, so
/// this is much simpler (and faster) than str::parse. Any non-digit byte is
/// reported along with its position in the field.
///
pub fn parse_u64(bytes: &[u8]) -> Result<u64, ParseCause> {
    // On some architectures, there are many counters that will never move.
    // Special-casing zero thus speeds up parsing of files like /proc/stat.
    if bytes == b"0" { return Ok(0); }
    if bytes.is_empty() { return Err(ParseCause::MissingField); }

    let mut value = 0u64;
    for (position, &byte) in bytes.iter().enumerate() {
        let digit = byte.wrapping_sub(b'0');
        if digit > 9 {
            return Err(ParseCause::MalformedNumber { byte, position });
        }
        value = value.checked_mul(10)
                     .and_then(|v| v.checked_add(u64::from(digit)))
                     .ok_or(ParseCause::Overflow)?;
    }
    Ok(value)
}


/// Unsigned fixed-point decimal number, using the usual XXXX[.[YY]] format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decimal {
    /// Integral part
    pub integer: u64,

    /// Fractional part, as an integer...
    pub fraction: u64,

    /// ...and the number of decimal digits it spans
    pub digits: u32,
}
//
impl Decimal {
    /// Maximal number of fractional digits that we keep
    const MAX_DIGITS: u32 = 18;

    /// Convert to floating-point
    pub fn to_f64(&self) -> f64 {
        self.integer as f64
            + (self.fraction as f64) / 10f64.powi(self.digits as i32)
    }

    /// Interpret as a number of seconds. Sub-nanosecond decimals are
    /// truncated: we only count whole nanoseconds.
    pub fn to_duration(&self) -> Duration {
        let nanoseconds = if self.digits <= 9 {
            self.fraction * 10u64.pow(9 - self.digits)
        } else {
            self.fraction / 10u64.pow(self.digits - 9)
        };
        Duration::new(self.integer, nanoseconds as u32)
    }
}


/// Decoder for unsigned fixed-point numbers, see Decimal
pub fn parse_decimal(bytes: &[u8]) -> Result<Decimal, ParseCause> {
    // Separate the integral part from the fractional part (if any)
    let dot = bytes.iter().position(|&b| b == b'.');
    let (int_bytes, frac_bytes) = match dot {
        Some(idx) => (&bytes[..idx], &bytes[idx+1..]),
        None => (bytes, &bytes[bytes.len()..]),
    };

    // Parse the integral part
    let integer = parse_u64(int_bytes)?;

    // Parse the fractional part, keeping a bounded amount of digits but
    // still checking that the extra ones are digits
    let frac_offset = int_bytes.len() + 1;
    let mut fraction = 0u64;
    let mut digits = 0u32;
    for (idx, &byte) in frac_bytes.iter().enumerate() {
        let digit = byte.wrapping_sub(b'0');
        if digit > 9 {
            return Err(ParseCause::MalformedNumber {
                byte,
                position: frac_offset + idx,
            });
        }
        if digits < Decimal::MAX_DIGITS {
            fraction = fraction * 10 + u64::from(digit);
            digits += 1;
        }
    }
    Ok(Decimal { integer, fraction, digits })
}


/// Testing code often needs to split a single line of text, even though the
/// Real Thing needs to operate over multiple lines of text. We got you covered.
#[cfg(test)]
pub(crate) fn split_line(input: &[u8], delimiters: Delimiters)
    -> SplitColumns<'_>
{
    SplitLines::new(input, delimiters).next()
                                      .expect("Input should have one line")
                                      .columns()
}
