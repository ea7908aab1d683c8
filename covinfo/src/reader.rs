//! Cursor over a single GCNO/GCDA file.
//!
//! Both kinds of file share one envelope: a magic word identifying the kind
//! and the byte order, a version word, a stamp word, then a sequence of
//! `(tag, length, payload)` records with the length counted in 32-bit words.
//! The reader exposes the primitive reads and a [`sync`] operation that
//! skips to the end of the current record, failing if the caller already
//! consumed past it.
//!
//! [`sync`]: struct.Reader.html#method.sync

use error::*;
use raw::{GCOV_DATA_MAGIC, GCOV_NOTE_MAGIC, Tag, Type, Version};

use byteorder::{LittleEndian, ReadBytesExt};

use std::io::{self, Read};
use std::result::Result as StdResult;

/// The reader of a GCNO/GCDA file.
#[derive(Debug)]
pub struct Reader<R> {
    reader: R,
    cursor: u64,
    ty: Type,
    version: Version,
    stamp: u32,
    is_big_endian: bool,
}

impl<R: Read> Reader<R> {
    /// Parses the file header and creates a reader for the records that
    /// follow. The byte order is deduced from the magic word; all further
    /// reads honour it.
    ///
    /// # Errors
    ///
    /// * Returns [`UnknownFileType`] if the magic word is not recognized.
    /// * Returns [`UnexpectedFileType`] if the file is a valid gcov file of
    ///   the wrong kind.
    /// * Returns [`Io`] on I/O failure.
    ///
    /// [`UnknownFileType`]: ../error/enum.ErrorKind.html#variant.UnknownFileType
    /// [`UnexpectedFileType`]: ../error/enum.ErrorKind.html#variant.UnexpectedFileType
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    pub fn new(mut reader: R, expected: Type) -> Result<Reader<R>> {
        trace!("gcov-magic");
        let (ty, is_big_endian) = match reader.read_u32::<LittleEndian>()? {
            GCOV_NOTE_MAGIC => (Type::Gcno, false),
            m if m == GCOV_NOTE_MAGIC.swap_bytes() => (Type::Gcno, true),
            GCOV_DATA_MAGIC => (Type::Gcda, false),
            m if m == GCOV_DATA_MAGIC.swap_bytes() => (Type::Gcda, true),
            magic => bail!(ErrorKind::UnknownFileType(magic)),
        };
        ensure!(ty == expected, ErrorKind::UnexpectedFileType(expected, ty));
        let mut result = Reader {
            reader,
            ty,
            is_big_endian,
            cursor: 4,
            version: Version::default(),
            stamp: 0,
        };
        trace!("gcov-version @ 0x{:x}", result.cursor);
        result.version = Version(result.read_32()?);
        trace!("gcov-stamp @ 0x{:x}", result.cursor);
        result.stamp = result.read_32()?;
        Ok(result)
    }

    /// The version word found in the header.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The stamp word found in the header.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    /// The current byte position in the file.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Advances the reader cursor by `count` bytes and converts the error of
    /// `res`, if any. The cursor moves even on failure; the caller bails out
    /// of the whole pair in that case.
    fn advance_cursor<T, E: Into<Error>>(&mut self, count: u64, res: StdResult<T, E>) -> Result<T> {
        self.cursor += count;
        res.map_err(E::into)
    }

    /// Reads a 32-bit number in gcov format.
    ///
    /// # Errors
    ///
    /// Returns [`Io`] on I/O failure, e.g. reaching end-of-file.
    ///
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    pub fn read_32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>();
        let mut value = self.advance_cursor(4, value)?;
        if self.is_big_endian {
            value = value.swap_bytes();
        }
        Ok(value)
    }

    /// Reads a 64-bit counter, stored as two 32-bit halves, low half first.
    ///
    /// # Errors
    ///
    /// Returns [`Io`] on I/O failure, e.g. reaching end-of-file.
    ///
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    pub fn read_64(&mut self) -> Result<u64> {
        let lo = self.read_32()?;
        let hi = self.read_32()?;
        Ok(u64::from(hi) << 32 | u64::from(lo))
    }

    /// Reads a string in gcov format: a length in 32-bit words followed by
    /// that many words of NUL-padded content. A length of zero denotes an
    /// absent string and yields `None`.
    ///
    /// # Errors
    ///
    /// * Returns [`Io`] on I/O failure, e.g. reaching end-of-file.
    /// * Returns [`FromUtf8`] if the string is not encoded in UTF-8.
    ///
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    /// [`FromUtf8`]: ../error/enum.ErrorKind.html#variant.FromUtf8
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let length = u64::from(self.read_32()?) * 4;
        if length == 0 {
            return Ok(None);
        }
        let mut buf = vec![0; length as usize];
        let res = self.reader.read_exact(&mut buf);
        self.advance_cursor(length, res)?;
        let actual_length = buf.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        buf.truncate(actual_length);
        Ok(Some(String::from_utf8(buf)?))
    }

    /// Reads a record header, returning the tag and the payload length in
    /// 32-bit words. A tag of zero or a clean end-of-file both mean there
    /// are no records left.
    pub fn read_record_header(&mut self) -> Result<Option<(Tag, u32)>> {
        trace!("record-tag @ 0x{:x}", self.cursor);
        let tag = match self.read_32() {
            Ok(0) => return Ok(None),
            Ok(tag) => Tag(tag),
            Err(ref e) if e.is_eof() => return Ok(None),
            Err(e) => return Err(e),
        };
        trace!("record-length @ 0x{:x}", self.cursor);
        let length = self.read_32()?;
        debug!("record-header: tag = {}, length = {} words, payload @ 0x{:x}", tag, length, self.cursor);
        Ok(Some((tag, length)))
    }

    /// Skips to the end of the record whose payload started at `base` with
    /// the given length in words.
    ///
    /// # Errors
    ///
    /// * Returns [`RecordOvershoot`] if the caller already consumed past the
    ///   record's end, which means the payload was shorter than its reads.
    /// * Returns [`Eof`] if the file ends before the record does.
    ///
    /// [`RecordOvershoot`]: ../error/enum.ErrorKind.html#variant.RecordOvershoot
    /// [`Eof`]: ../error/enum.ErrorKind.html#variant.Eof
    pub fn sync(&mut self, base: u64, length: u32) -> Result<()> {
        let end = base + u64::from(length) * 4;
        ensure!(self.cursor <= end, ErrorKind::RecordOvershoot(end, self.cursor));
        let remaining = end - self.cursor;
        let skipped = io::copy(&mut self.reader.by_ref().take(remaining), &mut io::sink())?;
        self.cursor += skipped;
        ensure!(skipped == remaining, ErrorKind::Eof);
        Ok(())
    }
}
