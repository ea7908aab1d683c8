//! Errors raised while reconstructing coverage from a note/data pair.
//!
//! Every kind here is fatal *for the current pair only*; the driver reports
//! the chain to stderr and moves on to the next data file.

use raw::Type;

use std::io;
use std::string::FromUtf8Error;

error_chain! {
    foreign_links {
        Io(io::Error) /** Wrapper of standard I/O error. */;
        FromUtf8(FromUtf8Error) /** Wrapper of UTF-8 decode error. */;
    }

    errors {
        /// Trying to read a file whose magic word is neither GCNO nor GCDA in
        /// either byte order.
        UnknownFileType(magic: u32) {
            description("unknown file type")
            display("unknown file type, magic 0x{:08x} not recognized", magic)
        }

        /// The magic word decodes to a valid gcov file, but not the kind the
        /// caller asked for (e.g. a data file where a note file was expected).
        UnexpectedFileType(expected: Type, actual: Type) {
            description("unexpected file type")
            display("expected a *.{} file, found a *.{} file", expected, actual)
        }

        /// The data file's stamp does not match the companion note file, so
        /// the pair was produced by different compilations.
        StampMismatch(expected: u32, actual: u32) {
            description("stamp mismatch with note file")
            display("stamp mismatch with note file, expected 0x{:08x}, found 0x{:08x}", expected, actual)
        }

        /// Reached the end of the file while a read was still pending.
        Eof {
            description("unexpected end of file")
        }

        /// A record's payload was consumed past its declared length.
        RecordOvershoot(end: u64, cursor: u64) {
            description("record overrun")
            display("record overrun, payload ends at 0x{:x} but cursor is at 0x{:x}", end, cursor)
        }

        /// A structurally impossible note file: a block index pointing
        /// outside the function's block array.
        BlockOutOfRange(index: u32, function: String) {
            description("block index out of range")
            display("block index {} out of range in '{}'", index, function)
        }

        /// Two records claimed the same slot (arcs for one source block, or
        /// lines for an already-annotated block).
        DuplicateRecord(kind: &'static str, function: String) {
            description("duplicate record")
            display("duplicate {} record in '{}'", kind, function)
        }

        /// A line number appeared before any source file was announced.
        LineWithoutSource(function: String) {
            description("line number without a source file")
            display("line number without a source file in '{}'", function)
        }

        /// The data file disagrees with the note file about a function.
        ChecksumMismatch(function: String) {
            description("profile mismatch")
            display("profile mismatch for '{}'", function)
        }

        /// The counter payload does not hold exactly one counter per
        /// instrumented arc.
        CountsMismatch(expected: usize, actual: usize, function: String) {
            description("counter length mismatch")
            display("expected {} counters for '{}', record holds {}", expected, function, actual)
        }

        /// The note file parsed cleanly but declared no functions at all.
        NoFunctions {
            description("no functions found")
        }
    }
}

/// A trait to check if an error is an EOF error.
pub trait IsEof {
    /// Checks whether the error is caused by an unexpected EOF.
    fn is_eof(&self) -> bool;
}

impl IsEof for ErrorKind {
    fn is_eof(&self) -> bool {
        match *self {
            ErrorKind::Io(ref e) => e.kind() == io::ErrorKind::UnexpectedEof,
            ErrorKind::Eof => true,
            _ => false,
        }
    }
}

impl IsEof for Error {
    fn is_eof(&self) -> bool {
        self.kind().is_eof()
    }
}
