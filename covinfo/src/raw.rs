//! The raw vocabulary of the gcov container format: magic words, record
//! tags, the version word and the attribute bits carried by arcs and blocks.

use std::fmt;

/// Magic word of a note (`*.gcno`) file, the bytes `"gcno"`.
pub const GCOV_NOTE_MAGIC: u32 = 0x67_63_6e_6f;
/// Magic word of a data (`*.gcda`) file, the bytes `"gcda"`.
pub const GCOV_DATA_MAGIC: u32 = 0x67_63_64_61;

/// The file type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    /// The "notes" file, with file extension `*.gcno`.
    Gcno,
    /// The "data" file, with file extension `*.gcda`.
    Gcda,
}

impl fmt::Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            Type::Gcno => "gcno",
            Type::Gcda => "gcda",
        })
    }
}

//----------------------------------------------------------------------------------------------------------------------
//{{{ Tag

/// The tag of a record.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

/// The tag for the end of file.
pub const EOF_TAG: Tag = Tag(0);
/// The tag for an `ANNOUNCE_FUNCTION` record.
pub const FUNCTION_TAG: Tag = Tag(0x01_00_00_00);
/// The tag for a `BASIC_BLOCK` record.
pub const BLOCKS_TAG: Tag = Tag(0x01_41_00_00);
/// The tag for an `ARCS` record.
pub const ARCS_TAG: Tag = Tag(0x01_43_00_00);
/// The tag for a `LINES` record.
pub const LINES_TAG: Tag = Tag(0x01_45_00_00);
/// The tag for an `ARC_COUNTS` record.
pub const COUNTER_BASE_TAG: Tag = Tag(0x01_a1_00_00);
/// The tag for an object-`SUMMARY` record.
pub const OBJECT_SUMMARY_TAG: Tag = Tag(0xa1_00_00_00);
/// The tag for a program-`SUMMARY` record.
pub const PROGRAM_SUMMARY_TAG: Tag = Tag(0xa3_00_00_00);

impl Tag {
    /// The mask of bits below the tag's level in the record hierarchy.
    fn mask(self) -> u32 {
        self.0.wrapping_sub(1) ^ self.0
    }

    /// Checks whether `sub` nests inside a record group opened by `self`.
    ///
    /// Tags form a hierarchy encoded in their byte pattern: a sub-tag shares
    /// its parent's prefix and sits one level (8 bits) below it.
    pub fn is_subtag(self, sub: Tag) -> bool {
        self.mask() >> 8 == sub.mask() && (sub.0 ^ self.0) & !self.mask() == 0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "0x{:08x}", self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Tag(0x{:08x})", self.0)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Version

/// File version word. Stored as four ASCII-ish bytes; only equality matters
/// here, a mismatch between the pair's two files is reported as a warning.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u32);

impl fmt::Display for Version {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}{}{}{}",
            (self.0 >> 24 & 0xff) as u8 as char,
            (self.0 >> 16 & 0xff) as u8 as char,
            (self.0 >> 8 & 0xff) as u8 as char,
            (self.0 & 0xff) as u8 as char,
        )
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Version(\"{}\")", self)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Attributes

bitflags! {
    /// Attributes of an arc. The low three bits come straight from the note
    /// file; the rest are derived during graph assembly and solving.
    #[derive(Default)]
    pub struct ArcAttr: u16 {
        // These three must be consistent with the on-disk flag word.
        const ON_TREE = 1;
        const FAKE = 2;
        const FALLTHROUGH = 4;

        const CALL_NON_RETURN = 0x20;
        const NONLOCAL_RETURN = 0x40;
        const UNCONDITIONAL = 0x80;
        /// The arc closed an elementary cycle during line counting and must
        /// not be revisited.
        const CYCLE = 0x100;
    }
}

impl ArcAttr {
    /// Decodes the flag word of an arc record. Bits beyond the three known
    /// ones are not meaningful to us and are dropped.
    pub fn from_gcno(flags: u32) -> ArcAttr {
        ArcAttr::from_bits_truncate(flags as u16) & (ArcAttr::ON_TREE | ArcAttr::FAKE | ArcAttr::FALLTHROUGH)
    }
}

bitflags! {
    /// Attributes of a basic block, all derived during assembly and solving.
    /// The flag word read from the `BASIC_BLOCK` record is kept opaque.
    #[derive(Default)]
    pub struct BlockAttr: u16 {
        /// The block instruments a call that may not return.
        const CALL_SITE = 0x1000;
        /// The block is the artificial return site of a call.
        const CALL_RETURN = 0x2000;
        /// The block is a landing pad for longjmp or throw.
        const NONLOCAL_RETURN = 0x4000;
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Summary

/// Object summary carried in a data file. Retained for diagnostics only.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Summary {
    pub checksum: u32,
    pub num: u32,
    pub runs: u32,
    pub sum: u64,
    pub max: u64,
    pub sum_max: u64,
}

//}}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtag_nesting() {
        assert!(FUNCTION_TAG.is_subtag(BLOCKS_TAG));
        assert!(FUNCTION_TAG.is_subtag(ARCS_TAG));
        assert!(FUNCTION_TAG.is_subtag(LINES_TAG));
        assert!(!FUNCTION_TAG.is_subtag(FUNCTION_TAG));
        assert!(!FUNCTION_TAG.is_subtag(OBJECT_SUMMARY_TAG));
        assert!(!FUNCTION_TAG.is_subtag(PROGRAM_SUMMARY_TAG));
    }

    #[test]
    fn arc_attr_decoding() {
        assert_eq!(ArcAttr::from_gcno(5), ArcAttr::ON_TREE | ArcAttr::FALLTHROUGH);
        // unknown high bits from newer producers are ignored
        assert_eq!(ArcAttr::from_gcno(0xfff8), ArcAttr::empty());
    }
}
