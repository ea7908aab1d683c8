//! Per-pair flow graph: the data model built from a note file and the
//! counters attached to it from the matching data file.
//!
//! Every function is an arena of blocks and an arena of arcs. Blocks keep
//! their successor and predecessor arcs as index chains, in the order the
//! compiler emitted them; that order is load-bearing, because the data file
//! stores one counter per off-tree arc in exactly that order. Cross-function
//! references (a source line collecting blocks from several functions) are
//! `(function, block)` index pairs, so the graph is cycle-friendly without
//! any ownership knots.

use error::*;
use raw::*;
use reader::Reader;
use sourcepath::canonical_source_path;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Data model

/// Sentinel for a cycle-workspace block that is not on any line.
pub const NO_LINE: usize = !0;

/// A directed edge between two basic blocks.
#[derive(Debug)]
pub struct Arc {
    /// Index of the source block within the owning function.
    pub src: usize,
    /// Index of the destination block within the owning function.
    pub dst: usize,
    /// Transition count, measured or deduced.
    pub count: u64,
    /// Working count during cycle search, so the real count stays intact.
    pub cs_count: u64,
    /// Whether `count` holds a real value yet.
    pub count_valid: bool,
    pub attr: ArcAttr,
}

/// What a block knows about source lines. Starts out as the line encoding
/// read from the note file and becomes a cycle-search workspace the moment
/// line attribution begins; the two never coexist.
#[derive(Debug)]
pub enum BlockRole {
    /// Sequence of line numbers, interleaved with source switches. Always
    /// begins with a `Source` token.
    Lines(Vec<LineToken>),
    /// Cycle workspace: the line this block sits on (or [`NO_LINE`]) and the
    /// arc through which the current search path entered it.
    ///
    /// [`NO_LINE`]: constant.NO_LINE.html
    Cycle { ident: usize, arc: Option<usize> },
}

/// One token of a block's line encoding.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LineToken {
    /// Switch the current source file (index into [`FlowGraph::sources`]).
    ///
    /// [`FlowGraph::sources`]: struct.FlowGraph.html#structfield.sources
    Source(usize),
    /// A line number of the current source file.
    Line(u32),
}

/// A basic block.
#[derive(Debug)]
pub struct Block {
    /// The flag word from the `BASIC_BLOCK` record, kept opaque.
    pub flags: u32,
    pub attr: BlockAttr,
    /// Execution count, valid once [`count_valid`] is set by the solver.
    ///
    /// [`count_valid`]: #structfield.count_valid
    pub count: u64,
    pub count_valid: bool,
    /// Outgoing arcs (indices into the function's arc arena), emission order.
    pub succ: Vec<usize>,
    /// Incoming arcs, emission order.
    pub pred: Vec<usize>,
    /// Outgoing arcs whose count is still unknown. Saturated to `usize::MAX`
    /// on the exit block so the solver never infers from an empty list.
    pub num_succ: usize,
    /// Incoming arcs whose count is still unknown; saturated on entry.
    pub num_pred: usize,
    pub role: BlockRole,
}

impl Block {
    fn new(flags: u32) -> Block {
        Block {
            flags,
            attr: BlockAttr::default(),
            count: 0,
            count_valid: false,
            succ: Vec::new(),
            pred: Vec::new(),
            num_succ: 0,
            num_pred: 0,
            role: BlockRole::Lines(Vec::new()),
        }
    }
}

/// A single function's control-flow graph.
#[derive(Debug)]
pub struct Function {
    /// Raw (mangled) name.
    pub name: String,
    pub ident: u32,
    pub checksum: u32,
    /// First line number.
    pub line: u32,
    /// Index of the owning source file.
    pub src: usize,
    pub blocks: Vec<Block>,
    pub arcs: Vec<Arc>,
    /// Measured counters from the data file, one per off-tree arc, allocated
    /// on first sight and accumulated across data files.
    pub counts: Option<Vec<u64>>,
    /// Number of off-tree arcs, i.e. the expected counter array length.
    pub num_counts: usize,
    /// Interior blocks with a non-zero count, filled during attribution.
    pub blocks_executed: u64,
}

impl Function {
    /// Index of the entry block.
    pub fn entry_block(&self) -> usize {
        0
    }

    /// Index of the exit block.
    pub fn exit_block(&self) -> usize {
        self.blocks.len() - 1
    }
}

/// Running coverage totals of one source file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Coverage {
    pub lines: u32,
    pub lines_executed: u32,
    pub branches: u32,
    pub branches_executed: u32,
    pub branches_taken: u32,
    pub calls: u32,
    pub calls_executed: u32,
}

/// Per-line result of attribution.
#[derive(Clone, Debug, Default)]
pub struct LineInfo {
    /// The line is instrumented (mentioned by some block's encoding).
    pub exists: bool,
    /// Execution count of the line.
    pub count: u64,
    /// Interior blocks starting on this line, as `(function, block)` pairs.
    pub blocks: Vec<(usize, usize)>,
}

/// A source file mentioned in the note file.
#[derive(Debug)]
pub struct SourceFile {
    /// Canonical path, the de-duplication and report key.
    pub name: String,
    /// 1-based index, in order of first reference.
    pub index: u32,
    /// High-water mark: one past the largest line number seen.
    pub num_lines: u32,
    /// Line table, allocated once `num_lines` is final.
    pub lines: Vec<LineInfo>,
    /// Functions whose first line is in this file, ascending by first line
    /// once assembly finishes (ties keep the order they were read in).
    pub functions: Vec<usize>,
    pub coverage: Coverage,
}

/// Everything reconstructed from one note/data pair. Dropped wholesale when
/// the pair is done, so no identity leaks into the next one.
#[derive(Debug)]
pub struct FlowGraph {
    /// Path of the note file, carried for warnings and source resolution.
    pub note_file: PathBuf,
    pub version: Version,
    pub stamp: u32,
    /// Modification time of the note file, if the filesystem offers one.
    pub mtime: Option<SystemTime>,
    pub sources: Vec<SourceFile>,
    pub functions: Vec<Function>,
    /// Object summary from the data file, kept for diagnostics.
    pub object_summary: Option<Summary>,
    /// Number of program-summary records seen in the data file.
    pub program_count: u32,
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Graph assembly (note file)

impl FlowGraph {
    /// Reads a note file and assembles the per-function flow graphs.
    ///
    /// # Errors
    ///
    /// * Returns [`UnknownFileType`]/[`UnexpectedFileType`] if the file is
    ///   not a note file.
    /// * Returns [`BlockOutOfRange`], [`DuplicateRecord`],
    ///   [`LineWithoutSource`] or [`RecordOvershoot`] on structural
    ///   corruption.
    /// * Returns [`Io`] on I/O failure.
    ///
    /// [`UnknownFileType`]: ../error/enum.ErrorKind.html#variant.UnknownFileType
    /// [`UnexpectedFileType`]: ../error/enum.ErrorKind.html#variant.UnexpectedFileType
    /// [`BlockOutOfRange`]: ../error/enum.ErrorKind.html#variant.BlockOutOfRange
    /// [`DuplicateRecord`]: ../error/enum.ErrorKind.html#variant.DuplicateRecord
    /// [`LineWithoutSource`]: ../error/enum.ErrorKind.html#variant.LineWithoutSource
    /// [`RecordOvershoot`]: ../error/enum.ErrorKind.html#variant.RecordOvershoot
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    pub fn from_note_file(path: &Path) -> Result<FlowGraph> {
        debug!("open note file {:?}", path);
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        let file = BufReader::new(File::open(path)?);
        let reader = Reader::new(file, Type::Gcno)?;
        FlowGraph::assemble(reader, path, mtime)
    }

    fn assemble<R: ::std::io::Read>(mut reader: Reader<R>, path: &Path, mtime: Option<SystemTime>) -> Result<FlowGraph> {
        let mut graph = FlowGraph {
            note_file: path.to_owned(),
            version: reader.version(),
            stamp: reader.stamp(),
            mtime,
            sources: Vec::new(),
            functions: Vec::new(),
            object_summary: None,
            program_count: 0,
        };

        let mut current_fn: Option<usize> = None;
        let mut current_tag: Option<Tag> = None;
        // The source announced by the latest LINES record; line numbers
        // belong to it until the next announcement.
        let mut current_src: Option<usize> = None;

        while let Some((tag, length)) = reader.read_record_header()? {
            let base = reader.position();
            match tag {
                FUNCTION_TAG => {
                    let index = graph.read_function(&mut reader)?;
                    current_fn = Some(index);
                    current_tag = Some(tag);
                },
                BLOCKS_TAG => if let Some(fi) = current_fn {
                    graph.read_blocks(&mut reader, fi, length)?;
                },
                ARCS_TAG => if let Some(fi) = current_fn {
                    graph.read_arcs(&mut reader, fi, length)?;
                },
                LINES_TAG => if let Some(fi) = current_fn {
                    graph.read_lines(&mut reader, fi, &mut current_src)?;
                },
                tag => {
                    if let Some(cur) = current_tag {
                        if !cur.is_subtag(tag) {
                            // The function-scoped record group is over.
                            current_fn = None;
                            current_tag = None;
                        }
                    }
                    trace!("gcno-skip-record: tag = {}", tag);
                },
            }
            reader.sync(base, length)?;
        }

        graph.finish_assembly();
        Ok(graph)
    }

    /// Handles an `ANNOUNCE_FUNCTION` record and returns the new function's
    /// index.
    fn read_function<R: ::std::io::Read>(&mut self, reader: &mut Reader<R>) -> Result<usize> {
        trace!("function-ident @ 0x{:x}", reader.position());
        let ident = reader.read_32()?;
        trace!("function-checksum @ 0x{:x}", reader.position());
        let checksum = reader.read_32()?;
        trace!("function-name @ 0x{:x}", reader.position());
        let name = reader.read_string()?.unwrap_or_else(|| "<unknown>".to_owned());
        trace!("function-source @ 0x{:x}", reader.position());
        let filename = reader.read_string()?;
        let src = self.find_source(filename.as_ref().map(|s| s.as_str()));
        trace!("function-line @ 0x{:x}", reader.position());
        let line = reader.read_32()?;

        let index = self.functions.len();
        debug!("gcno-add-function '{}' @ {}:{} -> {}", name, self.sources[src].name, line, index);
        self.functions.push(Function {
            name,
            ident,
            checksum,
            line,
            src,
            blocks: Vec::new(),
            arcs: Vec::new(),
            counts: None,
            num_counts: 0,
            blocks_executed: 0,
        });

        {
            let source = &mut self.sources[src];
            if line >= source.num_lines {
                source.num_lines = line + 1;
            }
            // Insert by descending first line, new-before-equal; the finish
            // step reverses the list into ascending order with ties in read
            // order. Functions normally arrive ascending, so the scan is
            // short.
            let functions = &self.functions;
            let position = source
                .functions
                .iter()
                .position(|&f| functions[f].line <= line)
                .unwrap_or(source.functions.len());
            source.functions.insert(position, index);
        }

        Ok(index)
    }

    /// Handles a `BASIC_BLOCK` record: one flag word per block.
    fn read_blocks<R: ::std::io::Read>(&mut self, reader: &mut Reader<R>, fi: usize, length: u32) -> Result<()> {
        let function = &mut self.functions[fi];
        if !function.blocks.is_empty() {
            warn!("{}: already seen blocks for '{}'", self.note_file.display(), function.name);
            return Ok(()); // the duplicate record is skipped by sync
        }
        trace!("blocks-flags @ 0x{:x}: {} blocks", reader.position(), length);
        function.blocks.reserve(length as usize);
        for _ in 0..length {
            let flags = reader.read_32()?;
            function.blocks.push(Block::new(flags));
        }
        Ok(())
    }

    /// Handles an `ARCS` record: every outgoing arc of one source block.
    fn read_arcs<R: ::std::io::Read>(&mut self, reader: &mut Reader<R>, fi: usize, length: u32) -> Result<()> {
        let function = &mut self.functions[fi];
        trace!("arcs-block-no @ 0x{:x}", reader.position());
        let src = reader.read_32()?;
        let num_dests = (length.saturating_sub(1)) / 2;

        let num_blocks = function.blocks.len();
        ensure!((src as usize) < num_blocks, ErrorKind::BlockOutOfRange(src, function.name.clone()));
        ensure!(
            function.blocks[src as usize].succ.is_empty(),
            ErrorKind::DuplicateRecord("arcs", function.name.clone())
        );
        let src = src as usize;

        for _ in 0..num_dests {
            trace!("arc-dest-block @ 0x{:x}", reader.position());
            let dest = reader.read_32()?;
            trace!("arc-flags @ 0x{:x}", reader.position());
            let flags = reader.read_32()?;
            ensure!((dest as usize) < num_blocks, ErrorKind::BlockOutOfRange(dest, function.name.clone()));
            let dest = dest as usize;

            let mut attr = ArcAttr::from_gcno(flags);
            if attr.contains(ArcAttr::FAKE) {
                if src != 0 {
                    // Exceptional exit from this function, the source block
                    // must be a call.
                    function.blocks[src].attr |= BlockAttr::CALL_SITE;
                    attr |= ArcAttr::CALL_NON_RETURN;
                } else {
                    // Non-local return from a callee of this function. The
                    // destination block is a catch or setjmp.
                    attr |= ArcAttr::NONLOCAL_RETURN;
                    function.blocks[dest].attr |= BlockAttr::NONLOCAL_RETURN;
                }
            }

            let arc = function.arcs.len();
            function.arcs.push(Arc {
                src,
                dst: dest,
                count: 0,
                cs_count: 0,
                count_valid: false,
                attr,
            });
            function.blocks[src].succ.push(arc);
            function.blocks[src].num_succ += 1;
            function.blocks[dest].pred.push(arc);
            function.blocks[dest].num_pred += 1;

            if !attr.contains(ArcAttr::ON_TREE) {
                function.num_counts += 1;
            }
        }
        Ok(())
    }

    /// Handles a `LINES` record: the line encoding of one block.
    fn read_lines<R: ::std::io::Read>(&mut self, reader: &mut Reader<R>, fi: usize, current_src: &mut Option<usize>) -> Result<()> {
        trace!("lines-block-no @ 0x{:x}", reader.position());
        let blockno = reader.read_32()?;
        let (num_blocks, fn_name) = {
            let function = &self.functions[fi];
            (function.blocks.len(), function.name.clone())
        };
        ensure!((blockno as usize) < num_blocks, ErrorKind::BlockOutOfRange(blockno, fn_name.clone()));
        match self.functions[fi].blocks[blockno as usize].role {
            BlockRole::Lines(ref tokens) if tokens.is_empty() => {},
            _ => bail!(ErrorKind::DuplicateRecord("lines", fn_name)),
        }

        let mut tokens = Vec::new();
        loop {
            trace!("line-line-no @ 0x{:x}", reader.position());
            let line_number = reader.read_32()?;
            if line_number != 0 {
                let src = match *current_src {
                    Some(src) => src,
                    None => bail!(ErrorKind::LineWithoutSource(fn_name)),
                };
                if tokens.is_empty() {
                    tokens.push(LineToken::Source(src));
                }
                tokens.push(LineToken::Line(line_number));
                let source = &mut self.sources[src];
                if line_number >= source.num_lines {
                    source.num_lines = line_number + 1;
                }
            } else {
                trace!("line-filename @ 0x{:x}", reader.position());
                let filename = match reader.read_string()? {
                    Some(name) => name,
                    None => break, // the empty string terminates the record
                };
                let src = self.find_source(Some(&filename));
                *current_src = Some(src);
                tokens.push(LineToken::Source(src));
            }
        }

        self.functions[fi].blocks[blockno as usize].role = BlockRole::Lines(tokens);
        Ok(())
    }

    /// Finds or creates the source file for `file_name`, resolved against
    /// the note file's directory. Equal canonical paths share one entry.
    fn find_source(&mut self, file_name: Option<&str>) -> usize {
        let name = canonical_source_path(file_name, &self.note_file);
        if let Some(index) = self.sources.iter().position(|s| s.name == name) {
            return index;
        }
        let index = self.sources.len();
        trace!("gcno-add-source '{}' -> {}", name, index);
        self.sources.push(SourceFile {
            name,
            index: index as u32 + 1,
            num_lines: 0,
            lines: Vec::new(),
            functions: Vec::new(),
            coverage: Coverage::default(),
        });
        index
    }

    /// Puts assembly output into caller-visible order. The arenas append,
    /// so sources, functions and arc chains already match emission order;
    /// only the per-source function lists were built descending and need a
    /// reversal.
    fn finish_assembly(&mut self) {
        for source in &mut self.sources {
            source.functions.reverse();
        }
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Count attachment (data file)

impl FlowGraph {
    /// Reads the matching data file and adds its counters into every
    /// function's counts buffer. May be called for several data files; the
    /// counters accumulate.
    ///
    /// # Errors
    ///
    /// * Returns [`StampMismatch`] if the data file was produced by a
    ///   different compilation than the note file.
    /// * Returns [`ChecksumMismatch`]/[`CountsMismatch`] if a function's
    ///   profile does not fit the assembled graph.
    /// * Returns [`RecordOvershoot`] or [`Io`] on corruption.
    ///
    /// [`StampMismatch`]: ../error/enum.ErrorKind.html#variant.StampMismatch
    /// [`ChecksumMismatch`]: ../error/enum.ErrorKind.html#variant.ChecksumMismatch
    /// [`CountsMismatch`]: ../error/enum.ErrorKind.html#variant.CountsMismatch
    /// [`RecordOvershoot`]: ../error/enum.ErrorKind.html#variant.RecordOvershoot
    /// [`Io`]: ../error/enum.ErrorKind.html#variant.Io
    pub fn attach_counts(&mut self, data_file: &Path) -> Result<()> {
        debug!("open data file {:?}", data_file);
        let file = BufReader::new(File::open(data_file)?);
        let reader = Reader::new(file, Type::Gcda)?;
        self.attach(reader, data_file)
    }

    fn attach<R: ::std::io::Read>(&mut self, mut reader: Reader<R>, data_file: &Path) -> Result<()> {
        if reader.version() != self.version {
            warn!(
                "{}: version '{}' differs from note file's '{}'",
                data_file.display(),
                reader.version(),
                self.version
            );
        }
        ensure!(
            reader.stamp() == self.stamp,
            ErrorKind::StampMismatch(self.stamp, reader.stamp())
        );

        // Cursor into the function list; data records usually arrive in the
        // same order the note file declared them.
        let mut current_fn: Option<usize> = None;

        while let Some((tag, length)) = reader.read_record_header()? {
            let base = reader.position();
            match tag {
                OBJECT_SUMMARY_TAG => {
                    self.object_summary = Some(read_summary(&mut reader)?);
                    debug!("gcda-object-summary: {:?}", self.object_summary);
                },
                PROGRAM_SUMMARY_TAG => {
                    self.program_count += 1;
                },
                FUNCTION_TAG => {
                    trace!("gcda-function-ident @ 0x{:x}", reader.position());
                    let ident = reader.read_32()?;
                    current_fn = self.find_function(current_fn, ident);
                    match current_fn {
                        None => warn!("{}: unknown function '{}'", data_file.display(), ident),
                        Some(fi) => {
                            let function = &self.functions[fi];
                            let checksum = reader.read_32()?;
                            ensure!(
                                checksum == function.checksum,
                                ErrorKind::ChecksumMismatch(function.name.clone())
                            );
                        },
                    }
                },
                COUNTER_BASE_TAG => if let Some(fi) = current_fn {
                    let function = &mut self.functions[fi];
                    let expected = function.num_counts * 2;
                    ensure!(
                        length as usize == expected,
                        ErrorKind::CountsMismatch(function.num_counts, length as usize / 2, function.name.clone())
                    );
                    let num_counts = function.num_counts;
                    let counts = function.counts.get_or_insert_with(|| vec![0; num_counts]);
                    for slot in counts.iter_mut() {
                        *slot = slot.wrapping_add(reader.read_64()?);
                    }
                },
                tag => trace!("gcda-skip-record: tag = {}", tag),
            }
            reader.sync(base, length)?;
        }

        if self.program_count != 0 {
            debug!("{}: {} program summaries", data_file.display(), self.program_count);
        }
        Ok(())
    }

    /// Finds the function with the given identity, scanning forward from the
    /// last match and wrapping around once. Data records usually follow the
    /// note file's order, so the scan almost always stops immediately.
    fn find_function(&self, after: Option<usize>, ident: u32) -> Option<usize> {
        let n = self.functions.len();
        let start = after.map_or(0, |i| i + 1);
        (start..n).chain(0..n).find(|&i| self.functions[i].ident == ident)
    }
}

/// Reads the body of a summary record.
fn read_summary<R: ::std::io::Read>(reader: &mut Reader<R>) -> Result<Summary> {
    trace!("summary-checksum @ 0x{:x}", reader.position());
    let checksum = reader.read_32()?;
    trace!("summary-num @ 0x{:x}", reader.position());
    let num = reader.read_32()?;
    trace!("summary-runs @ 0x{:x}", reader.position());
    let runs = reader.read_32()?;
    trace!("summary-sum @ 0x{:x}", reader.position());
    let sum = reader.read_64()?;
    trace!("summary-max @ 0x{:x}", reader.position());
    let max = reader.read_64()?;
    trace!("summary-sum-max @ 0x{:x}", reader.position());
    let sum_max = reader.read_64()?;
    Ok(Summary {
        checksum,
        num,
        runs,
        sum,
        max,
        sum_max,
    })
}

//}}}

#[cfg(test)]
mod tests {
    use super::*;
    use error::ErrorKind;
    use raw::{ArcAttr, GCOV_DATA_MAGIC, GCOV_NOTE_MAGIC};
    use reader::Reader;

    use std::path::Path;

    const VERSION: u32 = 0x3430_372a; // "407*"
    const STAMP: u32 = 0x1234_5678;

    fn w(buf: &mut Vec<u8>, word: u32) {
        buf.extend_from_slice(&[word as u8, (word >> 8) as u8, (word >> 16) as u8, (word >> 24) as u8]);
    }

    fn string(buf: &mut Vec<u8>, s: &str) {
        let words = s.len() / 4 + 1;
        w(buf, words as u32);
        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(words * 4, 0);
        buf.extend_from_slice(&bytes);
    }

    fn record(buf: &mut Vec<u8>, tag: Tag, payload: &[u8]) {
        w(buf, tag.0);
        w(buf, (payload.len() / 4) as u32);
        buf.extend_from_slice(payload);
    }

    fn header(magic: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        w(&mut buf, magic);
        w(&mut buf, VERSION);
        w(&mut buf, STAMP);
        buf
    }

    fn function_record(buf: &mut Vec<u8>, ident: u32, checksum: u32, name: &str, filename: &str, line: u32) {
        let mut payload = Vec::new();
        w(&mut payload, ident);
        w(&mut payload, checksum);
        string(&mut payload, name);
        string(&mut payload, filename);
        w(&mut payload, line);
        record(buf, FUNCTION_TAG, &payload);
    }

    fn blocks_record(buf: &mut Vec<u8>, count: u32) {
        let mut payload = Vec::new();
        for _ in 0..count {
            w(&mut payload, 0);
        }
        record(buf, BLOCKS_TAG, &payload);
    }

    fn arcs_record(buf: &mut Vec<u8>, src: u32, arcs: &[(u32, u32)]) {
        let mut payload = Vec::new();
        w(&mut payload, src);
        for &(dest, flags) in arcs {
            w(&mut payload, dest);
            w(&mut payload, flags);
        }
        record(buf, ARCS_TAG, &payload);
    }

    fn lines_record(buf: &mut Vec<u8>, block: u32, filename: &str, lines: &[u32]) {
        let mut payload = Vec::new();
        w(&mut payload, block);
        w(&mut payload, 0);
        string(&mut payload, filename);
        for &line in lines {
            w(&mut payload, line);
        }
        w(&mut payload, 0);
        w(&mut payload, 0); // empty string terminates the record
        record(buf, LINES_TAG, &payload);
    }

    fn assemble(bytes: &[u8]) -> Result<FlowGraph> {
        let reader = Reader::new(bytes, Type::Gcno).unwrap();
        FlowGraph::assemble(reader, Path::new("/build/unit.gcno"), None)
    }

    // A diamond: 0 -> 1, 1 -> 2 and 1 -> 3 (instrumented), 2 -> 4, 3 -> 4.
    fn diamond() -> Vec<u8> {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0xaaaa, "branchy", "m.c", 11);
        blocks_record(&mut buf, 5);
        arcs_record(&mut buf, 0, &[(1, ArcAttr::ON_TREE.bits() as u32)]);
        arcs_record(&mut buf, 1, &[(2, 0), (3, 0)]);
        arcs_record(&mut buf, 2, &[(4, ArcAttr::ON_TREE.bits() as u32)]);
        arcs_record(&mut buf, 3, &[(4, ArcAttr::ON_TREE.bits() as u32)]);
        lines_record(&mut buf, 1, "m.c", &[11]);
        lines_record(&mut buf, 2, "m.c", &[12]);
        lines_record(&mut buf, 3, "m.c", &[13]);
        buf
    }

    #[test]
    fn arcs_appear_once_per_chain() {
        let graph = assemble(&diamond()).unwrap();
        let function = &graph.functions[0];
        assert_eq!(function.arcs.len(), 5);
        for (arc_id, arc) in function.arcs.iter().enumerate() {
            let in_succ = function
                .blocks
                .iter()
                .flat_map(|b| b.succ.iter())
                .filter(|&&a| a == arc_id)
                .count();
            let in_pred = function
                .blocks
                .iter()
                .flat_map(|b| b.pred.iter())
                .filter(|&&a| a == arc_id)
                .count();
            assert_eq!((in_succ, in_pred), (1, 1), "arc {}", arc_id);
            assert_eq!(function.blocks[arc.src].succ.contains(&arc_id), true);
            assert_eq!(function.blocks[arc.dst].pred.contains(&arc_id), true);
        }
    }

    #[test]
    fn off_tree_arcs_match_counter_expectation() {
        let graph = assemble(&diamond()).unwrap();
        let function = &graph.functions[0];
        assert_eq!(function.num_counts, 2);
        let off_tree = function.arcs.iter().filter(|a| !a.attr.contains(ArcAttr::ON_TREE)).count();
        assert_eq!(off_tree, function.num_counts);
    }

    #[test]
    fn sources_deduplicate_on_canonical_path() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "f", "a.c", 3);
        blocks_record(&mut buf, 2);
        function_record(&mut buf, 2, 0, "g", "x/../a.c", 5);
        blocks_record(&mut buf, 2);
        let graph = assemble(&buf).unwrap();
        assert_eq!(graph.sources.len(), 1);
        assert_eq!(graph.sources[0].name, "/build/a.c");
        assert_eq!(graph.sources[0].functions, vec![0, 1]);
    }

    #[test]
    fn functions_sort_by_line_with_ties_in_read_order() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "late", "a.c", 30);
        blocks_record(&mut buf, 2);
        function_record(&mut buf, 2, 0, "early", "a.c", 10);
        blocks_record(&mut buf, 2);
        function_record(&mut buf, 3, 0, "tie_a", "a.c", 20);
        blocks_record(&mut buf, 2);
        function_record(&mut buf, 4, 0, "tie_b", "a.c", 20);
        blocks_record(&mut buf, 2);
        let graph = assemble(&buf).unwrap();
        let names: Vec<&str> = graph.sources[0]
            .functions
            .iter()
            .map(|&f| graph.functions[f].name.as_str())
            .collect();
        assert_eq!(names, ["early", "tie_a", "tie_b", "late"]);
    }

    #[test]
    fn fake_arcs_classify_calls_and_nonlocal_returns() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "thrower", "a.c", 1);
        blocks_record(&mut buf, 4);
        // entry -> landing pad (fake from block 0), call site -> exit (fake)
        arcs_record(&mut buf, 0, &[(1, 0), (2, ArcAttr::FAKE.bits() as u32)]);
        arcs_record(&mut buf, 1, &[(3, ArcAttr::FAKE.bits() as u32), (2, 0)]);
        let graph = assemble(&buf).unwrap();
        let function = &graph.functions[0];
        assert!(function.arcs[1].attr.contains(ArcAttr::NONLOCAL_RETURN));
        assert!(function.blocks[2].attr.contains(BlockAttr::NONLOCAL_RETURN));
        assert!(function.arcs[2].attr.contains(ArcAttr::CALL_NON_RETURN));
        assert!(function.blocks[1].attr.contains(BlockAttr::CALL_SITE));
    }

    #[test]
    fn duplicate_arcs_are_corruption() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "f", "a.c", 1);
        blocks_record(&mut buf, 2);
        arcs_record(&mut buf, 0, &[(1, 0)]);
        arcs_record(&mut buf, 0, &[(1, 0)]);
        match assemble(&buf) {
            Err(Error(ErrorKind::DuplicateRecord("arcs", _), _)) => {},
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn out_of_range_block_is_corruption() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "f", "a.c", 1);
        blocks_record(&mut buf, 2);
        arcs_record(&mut buf, 0, &[(7, 0)]);
        match assemble(&buf) {
            Err(Error(ErrorKind::BlockOutOfRange(7, _), _)) => {},
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn duplicate_lines_are_corruption() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "f", "a.c", 1);
        blocks_record(&mut buf, 3);
        lines_record(&mut buf, 1, "a.c", &[4]);
        lines_record(&mut buf, 1, "a.c", &[5]);
        match assemble(&buf) {
            Err(Error(ErrorKind::DuplicateRecord("lines", _), _)) => {},
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn foreign_top_level_tag_closes_the_function_scope() {
        let mut buf = header(GCOV_NOTE_MAGIC);
        function_record(&mut buf, 1, 0, "f", "a.c", 1);
        record(&mut buf, PROGRAM_SUMMARY_TAG, &[0; 8]);
        // blocks after the scope closed must be ignored, not attached
        blocks_record(&mut buf, 2);
        let graph = assemble(&buf).unwrap();
        assert!(graph.functions[0].blocks.is_empty());
    }

    fn data_header() -> Vec<u8> {
        header(GCOV_DATA_MAGIC)
    }

    fn data_function_record(buf: &mut Vec<u8>, ident: u32, checksum: u32) {
        let mut payload = Vec::new();
        w(&mut payload, ident);
        w(&mut payload, checksum);
        record(buf, FUNCTION_TAG, &payload);
    }

    fn counter_record(buf: &mut Vec<u8>, counts: &[u64]) {
        let mut payload = Vec::new();
        for &count in counts {
            w(&mut payload, count as u32);
            w(&mut payload, (count >> 32) as u32);
        }
        record(buf, COUNTER_BASE_TAG, &payload);
    }

    fn attach(graph: &mut FlowGraph, bytes: &[u8]) -> Result<()> {
        let reader = Reader::new(bytes, Type::Gcda).unwrap();
        graph.attach(reader, Path::new("/build/unit.gcda"))
    }

    #[test]
    fn counters_accumulate_across_data_files() {
        let mut graph = assemble(&diamond()).unwrap();
        let mut data = data_header();
        data_function_record(&mut data, 1, 0xaaaa);
        counter_record(&mut data, &[1, 2]);
        attach(&mut graph, &data).unwrap();
        attach(&mut graph, &data).unwrap();
        assert_eq!(graph.functions[0].counts, Some(vec![2, 4]));
    }

    #[test]
    fn stamp_mismatch_rejects_the_pair() {
        let mut graph = assemble(&diamond()).unwrap();
        let mut data = Vec::new();
        w(&mut data, GCOV_DATA_MAGIC);
        w(&mut data, VERSION);
        w(&mut data, STAMP ^ 1);
        match attach(&mut graph, &data) {
            Err(Error(ErrorKind::StampMismatch(..), _)) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn checksum_mismatch_rejects_the_pair() {
        let mut graph = assemble(&diamond()).unwrap();
        let mut data = data_header();
        data_function_record(&mut data, 1, 0xbbbb);
        match attach(&mut graph, &data) {
            Err(Error(ErrorKind::ChecksumMismatch(_), _)) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn counter_length_mismatch_rejects_the_pair() {
        let mut graph = assemble(&diamond()).unwrap();
        let mut data = data_header();
        data_function_record(&mut data, 1, 0xaaaa);
        counter_record(&mut data, &[1, 2, 3]);
        match attach(&mut graph, &data) {
            Err(Error(ErrorKind::CountsMismatch(2, 3, _), _)) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unknown_function_in_data_file_is_skipped() {
        let mut graph = assemble(&diamond()).unwrap();
        let mut data = data_header();
        data_function_record(&mut data, 99, 0);
        counter_record(&mut data, &[7, 7]);
        attach(&mut graph, &data).unwrap();
        assert_eq!(graph.functions[0].counts, None);
    }
}
