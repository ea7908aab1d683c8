//! `covinfo` reconstructs source-level coverage from the GCNO/GCDA files
//! produced by GCC-compatible instrumentation.
//!
//! A note file (`*.gcno`), written at compile time, encodes the control-flow
//! graph of every function together with the source lines of each basic
//! block. A data file (`*.gcda`), written when the instrumented program
//! runs, holds one counter per arc off the compiler-chosen spanning tree.
//! Combining the two recovers the execution count of every arc, block and
//! line: the missing counts follow from flow conservation, and line counts
//! come from the flow entering each line's sub-graph plus its internal
//! cycles.
//!
//! The crate processes one note/data pair at a time and folds the results
//! into process-wide [`Tables`], which a front end can render into a report
//! such as an lcov tracefile.
//!
//! ```no_run
//! extern crate covinfo;
//! use covinfo::Tables;
//! use std::path::Path;
//!
//! # fn main() { run().unwrap(); }
//! # fn run() -> covinfo::Result<()> {
//! let mut tables = Tables::new();
//! covinfo::process_pair(Path::new("obj/unit.gcda"), &mut tables)?;
//! // tables.lines, tables.functions and tables.branches now hold the
//! // accumulated coverage, keyed by canonical source path.
//! # Ok(()) }
//! ```
//!
//! [`Tables`]: ./aggregate/struct.Tables.html

#![recursion_limit = "128"] // needed for error_chain.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate byteorder;
extern crate fixedbitset;

pub mod aggregate;
pub mod error;
pub mod graph;
pub mod line;
pub mod raw;
pub mod reader;
pub mod solve;
pub mod sourcepath;

pub use aggregate::{BranchId, FunctionRecord, Tables, CALL_RETURN_BLOCK, UNKNOWN_TAKEN};
pub use error::{Error, ErrorKind, Result};
pub use graph::FlowGraph;
pub use reader::Reader;

use error::ResultExt;

use std::path::{Path, PathBuf};

/// Derives the note file's path from a data file's: same name, `.gcno`
/// suffix.
pub fn note_path_for(data_file: &Path) -> PathBuf {
    data_file.with_extension("gcno")
}

/// Processes one data file and its companion note file, folding the
/// reconstructed coverage into `tables`.
///
/// Per-function problems (an unsolvable graph, a function without lines)
/// are logged and do not fail the pair; every [`ErrorKind`] does, leaving
/// `tables` without the pair's contribution.
///
/// # Errors
///
/// Any [`ErrorKind`] of this crate, annotated with the offending file.
///
/// [`ErrorKind`]: ./error/enum.ErrorKind.html
pub fn process_pair(data_file: &Path, tables: &mut Tables) -> Result<()> {
    let note_file = note_path_for(data_file);

    let mut graph = FlowGraph::from_note_file(&note_file)
        .chain_err(|| format!("processing note file {}", note_file.display()))?;
    if graph.functions.is_empty() {
        return Err(Error::from(ErrorKind::NoFunctions))
            .chain_err(|| format!("processing note file {}", note_file.display()));
    }

    graph
        .attach_counts(data_file)
        .chain_err(|| format!("processing data file {}", data_file.display()))?;

    graph.solve();
    graph.attribute_lines();
    tables.aggregate(&graph);

    Ok(())
}
