//! Process-wide aggregation of per-pair results.
//!
//! Three tables, all keyed by canonical source path, accumulate across every
//! note/data pair processed: function hits, line counts and branch counts.
//! `BTreeMap` keeps them in a deterministic order so the emitted report does
//! not depend on filesystem enumeration.

use graph::{FlowGraph, Function, SourceFile};
use raw::{ArcAttr, BlockAttr};

use std::collections::BTreeMap;

/// Taken count of a branch that was seen but whose source block never ran.
pub const UNKNOWN_TAKEN: i64 = -1;

/// Block ordinal standing in for call-return blocks, keeping them apart
/// from real branching blocks on the same line.
pub const CALL_RETURN_BLOCK: u32 = 9999;

/// Identity of a branch within a source file, ordered by line, then block
/// ordinal, then branch index.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BranchId {
    pub line: u32,
    pub block: u32,
    pub branch: u32,
}

/// Aggregate of one function: where it starts and how often it was entered.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct FunctionRecord {
    pub line: u32,
    pub hit: u64,
}

/// The process-wide aggregate tables.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Tables {
    /// source path -> raw function name -> record.
    pub functions: BTreeMap<String, BTreeMap<String, FunctionRecord>>,
    /// source path -> line number -> cumulative execution count.
    pub lines: BTreeMap<String, BTreeMap<u32, u64>>,
    /// source path -> branch -> cumulative taken count, or
    /// [`UNKNOWN_TAKEN`] while every sighting had an unexecuted source.
    ///
    /// [`UNKNOWN_TAKEN`]: constant.UNKNOWN_TAKEN.html
    pub branches: BTreeMap<String, BTreeMap<BranchId, i64>>,
}

impl Tables {
    pub fn new() -> Tables {
        Tables::default()
    }

    /// Merges one fully attributed pair into the tables.
    pub fn aggregate(&mut self, graph: &FlowGraph) {
        for source in &graph.sources {
            self.aggregate_source(source, &graph.functions);
        }
    }

    fn aggregate_source(&mut self, source: &SourceFile, functions: &[Function]) {
        let src_functions = self.functions.entry(source.name.clone()).or_insert_with(BTreeMap::new);
        let src_lines = self.lines.entry(source.name.clone()).or_insert_with(BTreeMap::new);
        let src_branches = self.branches.entry(source.name.clone()).or_insert_with(BTreeMap::new);

        // Cursor over the source's functions, ascending by first line.
        let mut next_fn = source.functions.iter().peekable();

        for line_number in 1..source.num_lines {
            let line = &source.lines[line_number as usize];

            while let Some(&&fi) = next_fn.peek() {
                let function = &functions[fi];
                if function.line != line_number {
                    break;
                }
                next_fn.next();

                let hit = function.blocks[function.entry_block()].count;
                let exit = &function.blocks[function.exit_block()];
                let mut return_count = exit.count;
                for &arc in &exit.pred {
                    if function.arcs[arc].attr.contains(ArcAttr::FAKE) {
                        return_count = return_count.wrapping_sub(function.arcs[arc].count);
                    }
                }
                debug!("function '{}' called {} returned {}", function.name, hit, return_count);

                let record = src_functions.entry(function.name.clone()).or_insert_with(Default::default);
                record.line = function.line;
                record.hit += hit;
            }

            if line.exists {
                *src_lines.entry(line_number).or_insert(0) += line.count;
            }

            // Branches of every block on this line. The block ordinal skips
            // call-return blocks; the branch index does not skip call arcs,
            // so emitted indices may have gaps.
            let mut block_ordinal = 0;
            let mut branch_index = 0;
            for &(f, b) in &line.blocks {
                let function = &functions[f];
                let block = if function.blocks[b].attr.contains(BlockAttr::CALL_RETURN) {
                    CALL_RETURN_BLOCK
                } else {
                    let ordinal = block_ordinal;
                    block_ordinal += 1;
                    ordinal
                };

                for &arc in &function.blocks[b].succ {
                    let arc = &function.arcs[arc];
                    match classify_branch(arc.attr) {
                        BranchClass::Skipped => {},
                        BranchClass::Call => branch_index += 1,
                        BranchClass::Branch => {
                            let id = BranchId {
                                line: line_number,
                                block,
                                branch: branch_index,
                            };
                            branch_index += 1;
                            let taken = if function.blocks[arc.src].count != 0 {
                                arc.count as i64
                            } else {
                                UNKNOWN_TAKEN
                            };
                            merge_taken(src_branches.entry(id).or_insert(UNKNOWN_TAKEN), taken);
                        },
                    }
                }
            }
        }
    }
}

/// How an arc takes part in branch emission.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum BranchClass {
    /// A call that may not return: consumes a branch index, emits nothing.
    Call,
    /// A real conditional branch: consumes an index and is emitted.
    Branch,
    /// An unconditional arc: not part of branch output at all.
    Skipped,
}

fn classify_branch(attr: ArcAttr) -> BranchClass {
    if attr.contains(ArcAttr::CALL_NON_RETURN) {
        BranchClass::Call
    } else if !attr.contains(ArcAttr::UNCONDITIONAL) {
        BranchClass::Branch
    } else {
        BranchClass::Skipped
    }
}

/// Folds one sighting of a branch into its table entry: known counts add
/// up, a known count supersedes the unknown sentinel, and unknown sightings
/// never disturb a known value.
fn merge_taken(entry: &mut i64, taken: i64) {
    if taken >= 0 {
        if *entry < 0 {
            *entry = taken;
        } else {
            *entry += taken;
        }
    }
}
