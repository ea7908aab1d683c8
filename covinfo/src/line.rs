//! Attribution of block counts to source lines.
//!
//! Summing the counts of every block on a line would overstate it: a line
//! whose blocks loop among themselves is entered once but its blocks count
//! every iteration. The right value is the flow *entering* the line's
//! sub-graph plus the flow around each elementary cycle inside it. Cycles
//! are found with the search of Tiernan, "An Efficient Search Algorithm to
//! Find the Elementary Circuits of a Graph" (CACM, Dec 1970); each cycle
//! contributes the smallest working count along it, which is then drained
//! from every arc of the cycle so overlapping cycles are not double-counted.

use graph::{Block, BlockRole, Coverage, FlowGraph, Function, LineToken, SourceFile, NO_LINE};
use raw::ArcAttr;

use std::mem;
use std::path::Path;

impl FlowGraph {
    /// Maps every solved block count onto source lines and computes each
    /// line's execution count. Must run after the solver; runs once.
    pub fn attribute_lines(&mut self) {
        for source in &mut self.sources {
            source.lines = vec![Default::default(); source.num_lines as usize];
        }

        let FlowGraph {
            ref note_file,
            ref mut sources,
            ref mut functions,
            ..
        } = *self;

        for fi in 0..functions.len() {
            add_line_counts(sources, functions, fi, note_file);
        }
        for si in 0..sources.len() {
            accumulate_line_counts(&mut sources[si], functions);
            let coverage = &sources[si].coverage;
            debug!(
                "{}: {}/{} lines, {}/{} branches ({} taken), {}/{} calls",
                sources[si].name,
                coverage.lines_executed,
                coverage.lines,
                coverage.branches_executed,
                coverage.branches,
                coverage.branches_taken,
                coverage.calls_executed,
                coverage.calls
            );
        }
    }
}

/// Scans one function's blocks, adds each block's count to every line it
/// mentions, and chains interior blocks onto the last line they mention so
/// the per-line sub-graphs can be cycle-counted later.
fn add_line_counts(sources: &mut [SourceFile], functions: &mut [Function], fi: usize, note_file: &Path) {
    let num_blocks = functions[fi].blocks.len();
    // The last source/line pair seen; carries over between blocks so a
    // block without line information lands on its predecessor's line.
    let mut last: Option<(usize, u32)> = None;

    for ix in 0..num_blocks {
        let (tokens, count) = {
            let block = &mut functions[fi].blocks[ix];
            let role = mem::replace(&mut block.role, BlockRole::Cycle { ident: NO_LINE, arc: None });
            let tokens = match role {
                BlockRole::Lines(tokens) => tokens,
                BlockRole::Cycle { .. } => Vec::new(),
            };
            (tokens, block.count)
        };

        if count != 0 && ix != 0 && ix + 1 != num_blocks {
            functions[fi].blocks_executed += 1;
        }

        let mut current_src = None;
        for token in &tokens {
            match *token {
                LineToken::Source(src) => current_src = Some(src),
                LineToken::Line(number) => if let Some(src) = current_src {
                    let line = &mut sources[src].lines[number as usize];
                    line.exists = true;
                    line.count += count;
                    last = Some((src, number));
                },
            }
        }

        if ix == 0 || ix + 1 == num_blocks {
            continue; // entry and exit blocks are never chained onto lines
        }
        let (src, number) = match last {
            Some(pair) => pair,
            None => (functions[fi].src, functions[fi].line),
        };
        sources[src].lines[number as usize].blocks.push((fi, ix));
    }

    if last.is_none() {
        warn!("{}: no lines for '{}'", note_file.display(), functions[fi].name);
    }
}

/// Computes the final count of every line of one source and updates the
/// source's coverage totals.
fn accumulate_line_counts(source: &mut SourceFile, functions: &mut [Function]) {
    for ix in 0..source.lines.len() {
        let on_line = source.lines[ix].blocks.clone();

        if !on_line.is_empty() {
            // Stamp the line's identity into every block's workspace so the
            // cycle search can tell the line's sub-graph from the rest.
            for &(f, b) in &on_line {
                if let BlockRole::Cycle { ref mut ident, .. } = functions[f].blocks[b].role {
                    *ident = ix;
                }
            }

            let mut count = 0;
            for &(f, b) in &on_line {
                let function = &mut functions[f];
                for pos in 0..function.blocks[b].pred.len() {
                    let arc = function.blocks[b].pred[pos];
                    let (src, arc_count, attr) = {
                        let arc = &function.arcs[arc];
                        (arc.src, arc.count, arc.attr)
                    };
                    if cycle_ident(&function.blocks[src]) != ix {
                        count += arc_count;
                    }
                    add_branch_counts(&mut source.coverage, attr, arc_count, function.blocks[src].count);
                }
                // Seed the working counts for the cycle search.
                for pos in 0..function.blocks[b].succ.len() {
                    let arc = function.blocks[b].succ[pos];
                    let arc = &mut function.arcs[arc];
                    arc.cs_count = arc.count;
                }
            }

            for &(f, root) in &on_line {
                count += reap_cycles(&mut functions[f], root, ix);
            }

            source.lines[ix].count = count;
        }

        if source.lines[ix].exists {
            source.coverage.lines += 1;
            if source.lines[ix].count != 0 {
                source.coverage.lines_executed += 1;
            }
        }
    }
}

/// Increments the coverage totals according to one arc.
pub fn add_branch_counts(coverage: &mut Coverage, attr: ArcAttr, arc_count: u64, src_count: u64) {
    if attr.contains(ArcAttr::CALL_NON_RETURN) {
        coverage.calls += 1;
        if src_count != 0 {
            coverage.calls_executed += 1;
        }
    } else if !attr.contains(ArcAttr::UNCONDITIONAL) {
        coverage.branches += 1;
        if src_count != 0 {
            coverage.branches_executed += 1;
        }
        if arc_count != 0 {
            coverage.branches_taken += 1;
        }
    }
}

fn cycle_ident(block: &Block) -> usize {
    match block.role {
        BlockRole::Cycle { ident, .. } => ident,
        BlockRole::Lines(_) => NO_LINE,
    }
}

fn cycle_arc(block: &Block) -> Option<usize> {
    match block.role {
        BlockRole::Cycle { arc, .. } => arc,
        BlockRole::Lines(_) => None,
    }
}

fn set_cycle_arc(block: &mut Block, value: Option<usize>) {
    if let BlockRole::Cycle { ref mut arc, .. } = block.role {
        *arc = value;
    }
}

fn set_cycle_ident(block: &mut Block, value: usize) {
    if let BlockRole::Cycle { ref mut ident, .. } = block.role {
        *ident = value;
    }
}

/// Finds every elementary cycle through `root` that stays on line `ix` and
/// returns the summed cycle flow.
///
/// The search path is held as a per-block back-pointer to the arc taken to
/// enter it; the position of that arc in its source's successor list doubles
/// as the resumption point when the path unwinds.
fn reap_cycles(function: &mut Function, root: usize, ix: usize) -> u64 {
    let mut total = 0;
    let mut head = root;
    let mut pos = 0;

    loop {
        // Try to extend the path with an unused successor of `head` that
        // stays on this line and is not already on the path.
        let mut extended = false;
        while pos < function.blocks[head].succ.len() {
            let arc = function.blocks[head].succ[pos];
            let (dst, attr) = {
                let arc = &function.arcs[arc];
                (arc.dst, arc.attr)
            };
            if attr.contains(ArcAttr::CYCLE) || cycle_ident(&function.blocks[dst]) != ix || cycle_arc(&function.blocks[dst]).is_some() {
                pos += 1;
                continue;
            }

            if dst == root {
                // A closing arc: drain the cycle by its minimum working
                // count and retire the arc that carried it.
                let mut cycle_count = function.arcs[arc].cs_count;
                let mut cycle_arc_id = arc;
                let mut probe = head;
                while let Some(path_arc) = cycle_arc(&function.blocks[probe]) {
                    if cycle_count > function.arcs[path_arc].cs_count {
                        cycle_count = function.arcs[path_arc].cs_count;
                        cycle_arc_id = path_arc;
                    }
                    probe = function.arcs[path_arc].src;
                }

                total += cycle_count;
                function.arcs[cycle_arc_id].attr |= ArcAttr::CYCLE;

                function.arcs[arc].cs_count -= cycle_count;
                let mut probe = head;
                while let Some(path_arc) = cycle_arc(&function.blocks[probe]) {
                    function.arcs[path_arc].cs_count -= cycle_count;
                    probe = function.arcs[path_arc].src;
                }

                // Unwind the path to the retired arc's source and resume
                // scanning there, just past the arc we came down through.
                let mut resume = arc;
                while head != function.arcs[cycle_arc_id].src {
                    let path_arc = match cycle_arc(&function.blocks[head]) {
                        Some(path_arc) => path_arc,
                        None => break, // the path always reaches the retired arc
                    };
                    set_cycle_arc(&mut function.blocks[head], None);
                    resume = path_arc;
                    head = function.arcs[path_arc].src;
                }
                pos = succ_position(function, head, resume) + 1;
                continue;
            }

            // Add the new block to the path and restart from it.
            set_cycle_arc(&mut function.blocks[dst], Some(arc));
            head = dst;
            pos = 0;
            extended = true;
            break;
        }
        if extended {
            continue;
        }

        // Could not extend the path: back up one block, or finish if the
        // path is already empty.
        match cycle_arc(&function.blocks[head]) {
            Some(path_arc) => {
                set_cycle_arc(&mut function.blocks[head], None);
                let prev = function.arcs[path_arc].src;
                pos = succ_position(function, prev, path_arc) + 1;
                head = prev;
            },
            None => {
                // No cycle through this root remains; take it off the line
                // so later roots do not route through it.
                set_cycle_ident(&mut function.blocks[root], NO_LINE);
                return total;
            },
        }
    }
}

/// Position of an arc within its source block's successor list.
fn succ_position(function: &Function, block: usize, arc: usize) -> usize {
    function.blocks[block]
        .succ
        .iter()
        .position(|&a| a == arc)
        .unwrap_or(function.blocks[block].succ.len())
}
