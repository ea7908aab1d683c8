//! Propagation of the measured arc counts to every arc and block of a
//! function.
//!
//! The instrumentation only measures the arcs *off* the spanning tree; the
//! rest follow from flow conservation, since every block's count equals the
//! sum of its incoming arcs and the sum of its outgoing arcs. The solver
//! alternates between two work sets until the fixed point: blocks whose
//! count is still unknown but may be summed from one fully-known side, and
//! known blocks that can pin down a single remaining unknown arc.

use graph::{FlowGraph, Function};
use raw::{ArcAttr, BlockAttr};

use fixedbitset::FixedBitSet;

use std::mem;
use std::path::Path;
use std::usize;

impl FlowGraph {
    /// Solves every function's flow graph. Runs after count attachment.
    pub fn solve(&mut self) {
        let FlowGraph {
            ref note_file,
            ref mut functions,
            ..
        } = *self;
        for function in functions.iter_mut() {
            solve_flow_graph(function, note_file);
        }
    }
}

/// Solves the flow graph of one function in place. Unsolvable graphs are
/// reported and left partially counted; the caller proceeds with whatever
/// was deduced.
pub fn solve_flow_graph(function: &mut Function, note_file: &Path) {
    let num_blocks = function.blocks.len();
    if num_blocks < 2 {
        warn!(
            "{}: '{}' lacks entry and/or exit blocks",
            note_file.display(),
            function.name
        );
        return;
    }

    if function.blocks[0].num_pred != 0 {
        warn!("{}: '{}' has arcs to entry block", note_file.display(), function.name);
    } else {
        // We can't deduce the entry block count from its empty predecessor
        // list, so saturate the pending counter.
        function.blocks[0].num_pred = usize::MAX;
    }
    if function.blocks[num_blocks - 1].num_succ != 0 {
        warn!("{}: '{}' has arcs from exit block", note_file.display(), function.name);
    } else {
        function.blocks[num_blocks - 1].num_succ = usize::MAX;
    }

    install_measured_counts(function);

    // Every block starts in the invalid set; blocks that cannot be summed
    // yet simply fall out and return once an arc resolution readmits them.
    let mut invalid = FixedBitSet::with_capacity(num_blocks);
    let mut valid = FixedBitSet::with_capacity(num_blocks);
    let mut draining = FixedBitSet::with_capacity(num_blocks);
    invalid.insert_range(..);

    let mut should_process = true;
    while should_process {
        should_process = false;

        for ix in invalid.ones() {
            should_process = true;
            if try_sum_block(function, ix) {
                valid.insert(ix);
            }
        }
        invalid.clear();

        // `draining` is always empty here; swap it in so newly validated
        // blocks queue up for the next round.
        mem::swap(&mut valid, &mut draining);
        for ix in draining.ones() {
            should_process = true;
            resolve_single_arc(function, ix, Direction::Outgoing, &mut invalid, &mut valid);
            resolve_single_arc(function, ix, Direction::Incoming, &mut invalid, &mut valid);
        }
        draining.clear();
    }

    // If the graph was solved, every block now has a valid count.
    for block in &function.blocks {
        if !block.count_valid {
            warn!(
                "{}: graph is unsolvable for '{}'",
                note_file.display(),
                function.name
            );
            break;
        }
    }
}

/// Copies the data file's counters onto the off-tree arcs, marks
/// unconditional arcs and call-return blocks, and re-sorts successor lists
/// that arrived out of order.
///
/// The counters are consumed in the order arcs appear in the note file, so
/// this must run before any reordering.
fn install_measured_counts(function: &mut Function) {
    let num_blocks = function.blocks.len();
    let mut counts = match function.counts {
        Some(ref counts) => counts.iter(),
        None => [].iter(),
    };

    for ix in 0..num_blocks {
        let mut prev_dst = None;
        let mut out_of_order = false;
        let mut non_fake_succ = 0;

        for pos in 0..function.blocks[ix].succ.len() {
            let arc = function.blocks[ix].succ[pos];
            let (dst, attr) = {
                let arc = &function.arcs[arc];
                (arc.dst, arc.attr)
            };
            if !attr.contains(ArcAttr::FAKE) {
                non_fake_succ += 1;
            }
            if !attr.contains(ArcAttr::ON_TREE) {
                let measured = counts.next().cloned().unwrap_or(0);
                {
                    let arc = &mut function.arcs[arc];
                    arc.count = measured;
                    arc.count_valid = true;
                }
                function.blocks[ix].num_succ -= 1;
                function.blocks[dst].num_pred = function.blocks[dst].num_pred.wrapping_sub(1);
            }
            if prev_dst.map_or(false, |prev| prev > dst) {
                out_of_order = true;
            }
            prev_dst = Some(dst);
        }

        if non_fake_succ == 1 {
            // A single non-fake exit is an unconditional branch. If this
            // block instruments a call and falls through into a block with
            // no other entry, that destination is the call's return site.
            for pos in 0..function.blocks[ix].succ.len() {
                let arc = function.blocks[ix].succ[pos];
                let (dst, attr) = {
                    let arc = &function.arcs[arc];
                    (arc.dst, arc.attr)
                };
                if attr.contains(ArcAttr::FAKE) {
                    continue;
                }
                function.arcs[arc].attr |= ArcAttr::UNCONDITIONAL;
                if function.blocks[ix].attr.contains(BlockAttr::CALL_SITE)
                    && attr.contains(ArcAttr::FALLTHROUGH)
                    && function.blocks[dst].pred.len() == 1
                {
                    function.blocks[dst].attr |= BlockAttr::CALL_RETURN;
                }
            }
        }

        // The compiler normally emits successors in ascending destination
        // order, but sometimes one or two slip; later stages rely on the
        // ascending order.
        if out_of_order {
            let arcs = &function.arcs;
            function.blocks[ix].succ.sort_by_key(|&arc| arcs[arc].dst);
        }
    }
}

enum Direction {
    Outgoing,
    Incoming,
}

/// Tries to compute an invalid block's count by summing a fully-resolved
/// side. Returns whether the block became valid.
fn try_sum_block(function: &mut Function, ix: usize) -> bool {
    let total = {
        let block = &function.blocks[ix];
        if block.num_succ == 0 {
            block.succ.iter().map(|&arc| function.arcs[arc].count).sum()
        } else if block.num_pred == 0 {
            block.pred.iter().map(|&arc| function.arcs[arc].count).sum()
        } else {
            return false;
        }
    };
    let block = &mut function.blocks[ix];
    block.count = total;
    block.count_valid = true;
    true
}

/// For a valid block with exactly one unresolved arc on the given side,
/// deduces that arc's count from conservation and queues the block at the
/// arc's other end on whichever work set now applies to it.
fn resolve_single_arc(
    function: &mut Function,
    ix: usize,
    direction: Direction,
    invalid: &mut FixedBitSet,
    valid: &mut FixedBitSet,
) {
    let (pending, outgoing) = match direction {
        Direction::Outgoing => (function.blocks[ix].num_succ, true),
        Direction::Incoming => (function.blocks[ix].num_pred, false),
    };
    if pending != 1 {
        return;
    }

    let (inv_arc, total) = {
        let block = &function.blocks[ix];
        let chain = if outgoing { &block.succ } else { &block.pred };
        let mut total = block.count;
        let mut inv_arc = None;
        for &arc in chain {
            total = total.wrapping_sub(function.arcs[arc].count);
            if !function.arcs[arc].count_valid {
                inv_arc = Some(arc);
            }
        }
        match inv_arc {
            Some(arc) => (arc, total),
            None => return, // bookkeeping says one pending, the chain disagrees
        }
    };

    let other = {
        let arc = &mut function.arcs[inv_arc];
        arc.count = total;
        arc.count_valid = true;
        if outgoing {
            arc.dst
        } else {
            arc.src
        }
    };
    if outgoing {
        function.blocks[ix].num_succ -= 1;
        function.blocks[other].num_pred = function.blocks[other].num_pred.wrapping_sub(1);
    } else {
        function.blocks[ix].num_pred -= 1;
        function.blocks[other].num_succ = function.blocks[other].num_succ.wrapping_sub(1);
    }

    let other_block = &function.blocks[other];
    let other_pending = if outgoing {
        other_block.num_pred
    } else {
        other_block.num_succ
    };
    if other_block.count_valid {
        if other_pending == 1 {
            valid.insert(other);
        }
    } else if other_pending == 0 {
        invalid.insert(other);
    }
}
