//! Depth-bounded closure inlining and edge extraction.
//!
//! The analyzer leaves every nested closure behind a single placeholder
//! block in its parent's graph. Flattening replaces that placeholder with
//! the child's real blocks (minus the child's reserved return/throw pair),
//! renumbering both sides so the merged array stays dense:
//!
//!   - child ids shift up to start at the splice point;
//!   - a child edge into its discarded return block is rewired to the
//!     parent's continuation (the placeholder's jump target);
//!   - a child edge into its discarded throw block keeps targeting the
//!     parent's raise block (block 1 in both numberings);
//!   - parent ids beyond the splice point shift up by the inserted length.
//!
//! Children are flattened innermost-first, each at one depth less, so a
//! depth of `n` inlines `n - 1` levels of nesting. Depth 1 is the identity.
//! The caller's closure is never mutated; everything happens on a clone.

use tracing::debug;

use crate::cfg::types::{Block, Closure, FlatCfg, Terminator};
use crate::error::{FlowError, Result};

/// Inline nested closures into `closure` up to `depth` levels, then emit
/// the flat `(blocks, edges, ops)` view.
pub fn flatten(closure: &Closure, depth: usize) -> Result<FlatCfg> {
    if depth < 1 {
        return Err(FlowError::InvalidDepth(depth));
    }
    let mut root = closure.clone();
    inline_children(&mut root, depth);
    let (edges, ops) = extract_edges_and_ops(&root.blocks);
    Ok(FlatCfg {
        blocks: root.blocks,
        edges,
        ops,
    })
}

/// Every control transfer in `blocks` as a flat edge list, plus the
/// per-block operation tags. Edges come out in block order: normal
/// successors first, then exception targets. Duplicates are preserved.
pub fn extract_edges_and_ops(blocks: &[Block]) -> (Vec<(usize, usize)>, Vec<Vec<String>>) {
    let mut edges = Vec::new();
    let mut ops = Vec::with_capacity(blocks.len());
    for block in blocks {
        ops.push(block.body.clone());
        for successor in block.terminator.successors() {
            edges.push((block.id, successor));
        }
        for &target in &block.exceptions {
            edges.push((block.id, target));
        }
    }
    (edges, ops)
}

fn inline_children(closure: &mut Closure, depth: usize) {
    if depth <= 1 {
        return;
    }
    let mut children = std::mem::take(&mut closure.children);
    for child in &mut children {
        inline_children(&mut child.closure, depth - 1);
    }

    // Each splice grows the parent, shifting the recorded placeholder ids
    // of the children still to come.
    let mut offset = 0usize;
    for child in children {
        let mut fragment = child.closure;
        let splice_at = match fragment.parent_block_id {
            Some(id) => id + offset,
            None => {
                debug_assert!(false, "child closure without a placeholder block");
                continue;
            }
        };
        let inserted = fragment.blocks.len() - 3;

        debug!(
            child = %fragment.name,
            splice_at,
            inserted,
            "inlining closure into parent graph"
        );

        let placeholder = &closure.blocks[splice_at];
        let continuation = match placeholder.terminator {
            Terminator::Jump { next, .. } => {
                if next > splice_at {
                    next + inserted
                } else {
                    next
                }
            }
            ref other => {
                debug_assert!(false, "placeholder block without a jump: {other:?}");
                return;
            }
        };
        let inherited_exceptions = placeholder.exceptions.clone();

        renumber_child(
            &mut fragment.blocks,
            splice_at - 2,
            continuation,
            &inherited_exceptions,
        );
        renumber_parent(&mut closure.blocks, splice_at, inserted);
        closure
            .blocks
            .splice(splice_at..splice_at + 1, fragment.blocks.drain(2..));
        offset += inserted;
    }
}

/// Renumber a child fragment for insertion at `shift + 2`. References to
/// the child's reserved blocks resolve to `continuation` (return) or stay
/// at 1 (throw, the parent's raise block).
fn renumber_child(blocks: &mut [Block], shift: usize, continuation: usize, inherited: &[usize]) {
    for block in blocks.iter_mut() {
        block.id += shift;

        block.terminator.retarget(|target| {
            if *target > 1 {
                *target += shift;
            } else if *target == 0 {
                *target = continuation;
            }
        });

        let mut exceptions: Vec<usize> = inherited.to_vec();
        for &target in block.exceptions.iter() {
            let target = if target > 1 { target + shift } else { target };
            if !exceptions.contains(&target) {
                exceptions.push(target);
            }
        }
        block.exceptions = exceptions;
    }
}

/// Shift every parent id and reference beyond the splice point up by the
/// inserted length. References to the splice point itself now denote the
/// child's entry block and stay put.
fn renumber_parent(blocks: &mut [Block], splice_at: usize, inserted: usize) {
    for block in blocks.iter_mut() {
        if block.id > splice_at {
            block.id += inserted;
        }
        block.terminator.retarget(|target| {
            if *target > splice_at {
                *target += inserted;
            }
        });
        for target in block.exceptions.iter_mut() {
            if *target > splice_at {
                *target += inserted;
            }
        }
    }
}
