//! Dead-block elimination.
//!
//! The block pass splits eagerly: every return, closure placeholder, and
//! loop head leaves an empty continuation block behind, and break/continue
//! leave stretches nothing ever jumps to. This pass deletes those blocks
//! and contracts the edges through them so the surviving graph is dense
//! again.
//!
//! One linear pass over a single candidate collection. A block whose only
//! predecessor is itself removed in the same pass is not re-examined; the
//! analyzer runs this exactly once per closure.

use tracing::debug;

use crate::cfg::types::{Block, Terminator};

/// Remove every block that is empty or has no predecessor, contracting
/// references through removed blocks and renumbering the survivors.
///
/// Blocks 0, 1 and the entry block are never removed. A self-loop counts as
/// a predecessor. Returns the removed ids as they were numbered on entry,
/// ascending, so callers holding block ids can repair them.
pub fn simplify(blocks: &mut Vec<Block>, entry: usize) -> Vec<usize> {
    let removable: Vec<usize> = blocks
        .iter()
        .filter(|b| {
            b.id > 1 && b.id != entry && (b.body.is_empty() || !has_predecessor(blocks, b.id))
        })
        .map(|b| b.id)
        .collect();

    // Deleting ascending shifts later candidates down one per removal.
    for (already_removed, original) in removable.iter().enumerate() {
        remove_block(blocks, original - already_removed);
    }

    if !removable.is_empty() {
        debug!(removed = ?removable, remaining = blocks.len(), "simplified block graph");
    }
    removable
}

fn has_predecessor(blocks: &[Block], id: usize) -> bool {
    blocks.iter().any(|b| b.references(id))
}

/// Delete `blocks[id]`, forwarding every reference to it through its own
/// terminator and shifting all higher ids down by one.
fn remove_block(blocks: &mut Vec<Block>, id: usize) {
    let removed = blocks.remove(id);
    let shift = |target: usize| if target > id { target - 1 } else { target };

    for block in blocks.iter_mut() {
        if block.id > id {
            block.id -= 1;
        }

        // Exception entries through the removed block land on wherever it
        // would have transferred control.
        let mut exceptions = Vec::with_capacity(block.exceptions.len());
        for &target in &block.exceptions {
            if target == id {
                match &removed.terminator {
                    Terminator::Jump { next, .. } => exceptions.push(shift(*next)),
                    Terminator::If {
                        consequent,
                        alternate,
                        ..
                    } => {
                        exceptions.push(shift(*consequent));
                        exceptions.push(shift(*alternate));
                    }
                    Terminator::Return { .. } | Terminator::Throw { .. } => {}
                }
            } else {
                exceptions.push(shift(target));
            }
        }
        let mut seen = Vec::with_capacity(exceptions.len());
        for target in exceptions {
            if !seen.contains(&target) {
                seen.push(target);
            }
        }
        block.exceptions = seen;

        block.terminator = contract(std::mem::replace(&mut block.terminator, Terminator::jump(0)), id, &removed);
    }
}

/// Rewrite one terminator after `id` was removed: shift higher targets
/// down, and forward targets equal to `id` through the removed block's own
/// terminator. A jump into a removed branch block becomes that branch.
fn contract(terminator: Terminator, id: usize, removed: &Block) -> Terminator {
    let shift = |target: usize| if target > id { target - 1 } else { target };
    let forward = |target: usize| -> Option<usize> {
        if target != id {
            return Some(shift(target));
        }
        match &removed.terminator {
            Terminator::Jump { next, .. } => Some(shift(*next)),
            _ => None,
        }
    };

    match terminator {
        Terminator::Jump { next, node } => match forward(next) {
            Some(next) => Terminator::Jump { next, node },
            None => match &removed.terminator {
                Terminator::If {
                    predicate,
                    consequent,
                    alternate,
                    node: if_node,
                } => Terminator::If {
                    predicate: predicate.clone(),
                    consequent: shift(*consequent),
                    alternate: shift(*alternate),
                    node: if_node.clone(),
                },
                _ => Terminator::Jump { next: shift(next), node },
            },
        },
        Terminator::If {
            predicate,
            consequent,
            alternate,
            node,
        } => {
            let consequent = match forward(consequent) {
                Some(target) => target,
                None => match &removed.terminator {
                    Terminator::If { consequent, .. } => shift(*consequent),
                    _ => shift(consequent),
                },
            };
            let alternate = match forward(alternate) {
                Some(target) => target,
                None => match &removed.terminator {
                    Terminator::If { alternate, .. } => shift(*alternate),
                    _ => shift(alternate),
                },
            };
            Terminator::If {
                predicate,
                consequent,
                alternate,
                node,
            }
        }
        done @ (Terminator::Return { .. } | Terminator::Throw { .. }) => done,
    }
}
