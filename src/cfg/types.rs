//! Core types for closure control-flow graphs.
//!
//! A [`Closure`] is one function's graph: a dense array of [`Block`]s linked
//! by typed [`Terminator`]s, plus the closure's variable table and its
//! lexically nested child closures. Blocks 0 and 1 are reserved in every
//! closure for the unified return and throw exits; real control flow starts
//! at `entry` (block 2).
//!
//! All types serialize with the `type`-tagged layout consumers of the JSON
//! form expect (`JumpTerminator`, `IfTerminator`, `VariableId`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::NodeRef;

// ============================================================================
// Operands
// ============================================================================

/// A named variable occurrence: a source identifier or a `~{n}` temporary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableId {
    pub identifier: String,
    /// The use-site this occurrence came from, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeRef>,
}

impl VariableId {
    pub fn new(identifier: impl Into<String>, node: Option<NodeRef>) -> Self {
        VariableId {
            identifier: identifier.into(),
            node,
        }
    }
}

/// A literal constant captured from the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeRef>,
}

/// A terminator operand: either a variable reference or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operand {
    #[serde(rename = "VariableId")]
    Var(VariableId),
    #[serde(rename = "Literal")]
    Literal(Literal),
}

impl Operand {
    /// The identifier if this operand is a variable reference.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Operand::Var(var) => Some(&var.identifier),
            Operand::Literal(_) => None,
        }
    }
}

// ============================================================================
// Blocks and terminators
// ============================================================================

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Terminator {
    /// Unconditional transfer to `next`.
    #[serde(rename = "JumpTerminator")]
    Jump {
        next: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<NodeRef>,
    },
    /// Two-way branch on `predicate`.
    #[serde(rename = "IfTerminator")]
    If {
        predicate: Operand,
        consequent: usize,
        alternate: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<NodeRef>,
    },
    /// Function return carrying `result`. Only block 0 ends this way.
    #[serde(rename = "ReturnTerminator")]
    Return {
        result: Operand,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<NodeRef>,
    },
    /// Exception exit carrying `exception`. Only block 1 ends this way.
    #[serde(rename = "ThrowTerminator")]
    Throw {
        exception: Operand,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<NodeRef>,
    },
}

impl Terminator {
    pub fn jump(next: usize) -> Self {
        Terminator::Jump { next, node: None }
    }

    /// Normal-flow successors, in branch order. Exception successors live on
    /// the block, not the terminator.
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Terminator::Jump { next, .. } => vec![*next],
            Terminator::If {
                consequent,
                alternate,
                ..
            } => vec![*consequent, *alternate],
            Terminator::Return { .. } | Terminator::Throw { .. } => Vec::new(),
        }
    }

    /// Apply `f` to every normal-flow target id in place.
    pub fn retarget(&mut self, mut f: impl FnMut(&mut usize)) {
        match self {
            Terminator::Jump { next, .. } => f(next),
            Terminator::If {
                consequent,
                alternate,
                ..
            } => {
                f(consequent);
                f(alternate);
            }
            Terminator::Return { .. } | Terminator::Throw { .. } => {}
        }
    }
}

/// A basic block: an ordered operation-tag trace plus one terminator.
///
/// `exceptions` lists the blocks control may transfer to if any operation in
/// this block throws, innermost handler first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: usize,
    pub body: Vec<String>,
    pub exceptions: Vec<usize>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(id: usize, terminator: Terminator) -> Self {
        Block {
            id,
            body: Vec::new(),
            exceptions: Vec::new(),
            terminator,
        }
    }

    /// True if any terminator target or exception target equals `id`.
    pub fn references(&self, id: usize) -> bool {
        self.terminator.successors().contains(&id) || self.exceptions.contains(&id)
    }
}

// ============================================================================
// Closures
// ============================================================================

/// A declared or temporary variable with every recorded use-site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub identifier: String,
    pub usage_sites: Vec<NodeRef>,
}

impl Variable {
    pub fn new(identifier: impl Into<String>) -> Self {
        Variable {
            identifier: identifier.into(),
            usage_sites: Vec::new(),
        }
    }
}

/// A nested closure together with the temporary holding its produced value
/// in the parent's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildClosure {
    pub value: VariableId,
    pub closure: Closure,
}

/// One function's control-flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    /// Declared name, `"Root"` for the program, or a generated
    /// `Anonymous{n}` for unnamed function expressions.
    pub name: String,
    /// All local variables, sorted by identifier.
    pub variables: Vec<Variable>,
    /// Declared parameters in source order.
    pub parameters: Vec<VariableId>,
    /// Nested closures in discovery order.
    pub children: Vec<ChildClosure>,
    /// First real block, always 2.
    pub entry: usize,
    /// The unified return block, always 0.
    pub exit: usize,
    /// The unified throw block, always 1.
    pub raise: usize,
    /// Dense block array; `blocks[i].id == i`.
    pub blocks: Vec<Block>,
    pub strict: bool,
    pub node: NodeRef,
    /// Name of the enclosing closure, absent on the analysis root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_closure: Option<String>,
    /// Id of the placeholder block this closure occupies in its parent's
    /// graph; the flattener splices the closure's blocks over it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_block_id: Option<usize>,
}

// ============================================================================
// Flattened output
// ============================================================================

/// Result of flattening a closure tree: the inlined block array, the flat
/// edge list (normal and exception edges, duplicates preserved), and the
/// per-block operation tags aligned with `blocks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatCfg {
    pub blocks: Vec<Block>,
    pub edges: Vec<(usize, usize)>,
    pub ops: Vec<Vec<String>>,
}
