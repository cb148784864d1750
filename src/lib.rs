//! Closure control-flow graphs for ESTree syntax trees.
//!
//! Turns a parsed program of a closure-based, exception-capable language
//! into explicit per-function control-flow graphs: ordered basic blocks
//! linked by typed terminators, with nested closures deferred behind
//! placeholder blocks and inlined on demand.
//!
//! # Pipeline
//! - [`cfg::analyze`] - one [`Closure`] graph per lexical function
//! - [`cfg::flatten`] - depth-bounded inlining of nested closures
//! - [`cfg::extract`] / [`cfg::extract_from_file`] - both steps in one call
//!
//! # Input
//! Syntax trees are consumed as untyped [`serde_json::Value`]s in the shape
//! standard ECMAScript parsers (esprima, acorn) emit: objects with a
//! `"type"` discriminator. No parser is bundled.
//!
//! # Graph shape
//! Every closure reserves block 0 for its unified return and block 1 for
//! its unified throw; real control flow starts at block 2. Each block lists
//! the exception handlers it can reach, so the flat edge list covers both
//! normal and exceptional transfers.

pub mod ast;
pub mod cfg;
pub mod error;
pub mod hoist;

pub use ast::NodeRef;
pub use cfg::{
    analyze, analyze_with_options, extract, extract_from_file, flatten, AnalyzeOptions, Block,
    ChildClosure, Closure, FlatCfg, Literal, Operand, Terminator, Variable, VariableId,
};
pub use error::{FlowError, Result};
