//! Control-flow graph extraction.
//!
//! The pipeline runs in three stages over an ESTree-shaped JSON tree:
//! [`analyzer`] builds one [`Closure`] per lexical function, [`simplify`]
//! prunes dead blocks inside the analyzer, and [`flatten`] inlines nested
//! closures into a single [`FlatCfg`] up to a chosen depth.
//!
//! ```no_run
//! use serde_json::json;
//!
//! let program = json!({"type": "Program", "body": []});
//! let flat = closure_cfg::cfg::extract(&program, 2)?;
//! for (from, to) in &flat.edges {
//!     println!("{from} -> {to}");
//! }
//! # Ok::<(), closure_cfg::FlowError>(())
//! ```

pub mod analyzer;
pub mod flatten;
pub mod simplify;
pub mod types;

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{FlowError, Result};

pub use analyzer::{analyze, analyze_with_options, AnalyzeOptions};
pub use flatten::{extract_edges_and_ops, flatten};
pub use types::{
    Block, ChildClosure, Closure, FlatCfg, Literal, Operand, Terminator, Variable, VariableId,
};

/// Analyze `root` and flatten the result in one step.
pub fn extract(root: &Value, depth: usize) -> Result<FlatCfg> {
    let closure = analyze(root)?;
    flatten(&closure, depth)
}

/// Read an ESTree JSON file (as emitted by `esprima` or `acorn`) and
/// extract its flattened graph.
pub fn extract_from_file(path: impl AsRef<Path>, depth: usize) -> Result<FlatCfg> {
    let path = path.as_ref();
    debug!(path = %path.display(), depth, "extracting graph from file");
    let source = fs::read_to_string(path).map_err(|e| FlowError::io_with_path(e, path))?;
    let root: Value = serde_json::from_str(&source)?;
    extract(&root, depth)
}
