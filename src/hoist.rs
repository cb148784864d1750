//! Hoisted declaration discovery.
//!
//! Before a closure body is lowered, every name it declares must already be
//! registered so that uses preceding the declaration resolve to the local
//! binding rather than leaking outward. This walks a statement list the way
//! the runtime hoists: through blocks, loops, branches, try/switch arms and
//! labels, but never across a nested function or class body boundary.

use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::ast;

/// Collect the names declared by a statement list, in first-occurrence
/// order without duplicates.
///
/// `var`/`let`/`const` declarators with identifier patterns contribute
/// their names, as do function and class declarations. Destructuring
/// patterns are skipped. Nested closures are opaque: a `FunctionDeclaration`
/// contributes its own name but nothing from inside its body.
pub fn hoisted_names(statements: &[Value]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = FxHashSet::default();
    for statement in statements {
        visit(statement, &mut names, &mut seen);
    }
    names
}

fn visit(node: &Value, names: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    match ast::kind(node) {
        "LabeledStatement" | "WithStatement" | "WhileStatement" | "DoWhileStatement" => {
            visit_opt(node.get("body"), names, seen);
        }
        "BlockStatement" => {
            if let Some(body) = node.get("body").and_then(Value::as_array) {
                for statement in body {
                    visit(statement, names, seen);
                }
            }
        }
        "TryStatement" => {
            visit_opt(node.get("block"), names, seen);
            if let Some(handler) = ast::opt_field(node, "handler") {
                visit_opt(handler.get("body"), names, seen);
            }
            // Older parsers emit a `handlers` array instead.
            if let Some(handlers) = node.get("handlers").and_then(Value::as_array) {
                for handler in handlers {
                    visit_opt(handler.get("body"), names, seen);
                }
            }
            visit_opt(ast::opt_field(node, "finalizer"), names, seen);
        }
        "IfStatement" => {
            visit_opt(node.get("consequent"), names, seen);
            visit_opt(ast::opt_field(node, "alternate"), names, seen);
        }
        "SwitchStatement" => {
            if let Some(cases) = node.get("cases").and_then(Value::as_array) {
                for case in cases {
                    if let Some(body) = case.get("consequent").and_then(Value::as_array) {
                        for statement in body {
                            visit(statement, names, seen);
                        }
                    }
                }
            }
        }
        "ForStatement" => {
            if let Some(init) = ast::opt_field(node, "init") {
                if ast::kind(init) == "VariableDeclaration" {
                    visit(init, names, seen);
                }
            }
            visit_opt(node.get("body"), names, seen);
        }
        "ForInStatement" | "ForOfStatement" => {
            if let Some(left) = node.get("left") {
                if ast::kind(left) == "VariableDeclaration" {
                    visit(left, names, seen);
                }
            }
            visit_opt(node.get("body"), names, seen);
        }
        "VariableDeclaration" => {
            if let Some(declarations) = node.get("declarations").and_then(Value::as_array) {
                for declarator in declarations {
                    if let Some(name) = declarator
                        .get("id")
                        .and_then(|id| id.get("name"))
                        .and_then(Value::as_str)
                    {
                        push_name(name, names, seen);
                    }
                }
            }
        }
        "FunctionDeclaration" | "ClassDeclaration" => {
            if let Some(name) = node
                .get("id")
                .and_then(|id| id.get("name"))
                .and_then(Value::as_str)
            {
                push_name(name, names, seen);
            }
        }
        _ => {}
    }
}

fn visit_opt(node: Option<&Value>, names: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    if let Some(node) = node {
        visit(node, names, seen);
    }
}

fn push_name(name: &str, names: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    if seen.insert(name.to_string()) {
        names.push(name.to_string());
    }
}
