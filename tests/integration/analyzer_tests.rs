//! Scenario tests for the closure analyzer.
//!
//! Each test lowers a small program and pins the exact block layout the
//! analyzer must produce after simplification: operation traces, branch
//! targets, and exception edges.

use closure_cfg::{analyze, Closure, Operand, Terminator};
use serde_json::{json, Value};

fn identifier(name: &str) -> Value {
    json!({"type": "Identifier", "name": name})
}

fn literal(value: Value) -> Value {
    json!({"type": "Literal", "value": value})
}

fn block(body: Vec<Value>) -> Value {
    json!({"type": "BlockStatement", "body": body})
}

fn function(name: &str, params: Vec<Value>, body: Vec<Value>) -> Value {
    json!({
        "type": "FunctionDeclaration",
        "id": identifier(name),
        "params": params,
        "body": block(body)
    })
}

fn return_stmt(argument: Value) -> Value {
    json!({"type": "ReturnStatement", "argument": argument})
}

fn expr_stmt(expression: Value) -> Value {
    json!({"type": "ExpressionStatement", "expression": expression})
}

fn jump_target(terminator: &Terminator) -> usize {
    match terminator {
        Terminator::Jump { next, .. } => *next,
        other => panic!("expected jump, got {other:?}"),
    }
}

fn branch_targets(terminator: &Terminator) -> (usize, usize) {
    match terminator {
        Terminator::If {
            consequent,
            alternate,
            ..
        } => (*consequent, *alternate),
        other => panic!("expected branch, got {other:?}"),
    }
}

fn predicate_name(terminator: &Terminator) -> &str {
    match terminator {
        Terminator::If { predicate, .. } => predicate
            .as_identifier()
            .unwrap_or_else(|| panic!("predicate is not a variable")),
        other => panic!("expected branch, got {other:?}"),
    }
}

/// Simplification leaves no empty or unreachable block behind (other than
/// the reserved pair and the entry), and every reference stays in range.
fn assert_well_formed(closure: &Closure) {
    for (index, b) in closure.blocks.iter().enumerate() {
        assert_eq!(b.id, index, "{}: ids must be dense", closure.name);
        for target in b.terminator.successors() {
            assert!(target < closure.blocks.len(), "{}: target out of range", closure.name);
        }
        for &target in &b.exceptions {
            assert!(target < closure.blocks.len(), "{}: exception out of range", closure.name);
        }
        if b.id > 2 {
            assert!(!b.body.is_empty(), "{}: block {} is empty", closure.name, b.id);
            assert!(
                closure.blocks.iter().any(|other| other.references(b.id)),
                "{}: block {} has no predecessor",
                closure.name,
                b.id
            );
        }
    }
    assert!(matches!(closure.blocks[0].terminator, Terminator::Return { .. }));
    assert!(matches!(closure.blocks[1].terminator, Terminator::Throw { .. }));
    assert_eq!(closure.entry, 2);
    for child in &closure.children {
        assert_well_formed(&child.closure);
    }
}

#[test]
fn if_else_with_returns() {
    // function f(a) { if (a) { return 1 } else { return 2 } }
    let root = function(
        "f",
        vec![identifier("a")],
        vec![json!({
            "type": "IfStatement",
            "test": identifier("a"),
            "consequent": block(vec![return_stmt(literal(json!(1)))]),
            "alternate": block(vec![return_stmt(literal(json!(2)))])
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 5);

    let entry = &closure.blocks[2];
    assert_eq!(entry.body, vec!["FunctionDeclaration", "IfStatement", "Identifier"]);
    assert_eq!(branch_targets(&entry.terminator), (3, 4));
    assert_eq!(predicate_name(&entry.terminator), "a");
    assert_eq!(entry.exceptions, vec![1]);

    for arm in [&closure.blocks[3], &closure.blocks[4]] {
        assert_eq!(arm.body, vec!["BlockStatement", "ReturnStatement", "Literal"]);
        assert_eq!(jump_target(&arm.terminator), 0);
        assert_eq!(arm.exceptions, vec![1]);
    }
}

#[test]
fn empty_consequent_contributes_only_the_test() {
    // function f(a) { if (a) {} else { return 1 } }
    let root = function(
        "f",
        vec![identifier("a")],
        vec![json!({
            "type": "IfStatement",
            "test": identifier("a"),
            "consequent": block(vec![]),
            "alternate": block(vec![return_stmt(literal(json!(1)))])
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_eq!(closure.blocks.len(), 3);
    assert_eq!(
        closure.blocks[2].body,
        vec!["FunctionDeclaration", "IfStatement", "Identifier"]
    );
    assert_eq!(jump_target(&closure.blocks[2].terminator), 0);
}

#[test]
fn try_throw_catch_exception_flow() {
    // function f() { try { throw 1 } catch (e) { return e } }
    let root = function(
        "f",
        vec![],
        vec![json!({
            "type": "TryStatement",
            "block": block(vec![json!({
                "type": "ThrowStatement",
                "argument": literal(json!(1))
            })]),
            "handler": {
                "type": "CatchClause",
                "param": identifier("e"),
                "body": block(vec![return_stmt(identifier("e"))])
            },
            "finalizer": null
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 5);

    let entry = &closure.blocks[2];
    assert_eq!(entry.body, vec!["FunctionDeclaration", "TryStatement"]);
    assert_eq!(jump_target(&entry.terminator), 4);
    assert_eq!(entry.exceptions, vec![1]);

    let handler = &closure.blocks[3];
    assert_eq!(
        handler.body,
        vec!["CatchClause", "Identifier", "BlockStatement", "ReturnStatement", "Identifier"]
    );
    assert_eq!(jump_target(&handler.terminator), 0);
    assert_eq!(handler.exceptions, vec![1]);

    // The protected block can reach the handler and the raise block.
    let protected = &closure.blocks[4];
    assert_eq!(protected.body, vec!["BlockStatement", "ThrowStatement", "Literal"]);
    assert_eq!(jump_target(&protected.terminator), 3);
    assert_eq!(protected.exceptions, vec![3, 1]);

    // The catch parameter resolves to the exception temporary, so no
    // variable `e` is ever registered.
    let names: Vec<&str> = closure.variables.iter().map(|v| v.identifier.as_str()).collect();
    assert_eq!(names, vec!["this", "~0", "~1", "~2"]);
}

#[test]
fn handler_less_try_keeps_the_enclosing_target() {
    // function f() { try { throw 1 } finally { g() } }
    let root = function(
        "f",
        vec![],
        vec![json!({
            "type": "TryStatement",
            "block": block(vec![json!({
                "type": "ThrowStatement",
                "argument": literal(json!(1))
            })]),
            "handler": null,
            "finalizer": block(vec![expr_stmt(json!({
                "type": "CallExpression",
                "callee": identifier("g"),
                "arguments": []
            }))])
        })],
    );
    // No well-formedness sweep here: the protected block always throws,
    // so the single simplification pass leaves the finalizer orphaned.
    let closure = analyze(&root).unwrap();
    // Reserved blocks carry the whole subtree's kind trace, so only the
    // real body blocks are searched.
    let throwing = closure.blocks[2..]
        .iter()
        .find(|b| b.body.contains(&"ThrowStatement".to_string()))
        .unwrap();
    assert_eq!(jump_target(&throwing.terminator), 1);
    assert_eq!(throwing.exceptions, vec![1]);
}

#[test]
fn while_loop_shape() {
    // function f(n) { while (n) { n; } }
    let root = function(
        "f",
        vec![identifier("n")],
        vec![json!({
            "type": "WhileStatement",
            "test": identifier("n"),
            "body": block(vec![expr_stmt(identifier("n"))])
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 5);

    assert_eq!(closure.blocks[2].body, vec!["FunctionDeclaration", "WhileStatement"]);
    assert_eq!(jump_target(&closure.blocks[2].terminator), 3);

    let test = &closure.blocks[3];
    assert_eq!(test.body, vec!["Identifier"]);
    assert_eq!(branch_targets(&test.terminator), (4, 0));
    assert_eq!(predicate_name(&test.terminator), "n");

    // Loop body jumps back to the test.
    let body = &closure.blocks[4];
    assert_eq!(body.body, vec!["BlockStatement", "ExpressionStatement", "Identifier"]);
    assert_eq!(jump_target(&body.terminator), 3);
}

#[test]
fn for_in_over_declared_binding() {
    // function f(o) { for (var k in o) { k; } }
    let root = function(
        "f",
        vec![identifier("o")],
        vec![json!({
            "type": "ForInStatement",
            "left": json!({
                "type": "VariableDeclaration",
                "kind": "var",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": identifier("k"),
                    "init": null
                }]
            }),
            "right": identifier("o"),
            "body": block(vec![expr_stmt(identifier("k"))])
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 5);

    assert_eq!(
        closure.blocks[2].body,
        vec!["FunctionDeclaration", "ForInStatement", "Identifier"]
    );
    let head = &closure.blocks[3];
    assert_eq!(head.body, vec!["VariableDeclaration", "VariableDeclarator", "Identifier"]);
    assert_eq!(branch_targets(&head.terminator), (4, 0));
    assert_eq!(predicate_name(&head.terminator), "k");
    assert_eq!(jump_target(&closure.blocks[4].terminator), 3);
    assert!(closure.variables.iter().any(|v| v.identifier == "k"));
}

#[test]
fn switch_dispatch_shape() {
    // function f(x) { switch (x) { case 1: g(); break; default: h(); } }
    let call = |callee: &str| {
        expr_stmt(json!({
            "type": "CallExpression",
            "callee": identifier(callee),
            "arguments": []
        }))
    };
    let root = function(
        "f",
        vec![identifier("x")],
        vec![json!({
            "type": "SwitchStatement",
            "discriminant": identifier("x"),
            "cases": [
                {
                    "type": "SwitchCase",
                    "test": literal(json!(1)),
                    "consequent": [call("g"), json!({"type": "BreakStatement", "label": null})]
                },
                {
                    "type": "SwitchCase",
                    "test": null,
                    "consequent": [call("h")]
                }
            ]
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 6);

    assert_eq!(
        closure.blocks[2].body,
        vec!["FunctionDeclaration", "SwitchStatement", "Identifier"]
    );
    assert_eq!(jump_target(&closure.blocks[2].terminator), 3);

    let case = &closure.blocks[3];
    assert_eq!(case.body, vec!["SwitchCase", "Literal"]);
    assert_eq!(branch_targets(&case.terminator), (4, 5));

    // The break is recorded in the case body before the block splits.
    let matched = &closure.blocks[4];
    assert_eq!(
        matched.body,
        vec!["ExpressionStatement", "CallExpression", "Identifier", "BreakStatement"]
    );
    assert_eq!(jump_target(&matched.terminator), 0);

    // The default body gets its marker tag spliced in front.
    let default = &closure.blocks[5];
    assert_eq!(
        default.body,
        vec!["SwitchCase", "ExpressionStatement", "CallExpression", "Identifier"]
    );
    assert_eq!(jump_target(&default.terminator), 0);
}

#[test]
fn labeled_break_leaves_the_loop() {
    // function f(n) { outer: while (n) { break outer; } }
    let root = function(
        "f",
        vec![identifier("n")],
        vec![json!({
            "type": "LabeledStatement",
            "label": identifier("outer"),
            "body": {
                "type": "WhileStatement",
                "test": identifier("n"),
                "body": block(vec![json!({
                    "type": "BreakStatement",
                    "label": identifier("outer")
                })])
            }
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 7);

    // The labeled statement is entered through a patched jump, not a fall
    // into the return block.
    assert_eq!(closure.blocks[2].body, vec!["FunctionDeclaration"]);
    assert_eq!(jump_target(&closure.blocks[2].terminator), 4);
    assert_eq!(closure.blocks[3].body, vec!["LabeledStatement"]);
    assert_eq!(jump_target(&closure.blocks[3].terminator), 0);

    // `break outer` jumps to the label continuation.
    let body = &closure.blocks[6];
    assert_eq!(body.body, vec!["BlockStatement", "BreakStatement"]);
    assert_eq!(jump_target(&body.terminator), 3);
}

#[test]
fn logical_or_short_circuits_to_continuation() {
    // function f(a, b) { var x = a || b; }
    let root = function(
        "f",
        vec![identifier("a"), identifier("b")],
        vec![json!({
            "type": "VariableDeclaration",
            "kind": "var",
            "declarations": [{
                "type": "VariableDeclarator",
                "id": identifier("x"),
                "init": {
                    "type": "LogicalExpression",
                    "operator": "||",
                    "left": identifier("a"),
                    "right": identifier("b")
                }
            }]
        })],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 4);

    let entry = &closure.blocks[2];
    assert_eq!(
        entry.body,
        vec![
            "FunctionDeclaration",
            "VariableDeclaration",
            "VariableDeclarator",
            "Identifier",
            "LogicalExpression",
            "Identifier"
        ]
    );
    // Truthy left short-circuits past the right operand; the continuation
    // here collapsed into the return block.
    assert_eq!(predicate_name(&entry.terminator), "a");
    assert_eq!(branch_targets(&entry.terminator), (0, 3));
    assert_eq!(closure.blocks[3].body, vec!["Identifier"]);
    assert_eq!(jump_target(&closure.blocks[3].terminator), 0);
}

#[test]
fn nested_function_occupies_one_placeholder_block() {
    // function f() { function g() {} return g; }
    let root = function(
        "f",
        vec![],
        vec![
            function("g", vec![], vec![]),
            return_stmt(identifier("g")),
        ],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.blocks.len(), 5);
    assert_eq!(jump_target(&closure.blocks[2].terminator), 3);
    assert_eq!(closure.blocks[3].body, vec!["FunctionDeclaration"]);
    assert_eq!(jump_target(&closure.blocks[3].terminator), 4);
    assert_eq!(closure.blocks[4].body, vec!["ReturnStatement", "Identifier"]);

    assert_eq!(closure.children.len(), 1);
    let child = &closure.children[0];
    assert_eq!(child.closure.name, "g");
    assert_eq!(child.closure.parent_block_id, Some(3));
    assert_eq!(child.closure.parent_closure.as_deref(), Some("f"));
    assert!(child.value.identifier.starts_with('~'));
    // The hoisted name is registered and used by the return.
    let g_var = closure.variables.iter().find(|v| v.identifier == "g").unwrap();
    assert_eq!(g_var.usage_sites.len(), 1);
}

#[test]
fn strict_mode_propagates_to_nested_closures() {
    let root = function(
        "f",
        vec![],
        vec![
            expr_stmt(literal(json!("use strict"))),
            function("g", vec![], vec![]),
        ],
    );
    let closure = analyze(&root).unwrap();
    assert!(closure.strict);
    assert!(closure.children[0].closure.strict);
}

#[test]
fn class_declaration_queues_one_closure_per_method() {
    let method = |name: &str| {
        json!({
            "type": "MethodDefinition",
            "key": identifier(name),
            "kind": "method",
            "value": {
                "type": "FunctionExpression",
                "id": null,
                "params": [],
                "body": block(vec![])
            }
        })
    };
    let root = json!({"type": "Program", "body": [
        {
            "type": "ClassDeclaration",
            "id": identifier("C"),
            "body": {"type": "ClassBody", "body": [method("a"), method("b")]}
        }
    ]});
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    assert_eq!(closure.children.len(), 2);
    assert_eq!(closure.children[0].closure.name, "a");
    assert_eq!(closure.children[1].closure.name, "b");
    assert!(closure.variables.iter().any(|v| v.identifier == "C"));
}

#[test]
fn program_roots_and_functions_share_one_temp_sequence() {
    let root = json!({"type": "Program", "body": [
        function("f", vec![], vec![return_stmt(literal(json!(1)))]),
        function("g", vec![], vec![return_stmt(literal(json!(2)))])
    ]});
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);

    let mut temps = Vec::new();
    let mut stack = vec![&closure];
    while let Some(current) = stack.pop() {
        for var in &current.variables {
            if var.identifier.starts_with('~') && var.identifier != "~global" {
                temps.push(var.identifier.clone());
            }
        }
        for child in &current.children {
            stack.push(&child.closure);
        }
    }
    let total = temps.len();
    temps.sort();
    temps.dedup();
    assert_eq!(temps.len(), total);
}

#[test]
fn conditional_expression_arms_converge() {
    // function f(c) { return c ? 1 : 2; }
    let root = function(
        "f",
        vec![identifier("c")],
        vec![return_stmt(json!({
            "type": "ConditionalExpression",
            "test": identifier("c"),
            "consequent": literal(json!(1)),
            "alternate": literal(json!(2))
        }))],
    );
    let closure = analyze(&root).unwrap();
    assert_well_formed(&closure);
    // Entry branches on the test, both arms converge, and the converged
    // block returns.
    let entry = &closure.blocks[2];
    assert_eq!(predicate_name(&entry.terminator), "c");
    let (then_block, else_block) = branch_targets(&entry.terminator);
    let (a, b) = (
        jump_target(&closure.blocks[then_block].terminator),
        jump_target(&closure.blocks[else_block].terminator),
    );
    assert_eq!(a, b, "both arms converge on the continuation");
}

#[test]
fn assignment_evaluates_right_before_left() {
    // function f(a, b) { a = b; } -- trace order pins evaluation order.
    let root = function(
        "f",
        vec![identifier("a"), identifier("b")],
        vec![expr_stmt(json!({
            "type": "AssignmentExpression",
            "operator": "=",
            "left": identifier("a"),
            "right": identifier("b")
        }))],
    );
    let closure = analyze(&root).unwrap();
    let entry = &closure.blocks[2];
    assert_eq!(
        entry.body,
        vec![
            "FunctionDeclaration",
            "ExpressionStatement",
            "AssignmentExpression",
            "Identifier",
            "Identifier"
        ]
    );
    // Both sides resolve locally, so each records one use-site.
    let b_var = closure.variables.iter().find(|v| v.identifier == "b").unwrap();
    // Parameter registration plus the read.
    assert_eq!(b_var.usage_sites.len(), 2);

    match &closure.blocks[0].terminator {
        Terminator::Return { result: Operand::Var(value), .. } => {
            assert!(value.identifier.starts_with('~'));
        }
        other => panic!("expected return over a temporary, got {other:?}"),
    }
}
