//! Hoisting seen through the analyzer: names declared anywhere in a
//! closure body are registered as closure variables before lowering
//! starts, and nested closure bodies stay opaque.

use closure_cfg::{analyze, hoist::hoisted_names, Closure};
use serde_json::{json, Value};

fn identifier(name: &str) -> Value {
    json!({"type": "Identifier", "name": name})
}

fn var_decl(name: &str) -> Value {
    json!({"type": "VariableDeclaration", "kind": "var", "declarations": [
        {"type": "VariableDeclarator", "id": identifier(name), "init": null}
    ]})
}

fn has_variable(closure: &Closure, name: &str) -> bool {
    closure.variables.iter().any(|v| v.identifier == name)
}

#[test]
fn conditionally_declared_names_are_closure_variables() {
    // function f(c) { if (c) { var x = 1; } }
    let root = json!({
        "type": "FunctionDeclaration",
        "id": identifier("f"),
        "params": [identifier("c")],
        "body": {"type": "BlockStatement", "body": [
            {"type": "IfStatement",
             "test": identifier("c"),
             "consequent": {"type": "BlockStatement", "body": [var_decl("x")]},
             "alternate": null}
        ]}
    });
    let closure = analyze(&root).unwrap();
    assert!(has_variable(&closure, "x"));
}

#[test]
fn declarations_inside_nested_closures_stay_there() {
    // function f() { function g() { var hidden = 1; } }
    let root = json!({
        "type": "FunctionDeclaration",
        "id": identifier("f"),
        "params": [],
        "body": {"type": "BlockStatement", "body": [
            {"type": "FunctionDeclaration",
             "id": identifier("g"),
             "params": [],
             "body": {"type": "BlockStatement", "body": [var_decl("hidden")]}}
        ]}
    });
    let closure = analyze(&root).unwrap();
    assert!(has_variable(&closure, "g"));
    assert!(!has_variable(&closure, "hidden"));
    assert!(has_variable(&closure.children[0].closure, "hidden"));
}

#[test]
fn use_before_declaration_resolves_locally() {
    // function f() { x; var x = 1; }
    let root = json!({
        "type": "FunctionDeclaration",
        "id": identifier("f"),
        "params": [],
        "body": {"type": "BlockStatement", "body": [
            {"type": "ExpressionStatement", "expression": identifier("x")},
            var_decl("x")
        ]}
    });
    let closure = analyze(&root).unwrap();
    let x = closure.variables.iter().find(|v| v.identifier == "x").unwrap();
    // The read before the declaration and the declarator itself both count.
    assert_eq!(x.usage_sites.len(), 2);
}

#[test]
fn composite_statement_walk_covers_every_arm() {
    let statements = vec![
        json!({"type": "LabeledStatement", "label": identifier("l"), "body": {
            "type": "WhileStatement",
            "test": identifier("c"),
            "body": {"type": "BlockStatement", "body": [var_decl("a")]}
        }}),
        json!({"type": "TryStatement",
            "block": {"type": "BlockStatement", "body": [var_decl("b")]},
            "handler": {"type": "CatchClause", "param": identifier("e"),
                        "body": {"type": "BlockStatement", "body": [var_decl("c")]}},
            "finalizer": {"type": "BlockStatement", "body": [var_decl("d")]}}),
        json!({"type": "SwitchStatement", "discriminant": identifier("x"), "cases": [
            {"type": "SwitchCase", "test": null, "consequent": [var_decl("e")]}
        ]}),
        json!({"type": "ForStatement",
            "init": var_decl("i"), "test": null, "update": null,
            "body": {"type": "BlockStatement", "body": []}}),
    ];
    assert_eq!(hoisted_names(&statements), vec!["a", "b", "c", "d", "e", "i"]);
}

#[test]
fn catch_parameters_are_never_hoisted() {
    // function f() { try {} catch (e) {} }
    let root = json!({
        "type": "FunctionDeclaration",
        "id": identifier("f"),
        "params": [],
        "body": {"type": "BlockStatement", "body": [
            {"type": "TryStatement",
             "block": {"type": "BlockStatement", "body": []},
             "handler": {"type": "CatchClause", "param": identifier("e"),
                         "body": {"type": "BlockStatement", "body": []}},
             "finalizer": null}
        ]}
    });
    let closure = analyze(&root).unwrap();
    assert!(!has_variable(&closure, "e"));
}
