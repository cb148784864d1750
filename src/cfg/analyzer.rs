//! Closure graph construction.
//!
//! One call to [`analyze`] walks a closure-like syntax node and produces a
//! [`Closure`] per lexical function, nested the way the source nests. Each
//! closure gets its graph built in a single forward pass:
//!
//!   1. blocks 0 and 1 are reserved as the unified return and throw exits;
//!   2. parameters, `this`, and hoisted declarations are registered;
//!   3. the body is lowered statement by statement, splitting the current
//!      block at every branch, loop head, closure placeholder, and abrupt
//!      completion;
//!   4. the block array is simplified (dead and empty blocks contracted);
//!   5. nested closures queued during the pass are analyzed in discovery
//!      order and attached as children.
//!
//! Nested closures are never inlined here. Each occupies exactly one
//! placeholder block in the parent, bracketed by unconditional jumps, so
//! the flattener has a stable splice point.
//!
//! Temporaries (`~{n}`) are numbered by a per-call session shared across
//! the whole closure tree and are never reused. During construction,
//! unresolved jump targets carry an out-of-band sentinel; every one of them
//! is patched before the closure is returned, so a target of 0 or 1 in a
//! finished graph always means the real return or throw block.

use serde_json::{json, Value};
use tracing::debug;

use crate::ast::{self, NodeRef};
use crate::cfg::simplify::simplify;
use crate::cfg::types::{
    Block, ChildClosure, Closure, Literal, Operand, Terminator, Variable, VariableId,
};
use crate::error::{FlowError, Result};
use crate::hoist;

/// The unified return block of every closure.
const EXIT_BLOCK: usize = 0;
/// The unified throw block of every closure.
const RAISE_BLOCK: usize = 1;

/// Out-of-band placeholder for a jump target not yet known. Never survives
/// into a finished closure.
const UNRESOLVED: usize = usize::MAX;

/// Options for [`analyze_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Start in strict mode instead of waiting for a `"use strict"` pragma.
    pub strict: bool,
}

/// Build the closure graph for a program or function node.
///
/// `root` must be a `Program`, `FunctionDeclaration`, `FunctionExpression`,
/// `ArrowFunctionExpression`, or `MethodDefinition`; anything else fails
/// with [`FlowError::InvalidNodeKind`].
pub fn analyze(root: &Value) -> Result<Closure> {
    analyze_with_options(root, AnalyzeOptions::default())
}

/// [`analyze`] with explicit options.
pub fn analyze_with_options(root: &Value, options: AnalyzeOptions) -> Result<Closure> {
    let mut session = Session::default();
    build_closure(
        root,
        &mut session,
        CapturedScope {
            strict: options.strict,
            catch_bindings: Vec::new(),
        },
        None,
        None,
    )
}

/// Per-`analyze`-call counters, threaded through every nested closure so
/// temporaries and generated names stay unique across the whole tree.
#[derive(Debug, Default)]
struct Session {
    temporaries: usize,
    anonymous: usize,
}

impl Session {
    fn next_temporary(&mut self) -> String {
        let id = format!("~{}", self.temporaries);
        self.temporaries += 1;
        id
    }

    fn next_anonymous(&mut self) -> String {
        let name = format!("Anonymous{}", self.anonymous);
        self.anonymous += 1;
        name
    }
}

/// What a pending closure sees of its enclosing lexical context: the
/// strict flag and the catch-parameter rewrites active at the point of
/// definition, innermost first.
#[derive(Debug, Clone)]
struct CapturedScope {
    strict: bool,
    catch_bindings: Vec<(String, String)>,
}

/// A nested closure discovered during the block pass, analyzed after the
/// parent's graph is complete.
struct PendingClosure {
    value: VariableId,
    parent_block_id: usize,
    captured: CapturedScope,
    node: Value,
}

/// One level of lexical context during the block pass. Levels are stacked
/// on the call stack; derived levels copy the control targets and clear
/// everything construct-specific.
struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    next: usize,
    continue_block: usize,
    break_block: usize,
    label: Option<String>,
    /// Exception handler installed at this level, if any.
    catch: Option<usize>,
    /// Catch-parameter rewrite installed at this level: (name, temporary).
    catch_var: Option<(String, String)>,
    is_switch: bool,
}

impl<'a> Scope<'a> {
    fn child(&'a self) -> Scope<'a> {
        Scope {
            parent: Some(self),
            next: self.next,
            continue_block: self.continue_block,
            break_block: self.break_block,
            label: None,
            catch: None,
            catch_var: None,
            is_switch: false,
        }
    }

    /// Where a `throw` in this scope transfers control.
    fn catch_target(&self) -> usize {
        let mut level = Some(self);
        while let Some(scope) = level {
            if let Some(target) = scope.catch {
                return target;
            }
            level = scope.parent;
        }
        RAISE_BLOCK
    }

    /// Every handler reachable from this scope, innermost first, deduped.
    fn catch_chain(&self) -> Vec<usize> {
        let mut targets = Vec::new();
        let mut level = Some(self);
        while let Some(scope) = level {
            if let Some(target) = scope.catch {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            level = scope.parent;
        }
        targets
    }

    fn lookup_label(&self, name: &str) -> Option<&Scope<'a>> {
        let mut level = Some(self);
        while let Some(scope) = level {
            if scope.label.as_deref() == Some(name) {
                return Some(scope);
            }
            level = scope.parent;
        }
        None
    }
}

fn build_closure(
    node: &Value,
    session: &mut Session,
    captured: CapturedScope,
    parent_closure: Option<String>,
    parent_block_id: Option<usize>,
) -> Result<Closure> {
    let root_kind = ast::kind(node).to_string();
    let strict = captured.strict;
    let trace = ast::kind_trace(node);

    let mut builder = ClosureBuilder {
        session,
        name: String::new(),
        root_kind,
        vars: Vec::new(),
        parameters: Vec::new(),
        blocks: Vec::new(),
        current: 0,
        pending: Vec::new(),
        captured,
        strict,
        first_block_done: false,
    };

    let return_value = builder.temporary(Some(node));
    let mut exit = Block::new(
        EXIT_BLOCK,
        Terminator::Return {
            result: Operand::Var(return_value),
            node: Some(NodeRef::of(node)),
        },
    );
    exit.body = trace.clone();
    builder.blocks.push(exit);

    let throw_value = builder.temporary(Some(node));
    let mut raise = Block::new(
        RAISE_BLOCK,
        Terminator::Throw {
            exception: Operand::Var(throw_value),
            node: Some(NodeRef::of(node)),
        },
    );
    raise.body = trace;
    builder.blocks.push(raise);

    builder.vars.push(Variable::new("this"));

    let synthesized;
    let statements: &[Value] = match builder.root_kind.as_str() {
        "Program" => {
            builder.name = "Root".to_string();
            let mut global = Variable::new("~global");
            global.usage_sites.push(NodeRef::of(node));
            builder.vars.push(global);
            ast::array_field(node, "body")?
        }
        "FunctionDeclaration" | "FunctionExpression" | "ArrowFunctionExpression" => {
            builder.name = match ast::opt_field(node, "id") {
                Some(id) => ast::str_field(id, "name")?.to_string(),
                None => builder.session.next_anonymous(),
            };
            builder.register_parameters(ast::array_field(node, "params")?);
            let body = ast::field(node, "body")?;
            if ast::kind(body) == "BlockStatement" {
                ast::array_field(body, "body")?
            } else {
                // Expression-bodied arrow: lower the expression as the sole
                // statement of a synthetic body.
                synthesized = vec![json!({
                    "type": "ExpressionStatement",
                    "expression": body,
                })];
                &synthesized
            }
        }
        "MethodDefinition" => {
            let key = ast::field(node, "key")?;
            builder.name = match key.get("name").and_then(Value::as_str) {
                Some(name) => name.to_string(),
                None => builder.session.next_anonymous(),
            };
            let value = ast::field(node, "value")?;
            builder.register_parameters(ast::array_field(value, "params")?);
            ast::array_field(ast::field(value, "body")?, "body")?
        }
        other => return Err(FlowError::InvalidNodeKind(other.to_string())),
    };

    debug!(closure = %builder.name, "building closure graph");

    for name in hoist::hoisted_names(statements) {
        builder.vars.push(Variable::new(name));
    }

    let root_scope = Scope {
        parent: None,
        next: EXIT_BLOCK,
        continue_block: EXIT_BLOCK,
        break_block: EXIT_BLOCK,
        label: None,
        catch: Some(RAISE_BLOCK),
        catch_var: None,
        is_switch: true,
    };
    let entry = builder.process_block(statements, &root_scope)?;

    debug_assert!(
        builder.blocks.iter().all(|b| {
            !b.terminator.successors().contains(&UNRESOLVED) && !b.exceptions.contains(&UNRESOLVED)
        }),
        "unpatched jump target left in {}",
        builder.name
    );

    let removed = simplify(&mut builder.blocks, entry);
    for pending in &mut builder.pending {
        pending.parent_block_id -= removed
            .iter()
            .filter(|&&id| id < pending.parent_block_id)
            .count();
    }

    let ClosureBuilder {
        session,
        name,
        vars: mut variables,
        parameters,
        blocks,
        pending,
        strict,
        ..
    } = builder;

    let mut children = Vec::with_capacity(pending.len());
    for p in pending {
        let closure = build_closure(
            &p.node,
            session,
            p.captured,
            Some(name.clone()),
            Some(p.parent_block_id),
        )?;
        children.push(ChildClosure {
            value: p.value,
            closure,
        });
    }

    variables.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    debug!(
        closure = %name,
        blocks = blocks.len(),
        variables = variables.len(),
        children = children.len(),
        "closure graph complete"
    );

    Ok(Closure {
        name,
        variables,
        parameters,
        children,
        entry,
        exit: EXIT_BLOCK,
        raise: RAISE_BLOCK,
        blocks,
        strict,
        node: NodeRef::of(node),
        parent_closure,
        parent_block_id,
    })
}

struct ClosureBuilder<'s> {
    session: &'s mut Session,
    name: String,
    root_kind: String,
    vars: Vec<Variable>,
    parameters: Vec<VariableId>,
    blocks: Vec<Block>,
    current: usize,
    pending: Vec<PendingClosure>,
    captured: CapturedScope,
    strict: bool,
    first_block_done: bool,
}

fn pending_jump(node: &Value) -> Terminator {
    Terminator::Jump {
        next: UNRESOLVED,
        node: Some(NodeRef::of(node)),
    }
}

fn pending_branch(predicate: Operand, node: &Value) -> Terminator {
    Terminator::If {
        predicate,
        consequent: UNRESOLVED,
        alternate: UNRESOLVED,
        node: Some(NodeRef::of(node)),
    }
}

impl<'s> ClosureBuilder<'s> {
    // ------------------------------------------------------------------
    // Block bookkeeping
    // ------------------------------------------------------------------

    fn push_op(&mut self, tag: &str) {
        self.blocks[self.current].body.push(tag.to_string());
    }

    /// Allocate a fresh block inheriting every reachable handler.
    fn open_block(&mut self, scope: &Scope) -> usize {
        let id = self.blocks.len();
        let mut block = Block::new(
            id,
            Terminator::Jump {
                next: UNRESOLVED,
                node: None,
            },
        );
        block.exceptions = scope.catch_chain();
        self.blocks.push(block);
        id
    }

    /// Seal the current block with `terminator` and open a successor.
    /// Returns the sealed block's id for later patching.
    fn split(&mut self, terminator: Terminator, scope: &Scope) -> usize {
        let finished = self.current;
        self.blocks[finished].terminator = terminator;
        self.current = self.open_block(scope);
        finished
    }

    fn patch_jump(&mut self, block: usize, target: usize) {
        match &mut self.blocks[block].terminator {
            Terminator::Jump { next, .. } => *next = target,
            other => debug_assert!(false, "block {block} is not a jump: {other:?}"),
        }
    }

    fn patch_consequent(&mut self, block: usize, target: usize) {
        match &mut self.blocks[block].terminator {
            Terminator::If { consequent, .. } => *consequent = target,
            other => debug_assert!(false, "block {block} is not a branch: {other:?}"),
        }
    }

    fn patch_alternate(&mut self, block: usize, target: usize) {
        match &mut self.blocks[block].terminator {
            Terminator::If { alternate, .. } => *alternate = target,
            other => debug_assert!(false, "block {block} is not a branch: {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn temporary(&mut self, node: Option<&Value>) -> VariableId {
        let id = self.session.next_temporary();
        let node_ref = node.map(NodeRef::of);
        let mut var = Variable::new(id.clone());
        if let Some(site) = &node_ref {
            var.usage_sites.push(site.clone());
        }
        self.vars.push(var);
        VariableId::new(id, node_ref)
    }

    fn register_parameters(&mut self, params: &[Value]) {
        for param in params {
            // Destructuring parameters carry no single name to register.
            if let Some(name) = param.get("name").and_then(Value::as_str) {
                let mut var = Variable::new(name);
                var.usage_sites.push(NodeRef::of(param));
                self.vars.push(var);
                self.parameters
                    .push(VariableId::new(name, Some(NodeRef::of(param))));
            }
        }
    }

    /// Resolve a name at a use-site. Temporaries and `arguments` are taken
    /// as-is; catch parameters rewrite to their exception temporary; names
    /// local to this closure record the use-site. Anything else resolves
    /// free, in an enclosing closure or globally, and is not registered.
    fn lookup_identifier(&mut self, name: &str, node: Option<&Value>, scope: &Scope) -> VariableId {
        let node_ref = node.map(NodeRef::of);
        if name.starts_with('~') || name == "arguments" {
            return VariableId::new(name, node_ref);
        }
        let mut level = Some(scope);
        while let Some(current) = level {
            if let Some((bound, temp)) = &current.catch_var {
                if bound == name {
                    return VariableId::new(temp.clone(), node_ref);
                }
            }
            level = current.parent;
        }
        if let Some(var) = self.vars.iter_mut().find(|v| v.identifier == name) {
            if let Some(site) = &node_ref {
                var.usage_sites.push(site.clone());
            }
            return VariableId::new(name, node_ref);
        }
        for (bound, temp) in &self.captured.catch_bindings {
            if bound == name {
                return VariableId::new(temp.clone(), node_ref);
            }
        }
        VariableId::new(name, node_ref)
    }

    // ------------------------------------------------------------------
    // Pending closures
    // ------------------------------------------------------------------

    fn captured_for_child(&self, scope: &Scope) -> CapturedScope {
        let mut bindings = Vec::new();
        let mut level = Some(scope);
        while let Some(current) = level {
            if let Some(binding) = &current.catch_var {
                bindings.push(binding.clone());
            }
            level = current.parent;
        }
        bindings.extend(self.captured.catch_bindings.iter().cloned());
        CapturedScope {
            strict: self.strict,
            catch_bindings: bindings,
        }
    }

    /// Split out a single placeholder block for a nested closure and queue
    /// it for analysis. Both bracketing jumps are patched immediately, so
    /// the placeholder is `entry_jump -> placeholder -> continuation`.
    fn queue_closure(&mut self, tag: &str, node: &Value, scope: &Scope) -> VariableId {
        let entry_jump = self.split(pending_jump(node), scope);
        let placeholder = self.current;
        self.patch_jump(entry_jump, placeholder);
        self.push_op(tag);
        let value = self.temporary(Some(node));
        self.pending.push(PendingClosure {
            value: value.clone(),
            parent_block_id: placeholder,
            captured: self.captured_for_child(scope),
            node: node.clone(),
        });
        let exit_jump = self.split(pending_jump(node), scope);
        self.patch_jump(exit_jump, self.current);
        value
    }

    /// Queue one placeholder block per method of a class body.
    fn queue_class_methods(&mut self, class_node: &Value, scope: &Scope) -> Result<()> {
        let entry_jump = self.split(pending_jump(class_node), scope);
        self.patch_jump(entry_jump, self.current);
        let body = ast::field(class_node, "body")?;
        for method in ast::array_field(body, "body")? {
            self.push_op("MethodDefinition");
            let value = self.temporary(Some(method));
            self.pending.push(PendingClosure {
                value,
                parent_block_id: self.current,
                captured: self.captured_for_child(scope),
                node: method.clone(),
            });
            let exit_jump = self.split(pending_jump(class_node), scope);
            self.patch_jump(exit_jump, self.current);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Lower a statement list into a fresh chain of blocks, terminated by
    /// an unconditional jump to `scope.next`. Returns the entry block id.
    fn process_block(&mut self, statements: &[Value], scope: &Scope) -> Result<usize> {
        let saved = self.current;
        let entry = self.open_block(scope);
        self.current = entry;

        let is_first = !self.first_block_done;
        self.first_block_done = true;
        if is_first {
            let tag = self.root_kind.clone();
            self.push_op(&tag);
        }

        for statement in statements {
            self.process_statement(statement, scope, is_first)?;
        }

        let node = statements.last().map(NodeRef::of);
        self.blocks[self.current].terminator = Terminator::Jump {
            next: scope.next,
            node,
        };
        self.current = saved;
        Ok(entry)
    }

    fn process_single(&mut self, statement: &Value, scope: &Scope) -> Result<usize> {
        self.process_block(std::slice::from_ref(statement), scope)
    }

    fn process_statement(&mut self, stmt: &Value, scope: &Scope, is_first: bool) -> Result<()> {
        match ast::kind(stmt) {
            "EmptyStatement" => self.push_op("EmptyStatement"),

            "DebuggerStatement" => self.push_op("DebuggerStatement"),

            "BlockStatement" => {
                self.push_op("BlockStatement");
                for inner in ast::array_field(stmt, "body")? {
                    self.process_statement(inner, scope, is_first)?;
                }
            }

            "ExpressionStatement" => {
                self.push_op("ExpressionStatement");
                let result = self.process_expression(ast::field(stmt, "expression")?, scope)?;
                if is_first {
                    if let Operand::Literal(literal) = &result {
                        if literal.value.as_str() == Some("use strict") {
                            self.strict = true;
                        }
                    }
                }
            }

            "IfStatement" => self.process_if(stmt, scope)?,

            "LabeledStatement" => {
                let jump = self.split(pending_jump(stmt), scope);
                self.push_op("LabeledStatement");
                let label = ast::str_field(ast::field(stmt, "label")?, "name")?.to_string();
                let body = ast::field(stmt, "body")?;
                let mut body_scope = scope.child();
                body_scope.next = self.current;
                body_scope.break_block = self.current;
                body_scope.continue_block = self.current + 1;
                body_scope.label = Some(label);
                // A switch label is a valid break target but never a
                // continue target.
                body_scope.is_switch = ast::kind(body) == "SwitchStatement";
                let entry = self.process_single(body, &body_scope)?;
                self.patch_jump(jump, entry);
            }

            "BreakStatement" => {
                self.push_op("BreakStatement");
                let target = match ast::opt_field(stmt, "label") {
                    Some(label) => {
                        let name = ast::str_field(label, "name")?;
                        scope
                            .lookup_label(name)
                            .ok_or_else(|| FlowError::UnresolvedLabel(name.to_string()))?
                            .break_block
                    }
                    None => scope.break_block,
                };
                self.split(
                    Terminator::Jump {
                        next: target,
                        node: Some(NodeRef::of(stmt)),
                    },
                    scope,
                );
            }

            "ContinueStatement" => {
                self.push_op("ContinueStatement");
                let target = match ast::opt_field(stmt, "label") {
                    Some(label) => {
                        let name = ast::str_field(label, "name")?;
                        let found = scope
                            .lookup_label(name)
                            .ok_or_else(|| FlowError::UnresolvedLabel(name.to_string()))?;
                        if found.is_switch {
                            return Err(FlowError::IllegalContinueTarget(name.to_string()));
                        }
                        found.continue_block
                    }
                    None => scope.continue_block,
                };
                self.split(
                    Terminator::Jump {
                        next: target,
                        node: Some(NodeRef::of(stmt)),
                    },
                    scope,
                );
            }

            "WithStatement" => {
                self.push_op("WithStatement");
                self.process_expression(ast::field(stmt, "object")?, scope)?;
                self.process_statement(ast::field(stmt, "body")?, scope, is_first)?;
            }

            "SwitchStatement" => self.process_switch(stmt, scope)?,

            "ReturnStatement" => {
                self.push_op("ReturnStatement");
                if let Some(argument) = ast::opt_field(stmt, "argument") {
                    self.process_expression(argument, scope)?;
                }
                self.split(
                    Terminator::Jump {
                        next: EXIT_BLOCK,
                        node: Some(NodeRef::of(stmt)),
                    },
                    scope,
                );
            }

            "ThrowStatement" => {
                self.push_op("ThrowStatement");
                self.process_expression(ast::field(stmt, "argument")?, scope)?;
                self.split(
                    Terminator::Jump {
                        next: scope.catch_target(),
                        node: Some(NodeRef::of(stmt)),
                    },
                    scope,
                );
            }

            "TryStatement" => self.process_try(stmt, scope)?,

            "CatchClause" => {
                self.push_op("CatchClause");
                self.process_expression(ast::field(stmt, "param")?, scope)?;
                self.process_statement(ast::field(stmt, "body")?, scope, is_first)?;
            }

            "WhileStatement" => {
                self.push_op("WhileStatement");
                let entry_jump = self.split(pending_jump(stmt), scope);
                let loop_start = self.current;
                self.patch_jump(entry_jump, loop_start);
                let test = self.process_expression(ast::field(stmt, "test")?, scope)?;
                let branch = self.split(pending_branch(test, stmt), scope);
                let loop_exit = self.current;
                let mut body_scope = scope.child();
                body_scope.next = loop_start;
                body_scope.continue_block = loop_start;
                body_scope.break_block = loop_exit;
                let body = self.process_single(ast::field(stmt, "body")?, &body_scope)?;
                self.patch_consequent(branch, body);
                self.patch_alternate(branch, loop_exit);
            }

            "DoWhileStatement" => {
                self.push_op("DoWhileStatement");
                let entry_jump = self.split(pending_jump(stmt), scope);
                let loop_start = self.current;
                let test = self.process_expression(ast::field(stmt, "test")?, scope)?;
                let branch = self.split(pending_branch(test, stmt), scope);
                let loop_exit = self.current;
                let mut body_scope = scope.child();
                body_scope.next = loop_start;
                body_scope.continue_block = loop_start;
                body_scope.break_block = loop_exit;
                let body = self.process_single(ast::field(stmt, "body")?, &body_scope)?;
                self.patch_jump(entry_jump, body);
                self.patch_consequent(branch, body);
                self.patch_alternate(branch, loop_exit);
            }

            "ForStatement" => self.process_for(stmt, scope)?,

            "ForInStatement" => self.process_for_each(stmt, scope, "ForInStatement")?,

            "ForOfStatement" => self.process_for_each(stmt, scope, "ForOfStatement")?,

            "VariableDeclaration" => {
                self.push_op("VariableDeclaration");
                for declarator in ast::array_field(stmt, "declarations")? {
                    self.push_op("VariableDeclarator");
                    self.process_expression(ast::field(declarator, "id")?, scope)?;
                    if let Some(init) = ast::opt_field(declarator, "init") {
                        self.process_expression(init, scope)?;
                    }
                }
            }

            "FunctionDeclaration" => {
                self.queue_closure("FunctionDeclaration", stmt, scope);
            }

            "ClassDeclaration" => {
                self.push_op("ClassDeclaration");
                self.push_op("ClassBody");
                self.queue_class_methods(stmt, scope)?;
            }

            other => {
                return Err(FlowError::UnsupportedSyntax(format!("statement `{other}`")));
            }
        }
        Ok(())
    }

    fn process_if(&mut self, stmt: &Value, scope: &Scope) -> Result<()> {
        self.push_op("IfStatement");
        let test = self.process_expression(ast::field(stmt, "test")?, scope)?;

        // An if whose consequent is an empty block contributes only the
        // test evaluation, alternate included.
        let consequent = ast::field(stmt, "consequent")?;
        let empty_block = ast::kind(consequent) == "BlockStatement"
            && ast::array_field(consequent, "body")?.is_empty();
        if empty_block {
            return Ok(());
        }

        let branch = self.split(pending_branch(test, stmt), scope);
        let continuation = self.current;
        let mut arm_scope = scope.child();
        arm_scope.next = continuation;
        let then_entry = self.process_single(consequent, &arm_scope)?;
        self.patch_consequent(branch, then_entry);
        match ast::opt_field(stmt, "alternate") {
            Some(alternate) => {
                let mut arm_scope = scope.child();
                arm_scope.next = continuation;
                let else_entry = self.process_single(alternate, &arm_scope)?;
                self.patch_alternate(branch, else_entry);
            }
            None => self.patch_alternate(branch, continuation),
        }
        Ok(())
    }

    fn process_switch(&mut self, stmt: &Value, scope: &Scope) -> Result<()> {
        self.push_op("SwitchStatement");
        self.process_expression(ast::field(stmt, "discriminant")?, scope)?;

        // The dispatch block collects every break and is patched to the
        // statement's continuation once all cases are lowered.
        let head = self.split(pending_jump(stmt), scope);
        let dispatch = self.split(pending_jump(stmt), scope);
        self.patch_jump(head, self.current);

        for case in ast::array_field(stmt, "cases")? {
            let consequent = ast::array_field(case, "consequent")?;
            match ast::opt_field(case, "test") {
                Some(test) => {
                    self.push_op("SwitchCase");
                    let operand = self.process_expression(test, scope)?;
                    if !consequent.is_empty() {
                        let branch = self.split(pending_branch(operand, case), scope);
                        let after = self.current;
                        let mut case_scope = scope.child();
                        case_scope.next = after;
                        case_scope.break_block = dispatch;
                        case_scope.is_switch = true;
                        let body = self.process_block(consequent, &case_scope)?;
                        self.patch_consequent(branch, body);
                        self.patch_alternate(branch, after);
                    }
                }
                None if !consequent.is_empty() => {
                    let jump = self.split(pending_jump(case), scope);
                    let after = self.current;
                    let mut case_scope = scope.child();
                    case_scope.next = after;
                    case_scope.break_block = dispatch;
                    case_scope.is_switch = true;
                    let body = self.process_block(consequent, &case_scope)?;
                    self.patch_jump(jump, body);
                    self.blocks[body].body.insert(0, "SwitchCase".to_string());
                }
                None => self.push_op("SwitchCase"),
            }
        }

        self.patch_jump(dispatch, self.current);
        Ok(())
    }

    fn process_try(&mut self, stmt: &Value, scope: &Scope) -> Result<()> {
        self.push_op("TryStatement");
        let start = self.split(pending_jump(stmt), scope);
        let continuation = self.current;

        // Finalizer first: its entry is the common continuation of both
        // the protected block and the handler.
        let finally_entry = match ast::opt_field(stmt, "finalizer") {
            Some(finalizer) => {
                let mut finally_scope = scope.child();
                finally_scope.next = continuation;
                self.process_single(finalizer, &finally_scope)?
            }
            None => continuation,
        };

        let exception = self.temporary(Some(stmt));

        let handlers = ast::opt_field(stmt, "handlers").and_then(Value::as_array);
        let handler = ast::opt_field(stmt, "handler")
            .or_else(|| handlers.and_then(|list| list.first()));

        let mut catch_entry = None;
        if let Some(handler) = handler {
            let mut handler_scope = scope.child();
            handler_scope.next = finally_entry;
            if let Some(param_name) = handler
                .get("param")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
            {
                handler_scope.catch_var =
                    Some((param_name.to_string(), exception.identifier.clone()));
            }
            catch_entry = Some(self.process_single(handler, &handler_scope)?);
        }

        // Without a handler the enclosing catch target stays in effect.
        let mut try_scope = scope.child();
        try_scope.next = finally_entry;
        try_scope.catch = catch_entry;
        let try_entry = self.process_single(ast::field(stmt, "block")?, &try_scope)?;
        self.patch_jump(start, try_entry);
        Ok(())
    }

    fn process_for(&mut self, stmt: &Value, scope: &Scope) -> Result<()> {
        self.push_op("ForStatement");
        if let Some(init) = ast::opt_field(stmt, "init") {
            if ast::kind(init) == "VariableDeclaration" {
                self.process_statement(init, scope, false)?;
            } else {
                self.process_expression(init, scope)?;
            }
        }
        let entry_jump = self.split(pending_jump(stmt), scope);
        let loop_test = self.current;
        self.patch_jump(entry_jump, loop_test);

        let mut test_branch = None;
        let mut test_jump = None;
        match ast::opt_field(stmt, "test") {
            Some(test) => {
                let operand = self.process_expression(test, scope)?;
                test_branch = Some(self.split(pending_branch(operand, test), scope));
            }
            None => test_jump = Some(self.split(pending_jump(stmt), scope)),
        }

        let loop_update = self.current;
        if let Some(update) = ast::opt_field(stmt, "update") {
            self.process_expression(update, scope)?;
        }
        self.split(
            Terminator::Jump {
                next: loop_test,
                node: Some(NodeRef::of(stmt)),
            },
            scope,
        );
        let loop_exit = self.current;

        let mut body_scope = scope.child();
        body_scope.next = loop_update;
        body_scope.continue_block = loop_update;
        body_scope.break_block = loop_exit;
        let body = self.process_single(ast::field(stmt, "body")?, &body_scope)?;

        if let Some(branch) = test_branch {
            self.patch_consequent(branch, body);
            self.patch_alternate(branch, loop_exit);
        }
        if let Some(jump) = test_jump {
            self.patch_jump(jump, body);
        }
        Ok(())
    }

    fn process_for_each(&mut self, stmt: &Value, scope: &Scope, tag: &str) -> Result<()> {
        self.push_op(tag);
        self.process_expression(ast::field(stmt, "right")?, scope)?;
        let entry_jump = self.split(pending_jump(stmt), scope);
        self.patch_jump(entry_jump, self.current);

        let left = ast::field(stmt, "left")?;
        let predicate = if ast::kind(left) == "VariableDeclaration" {
            self.process_statement(left, scope, false)?;
            match left
                .get("declarations")
                .and_then(Value::as_array)
                .and_then(|list| list.first())
                .and_then(|declarator| declarator.get("id"))
                .and_then(|id| id.get("name"))
                .and_then(Value::as_str)
            {
                Some(name) => Operand::Var(VariableId::new(name, None)),
                None => Operand::Var(self.temporary(Some(left))),
            }
        } else {
            self.process_expression(left, scope)?
        };

        let loop_start = self.current;
        let branch = self.split(pending_branch(predicate, stmt), scope);
        let loop_exit = self.current;
        self.patch_alternate(branch, loop_exit);

        let mut body_scope = scope.child();
        body_scope.next = loop_start;
        body_scope.continue_block = loop_start;
        body_scope.break_block = loop_exit;
        let body = self.process_single(ast::field(stmt, "body")?, &body_scope)?;
        self.patch_consequent(branch, body);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Lower one expression, returning the operand holding its value. One
    /// fresh temporary per compound node, one body tag per visited node.
    fn process_expression(&mut self, node: &Value, scope: &Scope) -> Result<Operand> {
        match ast::kind(node) {
            "ThisExpression" => {
                self.push_op("ThisExpression");
                if let Some(var) = self.vars.iter_mut().find(|v| v.identifier == "this") {
                    var.usage_sites.push(NodeRef::of(node));
                }
                Ok(Operand::Var(VariableId::new(
                    "this",
                    Some(NodeRef::of(node)),
                )))
            }

            "Identifier" => {
                self.push_op("Identifier");
                let name = ast::str_field(node, "name")?.to_string();
                Ok(Operand::Var(self.lookup_identifier(&name, Some(node), scope)))
            }

            "Literal" => {
                self.push_op("Literal");
                Ok(Operand::Literal(Literal {
                    value: node.get("value").cloned().unwrap_or(Value::Null),
                    node: Some(NodeRef::of(node)),
                }))
            }

            "MemberExpression" => {
                self.push_op("MemberExpression");
                self.process_expression(ast::field(node, "object")?, scope)?;
                let result = self.temporary(Some(node));
                self.process_expression(ast::field(node, "property")?, scope)?;
                Ok(Operand::Var(result))
            }

            "FunctionExpression" => Ok(Operand::Var(self.queue_closure(
                "FunctionExpression",
                node,
                scope,
            ))),

            "ArrowFunctionExpression" => Ok(Operand::Var(self.queue_closure(
                "ArrowFunctionExpression",
                node,
                scope,
            ))),

            "SequenceExpression" => {
                self.push_op("SequenceExpression");
                let mut last = None;
                for expression in ast::array_field(node, "expressions")? {
                    last = Some(self.process_expression(expression, scope)?);
                }
                last.ok_or_else(|| {
                    FlowError::MalformedTree("empty SequenceExpression".to_string())
                })
            }

            "UnaryExpression" => {
                self.push_op("UnaryExpression");
                let result = self.temporary(Some(node));
                self.process_expression(ast::field(node, "argument")?, scope)?;
                Ok(Operand::Var(result))
            }

            "BinaryExpression" => {
                self.push_op("BinaryExpression");
                let result = self.temporary(Some(node));
                self.process_expression(ast::field(node, "left")?, scope)?;
                self.process_expression(ast::field(node, "right")?, scope)?;
                Ok(Operand::Var(result))
            }

            "AssignmentExpression" => {
                self.push_op("AssignmentExpression");
                self.process_expression(ast::field(node, "right")?, scope)?;
                let result = self.temporary(Some(node));
                self.process_expression(ast::field(node, "left")?, scope)?;
                Ok(Operand::Var(result))
            }

            "UpdateExpression" => {
                self.push_op("UpdateExpression");
                let result = self.temporary(Some(node));
                let operand = self.process_expression(ast::field(node, "argument")?, scope)?;
                if node.get("prefix").and_then(Value::as_bool).unwrap_or(false) {
                    Ok(Operand::Var(result))
                } else {
                    Ok(operand)
                }
            }

            "LogicalExpression" => self.process_logical(node, scope),

            "ConditionalExpression" => {
                self.push_op("ConditionalExpression");
                let result = self.temporary(Some(node));
                let test = self.process_expression(ast::field(node, "test")?, scope)?;
                let branch = self.split(pending_branch(test, node), scope);
                self.patch_consequent(branch, self.current);
                self.process_expression(ast::field(node, "consequent")?, scope)?;
                let then_jump = self.split(pending_jump(node), scope);
                self.patch_alternate(branch, self.current);
                self.process_expression(ast::field(node, "alternate")?, scope)?;
                let else_jump = self.split(pending_jump(node), scope);
                let continuation = self.current;
                self.patch_jump(then_jump, continuation);
                self.patch_jump(else_jump, continuation);
                Ok(Operand::Var(result))
            }

            "CallExpression" => {
                self.push_op("CallExpression");
                self.process_expression(ast::field(node, "callee")?, scope)?;
                for argument in ast::array_field(node, "arguments")? {
                    self.process_expression(argument, scope)?;
                }
                Ok(Operand::Var(self.temporary(Some(node))))
            }

            "NewExpression" => {
                self.push_op("NewExpression");
                for argument in ast::array_field(node, "arguments")? {
                    self.process_expression(argument, scope)?;
                }
                let result = self.temporary(Some(node));
                self.process_expression(ast::field(node, "callee")?, scope)?;
                Ok(Operand::Var(result))
            }

            "ArrayExpression" => {
                self.push_op("ArrayExpression");
                let array = self.temporary(Some(node));
                for element in ast::array_field(node, "elements")? {
                    if element.is_null() {
                        // Elision holes read as undefined.
                        self.push_op("Literal");
                    } else {
                        self.process_expression(element, scope)?;
                    }
                }
                Ok(Operand::Var(array))
            }

            "SpreadElement" => {
                self.push_op("SpreadElement");
                self.process_expression(ast::field(node, "argument")?, scope)
            }

            "ObjectExpression" => {
                self.push_op("ObjectExpression");
                let object = self.temporary(Some(node));
                self.process_properties(node, scope)?;
                Ok(Operand::Var(object))
            }

            "ObjectPattern" => {
                self.push_op("ObjectPattern");
                let object = self.temporary(Some(node));
                self.process_properties(node, scope)?;
                Ok(Operand::Var(object))
            }

            "ArrayPattern" => {
                let result = self.temporary(Some(node));
                self.push_op("ArrayPattern");
                for element in ast::array_field(node, "elements")? {
                    if !element.is_null() {
                        self.process_expression(element, scope)?;
                    }
                }
                Ok(Operand::Var(result))
            }

            "TemplateLiteral" => {
                let result = self.temporary(Some(node));
                self.push_op("TemplateLiteral");
                for expression in ast::array_field(node, "expressions")? {
                    self.process_expression(expression, scope)?;
                }
                Ok(Operand::Var(result))
            }

            "ClassExpression" => {
                let result = self.temporary(Some(node));
                self.push_op("ClassExpression");
                self.push_op("ClassBody");
                self.queue_class_methods(node, scope)?;
                Ok(Operand::Var(result))
            }

            "Super" => {
                let result = self.temporary(Some(node));
                self.push_op("Super");
                Ok(Operand::Var(result))
            }

            "AwaitExpression" => {
                let result = self.temporary(Some(node));
                self.push_op("AwaitExpression");
                self.process_expression(ast::field(node, "argument")?, scope)?;
                Ok(Operand::Var(result))
            }

            other => Err(FlowError::UnsupportedSyntax(format!("expression `{other}`"))),
        }
    }

    /// `||` and `&&` lower to a branch whose short-circuit side jumps over
    /// the right-operand block.
    fn process_logical(&mut self, node: &Value, scope: &Scope) -> Result<Operand> {
        let operator = ast::str_field(node, "operator")?;
        if operator != "||" && operator != "&&" {
            return Err(FlowError::UnsupportedSyntax(format!(
                "logical operator `{operator}`"
            )));
        }
        let or = operator == "||";

        self.push_op("LogicalExpression");
        let result = self.temporary(Some(node));
        let left = self.process_expression(ast::field(node, "left")?, scope)?;
        let branch = self.split(pending_branch(left, node), scope);
        let right_block = self.current;
        self.process_expression(ast::field(node, "right")?, scope)?;
        let jump = self.split(pending_jump(node), scope);
        let continuation = self.current;
        self.patch_jump(jump, continuation);
        if or {
            self.patch_consequent(branch, continuation);
            self.patch_alternate(branch, right_block);
        } else {
            self.patch_consequent(branch, right_block);
            self.patch_alternate(branch, continuation);
        }
        Ok(Operand::Var(result))
    }

    fn process_properties(&mut self, node: &Value, scope: &Scope) -> Result<()> {
        for property in ast::array_field(node, "properties")? {
            if ast::kind(property) == "SpreadElement" {
                self.process_expression(property, scope)?;
            } else {
                self.push_op("Property");
                self.process_expression(ast::field(property, "key")?, scope)?;
                self.process_expression(ast::field(property, "value")?, scope)?;
            }
        }
        Ok(())
    }
}
