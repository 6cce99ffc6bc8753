//! Statement expansion: the inlined view of a test body.
//!
//! Each top-level statement of a test becomes the root of an expansion
//! tree. Call expressions are resolved to their same-package definitions
//! (optionally restricted to test files) and the callee's body statements
//! become children, with a call-stack guard against recursion. Function
//! literals are data and are never expanded at their definition site; only
//! an immediately-invoked literal is a call.

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::{debug, error};

use crate::analysis::testcase::TestCase;
use crate::gosrc::ast::*;
use crate::project::Package;
use crate::types::resolve::is_universe;
use crate::types::{FnScope, GoType, ObjectKind};

/// Where a real statement came from: the file, the top-level declaration,
/// and the statement's own span. Synthetic wrapper nodes have no origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StmtOrigin {
    pub file: usize,
    pub decl: usize,
    pub span: Span,
}

/// One node of an expansion tree.
#[derive(Clone, Debug)]
pub struct ExpandedStatement {
    pub stmt: Stmt,
    pub children: Vec<ExpandedStatement>,
    pub origin: Option<StmtOrigin>,
}

impl ExpandedStatement {
    /// Pre-order iteration over this node and all descendants.
    pub fn iter(&self) -> ExpandedIter<'_> {
        ExpandedIter { stack: vec![self] }
    }
}

pub struct ExpandedIter<'a> {
    stack: Vec<&'a ExpandedStatement>,
}

impl<'a> Iterator for ExpandedIter<'a> {
    type Item = &'a ExpandedStatement;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Where a call resolves to.
#[derive(Clone, Debug)]
pub enum Definition {
    /// A function or method declared in the same package.
    FuncDecl { file: usize, decl: usize },
    /// A definition that exists but has no expandable body (variables, type
    /// names, bindings whose value is not obvious at the call site).
    Opaque,
}

/// Per-run memoization of definition lookups, keyed on the defining
/// position, the package, the project, and the test-only flag. Owned by the
/// task driver for one directory's parse and passed into the expander.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    entries: HashMap<(usize, u32, String, String, bool), Option<Definition>>,
}

impl DefinitionCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Expand one top-level statement of a test body.
pub fn expand_statement(
    pkg: &Package,
    tc: &TestCase,
    stmt: &Stmt,
    origin: StmtOrigin,
    cache: &mut DefinitionCache,
    test_only: bool,
) -> ExpandedStatement {
    let mut stack = Vec::new();
    expand_with_stack(pkg, tc, stmt, Some(origin), cache, test_only, &mut stack)
}

fn expand_with_stack(
    pkg: &Package,
    tc: &TestCase,
    stmt: &Stmt,
    origin: Option<StmtOrigin>,
    cache: &mut DefinitionCache,
    test_only: bool,
    call_stack: &mut Vec<String>,
) -> ExpandedStatement {
    let mut root = ExpandedStatement {
        stmt: stmt.clone(),
        children: Vec::new(),
        origin,
    };

    let mut calls = Vec::new();
    visit_calls_in_stmt(stmt, &mut |call| calls.push(call.clone()));

    let root_is_expr_stmt = matches!(root.stmt, Stmt::Expr(_));

    for call in calls {
        // A call that *is* the statement reuses the root as its container;
        // a call merely contained in the statement gets a synthetic
        // expression-statement wrapper inserted as a child.
        let mut wrapper = if root_is_expr_stmt {
            None
        } else {
            Some(ExpandedStatement {
                stmt: Stmt::Expr(ExprStmt {
                    x: Expr::Call(call.clone()),
                    span: Span::SYNTHETIC,
                }),
                children: Vec::new(),
                origin: None,
            })
        };

        {
            let parent: &mut ExpandedStatement = wrapper.as_mut().unwrap_or(&mut root);

            // Arguments that are themselves calls expand first, on the same
            // call stack (they run in the caller's scope).
            for arg in &call.args {
                if let Expr::Call(arg_call) = arg {
                    let arg_stmt = Stmt::Expr(ExprStmt {
                        x: Expr::Call(arg_call.clone()),
                        span: Span::SYNTHETIC,
                    });
                    let expanded = expand_with_stack(
                        pkg, tc, &arg_stmt, None, cache, test_only, call_stack,
                    );
                    parent.children.push(expanded);
                }
            }

            expand_callee(pkg, tc, &call, origin, parent, cache, test_only, call_stack);
        }

        if let Some(wrapper) = wrapper {
            root.children.push(wrapper);
        }
    }

    root
}

#[allow(clippy::too_many_arguments)]
fn expand_callee(
    pkg: &Package,
    tc: &TestCase,
    call: &CallExpr,
    origin: Option<StmtOrigin>,
    parent: &mut ExpandedStatement,
    cache: &mut DefinitionCache,
    test_only: bool,
    call_stack: &mut Vec<String>,
) {
    // An immediately-invoked function literal carries its body inline.
    if let Expr::FuncLit(lit) = call.fun.as_ref() {
        let name = funclit_name(tc, pkg, lit);
        expand_body(
            pkg, tc, &lit.body.stmts, origin, name, parent, cache, test_only, call_stack,
        );
        return;
    }

    let definition = match find_definition(pkg, tc, &call.fun, origin, cache, test_only) {
        Ok(Some(def)) => def,
        Ok(None) => return,
        Err(err) => {
            error!(%err, test = tc.test_name, "error finding definition for function call");
            return;
        }
    };

    match definition {
        Definition::FuncDecl { file, decl } => {
            let Some(func) = pkg
                .files
                .get(file)
                .and_then(|f| f.ast.decls.get(decl))
                .and_then(Decl::as_func)
            else {
                return;
            };
            let name = func.name.name.clone();
            let callee_origin = Some(StmtOrigin {
                file,
                decl,
                span: Span::SYNTHETIC,
            });
            let stmts: Vec<Stmt> = func.statements().to_vec();
            expand_body(
                pkg,
                tc,
                &stmts,
                callee_origin,
                name,
                parent,
                cache,
                test_only,
                call_stack,
            );
        }
        Definition::Opaque => {
            debug!(test = tc.test_name, "skipping expansion of call without an obvious body");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_body(
    pkg: &Package,
    tc: &TestCase,
    stmts: &[Stmt],
    body_origin: Option<StmtOrigin>,
    name: String,
    parent: &mut ExpandedStatement,
    cache: &mut DefinitionCache,
    test_only: bool,
    call_stack: &mut Vec<String>,
) {
    // Recursion guard: a callee already on the active call stack does not
    // expand again.
    if call_stack.contains(&name) {
        debug!(function = name, "skipping expansion of recursive function call");
        return;
    }
    call_stack.push(name);
    for inner in stmts {
        let inner_origin = body_origin.map(|o| StmtOrigin {
            file: o.file,
            decl: o.decl,
            span: inner.span(),
        });
        let expanded =
            expand_with_stack(pkg, tc, inner, inner_origin, cache, test_only, call_stack);
        parent.children.push(expanded);
    }
    call_stack.pop();
}

fn funclit_name(tc: &TestCase, pkg: &Package, lit: &FuncLit) -> String {
    let line = pkg
        .files
        .get(tc.file)
        .map(|f| f.line_of(lit.span.start))
        .unwrap_or(0);
    format!("funcLit@{}:{}", tc.file_path.display(), line)
}

/// Resolve the callee expression of a call to its same-package definition.
///
/// Returns `Ok(None)` when the definition is deliberately excluded: universe
/// scope, another package, or (with `test_only`) a non-test file.
pub fn find_definition(
    pkg: &Package,
    tc: &TestCase,
    fun: &Expr,
    origin: Option<StmtOrigin>,
    cache: &mut DefinitionCache,
    test_only: bool,
) -> Result<Option<Definition>> {
    let ident = match fun {
        Expr::Ident(i) => i,
        Expr::Selector(sel) => {
            // Qualified call into another package resolves to a foreign
            // object and is ignored; a method on a package-local type
            // resolves through the methods table.
            if let Some(def) = resolve_selector(pkg, tc, sel, origin, cache, test_only)? {
                return Ok(Some(def));
            }
            return Ok(None);
        }
        // Not an identifier or selector: the expression stands for itself
        // and has no declared body to expand.
        _ => return Ok(Some(Definition::Opaque)),
    };

    // Synthesized identifiers (inserted by earlier rewrites) are skipped.
    if !ident.span.is_valid() {
        debug!(identifier = ident.name, "ignoring identifier with invalid position");
        return Ok(None);
    }

    // A local binding shadows any package-level object.
    if let Some(origin) = origin {
        if let Some(func) = enclosing_func(pkg, origin) {
            if has_local_binding(func, &ident.name, ident.span.start) {
                return Ok(Some(Definition::Opaque));
            }
        }
    }

    if let Some(obj) = pkg.types.object(&ident.name) {
        return lookup_object(pkg, tc, obj.pos, obj.file, obj.decl, &obj.kind, cache, test_only);
    }

    if is_universe(&ident.name) {
        debug!(identifier = ident.name, "ignoring universe-scope function");
        return Ok(None);
    }

    bail!("could not resolve identifier {:?}", ident.name)
}

fn resolve_selector(
    pkg: &Package,
    tc: &TestCase,
    sel: &SelectorExpr,
    origin: Option<StmtOrigin>,
    cache: &mut DefinitionCache,
    test_only: bool,
) -> Result<Option<Definition>> {
    // Imports are resolved against the file the selector occurs in.
    let at_file = origin.map(|o| o.file).unwrap_or(tc.file);
    let typing = pkg.typing_for(at_file);

    if let Expr::Ident(x) = sel.x.as_ref() {
        if pkg.files[at_file]
            .ast
            .imports
            .iter()
            .any(|i| i.local_name() == x.name)
        {
            debug!(
                identifier = sel.sel.name,
                package = x.name,
                "ignoring function defined outside the current package"
            );
            return Ok(None);
        }
    }

    // Method call on a value: find the receiver's base type and look the
    // method up in the package.
    let scope = origin
        .and_then(|o| enclosing_func(pkg, o))
        .map(|func| FnScope {
            func,
            at: sel.span.start,
        });
    let recv_ty = typing.type_of(&sel.x, scope);
    let base = pkg.types.table.unpointer(&recv_ty);
    if let GoType::Named(name) = base {
        if let Some(obj) = pkg.types.method(&name, &sel.sel.name) {
            return lookup_object(pkg, tc, obj.pos, obj.file, obj.decl, &obj.kind, cache, test_only);
        }
    }

    // Anything else (foreign methods like `t.Run`, fields, interface calls)
    // is outside the package.
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn lookup_object(
    pkg: &Package,
    tc: &TestCase,
    pos: Span,
    file: usize,
    decl: usize,
    kind: &ObjectKind,
    cache: &mut DefinitionCache,
    test_only: bool,
) -> Result<Option<Definition>> {
    let key = (
        file,
        pos.start,
        tc.package_name.clone(),
        tc.project_name.clone(),
        test_only,
    );
    if let Some(cached) = cache.entries.get(&key) {
        return Ok(cached.clone());
    }

    let def_file = crate::project::enclosing_file(
        &pkg.files,
        crate::project::FilePos {
            file,
            offset: pos.start,
        },
    );
    let Some(def_file) = def_file else {
        bail!("could not find definition file for identifier at file {file}");
    };

    if test_only && !def_file.is_test_file() {
        debug!("ignoring identifier definition found outside a test file");
        cache.entries.insert(key, None);
        return Ok(None);
    }

    let resolved = match kind {
        ObjectKind::Func | ObjectKind::Method { .. } => Some(Definition::FuncDecl { file, decl }),
        // Vars and types have definitions but no body to step into.
        _ => Some(Definition::Opaque),
    };
    cache.entries.insert(key, resolved.clone());
    Ok(resolved)
}

fn enclosing_func(pkg: &Package, origin: StmtOrigin) -> Option<&FuncDecl> {
    pkg.files
        .get(origin.file)?
        .ast
        .decls
        .get(origin.decl)
        .and_then(Decl::as_func)
}

/// Whether the function introduces a local binding for `name` before the
/// given offset.
fn has_local_binding(func: &FuncDecl, name: &str, before: u32) -> bool {
    if func
        .params
        .iter()
        .chain(func.recv.as_slice())
        .any(|p| p.names.iter().any(|n| n.name == name))
    {
        return true;
    }
    fn scan(stmts: &[Stmt], name: &str, before: u32) -> bool {
        for stmt in stmts {
            if stmt.span().is_valid() && stmt.span().start >= before {
                continue;
            }
            match stmt {
                Stmt::Assign(a) if a.is_define() => {
                    if a.lhs
                        .iter()
                        .any(|l| l.as_ident().map(|i| i.name == name).unwrap_or(false))
                    {
                        return true;
                    }
                }
                Stmt::Decl(d) => {
                    for spec in &d.decl.specs {
                        if let Spec::Value(v) = spec {
                            if v.names.iter().any(|n| n.name == name) {
                                return true;
                            }
                        }
                    }
                }
                Stmt::Range(r) => {
                    if [&r.key, &r.value].iter().any(|v| {
                        v.as_ref()
                            .and_then(|e| e.as_ident())
                            .map(|i| i.name == name)
                            .unwrap_or(false)
                    }) || scan(&r.body.stmts, name, before)
                    {
                        return true;
                    }
                }
                Stmt::For(f) => {
                    if scan(&f.body.stmts, name, before) {
                        return true;
                    }
                }
                Stmt::If(i) => {
                    let in_init = i
                        .init
                        .as_deref()
                        .map(|s| scan(std::slice::from_ref(s), name, before))
                        .unwrap_or(false);
                    if in_init
                        || scan(&i.body.stmts, name, before)
                        || i.else_branch
                            .as_deref()
                            .map(|s| scan(std::slice::from_ref(s), name, before))
                            .unwrap_or(false)
                    {
                        return true;
                    }
                }
                Stmt::Block(b) => {
                    if scan(&b.stmts, name, before) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
    scan(func.statements(), name, before)
}

/// Pre-order walk over the call expressions of a statement. Call subtrees
/// are not descended into (their arguments and callees are handled by the
/// expansion itself), but function-literal bodies in non-call positions are.
pub fn visit_calls_in_stmt(stmt: &Stmt, f: &mut impl FnMut(&CallExpr)) {
    match stmt {
        Stmt::Expr(e) => visit_calls_in_expr(&e.x, f),
        Stmt::Assign(a) => {
            for lhs in &a.lhs {
                visit_calls_in_expr(lhs, f);
            }
            for rhs in &a.rhs {
                visit_calls_in_expr(rhs, f);
            }
        }
        Stmt::Decl(d) => {
            for spec in &d.decl.specs {
                if let Spec::Value(v) = spec {
                    for value in &v.values {
                        visit_calls_in_expr(value, f);
                    }
                }
            }
        }
        Stmt::Range(r) => {
            visit_calls_in_expr(&r.x, f);
            for s in &r.body.stmts {
                visit_calls_in_stmt(s, f);
            }
        }
        Stmt::For(for_stmt) => {
            for s in &for_stmt.body.stmts {
                visit_calls_in_stmt(s, f);
            }
        }
        Stmt::If(i) => {
            if let Some(init) = &i.init {
                visit_calls_in_stmt(init, f);
            }
            visit_calls_in_expr(&i.cond, f);
            for s in &i.body.stmts {
                visit_calls_in_stmt(s, f);
            }
            if let Some(e) = &i.else_branch {
                visit_calls_in_stmt(e, f);
            }
        }
        Stmt::Switch(sw) => {
            for case in &sw.cases {
                for s in &case.body {
                    visit_calls_in_stmt(s, f);
                }
            }
        }
        Stmt::Return(r) => {
            for result in &r.results {
                visit_calls_in_expr(result, f);
            }
        }
        Stmt::Go(g) => visit_calls_in_expr(&g.call, f),
        Stmt::Defer(d) => visit_calls_in_expr(&d.call, f),
        Stmt::Labeled(l) => visit_calls_in_stmt(&l.stmt, f),
        Stmt::Block(b) => {
            for s in &b.stmts {
                visit_calls_in_stmt(s, f);
            }
        }
        Stmt::Branch(_) | Stmt::Raw(_) => {}
    }
}

fn visit_calls_in_expr(expr: &Expr, f: &mut impl FnMut(&CallExpr)) {
    match expr {
        Expr::Call(call) => f(call),
        Expr::Selector(s) => visit_calls_in_expr(&s.x, f),
        Expr::Composite(c) => {
            for elt in &c.elts {
                visit_calls_in_expr(elt, f);
            }
        }
        Expr::KeyValue(kv) => {
            visit_calls_in_expr(&kv.key, f);
            visit_calls_in_expr(&kv.value, f);
        }
        Expr::FuncLit(lit) => {
            for s in &lit.body.stmts {
                visit_calls_in_stmt(s, f);
            }
        }
        Expr::Unary(u) => visit_calls_in_expr(&u.x, f),
        Expr::Binary(b) => {
            visit_calls_in_expr(&b.x, f);
            visit_calls_in_expr(&b.y, f);
        }
        Expr::Star(s) => visit_calls_in_expr(&s.x, f),
        Expr::Index(i) => {
            visit_calls_in_expr(&i.x, f);
            visit_calls_in_expr(&i.index, f);
        }
        Expr::Paren(p) => visit_calls_in_expr(&p.x, f),
        _ => {}
    }
}
