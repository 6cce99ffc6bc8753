//! General-purpose utilities over the owned Go AST.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::gosrc::ast::*;
use crate::gosrc::lower::{lower_file, lower_stmt};
use crate::gosrc::print::render_file;
use crate::parser::GoParser;

/// A node parsed back from a source snippet.
#[derive(Clone, Debug)]
pub enum ParsedNode {
    Decl(Decl),
    Stmt(Stmt),
    Expr(Expr),
}

/// Parse a source snippet into the corresponding AST node, trying it as a
/// declaration, a statement, and finally an expression, in that order.
pub fn string_to_node(text: &str) -> Result<ParsedNode> {
    // Declaration: treat the snippet as the body of a source file. Raw
    // declarations mean the grammar recovered over something that is not
    // really a declaration, so those fall through to the statement attempt.
    let as_file = format!("package _\n{text}\n");
    if let Some(file) = parse_clean(&as_file) {
        match file.decls.into_iter().next() {
            Some(Decl::Raw(_)) | None => {
                debug!("snippet is not a declaration, retrying as statement");
            }
            Some(decl) => return Ok(ParsedNode::Decl(decl)),
        }
    }

    // Statement: wrap the snippet in a function body.
    let as_func = format!("package _\nfunc _() {{\n{text}\n}}\n");
    if let Some(file) = parse_clean(&as_func) {
        if let Some(Decl::Func(func)) = file.decls.into_iter().next() {
            if let Some(stmt) = func.body.and_then(|b| b.stmts.into_iter().next()) {
                return Ok(ParsedNode::Stmt(stmt));
            }
        }
        debug!("snippet parsed as a function with no statements, retrying as expression");
    }

    // Expression: bind the snippet to a throwaway variable.
    let as_expr = format!("package _\nvar _ = {text}\n");
    if let Some(file) = parse_clean(&as_expr) {
        if let Some(Decl::Gen(gen)) = file.decls.into_iter().next() {
            if let Some(Spec::Value(spec)) = gen.specs.into_iter().next() {
                if let Some(value) = spec.values.into_iter().next() {
                    return Ok(ParsedNode::Expr(value));
                }
            }
        }
    }

    bail!("failed to parse node string {text:?}")
}

fn parse_clean(source: &str) -> Option<GoFile> {
    let parser = GoParser::parse(source.as_bytes().to_vec()).ok()?;
    if parser.root().has_error() {
        return None;
    }
    let (file, diags) = lower_file(parser.root(), parser.code());
    if diags.is_empty() {
        Some(file)
    } else {
        None
    }
}

/// Parse a snippet as a single statement.
pub fn string_to_stmt(text: &str) -> Result<Stmt> {
    let as_func = format!("package _\nfunc _() {{\n{text}\n}}\n");
    let parser = GoParser::parse(as_func.as_bytes().to_vec())?;
    let root = parser.root();
    let mut found = None;
    root.act_on_node(&mut |n| {
        if found.is_none() && n.kind() == "block" {
            found = Some(n.inner());
        }
    });
    let block = found.ok_or_else(|| anyhow!("no function body in wrapped snippet"))?;
    let stmt = crate::node::Node::new(block)
        .named_children()
        .into_iter()
        .find(|c| c.kind() != "comment")
        .ok_or_else(|| anyhow!("no statement in snippet {text:?}"))?;
    Ok(lower_stmt(&stmt, parser.code()))
}

/// Find the index of the top-level function declaration enclosing `offset`.
/// Top-level declarations are scanned in order, so the result is always the
/// outermost enclosing function.
pub fn enclosing_function(file: &GoFile, offset: u32) -> Option<usize> {
    file.decls.iter().position(|d| {
        matches!(d, Decl::Func(_)) && d.span().is_valid() && d.span().contains(offset)
    })
}

/// Replace the top-level function declaration named like `new` with `new`
/// itself, returning the displaced declaration. Bodies are not compared,
/// only names.
pub fn replace_func_decl(file: &mut GoFile, new: FuncDecl) -> Result<FuncDecl> {
    let name = new.name.name.clone();
    for decl in file.decls.iter_mut() {
        if let Decl::Func(f) = decl {
            if f.name.name == name {
                return Ok(std::mem::replace(f, new));
            }
        }
    }
    bail!(
        "could not find function declaration {:?} in package {}",
        name,
        file.package_name.name
    )
}

/// Find a statement in a body by deep structural equality (not identity).
pub fn find_stmt_in_body(stmt: &Stmt, body: &[Stmt]) -> Result<usize> {
    body.iter()
        .position(|s| s == stmt)
        .ok_or_else(|| anyhow!("could not find stmt in function body"))
}

/// Return the statement in `new_body` at the index `stmt` occupies in
/// `parent_body`.
pub fn stmt_with_same_index<'a>(
    stmt: &Stmt,
    parent_body: &[Stmt],
    new_body: &'a [Stmt],
) -> Result<&'a Stmt> {
    let index = find_stmt_in_body(stmt, parent_body).context("finding statement in parent body")?;
    new_body.get(index).ok_or_else(|| {
        anyhow!(
            "statement index {} out of bounds for new body containing {} statements",
            index,
            new_body.len()
        )
    })
}

/// Return the name of the first parameter whose type structurally matches
/// any of the candidate type expressions and which has at least one name.
pub fn param_name_by_type(func: &FuncDecl, candidates: &[Expr]) -> Result<String> {
    if candidates.is_empty() {
        bail!("cannot detect parameter name without parameter types");
    }
    for param in &func.params {
        if candidates.iter().any(|c| *c == param.ty) {
            match param.names.first() {
                Some(name) => return Ok(name.name.clone()),
                None => debug!("found parameter with matching type, but it has no name"),
            }
        }
    }
    bail!(
        "could not find parameter with the requested types in function {:?}",
        func.name.name
    )
}

/// Whether a statement is a call of the form `owner.name(...)`, returning
/// the call expression when it matches.
pub fn selector_func_call<'a>(stmt: &'a Stmt, owner: &str, name: &str) -> Option<&'a CallExpr> {
    if let Stmt::Expr(expr_stmt) = stmt {
        if let Expr::Call(call) = &expr_stmt.x {
            if match_selector_expr(&call.fun, owner, name) {
                return Some(call);
            }
        }
    }
    None
}

/// Whether an expression is a selector of the form `owner.name`.
pub fn match_selector_expr(expr: &Expr, owner: &str, name: &str) -> bool {
    if let Expr::Selector(sel) = expr {
        if let Expr::Ident(x) = sel.x.as_ref() {
            return x.name == owner && sel.sel.name == name;
        }
    }
    false
}

/// Build a selector expression of the form `owner.name`.
pub fn new_selector_expr(owner: &str, name: &str) -> Expr {
    Expr::Selector(SelectorExpr {
        x: Box::new(Expr::Ident(Ident::new(owner))),
        sel: Ident::new(name),
        span: Span::SYNTHETIC,
    })
}

/// Build a call expression statement from a callee and its arguments.
pub fn new_call_expr_stmt(fun: Expr, args: Vec<Expr>) -> Stmt {
    Stmt::Expr(ExprStmt {
        x: Expr::Call(CallExpr {
            fun: Box::new(fun),
            args,
            span: Span::SYNTHETIC,
        }),
        span: Span::SYNTHETIC,
    })
}

/// Build a pointer-to-qualified type expression like `*testing.T`.
pub fn new_pointer_type(pkg: &str, name: &str) -> Expr {
    Expr::Star(StarExpr {
        x: Box::new(Expr::Qualified(QualifiedType {
            pkg: Ident::new(pkg),
            name: Ident::new(name),
            span: Span::SYNTHETIC,
        })),
        span: Span::SYNTHETIC,
    })
}

/// Write the file's current AST state to disk, re-printing the declarations
/// listed in `rewritten` and keeping all other source bytes. Parent
/// directories are created as needed.
pub fn save_file_contents(
    path: &Path,
    file: &GoFile,
    original_source: &str,
    rewritten: &[usize],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output file's parent directory {parent:?}"))?;
    }
    let contents = render_file(file, original_source, rewritten);
    fs::write(path, contents).with_context(|| format!("writing to file {path:?}"))?;
    debug!(file = ?path, "replaced file contents");
    Ok(())
}

/// Find a statement anywhere inside a function body by its exact span,
/// descending into nested blocks and function literals.
pub fn find_stmt_by_span<'a>(stmts: &'a [Stmt], span: Span) -> Option<&'a Stmt> {
    for stmt in stmts {
        if stmt.span().is_valid() && stmt.span().same(&span) {
            return Some(stmt);
        }
        let found = match stmt {
            Stmt::Range(r) => find_stmt_by_span(&r.body.stmts, span)
                .or_else(|| find_stmt_by_span_in_expr(&r.x, span)),
            Stmt::For(f) => find_stmt_by_span(&f.body.stmts, span),
            Stmt::If(i) => find_stmt_by_span(&i.body.stmts, span)
                .or_else(|| i.else_branch.as_deref().and_then(|e| find_stmt_by_span(std::slice::from_ref(e), span)))
                .or_else(|| i.init.as_deref().and_then(|s| find_stmt_by_span(std::slice::from_ref(s), span))),
            Stmt::Switch(sw) => sw
                .cases
                .iter()
                .find_map(|c| find_stmt_by_span(&c.body, span)),
            Stmt::Labeled(l) => find_stmt_by_span(std::slice::from_ref(&l.stmt), span),
            Stmt::Block(b) => find_stmt_by_span(&b.stmts, span),
            Stmt::Expr(e) => find_stmt_by_span_in_expr(&e.x, span),
            Stmt::Assign(a) => a
                .rhs
                .iter()
                .find_map(|e| find_stmt_by_span_in_expr(e, span)),
            Stmt::Decl(d) => d.decl.specs.iter().find_map(|s| match s {
                Spec::Value(v) => v.values.iter().find_map(|e| find_stmt_by_span_in_expr(e, span)),
                _ => None,
            }),
            Stmt::Go(g) => find_stmt_by_span_in_expr(&g.call, span),
            Stmt::Defer(d) => find_stmt_by_span_in_expr(&d.call, span),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn find_stmt_by_span_in_expr<'a>(expr: &'a Expr, span: Span) -> Option<&'a Stmt> {
    match expr {
        Expr::FuncLit(f) => find_stmt_by_span(&f.body.stmts, span),
        Expr::Call(c) => c
            .args
            .iter()
            .find_map(|a| find_stmt_by_span_in_expr(a, span))
            .or_else(|| find_stmt_by_span_in_expr(&c.fun, span)),
        Expr::Unary(u) => find_stmt_by_span_in_expr(&u.x, span),
        Expr::Binary(b) => {
            find_stmt_by_span_in_expr(&b.x, span).or_else(|| find_stmt_by_span_in_expr(&b.y, span))
        }
        Expr::Paren(p) => find_stmt_by_span_in_expr(&p.x, span),
        Expr::Composite(c) => c.elts.iter().find_map(|e| find_stmt_by_span_in_expr(e, span)),
        Expr::KeyValue(kv) => find_stmt_by_span_in_expr(&kv.value, span),
        _ => None,
    }
}

/// Mutable variant of [`find_stmt_by_span`].
pub fn find_stmt_by_span_mut<'a>(stmts: &'a mut [Stmt], span: Span) -> Option<&'a mut Stmt> {
    for stmt in stmts {
        if stmt.span().is_valid() && stmt.span().same(&span) {
            return Some(stmt);
        }
        let found = match stmt {
            Stmt::Range(r) => find_stmt_by_span_mut(&mut r.body.stmts, span),
            Stmt::For(f) => find_stmt_by_span_mut(&mut f.body.stmts, span),
            Stmt::If(i) => {
                let in_body = find_stmt_by_span(&i.body.stmts, span).is_some();
                if in_body {
                    find_stmt_by_span_mut(&mut i.body.stmts, span)
                } else if let Some(e) = i.else_branch.as_deref_mut() {
                    find_stmt_by_span_mut(std::slice::from_mut(e), span)
                } else {
                    None
                }
            }
            Stmt::Switch(sw) => sw
                .cases
                .iter_mut()
                .find_map(|c| find_stmt_by_span_mut(&mut c.body, span)),
            Stmt::Labeled(l) => find_stmt_by_span_mut(std::slice::from_mut(&mut l.stmt), span),
            Stmt::Block(b) => find_stmt_by_span_mut(&mut b.stmts, span),
            Stmt::Expr(e) => find_stmt_by_span_in_expr_mut(&mut e.x, span),
            Stmt::Assign(a) => a
                .rhs
                .iter_mut()
                .find_map(|e| find_stmt_by_span_in_expr_mut(e, span)),
            Stmt::Go(g) => find_stmt_by_span_in_expr_mut(&mut g.call, span),
            Stmt::Defer(d) => find_stmt_by_span_in_expr_mut(&mut d.call, span),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn find_stmt_by_span_in_expr_mut<'a>(expr: &'a mut Expr, span: Span) -> Option<&'a mut Stmt> {
    match expr {
        Expr::FuncLit(f) => find_stmt_by_span_mut(&mut f.body.stmts, span),
        Expr::Call(c) => {
            let in_args = c
                .args
                .iter()
                .any(|a| find_stmt_by_span_in_expr(a, span).is_some());
            if in_args {
                c.args
                    .iter_mut()
                    .find_map(|a| find_stmt_by_span_in_expr_mut(a, span))
            } else {
                find_stmt_by_span_in_expr_mut(&mut c.fun, span)
            }
        }
        Expr::Unary(u) => find_stmt_by_span_in_expr_mut(&mut u.x, span),
        Expr::Paren(p) => find_stmt_by_span_in_expr_mut(&mut p.x, span),
        Expr::Composite(c) => c
            .elts
            .iter_mut()
            .find_map(|e| find_stmt_by_span_in_expr_mut(e, span)),
        Expr::KeyValue(kv) => find_stmt_by_span_in_expr_mut(&mut kv.value, span),
        _ => None,
    }
}

/// Collect the unquoted import paths of a file.
pub fn imported_packages(file: &GoFile) -> Vec<String> {
    file.imports.iter().map(|i| i.path.clone()).collect()
}

/// Collect the distinct top-level function names of a file, useful for
/// summaries and sanity checks in tests.
pub fn top_level_functions(file: &GoFile) -> HashSet<String> {
    file.decls
        .iter()
        .filter_map(|d| d.as_func().map(|f| f.name.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::lower::lower_file;

    fn lower(src: &str) -> GoFile {
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (file, _) = lower_file(parser.root(), parser.code());
        file
    }

    #[test]
    fn test_string_to_node_decl() {
        let node = string_to_node("func f() {}").unwrap();
        assert!(matches!(node, ParsedNode::Decl(Decl::Func(_))));
    }

    #[test]
    fn test_string_to_node_stmt() {
        let node = string_to_node("x := 1").unwrap();
        match node {
            ParsedNode::Stmt(Stmt::Assign(a)) => assert_eq!(a.op, ":="),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_string_to_node_rejects_garbage() {
        assert!(string_to_node("func (((").is_err());
    }

    #[test]
    fn test_replace_func_decl_by_name() {
        let mut file = lower("package p\n\nfunc a() {\n\tprintln(1)\n}\n");
        let replacement = match string_to_node("func a() {}").unwrap() {
            ParsedNode::Decl(Decl::Func(f)) => f,
            _ => unreachable!(),
        };
        let old = replace_func_decl(&mut file, replacement).unwrap();
        assert_eq!(old.statements().len(), 1);
        assert_eq!(file.decls[0].as_func().unwrap().statements().len(), 0);
    }

    #[test]
    fn test_replace_func_decl_missing() {
        let mut file = lower("package p\n\nfunc a() {}\n");
        let replacement = match string_to_node("func missing() {}").unwrap() {
            ParsedNode::Decl(Decl::Func(f)) => f,
            _ => unreachable!(),
        };
        assert!(replace_func_decl(&mut file, replacement).is_err());
    }

    #[test]
    fn test_find_stmt_in_body_structural() {
        let file = lower("package p\n\nfunc a() {\n\tx := 1\n\ty := 2\n}\n");
        let body = file.decls[0].as_func().unwrap().statements();
        // A freshly parsed statement has different spans but equal structure.
        let needle = string_to_stmt("y := 2").unwrap();
        assert_eq!(find_stmt_in_body(&needle, body).unwrap(), 1);
    }

    #[test]
    fn test_stmt_with_same_index() {
        let file = lower("package p\n\nfunc a() {\n\tx := 1\n\ty := 2\n}\n");
        let other = lower("package p\n\nfunc b() {\n\tfirst()\n\tsecond()\n}\n");
        let body = file.decls[0].as_func().unwrap().statements();
        let new_body = other.decls[0].as_func().unwrap().statements();
        let needle = string_to_stmt("y := 2").unwrap();
        let twin = stmt_with_same_index(&needle, body, new_body).unwrap();
        assert!(matches!(twin, Stmt::Expr(_)));
    }

    #[test]
    fn test_param_name_by_type() {
        let file = lower("package p\n\nimport \"testing\"\n\nfunc helper(tb *testing.T, n int) {\n\t_ = n\n}\n");
        let func = file.decls[0].as_func().unwrap();
        let name = param_name_by_type(func, &[new_pointer_type("testing", "T")]).unwrap();
        assert_eq!(name, "tb");
    }

    #[test]
    fn test_param_name_by_type_no_match() {
        let file = lower("package p\n\nfunc helper(n int) {\n\t_ = n\n}\n");
        let func = file.decls[0].as_func().unwrap();
        assert!(param_name_by_type(func, &[new_pointer_type("testing", "T")]).is_err());
    }

    #[test]
    fn test_selector_func_call() {
        let stmt = string_to_stmt("t.Run(\"name\", nil)").unwrap();
        assert!(selector_func_call(&stmt, "t", "Run").is_some());
        assert!(selector_func_call(&stmt, "t", "Log").is_none());
    }

    #[test]
    fn test_find_stmt_by_span_descends_into_blocks() {
        let file = lower(
            "package p\n\nfunc a() {\n\tif true {\n\t\tx := 1\n\t\t_ = x\n\t}\n}\n",
        );
        let func = file.decls[0].as_func().unwrap();
        let Stmt::If(if_stmt) = &func.statements()[0] else {
            panic!("expected if");
        };
        let target = if_stmt.body.stmts[0].span();
        let found = find_stmt_by_span(func.statements(), target).unwrap();
        assert!(matches!(found, Stmt::Assign(_)));
    }
}
