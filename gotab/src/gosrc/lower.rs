//! Lowering from the tree-sitter Go CST to the owned AST.
//!
//! The lowering is total: any construct without a dedicated AST shape is
//! captured as a [`RawNode`] with its verbatim text, so a lowered file can
//! always be printed back to compilable source.

use crate::gosrc::ast::*;
use crate::node::Node;

/// A parse-level problem found while lowering a file.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub offset: u32,
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Lower a parsed source file into the owned AST, collecting syntax-error
/// diagnostics along the way.
pub fn lower_file(root: Node, code: &[u8]) -> (GoFile, Vec<Diagnostic>) {
    let mut diags = Vec::new();
    collect_diagnostics(&root, &mut diags);

    let mut package_name = Ident::new("");
    let mut imports = Vec::new();
    let mut decls = Vec::new();

    for child in root.named_children() {
        match child.kind() {
            "package_clause" => {
                if let Some(name) = child.first_child_of_kind("package_identifier") {
                    package_name = lower_ident(&name, code);
                }
            }
            "import_declaration" => lower_imports(&child, code, &mut imports),
            "comment" => {}
            _ => decls.push(lower_decl(&child, code)),
        }
    }

    let file = GoFile {
        package_name,
        imports,
        decls,
        span: span_of(&root),
    };
    (file, diags)
}

fn collect_diagnostics(node: &Node, out: &mut Vec<Diagnostic>) {
    if !node.has_error() {
        return;
    }
    if node.kind() == "ERROR" || node.is_missing() {
        out.push(Diagnostic {
            offset: node.start_byte() as u32,
            line: node.start_row() + 1,
            message: if node.is_missing() {
                format!("missing {}", node.kind())
            } else {
                "syntax error".to_string()
            },
        });
        return;
    }
    for child in node.children() {
        collect_diagnostics(&child, out);
    }
}

fn span_of(node: &Node) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

fn lower_ident(node: &Node, code: &[u8]) -> Ident {
    Ident {
        name: node.text(code).to_string(),
        span: span_of(node),
    }
}

/// Capture a node verbatim, remembering the indentation of its first line so
/// the printer can re-indent continuation lines.
fn raw_node(node: &Node, code: &[u8]) -> RawNode {
    let start = node.start_byte();
    let mut line_start = start;
    while line_start > 0 && code[line_start - 1] != b'\n' {
        line_start -= 1;
    }
    let indent: String = code[line_start..start]
        .iter()
        .take_while(|b| **b == b' ' || **b == b'\t')
        .map(|b| *b as char)
        .collect();

    RawNode {
        text: node.text(code).to_string(),
        indent,
        span: span_of(node),
    }
}

fn lower_imports(node: &Node, code: &[u8], out: &mut Vec<ImportSpec>) {
    let mut specs = Vec::new();
    node.act_on_node(&mut |n| {
        if n.kind() == "import_spec" {
            specs.push(n.inner());
        }
    });
    for spec in specs {
        let spec = Node::new(spec);
        let path = spec
            .child_by_field_name("path")
            .map(|p| p.text(code).trim_matches(['"', '`']).to_string())
            .unwrap_or_default();
        let alias = spec.child_by_field_name("name").map(|n| n.text(code).to_string());
        out.push(ImportSpec {
            path,
            alias,
            span: span_of(&spec),
        });
    }
}

fn lower_decl(node: &Node, code: &[u8]) -> Decl {
    match node.kind() {
        "function_declaration" => Decl::Func(lower_func_decl(node, code, None)),
        "method_declaration" => {
            let recv = node
                .child_by_field_name("receiver")
                .and_then(|r| lower_params(&r, code).into_iter().next());
            Decl::Func(lower_func_decl(node, code, recv))
        }
        "var_declaration" => Decl::Gen(lower_gen_decl(node, code, GenTok::Var)),
        "const_declaration" => Decl::Gen(lower_gen_decl(node, code, GenTok::Const)),
        "type_declaration" => Decl::Gen(lower_type_decl(node, code)),
        _ => Decl::Raw(raw_node(node, code)),
    }
}

fn lower_func_decl(node: &Node, code: &[u8], recv: Option<Field>) -> FuncDecl {
    let name = node
        .child_by_field_name("name")
        .map(|n| lower_ident(&n, code))
        .unwrap_or_else(|| Ident::new(""));
    let has_type_params = node.child_by_field_name("type_parameters").is_some();
    let params = node
        .child_by_field_name("parameters")
        .map(|p| lower_params(&p, code))
        .unwrap_or_default();
    let results = node
        .child_by_field_name("result")
        .map(|r| lower_results(&r, code));
    let body = node.child_by_field_name("body").map(|b| lower_block(&b, code));

    FuncDecl {
        name,
        recv,
        has_type_params,
        params,
        results,
        body,
        span: span_of(node),
    }
}

fn lower_params(list: &Node, code: &[u8]) -> Vec<Field> {
    let mut fields = Vec::new();
    for child in list.named_children() {
        match child.kind() {
            "parameter_declaration" => {
                let names: Vec<Ident> = child
                    .children()
                    .into_iter()
                    .filter(|c| c.kind() == "identifier")
                    .map(|c| lower_ident(&c, code))
                    .collect();
                let ty = child
                    .child_by_field_name("type")
                    .map(|t| lower_expr(&t, code))
                    .unwrap_or_else(|| Expr::Raw(raw_node(&child, code)));
                fields.push(Field {
                    names,
                    ty,
                    tag: None,
                    span: span_of(&child),
                });
            }
            "variadic_parameter_declaration" => {
                let names: Vec<Ident> = child
                    .children()
                    .into_iter()
                    .filter(|c| c.kind() == "identifier")
                    .map(|c| lower_ident(&c, code))
                    .collect();
                // Keep the `...T` type verbatim.
                let ty = child
                    .child_by_field_name("type")
                    .map(|t| {
                        let mut raw = raw_node(&t, code);
                        raw.text = format!("...{}", raw.text);
                        Expr::Raw(raw)
                    })
                    .unwrap_or_else(|| Expr::Raw(raw_node(&child, code)));
                fields.push(Field {
                    names,
                    ty,
                    tag: None,
                    span: span_of(&child),
                });
            }
            _ => {}
        }
    }
    fields
}

fn lower_results(node: &Node, code: &[u8]) -> FieldList {
    let fields = if node.kind() == "parameter_list" {
        lower_params(node, code)
    } else {
        // A single bare result type.
        vec![Field {
            names: Vec::new(),
            ty: lower_expr(node, code),
            tag: None,
            span: span_of(node),
        }]
    };
    FieldList {
        fields,
        span: span_of(node),
    }
}

fn lower_gen_decl(node: &Node, code: &[u8], tok: GenTok) -> GenDecl {
    let spec_kind = match tok {
        GenTok::Var => "var_spec",
        GenTok::Const => "const_spec",
        GenTok::Type => "type_spec",
    };
    let mut specs = Vec::new();
    let mut spec_nodes = Vec::new();
    node.act_on_node(&mut |n| {
        if n.kind() == spec_kind {
            spec_nodes.push(n.inner());
        }
    });
    for spec in spec_nodes {
        let spec = Node::new(spec);
        let names: Vec<Ident> = spec
            .children()
            .into_iter()
            .filter(|c| c.kind() == "identifier")
            .map(|c| lower_ident(&c, code))
            .collect();
        let ty = spec.child_by_field_name("type").map(|t| lower_expr(&t, code));
        let values = spec
            .child_by_field_name("value")
            .map(|v| lower_expr_list(&v, code))
            .unwrap_or_default();
        specs.push(Spec::Value(ValueSpec {
            names,
            ty,
            values,
            span: span_of(&spec),
        }));
    }
    GenDecl {
        tok,
        specs,
        span: span_of(node),
    }
}

fn lower_type_decl(node: &Node, code: &[u8]) -> GenDecl {
    let mut specs = Vec::new();
    for child in node.named_children() {
        match child.kind() {
            "type_spec" | "type_alias" => {
                if child.child_by_field_name("type_parameters").is_some() {
                    // Generic type declarations are kept verbatim.
                    specs.push(Spec::Raw(raw_node(&child, code)));
                    continue;
                }
                let name = child
                    .child_by_field_name("name")
                    .map(|n| lower_ident(&n, code))
                    .unwrap_or_else(|| Ident::new(""));
                let ty = child
                    .child_by_field_name("type")
                    .map(|t| lower_expr(&t, code))
                    .unwrap_or_else(|| Expr::Raw(raw_node(&child, code)));
                specs.push(Spec::Type(TypeSpec {
                    name,
                    ty,
                    is_alias: child.kind() == "type_alias",
                    span: span_of(&child),
                }));
            }
            _ => {}
        }
    }
    GenDecl {
        tok: GenTok::Type,
        specs,
        span: span_of(node),
    }
}

fn lower_block(node: &Node, code: &[u8]) -> Block {
    let stmts = node
        .named_children()
        .into_iter()
        .filter(|c| c.kind() != "comment")
        .map(|c| lower_stmt(&c, code))
        .collect();
    Block {
        stmts,
        span: span_of(node),
    }
}

fn lower_expr_list(node: &Node, code: &[u8]) -> Vec<Expr> {
    if node.kind() == "expression_list" {
        node.named_children()
            .into_iter()
            .map(|c| lower_expr(&c, code))
            .collect()
    } else {
        vec![lower_expr(node, code)]
    }
}

pub(crate) fn lower_stmt(node: &Node, code: &[u8]) -> Stmt {
    let span = span_of(node);
    match node.kind() {
        "expression_statement" => match node.named_children().into_iter().next() {
            Some(x) => Stmt::Expr(ExprStmt {
                x: lower_expr(&x, code),
                span,
            }),
            None => Stmt::Raw(raw_node(node, code)),
        },
        "short_var_declaration" => {
            let lhs = node
                .child_by_field_name("left")
                .map(|l| lower_expr_list(&l, code))
                .unwrap_or_default();
            let rhs = node
                .child_by_field_name("right")
                .map(|r| lower_expr_list(&r, code))
                .unwrap_or_default();
            Stmt::Assign(AssignStmt {
                lhs,
                op: ":=".to_string(),
                rhs,
                span,
            })
        }
        "assignment_statement" => {
            let lhs = node
                .child_by_field_name("left")
                .map(|l| lower_expr_list(&l, code))
                .unwrap_or_default();
            let rhs = node
                .child_by_field_name("right")
                .map(|r| lower_expr_list(&r, code))
                .unwrap_or_default();
            let op = node
                .child_by_field_name("operator")
                .map(|o| o.text(code).to_string())
                .unwrap_or_else(|| "=".to_string());
            Stmt::Assign(AssignStmt { lhs, op, rhs, span })
        }
        "var_declaration" => Stmt::Decl(DeclStmt {
            decl: lower_gen_decl(node, code, GenTok::Var),
            span,
        }),
        "const_declaration" => Stmt::Decl(DeclStmt {
            decl: lower_gen_decl(node, code, GenTok::Const),
            span,
        }),
        "for_statement" => lower_for(node, code),
        "if_statement" => lower_if(node, code),
        "expression_switch_statement" | "type_switch_statement" => {
            lower_switch(node, code, "switch")
        }
        "select_statement" => lower_switch(node, code, "select"),
        "return_statement" => {
            let results = node
                .named_children()
                .into_iter()
                .next()
                .map(|l| lower_expr_list(&l, code))
                .unwrap_or_default();
            Stmt::Return(ReturnStmt { results, span })
        }
        "break_statement" | "continue_statement" | "goto_statement" => {
            let tok = match node.kind() {
                "break_statement" => BranchTok::Break,
                "continue_statement" => BranchTok::Continue,
                _ => BranchTok::Goto,
            };
            let label = node
                .first_child_of_kind("label_name")
                .map(|l| lower_ident(&l, code));
            Stmt::Branch(BranchStmt { tok, label, span })
        }
        "fallthrough_statement" => Stmt::Branch(BranchStmt {
            tok: BranchTok::Fallthrough,
            label: None,
            span,
        }),
        "go_statement" => match node.named_children().into_iter().next() {
            Some(call) => Stmt::Go(GoStmt {
                call: lower_expr(&call, code),
                span,
            }),
            None => Stmt::Raw(raw_node(node, code)),
        },
        "defer_statement" => match node.named_children().into_iter().next() {
            Some(call) => Stmt::Defer(DeferStmt {
                call: lower_expr(&call, code),
                span,
            }),
            None => Stmt::Raw(raw_node(node, code)),
        },
        "labeled_statement" => {
            let label = node
                .first_child_of_kind("label_name")
                .map(|l| lower_ident(&l, code))
                .unwrap_or_else(|| Ident::new(""));
            let inner = node
                .named_children()
                .into_iter()
                .find(|c| c.kind() != "label_name" && c.kind() != "comment");
            match inner {
                Some(s) => Stmt::Labeled(LabeledStmt {
                    label,
                    stmt: Box::new(lower_stmt(&s, code)),
                    span,
                }),
                None => Stmt::Raw(raw_node(node, code)),
            }
        }
        "block" => Stmt::Block(lower_block(node, code)),
        _ => Stmt::Raw(raw_node(node, code)),
    }
}

fn lower_for(node: &Node, code: &[u8]) -> Stmt {
    let span = span_of(node);
    let body = match node.child_by_field_name("body") {
        Some(b) => lower_block(&b, code),
        None => return Stmt::Raw(raw_node(node, code)),
    };

    if let Some(range) = node.first_child_of_kind("range_clause") {
        let (mut key, mut value) = (None, None);
        if let Some(left) = range.child_by_field_name("left") {
            let mut vars = lower_expr_list(&left, code).into_iter();
            key = vars.next();
            value = vars.next();
        }
        let define = range
            .children()
            .iter()
            .any(|c| !c.is_named() && c.text(code) == ":=");
        let x = range
            .child_by_field_name("right")
            .map(|r| lower_expr(&r, code))
            .unwrap_or_else(|| Expr::Raw(raw_node(&range, code)));
        return Stmt::Range(RangeStmt {
            key,
            value,
            define,
            x,
            body,
            span,
        });
    }

    // Plain `for` loop: keep everything between the keyword and the body
    // verbatim, since only the body participates in analysis.
    let clause_start = node.start_byte() + "for".len();
    let clause_end = body.span.start as usize;
    let text = String::from_utf8_lossy(&code[clause_start.min(clause_end)..clause_end])
        .trim()
        .to_string();
    let clause = RawNode {
        text,
        indent: String::new(),
        span: Span::new(clause_start, clause_end),
    };
    Stmt::For(ForStmt { clause, body, span })
}

fn lower_if(node: &Node, code: &[u8]) -> Stmt {
    let span = span_of(node);
    let init = node
        .child_by_field_name("initializer")
        .map(|i| Box::new(lower_stmt(&i, code)));
    let cond = match node.child_by_field_name("condition") {
        Some(c) => lower_expr(&c, code),
        None => return Stmt::Raw(raw_node(node, code)),
    };
    let body = match node.child_by_field_name("consequence") {
        Some(b) => lower_block(&b, code),
        None => return Stmt::Raw(raw_node(node, code)),
    };
    let else_branch = node
        .child_by_field_name("alternative")
        .map(|a| Box::new(lower_stmt(&a, code)));
    Stmt::If(IfStmt {
        init,
        cond,
        body,
        else_branch,
        span,
    })
}

fn lower_switch(node: &Node, code: &[u8], keyword: &str) -> Stmt {
    let span = span_of(node);
    let mut cases = Vec::new();
    let mut first_case_start = node.end_byte();

    for child in node.named_children() {
        match child.kind() {
            "expression_case" | "type_case" | "communication_case" | "default_case" => {
                if child.start_byte() < first_case_start {
                    first_case_start = child.start_byte();
                }
                // The header runs up to (and including) the `:` token; the
                // body is every statement child after it.
                let mut colon_end = child.start_byte();
                for tok in child.children() {
                    if !tok.is_named() && tok.text(code) == ":" {
                        colon_end = tok.end_byte();
                        break;
                    }
                }
                let header = String::from_utf8_lossy(&code[child.start_byte()..colon_end])
                    .trim()
                    .to_string();
                let body = child
                    .named_children()
                    .into_iter()
                    .filter(|c| c.start_byte() >= colon_end && c.kind() != "comment")
                    .map(|c| lower_stmt(&c, code))
                    .collect();
                cases.push(CaseClause {
                    header,
                    body,
                    span: span_of(&child),
                });
            }
            _ => {}
        }
    }

    // Header text between the keyword and the first case (or the closing
    // brace for an empty switch), minus the opening brace.
    let header_start = node.start_byte() + keyword.len();
    let header_end = first_case_start.max(header_start);
    let header = String::from_utf8_lossy(&code[header_start..header_end])
        .trim()
        .trim_end_matches('{')
        .trim()
        .to_string();

    Stmt::Switch(SwitchStmt {
        keyword: keyword.to_string(),
        header,
        cases,
        span,
    })
}

pub(crate) fn lower_expr(node: &Node, code: &[u8]) -> Expr {
    let span = span_of(node);
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "package_identifier"
        | "true" | "false" | "nil" | "iota" => Expr::Ident(Ident {
            name: node.text(code).to_string(),
            span,
        }),
        "interpreted_string_literal" | "raw_string_literal" => Expr::BasicLit(BasicLit {
            kind: LitKind::Str,
            value: node.text(code).to_string(),
            span,
        }),
        "int_literal" => Expr::BasicLit(BasicLit {
            kind: LitKind::Int,
            value: node.text(code).to_string(),
            span,
        }),
        "float_literal" => Expr::BasicLit(BasicLit {
            kind: LitKind::Float,
            value: node.text(code).to_string(),
            span,
        }),
        "imaginary_literal" => Expr::BasicLit(BasicLit {
            kind: LitKind::Imag,
            value: node.text(code).to_string(),
            span,
        }),
        "rune_literal" => Expr::BasicLit(BasicLit {
            kind: LitKind::Char,
            value: node.text(code).to_string(),
            span,
        }),
        "selector_expression" => {
            let x = node
                .child_by_field_name("operand")
                .map(|o| lower_expr(&o, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let sel = node
                .child_by_field_name("field")
                .map(|f| lower_ident(&f, code))
                .unwrap_or_else(|| Ident::new(""));
            Expr::Selector(SelectorExpr {
                x: Box::new(x),
                sel,
                span,
            })
        }
        "call_expression" => {
            let fun = node
                .child_by_field_name("function")
                .map(|f| lower_expr(&f, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let args = node
                .child_by_field_name("arguments")
                .map(|a| {
                    a.named_children()
                        .into_iter()
                        .filter(|c| c.kind() != "comment")
                        .map(|c| lower_expr(&c, code))
                        .collect()
                })
                .unwrap_or_default();
            Expr::Call(CallExpr {
                fun: Box::new(fun),
                args,
                span,
            })
        }
        "composite_literal" => {
            let ty = node
                .child_by_field_name("type")
                .map(|t| Box::new(lower_expr(&t, code)));
            let elts = node
                .child_by_field_name("body")
                .map(|b| lower_literal_elements(&b, code))
                .unwrap_or_default();
            Expr::Composite(CompositeLit { ty, elts, span })
        }
        "literal_value" => Expr::Composite(CompositeLit {
            ty: None,
            elts: lower_literal_elements(node, code),
            span,
        }),
        "func_literal" => {
            let params = node
                .child_by_field_name("parameters")
                .map(|p| lower_params(&p, code))
                .unwrap_or_default();
            let results = node
                .child_by_field_name("result")
                .map(|r| lower_results(&r, code));
            let body = node
                .child_by_field_name("body")
                .map(|b| lower_block(&b, code))
                .unwrap_or(Block {
                    stmts: Vec::new(),
                    span,
                });
            Expr::FuncLit(FuncLit {
                params,
                results,
                body,
                span,
            })
        }
        "unary_expression" => {
            let op = node
                .child_by_field_name("operator")
                .map(|o| o.text(code).to_string())
                .unwrap_or_default();
            let x = node
                .child_by_field_name("operand")
                .map(|o| lower_expr(&o, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::Unary(UnaryExpr {
                op,
                x: Box::new(x),
                span,
            })
        }
        "binary_expression" => {
            let x = node
                .child_by_field_name("left")
                .map(|l| lower_expr(&l, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let y = node
                .child_by_field_name("right")
                .map(|r| lower_expr(&r, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let op = node
                .child_by_field_name("operator")
                .map(|o| o.text(code).to_string())
                .unwrap_or_default();
            Expr::Binary(BinaryExpr {
                x: Box::new(x),
                op,
                y: Box::new(y),
                span,
            })
        }
        "pointer_type" => {
            let x = node
                .named_children()
                .into_iter()
                .next()
                .map(|t| lower_expr(&t, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::Star(StarExpr {
                x: Box::new(x),
                span,
            })
        }
        "index_expression" => {
            let x = node
                .child_by_field_name("operand")
                .map(|o| lower_expr(&o, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let index = node
                .child_by_field_name("index")
                .map(|i| lower_expr(&i, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::Index(IndexExpr {
                x: Box::new(x),
                index: Box::new(index),
                span,
            })
        }
        "parenthesized_expression" => {
            let x = node
                .named_children()
                .into_iter()
                .next()
                .map(|i| lower_expr(&i, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::Paren(ParenExpr {
                x: Box::new(x),
                span,
            })
        }
        "slice_type" => {
            let elem = node
                .child_by_field_name("element")
                .map(|e| lower_expr(&e, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::ArrayType(ArrayTypeExpr {
                len: None,
                elem: Box::new(elem),
                span,
            })
        }
        "array_type" => {
            let len = node
                .child_by_field_name("length")
                .map(|l| Box::new(lower_expr(&l, code)));
            let elem = node
                .child_by_field_name("element")
                .map(|e| lower_expr(&e, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::ArrayType(ArrayTypeExpr {
                len,
                elem: Box::new(elem),
                span,
            })
        }
        "map_type" => {
            let key = node
                .child_by_field_name("key")
                .map(|k| lower_expr(&k, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            let value = node
                .child_by_field_name("value")
                .map(|v| lower_expr(&v, code))
                .unwrap_or_else(|| Expr::Raw(raw_node(node, code)));
            Expr::MapType(MapTypeExpr {
                key: Box::new(key),
                value: Box::new(value),
                span,
            })
        }
        "struct_type" => {
            let mut fields = Vec::new();
            if let Some(list) = node.first_child_of_kind("field_declaration_list") {
                for field in list.named_children() {
                    if field.kind() != "field_declaration" {
                        continue;
                    }
                    let names: Vec<Ident> = field
                        .children()
                        .into_iter()
                        .filter(|c| c.kind() == "field_identifier")
                        .map(|c| lower_ident(&c, code))
                        .collect();
                    let ty = field
                        .child_by_field_name("type")
                        .map(|t| lower_expr(&t, code))
                        .unwrap_or_else(|| Expr::Raw(raw_node(&field, code)));
                    let tag = field
                        .child_by_field_name("tag")
                        .map(|t| t.text(code).to_string());
                    fields.push(Field {
                        names,
                        ty,
                        tag,
                        span: span_of(&field),
                    });
                }
            }
            Expr::StructType(StructTypeExpr { fields, span })
        }
        "function_type" => {
            let params = node
                .child_by_field_name("parameters")
                .map(|p| lower_params(&p, code))
                .unwrap_or_default();
            let results = node
                .child_by_field_name("result")
                .map(|r| lower_results(&r, code));
            Expr::FuncType(FuncTypeExpr {
                params,
                results,
                span,
            })
        }
        "qualified_type" => {
            let mut parts = node.named_children().into_iter();
            let pkg = parts
                .next()
                .map(|p| lower_ident(&p, code))
                .unwrap_or_else(|| Ident::new(""));
            let name = parts
                .next()
                .map(|n| lower_ident(&n, code))
                .unwrap_or_else(|| Ident::new(""));
            Expr::Qualified(QualifiedType { pkg, name, span })
        }
        _ => Expr::Raw(raw_node(node, code)),
    }
}

/// Lower the elements of a `literal_value`, unwrapping `literal_element`
/// wrappers and pairing `keyed_element` children into key/value expressions.
fn lower_literal_elements(body: &Node, code: &[u8]) -> Vec<Expr> {
    let mut elts = Vec::new();
    for child in body.named_children() {
        match child.kind() {
            "literal_element" => {
                if let Some(inner) = child.named_children().into_iter().next() {
                    elts.push(lower_expr(&inner, code));
                }
            }
            "keyed_element" => {
                // Parts are `literal_element` wrappers in current grammars,
                // bare expressions in older ones.
                let unwrap_part = |n: &Node| -> Option<Expr> {
                    if n.kind() == "literal_element" {
                        n.named_children()
                            .into_iter()
                            .next()
                            .map(|inner| lower_expr(&inner, code))
                    } else {
                        Some(lower_expr(n, code))
                    }
                };
                let mut parts = child.named_children().into_iter();
                let key = parts
                    .next()
                    .and_then(|k| unwrap_part(&k))
                    .unwrap_or_else(|| Expr::Raw(raw_node(&child, code)));
                let value = parts
                    .next()
                    .and_then(|v| unwrap_part(&v))
                    .unwrap_or_else(|| Expr::Raw(raw_node(&child, code)));
                elts.push(Expr::KeyValue(KeyValueExpr {
                    key: Box::new(key),
                    value: Box::new(value),
                    span: span_of(&child),
                }));
            }
            "comment" => {}
            _ => elts.push(lower_expr(&child, code)),
        }
    }
    elts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::GoParser;

    fn lower(src: &str) -> GoFile {
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (file, diags) = lower_file(parser.root(), parser.code());
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        file
    }

    #[test]
    fn test_lower_package_and_imports() {
        let file = lower("package demo\n\nimport (\n\t\"fmt\"\n\tx \"os\"\n)\n");
        assert_eq!(file.package_name.name, "demo");
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.imports[0].path, "fmt");
        assert_eq!(file.imports[1].alias.as_deref(), Some("x"));
        assert_eq!(file.imports[1].local_name(), "x");
    }

    #[test]
    fn test_lower_func_decl() {
        let file = lower("package demo\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n");
        let func = file.decls[0].as_func().unwrap();
        assert_eq!(func.name.name, "Add");
        assert_eq!(func.params.len(), 1);
        assert_eq!(func.params[0].names.len(), 2);
        assert!(func.results.is_some());
        assert_eq!(func.statements().len(), 1);
        assert!(matches!(func.statements()[0], Stmt::Return(_)));
    }

    #[test]
    fn test_lower_range_loop() {
        let file = lower(
            "package demo\n\nfunc f(cases []int) {\n\tfor _, c := range cases {\n\t\t_ = c\n\t}\n}\n",
        );
        let func = file.decls[0].as_func().unwrap();
        match &func.statements()[0] {
            Stmt::Range(r) => {
                assert_eq!(r.key.as_ref().unwrap().as_ident().unwrap().name, "_");
                assert_eq!(r.value.as_ref().unwrap().as_ident().unwrap().name, "c");
                assert!(r.define);
                assert_eq!(r.x.as_ident().unwrap().name, "cases");
                assert_eq!(r.body.stmts.len(), 1);
            }
            other => panic!("expected range statement, got {other:?}"),
        }
    }

    #[test]
    fn test_lower_for_index_loop_kept_as_for() {
        let file =
            lower("package demo\n\nfunc f() {\n\tfor i := 0; i < 3; i++ {\n\t\t_ = i\n\t}\n}\n");
        let func = file.decls[0].as_func().unwrap();
        match &func.statements()[0] {
            Stmt::For(f) => assert_eq!(f.clause.text, "i := 0; i < 3; i++"),
            other => panic!("expected for statement, got {other:?}"),
        }
    }

    #[test]
    fn test_lower_composite_literal_with_keyed_elements() {
        let file = lower(
            "package demo\n\nvar cases = map[string]int{\n\t\"a\": 1,\n\t\"b\": 2,\n}\n",
        );
        let Decl::Gen(gen) = &file.decls[0] else {
            panic!("expected gen decl");
        };
        let Spec::Value(spec) = &gen.specs[0] else {
            panic!("expected value spec");
        };
        let Expr::Composite(lit) = &spec.values[0] else {
            panic!("expected composite literal");
        };
        assert_eq!(lit.elts.len(), 2);
        assert!(matches!(lit.elts[0], Expr::KeyValue(_)));
    }

    #[test]
    fn test_lower_struct_type_fields() {
        let file = lower(
            "package demo\n\ntype scenario struct {\n\tName string\n\tWant int\n\tcheck func(int) bool\n}\n",
        );
        let Decl::Gen(gen) = &file.decls[0] else {
            panic!("expected gen decl");
        };
        let Spec::Type(spec) = &gen.specs[0] else {
            panic!("expected type spec");
        };
        let Expr::StructType(st) = &spec.ty else {
            panic!("expected struct type");
        };
        assert_eq!(st.fields.len(), 3);
        assert_eq!(st.fields[0].names[0].name, "Name");
        assert!(matches!(st.fields[2].ty, Expr::FuncType(_)));
    }

    #[test]
    fn test_lower_switch_preserves_case_bodies() {
        let file = lower(
            "package demo\n\nfunc f(x int) {\n\tswitch x {\n\tcase 1:\n\t\tprintln(x)\n\tdefault:\n\t\tprintln(0)\n\t}\n}\n",
        );
        let func = file.decls[0].as_func().unwrap();
        match &func.statements()[0] {
            Stmt::Switch(sw) => {
                assert_eq!(sw.keyword, "switch");
                assert_eq!(sw.header, "x");
                assert_eq!(sw.cases.len(), 2);
                assert_eq!(sw.cases[0].header, "case 1:");
                assert_eq!(sw.cases[0].body.len(), 1);
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_diagnostics_for_broken_source() {
        let parser = GoParser::parse(b"package demo\n\nfunc broken( {\n".to_vec()).unwrap();
        let (_, diags) = lower_file(parser.root(), parser.code());
        assert!(!diags.is_empty());
    }
}
