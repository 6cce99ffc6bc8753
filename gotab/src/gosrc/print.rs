//! Printing the owned AST back to Go source.
//!
//! Printing is deterministic, with tabs for indentation. Whole files are
//! rendered by splicing re-printed declarations into the original source
//! text (sorted reverse-order range edits), so untouched declarations and
//! their comments survive byte-for-byte.

use crate::gosrc::ast::*;

/// Types that can be printed as Go source.
pub trait ToGo {
    fn to_go(&self) -> String;
}

impl ToGo for Expr {
    fn to_go(&self) -> String {
        let mut p = Printer::new();
        p.expr(self);
        p.out
    }
}

impl ToGo for Stmt {
    fn to_go(&self) -> String {
        let mut p = Printer::new();
        p.stmt(self);
        p.out.trim_end().to_string()
    }
}

impl ToGo for Block {
    fn to_go(&self) -> String {
        let mut p = Printer::new();
        p.block(self);
        p.out.trim_end().to_string()
    }
}

impl ToGo for FuncDecl {
    fn to_go(&self) -> String {
        let mut p = Printer::new();
        p.func_decl(self);
        p.out.trim_end().to_string()
    }
}

impl ToGo for GenDecl {
    fn to_go(&self) -> String {
        let mut p = Printer::new();
        p.gen_decl(self);
        p.out.trim_end().to_string()
    }
}

/// Render a whole file, re-printing only the declarations whose indices are
/// listed in `rewritten` and keeping every other byte of the original.
pub fn render_file(file: &GoFile, original: &str, rewritten: &[usize]) -> String {
    let mut edits: Vec<(usize, usize, String)> = rewritten
        .iter()
        .filter_map(|&i| {
            let decl = file.decls.get(i)?;
            let span = decl.span();
            if !span.is_valid() || span.end as usize > original.len() {
                return None;
            }
            let text = match decl {
                Decl::Func(f) => f.to_go(),
                Decl::Gen(g) => g.to_go(),
                Decl::Raw(r) => r.text.clone(),
            };
            Some((span.start as usize, span.end as usize, text))
        })
        .collect();

    // Apply in reverse order so earlier edits don't shift later ranges.
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = original.to_string();
    for (start, end, text) in edits {
        out.replace_range(start..end, &text);
    }
    out
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn raw(&mut self, raw: &RawNode) {
        for (i, line) in raw.text.lines().enumerate() {
            if i == 0 {
                self.out.push_str(line);
                continue;
            }
            self.out.push('\n');
            let stripped = line.strip_prefix(raw.indent.as_str()).unwrap_or(line);
            self.push_indent();
            self.out.push_str(stripped);
        }
    }

    fn expr(&mut self, e: &Expr) {
        match e {
            Expr::Ident(i) => self.out.push_str(&i.name),
            Expr::BasicLit(l) => self.out.push_str(&l.value),
            Expr::Selector(s) => {
                self.expr(&s.x);
                self.out.push('.');
                self.out.push_str(&s.sel.name);
            }
            Expr::Call(c) => {
                self.expr(&c.fun);
                self.out.push('(');
                for (i, arg) in c.args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(arg);
                }
                self.out.push(')');
            }
            Expr::Composite(c) => self.composite(c),
            Expr::KeyValue(kv) => {
                self.expr(&kv.key);
                self.out.push_str(": ");
                self.expr(&kv.value);
            }
            Expr::FuncLit(f) => {
                self.out.push_str("func(");
                self.fields(&f.params);
                self.out.push(')');
                self.results(&f.results);
                self.out.push(' ');
                self.block(&f.body);
            }
            Expr::Unary(u) => {
                self.out.push_str(&u.op);
                self.expr(&u.x);
            }
            Expr::Binary(b) => {
                self.expr(&b.x);
                self.out.push(' ');
                self.out.push_str(&b.op);
                self.out.push(' ');
                self.expr(&b.y);
            }
            Expr::Star(s) => {
                self.out.push('*');
                self.expr(&s.x);
            }
            Expr::Index(i) => {
                self.expr(&i.x);
                self.out.push('[');
                self.expr(&i.index);
                self.out.push(']');
            }
            Expr::Paren(p) => {
                self.out.push('(');
                self.expr(&p.x);
                self.out.push(')');
            }
            Expr::ArrayType(a) => {
                self.out.push('[');
                if let Some(len) = &a.len {
                    self.expr(len);
                }
                self.out.push(']');
                self.expr(&a.elem);
            }
            Expr::MapType(m) => {
                self.out.push_str("map[");
                self.expr(&m.key);
                self.out.push(']');
                self.expr(&m.value);
            }
            Expr::StructType(s) => self.struct_type(s),
            Expr::FuncType(f) => {
                self.out.push_str("func(");
                self.fields(&f.params);
                self.out.push(')');
                self.results(&f.results);
            }
            Expr::Qualified(q) => {
                self.out.push_str(&q.pkg.name);
                self.out.push('.');
                self.out.push_str(&q.name.name);
            }
            Expr::Raw(r) => self.raw(r),
        }
    }

    fn composite(&mut self, c: &CompositeLit) {
        if let Some(ty) = &c.ty {
            self.expr(ty);
        }
        if c.elts.is_empty() {
            self.out.push_str("{}");
            return;
        }
        // Literals with nested or keyed elements go one element per line,
        // everything else stays inline.
        let multiline = c.elts.len() > 1
            && c
                .elts
                .iter()
                .any(|e| matches!(e, Expr::Composite(_) | Expr::KeyValue(_) | Expr::FuncLit(_)));
        if multiline {
            self.out.push_str("{\n");
            self.indent += 1;
            for elt in &c.elts {
                self.push_indent();
                self.expr(elt);
                self.out.push_str(",\n");
            }
            self.indent -= 1;
            self.push_indent();
            self.out.push('}');
        } else {
            self.out.push('{');
            for (i, elt) in c.elts.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.expr(elt);
            }
            self.out.push('}');
        }
    }

    fn struct_type(&mut self, s: &StructTypeExpr) {
        if s.fields.is_empty() {
            self.out.push_str("struct{}");
            return;
        }
        self.out.push_str("struct {\n");
        self.indent += 1;
        for field in &s.fields {
            self.push_indent();
            let names: Vec<&str> = field.names.iter().map(|n| n.name.as_str()).collect();
            if !names.is_empty() {
                self.out.push_str(&names.join(", "));
                self.out.push(' ');
            }
            self.expr(&field.ty);
            if let Some(tag) = &field.tag {
                self.out.push(' ');
                self.out.push_str(tag);
            }
            self.out.push('\n');
        }
        self.indent -= 1;
        self.push_indent();
        self.out.push('}');
    }

    fn fields(&mut self, fields: &[Field]) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let names: Vec<&str> = field.names.iter().map(|n| n.name.as_str()).collect();
            if !names.is_empty() {
                self.out.push_str(&names.join(", "));
                self.out.push(' ');
            }
            self.expr(&field.ty);
        }
    }

    fn results(&mut self, results: &Option<FieldList>) {
        let Some(list) = results else {
            return;
        };
        if list.fields.is_empty() {
            return;
        }
        self.out.push(' ');
        let single_bare = list.fields.len() == 1 && list.fields[0].names.is_empty();
        if single_bare {
            self.expr(&list.fields[0].ty);
        } else {
            self.out.push('(');
            self.fields(&list.fields);
            self.out.push(')');
        }
    }

    fn block(&mut self, b: &Block) {
        self.out.push_str("{\n");
        self.indent += 1;
        for stmt in &b.stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.push_indent();
        self.out.push('}');
    }

    /// Print a statement as one or more fully indented lines ending in '\n'.
    fn stmt(&mut self, s: &Stmt) {
        self.push_indent();
        self.stmt_inline(s);
        self.out.push('\n');
    }

    /// Print a statement without the leading indent or trailing newline.
    fn stmt_inline(&mut self, s: &Stmt) {
        match s {
            Stmt::Expr(e) => self.expr(&e.x),
            Stmt::Assign(a) => {
                for (i, lhs) in a.lhs.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(lhs);
                }
                self.out.push(' ');
                self.out.push_str(&a.op);
                self.out.push(' ');
                for (i, rhs) in a.rhs.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(rhs);
                }
            }
            Stmt::Decl(d) => self.gen_decl_inline(&d.decl),
            Stmt::Range(r) => {
                self.out.push_str("for ");
                if let Some(key) = &r.key {
                    self.expr(key);
                    if let Some(value) = &r.value {
                        self.out.push_str(", ");
                        self.expr(value);
                    }
                    self.out.push(' ');
                    self.out.push_str(if r.define { ":=" } else { "=" });
                    self.out.push(' ');
                }
                self.out.push_str("range ");
                self.expr(&r.x);
                self.out.push(' ');
                self.block(&r.body);
            }
            Stmt::For(f) => {
                self.out.push_str("for ");
                if !f.clause.text.is_empty() {
                    self.raw(&f.clause);
                    self.out.push(' ');
                }
                self.block(&f.body);
            }
            Stmt::If(i) => self.if_stmt(i),
            Stmt::Switch(sw) => {
                self.out.push_str(&sw.keyword);
                if !sw.header.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(&sw.header);
                }
                self.out.push_str(" {\n");
                for case in &sw.cases {
                    self.push_indent();
                    self.out.push_str(&case.header);
                    self.out.push('\n');
                    self.indent += 1;
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.push_indent();
                self.out.push('}');
            }
            Stmt::Return(r) => {
                self.out.push_str("return");
                for (i, res) in r.results.iter().enumerate() {
                    self.out.push_str(if i == 0 { " " } else { ", " });
                    self.expr(res);
                }
            }
            Stmt::Branch(b) => {
                self.out.push_str(b.tok.keyword());
                if let Some(label) = &b.label {
                    self.out.push(' ');
                    self.out.push_str(&label.name);
                }
            }
            Stmt::Go(g) => {
                self.out.push_str("go ");
                self.expr(&g.call);
            }
            Stmt::Defer(d) => {
                self.out.push_str("defer ");
                self.expr(&d.call);
            }
            Stmt::Labeled(l) => {
                self.out.push_str(&l.label.name);
                self.out.push_str(":\n");
                self.push_indent();
                self.stmt_inline(&l.stmt);
            }
            Stmt::Block(b) => self.block(b),
            Stmt::Raw(r) => self.raw(r),
        }
    }

    fn if_stmt(&mut self, i: &IfStmt) {
        self.out.push_str("if ");
        if let Some(init) = &i.init {
            self.stmt_inline(init);
            self.out.push_str("; ");
        }
        self.expr(&i.cond);
        self.out.push(' ');
        self.block(&i.body);
        if let Some(else_branch) = &i.else_branch {
            self.out.push_str(" else ");
            match else_branch.as_ref() {
                Stmt::If(nested) => self.if_stmt(nested),
                Stmt::Block(b) => self.block(b),
                other => self.stmt_inline(other),
            }
        }
    }

    fn gen_decl_inline(&mut self, decl: &GenDecl) {
        let keyword = match decl.tok {
            GenTok::Var => "var",
            GenTok::Const => "const",
            GenTok::Type => "type",
        };
        self.out.push_str(keyword);
        if decl.specs.len() == 1 {
            self.out.push(' ');
            self.spec(&decl.specs[0]);
        } else {
            self.out.push_str(" (\n");
            self.indent += 1;
            for spec in &decl.specs {
                self.push_indent();
                self.spec(spec);
                self.out.push('\n');
            }
            self.indent -= 1;
            self.push_indent();
            self.out.push(')');
        }
    }

    fn spec(&mut self, spec: &Spec) {
        match spec {
            Spec::Value(v) => {
                let names: Vec<&str> = v.names.iter().map(|n| n.name.as_str()).collect();
                self.out.push_str(&names.join(", "));
                if let Some(ty) = &v.ty {
                    self.out.push(' ');
                    self.expr(ty);
                }
                if !v.values.is_empty() {
                    self.out.push_str(" = ");
                    for (i, value) in v.values.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.expr(value);
                    }
                }
            }
            Spec::Type(t) => {
                self.out.push_str(&t.name.name);
                self.out.push_str(if t.is_alias { " = " } else { " " });
                self.expr(&t.ty);
            }
            Spec::Raw(r) => self.raw(r),
        }
    }

    fn func_decl(&mut self, f: &FuncDecl) {
        self.out.push_str("func ");
        if let Some(recv) = &f.recv {
            self.out.push('(');
            self.fields(std::slice::from_ref(recv));
            self.out.push_str(") ");
        }
        self.out.push_str(&f.name.name);
        self.out.push('(');
        self.fields(&f.params);
        self.out.push(')');
        self.results(&f.results);
        if let Some(body) = &f.body {
            self.out.push(' ');
            self.block(body);
        }
        self.out.push('\n');
    }

    fn gen_decl(&mut self, decl: &GenDecl) {
        self.gen_decl_inline(decl);
        self.out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::lower::lower_file;
    use crate::parser::GoParser;

    fn roundtrip_func(src: &str) -> String {
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (file, _) = lower_file(parser.root(), parser.code());
        file.decls[0].as_func().unwrap().to_go()
    }

    #[test]
    fn test_print_simple_func() {
        let out = roundtrip_func(
            "package p\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n",
        );
        assert_eq!(out, "func Add(a, b int) int {\n\treturn a + b\n}");
    }

    #[test]
    fn test_print_range_loop() {
        let out = roundtrip_func(
            "package p\n\nfunc f(cases []int) {\n\tfor _, c := range cases {\n\t\tprintln(c)\n\t}\n}\n",
        );
        assert!(out.contains("for _, c := range cases {"));
        assert!(out.contains("\t\tprintln(c)"));
    }

    #[test]
    fn test_print_if_else() {
        let out = roundtrip_func(
            "package p\n\nfunc f(x int) {\n\tif x > 0 {\n\t\tprintln(x)\n\t} else {\n\t\tprintln(-x)\n\t}\n}\n",
        );
        assert!(out.contains("if x > 0 {"));
        assert!(out.contains("} else {"));
    }

    #[test]
    fn test_render_file_keeps_untouched_decls_verbatim() {
        let src = "package p\n\n// keep me\nfunc a() {}\n\nfunc b() {\n\tprintln(1)\n}\n";
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (file, _) = lower_file(parser.root(), parser.code());
        let out = render_file(&file, src, &[]);
        assert_eq!(out, src);
    }

    #[test]
    fn test_render_file_replaces_rewritten_decl() {
        let src = "package p\n\nfunc a() {\n\tprintln(1)\n}\n\nfunc b() {}\n";
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (mut file, _) = lower_file(parser.root(), parser.code());
        if let Decl::Func(f) = &mut file.decls[0] {
            f.body.as_mut().unwrap().stmts.clear();
        }
        let out = render_file(&file, src, &[0]);
        assert!(out.contains("func a() {\n}"));
        assert!(out.contains("func b() {}"));
        assert!(out.contains("package p"));
    }
}
