//! Type and object resolution for one package.
//!
//! Builds the package-level type and object tables from lowered files, and
//! answers `type-of` queries for expressions inside function bodies by
//! walking lexical bindings (parameters, `:=`, `var`, range variables).

use std::collections::HashMap;

use crate::gosrc::ast::*;
use crate::types::{
    BasicKind, GoType, SignatureType, StructField, StructType, TypeTable,
};

/// Names bound in Go's universe scope, which are never expandable
/// definitions and never typing errors.
pub const UNIVERSE: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make",
    "max", "min", "new", "panic", "print", "println", "real", "recover", "any", "error",
    "comparable", "true", "false", "nil", "iota",
];

/// Whether a name is predeclared in the universe scope (including the basic
/// type names).
pub fn is_universe(name: &str) -> bool {
    UNIVERSE.contains(&name) || BasicKind::from_name(name).is_some()
}

/// What kind of thing a package-level object is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Func,
    Method { receiver: String },
    Var,
    Const,
    Type,
}

/// A package-level object: where it is declared and, for values, its type.
#[derive(Clone, Debug)]
pub struct Object {
    pub name: String,
    pub kind: ObjectKind,
    /// Index of the file declaring the object.
    pub file: usize,
    /// Index of the top-level declaration inside that file.
    pub decl: usize,
    /// Span of the declared name.
    pub pos: Span,
    /// Declared or inferred type for vars/consts, `None` until inferred.
    pub ty: Option<GoType>,
    /// The initializer expression for vars declared without a type.
    pub value: Option<Expr>,
}

/// The resolved type and object tables of one package.
#[derive(Clone, Debug, Default)]
pub struct PackageTypes {
    pub table: TypeTable,
    pub objects: HashMap<String, Object>,
    /// Methods keyed by (receiver base type, method name).
    pub methods: HashMap<(String, String), Object>,
}

impl PackageTypes {
    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn method(&self, receiver: &str, name: &str) -> Option<&Object> {
        self.methods.get(&(receiver.to_string(), name.to_string()))
    }
}

/// Resolve a type expression to a [`GoType`]. Context-free: package-local
/// names become [`GoType::Named`] and are resolved later through the table.
pub fn from_type_expr(expr: &Expr) -> GoType {
    match expr {
        Expr::Ident(i) => match BasicKind::from_name(&i.name) {
            Some(kind) => GoType::Basic(kind),
            None if i.name == "any" || i.name == "error" => GoType::Interface,
            None => GoType::Named(i.name.clone()),
        },
        Expr::Qualified(q) => GoType::Foreign(format!("{}.{}", q.pkg.name, q.name.name)),
        Expr::Selector(s) => match s.x.as_ref() {
            Expr::Ident(pkg) => GoType::Foreign(format!("{}.{}", pkg.name, s.sel.name)),
            _ => GoType::Invalid,
        },
        Expr::Star(s) => GoType::Pointer(Box::new(from_type_expr(&s.x))),
        Expr::Paren(p) => from_type_expr(&p.x),
        Expr::ArrayType(a) => {
            let elem = Box::new(from_type_expr(&a.elem));
            match &a.len {
                None => GoType::Slice(elem),
                Some(len) => {
                    let n = match len.as_ref() {
                        Expr::BasicLit(l) if l.kind == LitKind::Int => l.value.parse().ok(),
                        _ => None,
                    };
                    GoType::Array(n, elem)
                }
            }
        }
        Expr::MapType(m) => GoType::Map(
            Box::new(from_type_expr(&m.key)),
            Box::new(from_type_expr(&m.value)),
        ),
        Expr::StructType(s) => {
            let mut fields = Vec::new();
            for field in &s.fields {
                let ty = from_type_expr(&field.ty);
                if field.names.is_empty() {
                    let name = base_type_name(&field.ty).unwrap_or_default().to_string();
                    fields.push(StructField {
                        name,
                        ty,
                        embedded: true,
                    });
                } else {
                    for name in &field.names {
                        fields.push(StructField {
                            name: name.name.clone(),
                            ty: ty.clone(),
                            embedded: false,
                        });
                    }
                }
            }
            GoType::Struct(StructType { fields })
        }
        Expr::FuncType(f) => GoType::Signature(signature_of(&f.params, &f.results)),
        Expr::Raw(r) => {
            let text = r.text.trim_start();
            if text.starts_with("interface") {
                GoType::Interface
            } else if text.starts_with("chan") || text.starts_with("<-chan") {
                GoType::Chan(Box::new(GoType::Invalid))
            } else {
                GoType::Invalid
            }
        }
        _ => GoType::Invalid,
    }
}

fn signature_of(params: &[Field], results: &Option<FieldList>) -> SignatureType {
    let mut sig = SignatureType::default();
    for field in params {
        let ty = from_type_expr(&field.ty);
        let count = field.names.len().max(1);
        for _ in 0..count {
            sig.params.push(ty.clone());
        }
    }
    if let Some(list) = results {
        for field in &list.fields {
            let ty = from_type_expr(&field.ty);
            let count = field.names.len().max(1);
            for _ in 0..count {
                sig.results.push(ty.clone());
            }
        }
    }
    sig
}

/// Build the type and object tables for a package from its lowered files.
pub fn build_package_types(files: &[GoFile]) -> PackageTypes {
    let mut pt = PackageTypes::default();

    for (file_idx, file) in files.iter().enumerate() {
        for (decl_idx, decl) in file.decls.iter().enumerate() {
            match decl {
                Decl::Func(func) => {
                    let object = Object {
                        name: func.name.name.clone(),
                        kind: match func.receiver_type_name() {
                            Some(recv) => ObjectKind::Method {
                                receiver: recv.to_string(),
                            },
                            None => ObjectKind::Func,
                        },
                        file: file_idx,
                        decl: decl_idx,
                        pos: func.name.span,
                        ty: Some(GoType::Signature(signature_of(&func.params, &func.results))),
                        value: None,
                    };
                    match func.receiver_type_name() {
                        Some(recv) => {
                            pt.methods
                                .insert((recv.to_string(), func.name.name.clone()), object);
                        }
                        None => {
                            pt.objects.insert(func.name.name.clone(), object);
                        }
                    }
                }
                Decl::Gen(gen) => {
                    for spec in &gen.specs {
                        match spec {
                            Spec::Type(ts) => {
                                pt.table.insert(ts.name.name.clone(), from_type_expr(&ts.ty));
                                pt.objects.insert(
                                    ts.name.name.clone(),
                                    Object {
                                        name: ts.name.name.clone(),
                                        kind: ObjectKind::Type,
                                        file: file_idx,
                                        decl: decl_idx,
                                        pos: ts.name.span,
                                        ty: None,
                                        value: None,
                                    },
                                );
                            }
                            Spec::Value(vs) => {
                                let declared = vs.ty.as_ref().map(from_type_expr);
                                for (i, name) in vs.names.iter().enumerate() {
                                    if name.is_blank() {
                                        continue;
                                    }
                                    pt.objects.insert(
                                        name.name.clone(),
                                        Object {
                                            name: name.name.clone(),
                                            kind: if gen.tok == GenTok::Const {
                                                ObjectKind::Const
                                            } else {
                                                ObjectKind::Var
                                            },
                                            file: file_idx,
                                            decl: decl_idx,
                                            pos: name.span,
                                            ty: declared.clone(),
                                            value: vs.values.get(i).cloned(),
                                        },
                                    );
                                }
                            }
                            Spec::Raw(_) => {}
                        }
                    }
                }
                Decl::Raw(_) => {}
            }
        }
    }

    pt
}

/// The lexical context of an expression: the function it appears in and the
/// byte offset it occurs at, used to pick the latest preceding binding.
#[derive(Clone, Copy)]
pub struct FnScope<'a> {
    pub func: &'a FuncDecl,
    pub at: u32,
}

/// Answers type queries against one package.
pub struct Typing<'a> {
    pub types: &'a PackageTypes,
    pub imports: &'a [ImportSpec],
}

const MAX_TYPING_DEPTH: usize = 16;

impl<'a> Typing<'a> {
    pub fn new(types: &'a PackageTypes, imports: &'a [ImportSpec]) -> Self {
        Self { types, imports }
    }

    fn is_import_name(&self, name: &str) -> bool {
        self.imports.iter().any(|i| i.local_name() == name)
    }

    /// The type of an expression, or [`GoType::Invalid`] when it cannot be
    /// determined.
    pub fn type_of(&self, expr: &Expr, scope: Option<FnScope>) -> GoType {
        self.type_of_depth(expr, scope, 0)
    }

    fn type_of_depth(&self, expr: &Expr, scope: Option<FnScope>, depth: usize) -> GoType {
        if depth > MAX_TYPING_DEPTH {
            return GoType::Invalid;
        }
        match expr {
            Expr::Ident(i) => self.type_of_ident(&i.name, scope, depth),
            Expr::BasicLit(l) => match l.kind {
                LitKind::Int => GoType::Basic(BasicKind::Int),
                LitKind::Float => GoType::Basic(BasicKind::Float64),
                LitKind::Imag => GoType::Basic(BasicKind::Complex128),
                LitKind::Char => GoType::Basic(BasicKind::Int32),
                LitKind::Str => GoType::Basic(BasicKind::String),
            },
            Expr::Composite(c) => match &c.ty {
                Some(ty) => from_type_expr(ty),
                None => GoType::Invalid,
            },
            Expr::Call(call) => self.type_of_call(call, scope, depth),
            Expr::Selector(sel) => self.type_of_selector(sel, scope, depth),
            Expr::Index(idx) => {
                let base = self.type_of_depth(&idx.x, scope, depth + 1);
                match self.types.table.underlying(&base) {
                    GoType::Slice(e) | GoType::Array(_, e) => *e,
                    GoType::Map(_, v) => *v,
                    GoType::Basic(BasicKind::String) => GoType::Basic(BasicKind::Uint8),
                    _ => GoType::Invalid,
                }
            }
            Expr::Unary(u) => match u.op.as_str() {
                "&" => GoType::Pointer(Box::new(self.type_of_depth(&u.x, scope, depth + 1))),
                "*" => match self
                    .types
                    .table
                    .underlying(&self.type_of_depth(&u.x, scope, depth + 1))
                {
                    GoType::Pointer(e) => *e,
                    _ => GoType::Invalid,
                },
                "!" => GoType::Basic(BasicKind::Bool),
                "<-" => match self
                    .types
                    .table
                    .underlying(&self.type_of_depth(&u.x, scope, depth + 1))
                {
                    GoType::Chan(e) => *e,
                    _ => GoType::Invalid,
                },
                _ => self.type_of_depth(&u.x, scope, depth + 1),
            },
            Expr::Star(s) => match self
                .types
                .table
                .underlying(&self.type_of_depth(&s.x, scope, depth + 1))
            {
                GoType::Pointer(e) => *e,
                _ => GoType::Invalid,
            },
            Expr::Paren(p) => self.type_of_depth(&p.x, scope, depth + 1),
            Expr::Binary(b) => match b.op.as_str() {
                "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => {
                    GoType::Basic(BasicKind::Bool)
                }
                _ => self.type_of_depth(&b.x, scope, depth + 1),
            },
            Expr::FuncLit(f) => GoType::Signature(signature_of(&f.params, &f.results)),
            Expr::KeyValue(kv) => self.type_of_depth(&kv.value, scope, depth + 1),
            Expr::ArrayType(_) | Expr::MapType(_) | Expr::StructType(_) | Expr::FuncType(_)
            | Expr::Qualified(_) => from_type_expr(expr),
            _ => GoType::Invalid,
        }
    }

    fn type_of_ident(&self, name: &str, scope: Option<FnScope>, depth: usize) -> GoType {
        match name {
            "true" | "false" => return GoType::Basic(BasicKind::Bool),
            "nil" => return GoType::Invalid,
            _ => {}
        }
        if let Some(scope) = scope {
            if let Some(ty) = self.local_binding_type(scope, name, depth) {
                return ty;
            }
        }
        if let Some(obj) = self.types.object(name) {
            match &obj.kind {
                ObjectKind::Var | ObjectKind::Const => {
                    if let Some(ty) = &obj.ty {
                        return ty.clone();
                    }
                    if let Some(value) = &obj.value {
                        return self.type_of_depth(value, None, depth + 1);
                    }
                    return GoType::Invalid;
                }
                ObjectKind::Func => {
                    return obj.ty.clone().unwrap_or(GoType::Invalid);
                }
                ObjectKind::Type => return GoType::Named(name.to_string()),
                ObjectKind::Method { .. } => return GoType::Invalid,
            }
        }
        if let Some(kind) = BasicKind::from_name(name) {
            return GoType::Basic(kind);
        }
        GoType::Invalid
    }

    fn type_of_call(&self, call: &CallExpr, scope: Option<FnScope>, depth: usize) -> GoType {
        // Builtins and type conversions first.
        if let Expr::Ident(fun) = call.fun.as_ref() {
            match fun.name.as_str() {
                "make" | "new" => {
                    let inner = call
                        .args
                        .first()
                        .map(from_type_expr)
                        .unwrap_or(GoType::Invalid);
                    return if fun.name == "new" {
                        GoType::Pointer(Box::new(inner))
                    } else {
                        inner
                    };
                }
                "append" => {
                    return call
                        .args
                        .first()
                        .map(|a| self.type_of_depth(a, scope, depth + 1))
                        .unwrap_or(GoType::Invalid);
                }
                "len" | "cap" => return GoType::Basic(BasicKind::Int),
                _ => {}
            }
            // Conversion through a declared or basic type name.
            if self.types.object(&fun.name).map(|o| &o.kind) == Some(&ObjectKind::Type) {
                return GoType::Named(fun.name.clone());
            }
            if let Some(kind) = BasicKind::from_name(&fun.name) {
                return GoType::Basic(kind);
            }
        }
        match self.type_of_depth(&call.fun, scope, depth + 1) {
            GoType::Signature(sig) => sig.results.first().cloned().unwrap_or(GoType::Invalid),
            _ => GoType::Invalid,
        }
    }

    fn type_of_selector(&self, sel: &SelectorExpr, scope: Option<FnScope>, depth: usize) -> GoType {
        if let Expr::Ident(x) = sel.x.as_ref() {
            // Qualified reference into another package: opaque.
            if self.is_import_name(&x.name) {
                return GoType::Foreign(format!("{}.{}", x.name, sel.sel.name));
            }
        }
        // Struct field access.
        let base = self.type_of_depth(&sel.x, scope, depth + 1);
        let base = self.types.table.unpointer(&base);
        if let GoType::Struct(st) = self.types.table.underlying(&base) {
            for field in &st.fields {
                if field.name == sel.sel.name {
                    return field.ty.clone();
                }
            }
        }
        GoType::Invalid
    }

    /// The type bound to `name` at `scope.at`, looking at parameters and the
    /// latest preceding `:=` / `var` / range binding.
    fn local_binding_type(&self, scope: FnScope, name: &str, depth: usize) -> Option<GoType> {
        let mut best: Option<(u32, GoType)> = None;

        for param in &scope.func.params {
            if param.names.iter().any(|n| n.name == name) {
                let start = scope.func.span.start;
                best = Some((start, from_type_expr(&param.ty)));
            }
        }
        if let Some(recv) = &scope.func.recv {
            if recv.names.iter().any(|n| n.name == name) {
                best = Some((scope.func.span.start, from_type_expr(&recv.ty)));
            }
        }

        self.scan_bindings(scope.func.statements(), scope, name, depth, &mut best);
        best.map(|(_, ty)| ty)
    }

    fn scan_bindings(
        &self,
        stmts: &[Stmt],
        scope: FnScope,
        name: &str,
        depth: usize,
        best: &mut Option<(u32, GoType)>,
    ) {
        for stmt in stmts {
            if stmt.span().is_valid() && stmt.span().start >= scope.at {
                continue;
            }
            match stmt {
                Stmt::Assign(assign) if assign.is_define() => {
                    for (i, lhs) in assign.lhs.iter().enumerate() {
                        let Some(ident) = lhs.as_ident() else { continue };
                        if ident.name != name {
                            continue;
                        }
                        let ty = match assign.rhs.get(i).or_else(|| assign.rhs.first()) {
                            Some(rhs) => self.type_of_depth(rhs, Some(scope), depth + 1),
                            None => GoType::Invalid,
                        };
                        let start = assign.span.start;
                        if best.as_ref().map(|(s, _)| start >= *s).unwrap_or(true) {
                            *best = Some((start, ty));
                        }
                    }
                }
                Stmt::Decl(decl) => {
                    for spec in &decl.decl.specs {
                        let Spec::Value(vs) = spec else { continue };
                        for (i, n) in vs.names.iter().enumerate() {
                            if n.name != name {
                                continue;
                            }
                            let ty = match &vs.ty {
                                Some(ty) => from_type_expr(ty),
                                None => vs
                                    .values
                                    .get(i)
                                    .map(|v| self.type_of_depth(v, Some(scope), depth + 1))
                                    .unwrap_or(GoType::Invalid),
                            };
                            let start = decl.span.start;
                            if best.as_ref().map(|(s, _)| start >= *s).unwrap_or(true) {
                                *best = Some((start, ty));
                            }
                        }
                    }
                }
                Stmt::Range(range) => {
                    let ranged = self.type_of_depth(&range.x, Some(scope), depth + 1);
                    let ranged = self.types.table.underlying(&ranged);
                    let (key_ty, value_ty) = match ranged {
                        GoType::Slice(e) | GoType::Array(_, e) => {
                            (GoType::Basic(BasicKind::Int), *e)
                        }
                        GoType::Map(k, v) => (*k, *v),
                        GoType::Basic(BasicKind::String) => {
                            (GoType::Basic(BasicKind::Int), GoType::Basic(BasicKind::Int32))
                        }
                        _ => (GoType::Invalid, GoType::Invalid),
                    };
                    if let Some(Expr::Ident(k)) = &range.key {
                        if k.name == name && range.span.start < scope.at {
                            let start = range.span.start;
                            if best.as_ref().map(|(s, _)| start >= *s).unwrap_or(true) {
                                *best = Some((start, key_ty.clone()));
                            }
                        }
                    }
                    if let Some(Expr::Ident(v)) = &range.value {
                        if v.name == name && range.span.start < scope.at {
                            let start = range.span.start;
                            if best.as_ref().map(|(s, _)| start >= *s).unwrap_or(true) {
                                *best = Some((start, value_ty));
                            }
                        }
                    }
                    self.scan_bindings(&range.body.stmts, scope, name, depth, best);
                }
                Stmt::For(f) => self.scan_bindings(&f.body.stmts, scope, name, depth, best),
                Stmt::If(i) => {
                    if let Some(init) = &i.init {
                        self.scan_bindings(std::slice::from_ref(init), scope, name, depth, best);
                    }
                    self.scan_bindings(&i.body.stmts, scope, name, depth, best);
                    if let Some(e) = &i.else_branch {
                        self.scan_bindings(std::slice::from_ref(e), scope, name, depth, best);
                    }
                }
                Stmt::Switch(sw) => {
                    for case in &sw.cases {
                        self.scan_bindings(&case.body, scope, name, depth, best);
                    }
                }
                Stmt::Block(b) => self.scan_bindings(&b.stmts, scope, name, depth, best),
                Stmt::Labeled(l) => {
                    self.scan_bindings(std::slice::from_ref(&l.stmt), scope, name, depth, best)
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::lower::lower_file;
    use crate::parser::GoParser;

    fn package_of(src: &str) -> (Vec<GoFile>, PackageTypes) {
        let parser = GoParser::parse(src.as_bytes().to_vec()).unwrap();
        let (file, diags) = lower_file(parser.root(), parser.code());
        assert!(diags.is_empty(), "diagnostics: {diags:?}");
        let files = vec![file];
        let types = build_package_types(&files);
        (files, types)
    }

    #[test]
    fn test_type_table_from_type_decl() {
        let (_, types) = package_of(
            "package p\n\ntype scenario struct {\n\tName string\n\tWant int\n}\n",
        );
        let underlying = types.table.underlying(&GoType::Named("scenario".into()));
        let GoType::Struct(st) = underlying else {
            panic!("expected struct");
        };
        assert_eq!(st.fields.len(), 2);
        assert_eq!(st.fields[0].name, "Name");
        assert!(is_string(&st.fields[0].ty));
    }

    fn is_string(ty: &GoType) -> bool {
        matches!(ty, GoType::Basic(BasicKind::String))
    }

    #[test]
    fn test_local_binding_from_short_var() {
        let src = "package p\n\ntype tc struct{ Name string }\n\nfunc f() {\n\tcases := []tc{}\n\t_ = cases\n}\n";
        let (files, types) = package_of(src);
        let func = files[0].decls[1].as_func().unwrap();
        let typing = Typing::new(&types, &files[0].imports);
        let use_site = func.statements()[1].span();
        let ty = typing.type_of(
            &Expr::Ident(Ident::new("cases")),
            Some(FnScope {
                func,
                at: use_site.start,
            }),
        );
        assert_eq!(ty, GoType::Slice(Box::new(GoType::Named("tc".into()))));
    }

    #[test]
    fn test_param_binding() {
        let src = "package p\n\nfunc f(xs []int) {\n\t_ = xs\n}\n";
        let (files, types) = package_of(src);
        let func = files[0].decls[0].as_func().unwrap();
        let typing = Typing::new(&types, &files[0].imports);
        let ty = typing.type_of(
            &Expr::Ident(Ident::new("xs")),
            Some(FnScope {
                func,
                at: func.span.end,
            }),
        );
        assert_eq!(ty, GoType::Slice(Box::new(GoType::Basic(BasicKind::Int))));
    }

    #[test]
    fn test_call_result_type() {
        let src = "package p\n\ntype tc struct{ Name string }\n\nfunc build() []tc { return nil }\n\nfunc f() {\n\tcases := build()\n\t_ = cases\n}\n";
        let (files, types) = package_of(src);
        let func = files[0].decls[2].as_func().unwrap();
        let typing = Typing::new(&types, &files[0].imports);
        let ty = typing.type_of(
            &Expr::Ident(Ident::new("cases")),
            Some(FnScope {
                func,
                at: func.span.end,
            }),
        );
        assert_eq!(ty, GoType::Slice(Box::new(GoType::Named("tc".into()))));
    }

    #[test]
    fn test_package_level_var_inference() {
        let src = "package p\n\ntype tc struct{ Name string }\n\nvar cases = map[string]tc{}\n\nfunc f() {\n\t_ = cases\n}\n";
        let (files, types) = package_of(src);
        let func = files[0].decls[2].as_func().unwrap();
        let typing = Typing::new(&types, &files[0].imports);
        let ty = typing.type_of(
            &Expr::Ident(Ident::new("cases")),
            Some(FnScope {
                func,
                at: func.span.end,
            }),
        );
        assert_eq!(
            ty,
            GoType::Map(
                Box::new(GoType::Basic(BasicKind::String)),
                Box::new(GoType::Named("tc".into()))
            )
        );
    }

    #[test]
    fn test_foreign_selector_is_opaque() {
        let src = "package p\n\nimport \"testing\"\n\nfunc f(t *testing.T) {\n\t_ = t\n}\n";
        let (files, types) = package_of(src);
        let func = files[0].decls[0].as_func().unwrap();
        let typing = Typing::new(&types, &files[0].imports);
        let ty = typing.type_of(
            &Expr::Ident(Ident::new("t")),
            Some(FnScope {
                func,
                at: func.span.end,
            }),
        );
        assert_eq!(ty, GoType::Pointer(Box::new(GoType::Foreign("testing.T".into()))));
    }

    #[test]
    fn test_methods_indexed_by_receiver() {
        let src = "package p\n\ntype runner struct{}\n\nfunc (r *runner) Run() {}\n";
        let (_, types) = package_of(src);
        assert!(types.method("runner", "Run").is_some());
        assert!(types.object("Run").is_none());
    }

    #[test]
    fn test_universe_names() {
        assert!(is_universe("append"));
        assert!(is_universe("string"));
        assert!(!is_universe("helper"));
    }
}
