//! Arena-backed AST consumed and rewritten by the resolver.
//!
//! The scope binder hands over a [`Program`]: every symbol, expression and
//! type lives in a per-kind arena and is addressed by a stable index. Tree
//! ownership is expressed by a node listing its children; every other edge
//! (parent pointers, symbol references, def points) is a plain index with no
//! ownership implied. Nothing is ever removed from an arena. Dead functions
//! are detached from the tree and stay addressable.
//!
//! Every node also carries an identity value drawn from one program-wide
//! counter. Types get the lowest values, then symbols and expressions in
//! creation order. The congruence closure relies on that ordering to pick
//! canonical representatives.

use braid_common::Span;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::builtins;
use crate::lattice::{TypeId, TypeLattice};

/// Index of a symbol in the program's symbol arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub u32);

/// Index of an expression in the program's expression arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub u32);

// ── Symbols ────────────────────────────────────────────────────────────

/// A named entity.
#[derive(Clone, Debug)]
pub struct Symbol {
    /// Program-wide identity value.
    pub id: u32,
    pub name: String,
    pub kind: SymbolKind,
    /// Resolved type, `TypeLattice::UNKNOWN` until determined.
    pub ty: TypeId,
    /// The Definition expression declaring this symbol. Constants and
    /// builtin type symbols have none.
    pub def_point: Option<ExprId>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum SymbolKind {
    Function(Function),
    Variable,
    Argument(Formal),
    Type(TypeId),
    Module { block: ExprId },
}

/// A formal parameter.
#[derive(Clone, Debug, Default)]
pub struct Formal {
    /// Explicit type annotation.
    pub type_expr: Option<ExprId>,
    /// Default-value expression; evaluated in the scope of earlier formals.
    pub default: Option<ExprId>,
    /// The formal receives a type rather than a value.
    pub is_type_param: bool,
}

/// Where a function came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum FnOrigin {
    Declared,
    DefaultWrapper(SymbolId),
    OrderWrapper(SymbolId),
    Instance(SymbolId),
}

#[derive(Clone, Debug)]
pub struct Function {
    pub formals: Vec<SymbolId>,
    pub ret_type_expr: Option<ExprId>,
    /// Resolved return type, `TypeLattice::UNKNOWN` until the driver sets it.
    pub ret_type: TypeId,
    pub body: ExprId,
    /// Block of equality constraints checked by early verification.
    pub where_clause: Option<ExprId>,
    pub early_verify: bool,
    pub origin: FnOrigin,
}

impl Function {
    pub fn is_synthesized(&self) -> bool {
        self.origin != FnOrigin::Declared
    }
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Return,
    Op(String),
}

#[derive(Clone, Debug)]
pub struct Call {
    pub base: ExprId,
    pub args: Vec<ExprId>,
    pub primitive: Option<Primitive>,
    /// Module named in a qualified call `M.f(...)`.
    pub qualifier: Option<SymbolId>,
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub stmts: Vec<ExprId>,
    /// Modules brought into scope by `use`.
    pub uses: Vec<SymbolId>,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Call(Call),
    SymRef(SymbolId),
    Unresolved(String),
    Named { name: String, actual: ExprId },
    Def { sym: SymbolId, type_expr: Option<ExprId>, init: Option<ExprId> },
    Block(Block),
    Cond { cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId> },
    Goto { label: ExprId },
}

#[derive(Clone, Debug)]
pub struct ExprNode {
    pub id: u32,
    pub kind: Expr,
    pub parent: Option<ExprId>,
    pub span: Span,
}

/// Declaration of one formal for [`Program::add_formal`].
#[derive(Clone, Debug, Default)]
pub struct FormalDecl {
    pub ty: Option<TypeId>,
    pub type_expr: Option<ExprId>,
    pub default: Option<ExprId>,
    pub type_param: bool,
}

impl FormalDecl {
    pub fn typed(ty: TypeId) -> Self {
        FormalDecl { ty: Some(ty), ..Default::default() }
    }

    pub fn typed_default(ty: TypeId, default: ExprId) -> Self {
        FormalDecl { ty: Some(ty), default: Some(default), ..Default::default() }
    }

    pub fn annotated(type_expr: ExprId) -> Self {
        FormalDecl { type_expr: Some(type_expr), ..Default::default() }
    }

    pub fn untyped() -> Self {
        FormalDecl::default()
    }

    pub fn type_param() -> Self {
        FormalDecl { type_param: true, ..Default::default() }
    }
}

// ── Program ────────────────────────────────────────────────────────────

/// One compilation's AST, symbols and types.
#[derive(Clone, Debug)]
pub struct Program {
    pub types: TypeLattice,
    symbols: Vec<Symbol>,
    exprs: Vec<ExprNode>,
    /// Every function ever created, in creation order.
    functions: Vec<SymbolId>,
    next_id: u32,
    root: ExprId,
}

impl Program {
    /// Create an empty program: the distinguished types, a symbol for each,
    /// and the root block.
    pub fn new() -> Self {
        let mut program = Program {
            types: TypeLattice::new(),
            symbols: Vec::new(),
            exprs: Vec::new(),
            functions: Vec::new(),
            next_id: TypeLattice::BUILTIN_COUNT,
            root: ExprId(0),
        };
        for ty in TypeLattice::builtins() {
            let name = program.types.name(ty).to_string();
            let sym = program.push_symbol(name, SymbolKind::Type(ty), ty, Span::default());
            program.types.get_mut(ty).symbol = Some(sym);
        }
        program.root = program.new_expr(Expr::Block(Block::default()));
        program
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_symbol(&mut self, name: String, kind: SymbolKind, ty: TypeId, span: Span) -> SymbolId {
        let id = self.alloc_id();
        let sym = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol { id, name, kind, ty, def_point: None, span });
        sym
    }

    fn new_expr(&mut self, kind: Expr) -> ExprId {
        let id = self.alloc_id();
        let e = ExprId(self.exprs.len() as u32);
        self.exprs.push(ExprNode { id, kind, parent: None, span: Span::default() });
        self.link_children(e);
        e
    }

    fn link_children(&mut self, e: ExprId) {
        for child in self.children(e) {
            self.exprs[child.0 as usize].parent = Some(e);
        }
        if let Expr::Def { sym, .. } = self.exprs[e.0 as usize].kind {
            match &self.symbols[sym.0 as usize].kind {
                SymbolKind::Function(f) => {
                    let body = f.body;
                    self.exprs[body.0 as usize].parent = Some(e);
                }
                SymbolKind::Module { block } => {
                    let block = *block;
                    self.exprs[block.0 as usize].parent = Some(e);
                }
                _ => {}
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// The root block; everything attached hangs off it.
    pub fn root(&self) -> ExprId {
        self.root
    }

    /// The symbol `s`. Panics on an id from another program.
    pub fn symbol(&self, s: SymbolId) -> &Symbol {
        &self.symbols[s.0 as usize]
    }

    pub fn symbol_mut(&mut self, s: SymbolId) -> &mut Symbol {
        &mut self.symbols[s.0 as usize]
    }

    /// Every symbol, in creation order.
    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> {
        (0..self.symbols.len() as u32).map(SymbolId)
    }

    /// The arena node for `e`, with its identity, parent and span.
    pub fn expr(&self, e: ExprId) -> &ExprNode {
        &self.exprs[e.0 as usize]
    }

    /// Every expression in the arena, attached or not.
    pub fn exprs(&self) -> impl Iterator<Item = ExprId> {
        (0..self.exprs.len() as u32).map(ExprId)
    }

    /// What kind of expression `e` is.
    pub fn kind(&self, e: ExprId) -> &Expr {
        &self.exprs[e.0 as usize].kind
    }

    /// The enclosing expression. A function body's parent is its definition.
    pub fn parent(&self, e: ExprId) -> Option<ExprId> {
        self.exprs[e.0 as usize].parent
    }

    pub fn set_span(&mut self, e: ExprId, span: Span) {
        self.exprs[e.0 as usize].span = span;
    }

    pub fn set_symbol_span(&mut self, s: SymbolId, span: Span) {
        self.symbols[s.0 as usize].span = span;
    }

    pub fn name(&self, s: SymbolId) -> &str {
        &self.symbols[s.0 as usize].name
    }

    /// The function data of `s`, if `s` is a function.
    pub fn function(&self, s: SymbolId) -> Option<&Function> {
        match &self.symbols[s.0 as usize].kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, s: SymbolId) -> Option<&mut Function> {
        match &mut self.symbols[s.0 as usize].kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The formal data of `s`, if `s` is a formal argument.
    pub fn formal(&self, s: SymbolId) -> Option<&Formal> {
        match &self.symbols[s.0 as usize].kind {
            SymbolKind::Argument(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_function(&self, s: SymbolId) -> bool {
        matches!(self.symbols[s.0 as usize].kind, SymbolKind::Function(_))
    }

    /// Every function ever created, in creation order (including detached
    /// and synthesized ones).
    pub fn functions(&self) -> &[SymbolId] {
        &self.functions
    }

    /// Formals of `f` in declaration order; empty for non-functions.
    pub fn formals(&self, f: SymbolId) -> &[SymbolId] {
        self.function(f).map(|f| f.formals.as_slice()).unwrap_or(&[])
    }

    /// The body block of `f`.
    pub fn function_body(&self, f: SymbolId) -> Option<ExprId> {
        self.function(f).map(|f| f.body)
    }

    /// The block holding a module's declarations.
    pub fn module_block(&self, module: SymbolId) -> Option<ExprId> {
        match self.symbols[module.0 as usize].kind {
            SymbolKind::Module { block } => Some(block),
            _ => None,
        }
    }

    /// `e` as a block.
    pub fn block(&self, e: ExprId) -> Option<&Block> {
        match &self.exprs[e.0 as usize].kind {
            Expr::Block(b) => Some(b),
            _ => None,
        }
    }

    /// `e` as a call, primitive or not.
    pub fn as_call(&self, e: ExprId) -> Option<&Call> {
        match &self.exprs[e.0 as usize].kind {
            Expr::Call(c) => Some(c),
            _ => None,
        }
    }

    /// The symbol that names `ty`.
    pub fn type_symbol(&self, ty: TypeId) -> Option<SymbolId> {
        self.types.get(ty).symbol
    }

    /// Identity value of an expression.
    pub fn expr_identity(&self, e: ExprId) -> u32 {
        self.exprs[e.0 as usize].id
    }

    /// Identity value of a symbol.
    pub fn symbol_identity(&self, s: SymbolId) -> u32 {
        self.symbols[s.0 as usize].id
    }

    /// First attached, declared function named `name`.
    pub fn find_function(&self, name: &str) -> Option<SymbolId> {
        self.functions.iter().copied().find(|&f| {
            let sym = self.symbol(f);
            sym.name == name
                && self.function(f).is_some_and(|func| !func.is_synthesized())
                && sym.def_point.is_some_and(|d| self.is_attached(d))
        })
    }

    /// First module named `name`, attached or not.
    pub fn find_module(&self, name: &str) -> Option<SymbolId> {
        self.symbols().find(|&s| {
            let sym = self.symbol(s);
            sym.name == name && matches!(sym.kind, SymbolKind::Module { .. })
        })
    }

    // ── Tree structure ──────────────────────────────────────────────────

    /// Direct children of an expression in evaluation order. Function and
    /// module bodies hanging off a Definition are not included.
    pub fn children(&self, e: ExprId) -> Vec<ExprId> {
        match &self.exprs[e.0 as usize].kind {
            Expr::Call(call) => {
                let mut out = Vec::with_capacity(call.args.len() + 1);
                out.push(call.base);
                out.extend(call.args.iter().copied());
                out
            }
            Expr::SymRef(_) | Expr::Unresolved(_) => Vec::new(),
            Expr::Named { actual, .. } => vec![*actual],
            Expr::Def { type_expr, init, .. } => type_expr.iter().chain(init.iter()).copied().collect(),
            Expr::Block(block) => block.stmts.clone(),
            Expr::Cond { cond, then_branch, else_branch } => {
                let mut out = vec![*cond, *then_branch];
                out.extend(else_branch.iter().copied());
                out
            }
            Expr::Goto { label } => vec![*label],
        }
    }

    /// The nearest block strictly enclosing `e`.
    pub fn visibility_block(&self, e: ExprId) -> Option<ExprId> {
        let mut cur = self.parent(e);
        while let Some(p) = cur {
            if matches!(self.exprs[p.0 as usize].kind, Expr::Block(_)) {
                return Some(p);
            }
            cur = self.parent(p);
        }
        None
    }

    /// Whether `e` is still reachable from the root block.
    pub fn is_attached(&self, e: ExprId) -> bool {
        let mut cur = e;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Remove a statement from its enclosing block. The node stays in the
    /// arena.
    pub fn detach(&mut self, stmt: ExprId) {
        if let Some(parent) = self.parent(stmt) {
            if let Expr::Block(block) = &mut self.exprs[parent.0 as usize].kind {
                block.stmts.retain(|&s| s != stmt);
            }
        }
        self.exprs[stmt.0 as usize].parent = None;
    }

    /// Append `stmt` to `block` and reparent it there.
    pub fn push_stmt(&mut self, block: ExprId, stmt: ExprId) {
        if let Expr::Block(b) = &mut self.exprs[block.0 as usize].kind {
            b.stmts.push(stmt);
        }
        self.exprs[stmt.0 as usize].parent = Some(block);
    }

    /// Insert `stmt` right after `anchor` in `anchor`'s block.
    pub fn insert_after(&mut self, anchor: ExprId, stmt: ExprId) {
        let Some(block) = self.parent(anchor) else {
            return;
        };
        if let Expr::Block(b) = &mut self.exprs[block.0 as usize].kind {
            let at = b.stmts.iter().position(|&s| s == anchor).map_or(b.stmts.len(), |i| i + 1);
            b.stmts.insert(at, stmt);
        }
        self.exprs[stmt.0 as usize].parent = Some(block);
    }

    /// Point a call's base expression at `target`.
    pub fn set_call_base(&mut self, call: ExprId, target: SymbolId) {
        if let Some(base) = self.as_call(call).map(|c| c.base) {
            self.exprs[base.0 as usize].kind = Expr::SymRef(target);
        }
    }

    /// Replace named actuals with the expressions they wrap.
    pub fn strip_named_args(&mut self, call: ExprId) {
        let Some(args) = self.as_call(call).map(|c| c.args.clone()) else {
            return;
        };
        let mut stripped = Vec::with_capacity(args.len());
        for arg in args {
            match self.exprs[arg.0 as usize].kind {
                Expr::Named { actual, .. } => {
                    self.exprs[arg.0 as usize].parent = None;
                    self.exprs[actual.0 as usize].parent = Some(call);
                    stripped.push(actual);
                }
                _ => stripped.push(arg),
            }
        }
        if let Expr::Call(c) = &mut self.exprs[call.0 as usize].kind {
            c.args = stripped;
        }
    }

    // ── Builders ────────────────────────────────────────────────────────

    /// A fresh reference to `s`.
    pub fn sym_ref(&mut self, s: SymbolId) -> ExprId {
        self.new_expr(Expr::SymRef(s))
    }

    /// A name the binder could not tie to a symbol; calls use it as their
    /// base until resolution.
    pub fn unresolved(&mut self, name: impl Into<String>) -> ExprId {
        self.new_expr(Expr::Unresolved(name.into()))
    }

    /// A named actual `name: actual`.
    pub fn named(&mut self, name: impl Into<String>, actual: ExprId) -> ExprId {
        self.new_expr(Expr::Named { name: name.into(), actual })
    }

    /// A call through an arbitrary base expression.
    pub fn call(&mut self, base: ExprId, args: Vec<ExprId>) -> ExprId {
        self.new_expr(Expr::Call(Call { base, args, primitive: None, qualifier: None }))
    }

    /// A call to the function named `name`, to be looked up by visibility.
    pub fn call_named(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        let base = self.unresolved(name);
        self.call(base, args)
    }

    /// A module-qualified call `module.name(args)`.
    pub fn qualified_call(&mut self, module: SymbolId, name: &str, args: Vec<ExprId>) -> ExprId {
        let base = self.unresolved(name);
        self.new_expr(Expr::Call(Call { base, args, primitive: None, qualifier: Some(module) }))
    }

    /// A primitive operation; never resolved, typed by the builtin rules.
    pub fn primitive(&mut self, op: &str, args: Vec<ExprId>) -> ExprId {
        let base = self.unresolved(op);
        self.new_expr(Expr::Call(Call {
            base,
            args,
            primitive: Some(Primitive::Op(op.to_string())),
            qualifier: None,
        }))
    }

    /// `return value`.
    pub fn ret(&mut self, value: ExprId) -> ExprId {
        let base = self.unresolved("return");
        self.new_expr(Expr::Call(Call {
            base,
            args: vec![value],
            primitive: Some(Primitive::Return),
            qualifier: None,
        }))
    }

    pub fn cond(&mut self, cond: ExprId, then_branch: ExprId, else_branch: Option<ExprId>) -> ExprId {
        self.new_expr(Expr::Cond { cond, then_branch, else_branch })
    }

    pub fn goto(&mut self, label: ExprId) -> ExprId {
        self.new_expr(Expr::Goto { label })
    }

    /// A fresh, unattached block.
    pub fn new_block(&mut self, stmts: Vec<ExprId>) -> ExprId {
        self.new_expr(Expr::Block(Block { stmts, uses: Vec::new() }))
    }

    /// An immediate value of type `ty`, referenced through a symbol with no
    /// def point.
    pub fn constant(&mut self, text: impl Into<String>, ty: TypeId) -> SymbolId {
        self.push_symbol(text.into(), SymbolKind::Variable, ty, Span::default())
    }

    /// Shorthand for a reference to a fresh constant.
    pub fn literal(&mut self, text: impl Into<String>, ty: TypeId) -> ExprId {
        let c = self.constant(text, ty);
        self.sym_ref(c)
    }

    /// A reference to the symbol naming `ty`.
    pub fn type_ref(&mut self, ty: TypeId) -> Option<ExprId> {
        let sym = self.type_symbol(ty)?;
        Some(self.sym_ref(sym))
    }

    fn define(&mut self, block: ExprId, sym: SymbolId, type_expr: Option<ExprId>, init: Option<ExprId>) -> ExprId {
        let def = self.new_expr(Expr::Def { sym, type_expr, init });
        self.symbols[sym.0 as usize].def_point = Some(def);
        self.push_stmt(block, def);
        def
    }

    /// Declare a module in `parent`, returning the module symbol.
    pub fn add_module(&mut self, parent: ExprId, name: &str) -> SymbolId {
        let block = self.new_block(Vec::new());
        let sym = self.push_symbol(name.to_string(), SymbolKind::Module { block }, TypeLattice::VOID, Span::default());
        self.define(parent, sym, None, None);
        sym
    }

    /// Record that `block` uses `module`.
    pub fn add_use(&mut self, block: ExprId, module: SymbolId) {
        if let Expr::Block(b) = &mut self.exprs[block.0 as usize].kind {
            if !b.uses.contains(&module) {
                b.uses.push(module);
            }
        }
    }

    /// Declare a type in `block` with the given dispatch parents.
    pub fn add_type(&mut self, block: ExprId, name: &str, parents: &[TypeId]) -> TypeId {
        self.add_type_with(block, name, parents, false)
    }

    /// Like [`Program::add_type`], optionally declaring a generic type.
    pub fn add_type_with(&mut self, block: ExprId, name: &str, parents: &[TypeId], is_generic: bool) -> TypeId {
        let id = self.alloc_id();
        let ty = self.types.add(id, name, parents, is_generic);
        let sym = self.push_symbol(name.to_string(), SymbolKind::Type(ty), ty, Span::default());
        self.types.get_mut(ty).symbol = Some(sym);
        self.define(block, sym, None, None);
        ty
    }

    /// Record `f` as the function that builds default values of `ty`.
    pub fn set_default_constructor(&mut self, ty: TypeId, f: SymbolId) {
        self.types.get_mut(ty).default_constructor = Some(f);
    }

    /// Declare a function with an empty body in `block`.
    pub fn add_function(&mut self, block: ExprId, name: &str) -> SymbolId {
        let body = self.new_block(Vec::new());
        let sym = self.push_symbol(
            name.to_string(),
            SymbolKind::Function(Function {
                formals: Vec::new(),
                ret_type_expr: None,
                ret_type: TypeLattice::UNKNOWN,
                body,
                where_clause: None,
                early_verify: false,
                origin: FnOrigin::Declared,
            }),
            TypeLattice::UNKNOWN,
            Span::default(),
        );
        self.functions.push(sym);
        self.define(block, sym, None, None);
        sym
    }

    /// Append a formal to `f`. A `ty` without an annotation gets a reference
    /// to the type's symbol as its annotation; an annotation without `ty`
    /// determines the formal's type when it names a type.
    pub fn add_formal(&mut self, f: SymbolId, name: &str, decl: FormalDecl) -> SymbolId {
        let type_expr = match (decl.type_expr, decl.ty) {
            (Some(te), _) => Some(te),
            (None, Some(ty)) => self.type_ref(ty),
            (None, None) => None,
        };
        let ty = match (decl.ty, type_expr) {
            (Some(ty), _) => ty,
            (None, Some(te)) => self.annotation_type(te),
            (None, None) => TypeLattice::UNKNOWN,
        };
        let formal = Formal { type_expr, default: decl.default, is_type_param: decl.type_param };
        let sym = self.push_symbol(name.to_string(), SymbolKind::Argument(formal), ty, Span::default());
        if let Some(func) = self.function_mut(f) {
            func.formals.push(sym);
        }
        sym
    }

    /// Give `f` an explicit return-type annotation naming `ty`.
    pub fn set_return_type(&mut self, f: SymbolId, ty: TypeId) {
        let annotation = self.type_ref(ty);
        self.set_return_annotation(f, annotation);
    }

    /// Set or clear the return-type annotation of `f`.
    pub fn set_return_annotation(&mut self, f: SymbolId, annotation: Option<ExprId>) {
        if let Some(func) = self.function_mut(f) {
            func.ret_type_expr = annotation;
        }
    }

    /// Attach where-clause constraints to `f`, wrapped in one block.
    pub fn set_where_clause(&mut self, f: SymbolId, constraints: Vec<ExprId>) {
        let block = self.new_block(constraints);
        if let Some(func) = self.function_mut(f) {
            func.where_clause = Some(block);
        }
    }

    /// Have early verification check `f` against its annotations.
    pub fn mark_early_verify(&mut self, f: SymbolId) {
        if let Some(func) = self.function_mut(f) {
            func.early_verify = true;
        }
    }

    /// Append a statement to the body of `f`.
    pub fn push_body_stmt(&mut self, f: SymbolId, stmt: ExprId) {
        if let Some(body) = self.function_body(f) {
            self.push_stmt(body, stmt);
        }
    }

    /// Declare a variable in `block`. Its type comes from the annotation when
    /// it names a type; otherwise the driver fills it in from the
    /// initializer.
    pub fn add_variable(&mut self, block: ExprId, name: &str, type_expr: Option<ExprId>, init: Option<ExprId>) -> SymbolId {
        let ty = type_expr.map_or(TypeLattice::UNKNOWN, |te| self.annotation_type(te));
        let sym = self.push_symbol(name.to_string(), SymbolKind::Variable, ty, Span::default());
        self.define(block, sym, type_expr, init);
        sym
    }

    // ── Typing helpers ──────────────────────────────────────────────────

    /// The type an annotation expression names, or `UNKNOWN`.
    pub fn annotation_type(&self, te: ExprId) -> TypeId {
        match self.kind(te) {
            Expr::SymRef(s) => match &self.symbol(*s).kind {
                SymbolKind::Type(ty) => *ty,
                SymbolKind::Argument(formal) if formal.is_type_param => {
                    let ty = self.symbol(*s).ty;
                    if self.types.is_concrete(ty) { ty } else { TypeLattice::UNKNOWN }
                }
                _ => TypeLattice::UNKNOWN,
            },
            _ => TypeLattice::UNKNOWN,
        }
    }

    /// The type denoted by an actual that names a type.
    pub fn denoted_type(&self, e: ExprId) -> Option<TypeId> {
        match self.kind(e) {
            Expr::SymRef(s) => match self.symbol(*s).kind {
                SymbolKind::Type(ty) => Some(ty),
                _ => None,
            },
            Expr::Named { actual, .. } => self.denoted_type(*actual),
            _ => None,
        }
    }

    /// The static type of an expression as currently known.
    pub fn type_of(&self, e: ExprId) -> TypeId {
        match self.kind(e) {
            Expr::SymRef(s) => match self.symbol(*s).kind {
                SymbolKind::Type(ty) => ty,
                _ => self.symbol(*s).ty,
            },
            Expr::Unresolved(_) => TypeLattice::UNKNOWN,
            Expr::Named { actual, .. } => self.type_of(*actual),
            Expr::Def { sym, .. } => self.symbol(*sym).ty,
            Expr::Block(block) => block.stmts.last().map_or(TypeLattice::VOID, |&s| self.type_of(s)),
            Expr::Cond { then_branch, .. } => self.type_of(*then_branch),
            Expr::Goto { .. } => TypeLattice::VOID,
            Expr::Call(call) => match &call.primitive {
                Some(Primitive::Return) => TypeLattice::VOID,
                Some(Primitive::Op(op)) => {
                    let arg_types: Vec<TypeId> = call.args.iter().map(|&a| self.type_of(a)).collect();
                    builtins::primitive_result_type(op, &arg_types).unwrap_or(TypeLattice::UNKNOWN)
                }
                None => match self.kind(call.base) {
                    Expr::SymRef(s) => match self.function(*s) {
                        Some(f) => f.ret_type,
                        None => TypeLattice::UNKNOWN,
                    },
                    _ => TypeLattice::UNKNOWN,
                },
            },
        }
    }

    // ── Cloning ─────────────────────────────────────────────────────────

    /// Deep-copy an expression subtree. References to symbols in `map` are
    /// redirected; symbols defined inside the subtree are cloned and added
    /// to `map`.
    pub fn deep_clone(&mut self, e: ExprId, map: &mut FxHashMap<SymbolId, SymbolId>) -> ExprId {
        let span = self.expr(e).span;
        let kind = match self.kind(e).clone() {
            Expr::Call(call) => {
                let base = self.deep_clone(call.base, map);
                let args = call.args.iter().map(|&a| self.deep_clone(a, map)).collect();
                let qualifier = call.qualifier.map(|q| map.get(&q).copied().unwrap_or(q));
                Expr::Call(Call { base, args, primitive: call.primitive, qualifier })
            }
            Expr::SymRef(s) => Expr::SymRef(map.get(&s).copied().unwrap_or(s)),
            Expr::Unresolved(name) => Expr::Unresolved(name),
            Expr::Named { name, actual } => Expr::Named { name, actual: self.deep_clone(actual, map) },
            Expr::Def { sym, type_expr, init } => {
                let new_sym = self.clone_symbol(sym, map);
                let type_expr = type_expr.map(|t| self.deep_clone(t, map));
                let init = init.map(|i| self.deep_clone(i, map));
                let def = self.new_expr(Expr::Def { sym: new_sym, type_expr, init });
                self.exprs[def.0 as usize].span = span;
                self.symbols[new_sym.0 as usize].def_point = Some(def);
                return def;
            }
            Expr::Block(block) => {
                let stmts = block.stmts.iter().map(|&s| self.deep_clone(s, map)).collect();
                let uses = block.uses.iter().map(|u| map.get(u).copied().unwrap_or(*u)).collect();
                Expr::Block(Block { stmts, uses })
            }
            Expr::Cond { cond, then_branch, else_branch } => Expr::Cond {
                cond: self.deep_clone(cond, map),
                then_branch: self.deep_clone(then_branch, map),
                else_branch: else_branch.map(|b| self.deep_clone(b, map)),
            },
            Expr::Goto { label } => Expr::Goto { label: self.deep_clone(label, map) },
        };
        let copy = self.new_expr(kind);
        self.exprs[copy.0 as usize].span = span;
        copy
    }

    /// Clone a symbol declared inside a subtree being copied.
    fn clone_symbol(&mut self, s: SymbolId, map: &mut FxHashMap<SymbolId, SymbolId>) -> SymbolId {
        let original = self.symbol(s).clone();
        let copy = self.push_symbol(original.name.clone(), SymbolKind::Variable, original.ty, original.span);
        map.insert(s, copy);
        let kind = match original.kind {
            SymbolKind::Function(func) => {
                self.functions.push(copy);
                let formals = func.formals.iter().map(|&f| self.clone_formal(f, map)).collect();
                let ret_type_expr = func.ret_type_expr.map(|r| self.deep_clone(r, map));
                let where_clause = func.where_clause.map(|w| self.deep_clone(w, map));
                let body = self.deep_clone(func.body, map);
                SymbolKind::Function(Function { formals, ret_type_expr, where_clause, body, ..func })
            }
            SymbolKind::Argument(formal) => SymbolKind::Argument(self.clone_formal_parts(&formal, map)),
            SymbolKind::Module { block } => SymbolKind::Module { block: self.deep_clone(block, map) },
            other => other,
        };
        self.symbols[copy.0 as usize].kind = kind;
        copy
    }

    /// Clone one formal, redirecting references through `map`.
    pub(crate) fn clone_formal(&mut self, f: SymbolId, map: &mut FxHashMap<SymbolId, SymbolId>) -> SymbolId {
        let original = self.symbol(f).clone();
        let parts = match &original.kind {
            SymbolKind::Argument(formal) => self.clone_formal_parts(formal, map),
            _ => Formal::default(),
        };
        let copy = self.push_symbol(original.name, SymbolKind::Argument(parts), original.ty, original.span);
        map.insert(f, copy);
        copy
    }

    fn clone_formal_parts(&mut self, formal: &Formal, map: &mut FxHashMap<SymbolId, SymbolId>) -> Formal {
        Formal {
            type_expr: formal.type_expr.map(|t| self.deep_clone(t, map)),
            default: formal.default.map(|d| self.deep_clone(d, map)),
            is_type_param: formal.is_type_param,
        }
    }

    /// Create a synthesized function declared right after `anchor_fn`.
    pub(crate) fn add_synthesized_function(
        &mut self,
        anchor_fn: SymbolId,
        formals: Vec<SymbolId>,
        body: ExprId,
        ret_type_expr: Option<ExprId>,
        origin: FnOrigin,
    ) -> SymbolId {
        let name = self.name(anchor_fn).to_string();
        let span = self.symbol(anchor_fn).span;
        let sym = self.push_symbol(
            name,
            SymbolKind::Function(Function {
                formals,
                ret_type_expr,
                ret_type: TypeLattice::UNKNOWN,
                body,
                where_clause: None,
                early_verify: false,
                origin,
            }),
            TypeLattice::UNKNOWN,
            span,
        );
        self.functions.push(sym);
        let def = self.new_expr(Expr::Def { sym, type_expr: None, init: None });
        self.exprs[def.0 as usize].span = span;
        self.symbols[sym.0 as usize].def_point = Some(def);
        match self.symbol(anchor_fn).def_point {
            Some(anchor) if self.parent(anchor).is_some() => self.insert_after(anchor, def),
            _ => self.push_stmt(self.root, def),
        }
        sym
    }

    /// Add a formal symbol that is not yet attached to any function.
    pub(crate) fn new_formal_symbol(&mut self, name: &str, formal: Formal, ty: TypeId, span: Span) -> SymbolId {
        self.push_symbol(name.to_string(), SymbolKind::Argument(formal), ty, span)
    }

    /// Add a local variable definition (unattached) initialized by `init`.
    pub(crate) fn new_local(&mut self, name: &str, ty: TypeId, init: ExprId) -> (SymbolId, ExprId) {
        let sym = self.push_symbol(name.to_string(), SymbolKind::Variable, ty, Span::default());
        let def = self.new_expr(Expr::Def { sym, type_expr: None, init: Some(init) });
        self.symbols[sym.0 as usize].def_point = Some(def);
        (sym, def)
    }

    pub(crate) fn set_symbol_type(&mut self, s: SymbolId, ty: TypeId) {
        self.symbols[s.0 as usize].ty = ty;
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
