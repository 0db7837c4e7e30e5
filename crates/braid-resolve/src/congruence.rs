//! Congruence closure over AST-derived terms.
//!
//! Terms are normalized to their "root type or type expression" before being
//! keyed, so a formal, its annotation and the type the annotation names all
//! collapse onto one node. Calls are keyed by the representative of their
//! base expression plus the representatives of their arguments, which lets
//! structurally identical calls share a node before any union happens.
//!
//! The union-find itself is an `ena` table; the value carried by each class
//! is the lowest identity in it, and [`NodeKey::order_roots`] makes that
//! node the root. Lower identities belong to types, then symbols, then
//! expressions, so the canonical representative of a class is the most
//! "resolved" term in it.
//!
//! Adjacency lists (`contains` / `contained_by`) live next to the table.
//! Only a representative's `contained_by` list is kept complete after a
//! union; lists on redirected nodes are left stale and every traversal goes
//! through `find` first.

use ena::unify::{InPlaceUnificationTable, NoError, UnifyKey, UnifyValue};
use rustc_hash::FxHashMap;

use crate::ast::{Expr, ExprId, Program, SymbolId, SymbolKind};
use crate::error::InternalError;
use crate::lattice::{TypeId, TypeLattice};

/// Something the closure can reason about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Type(TypeId),
    Symbol(SymbolId),
    Expr(ExprId),
}

impl Term {
    /// Program-wide identity value of the term.
    pub fn identity(self, program: &Program) -> u32 {
        match self {
            Term::Type(ty) => program.types.get(ty).id,
            Term::Symbol(s) => program.symbol_identity(s),
            Term::Expr(e) => program.expr_identity(e),
        }
    }
}

// ── Union-find keys ────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey(pub u32);

/// Lowest identity value in an equivalence class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MinIdentity(pub u32);

impl UnifyValue for MinIdentity {
    type Error = NoError;

    fn unify_values(a: &Self, b: &Self) -> Result<Self, NoError> {
        Ok(MinIdentity(a.0.min(b.0)))
    }
}

impl UnifyKey for NodeKey {
    type Value = MinIdentity;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        NodeKey(u)
    }

    fn tag() -> &'static str {
        "NodeKey"
    }

    fn order_roots(a: Self, a_value: &MinIdentity, b: Self, b_value: &MinIdentity) -> Option<(Self, Self)> {
        if a_value.0 < b_value.0 {
            Some((a, b))
        } else {
            Some((b, a))
        }
    }
}

#[derive(Clone, Debug)]
struct CcNode {
    /// Identity key used for lookup. For calls, the identity of the base
    /// expression's representative at insertion time.
    key: u32,
    term: Term,
    /// Child representatives at insertion time. Length never changes.
    contains: Vec<NodeKey>,
    contained_by: Vec<NodeKey>,
}

// ── Root type normalization ────────────────────────────────────────────

/// Unwrap declarations down to the type or type expression they stand for.
/// `None` means the term carries no type information of its own.
pub fn root_type_or_type_expr(program: &Program, term: Term) -> Result<Option<Term>, InternalError> {
    match term {
        Term::Type(ty) => {
            if ty == TypeLattice::UNKNOWN || ty == TypeLattice::ANY {
                Ok(None)
            } else {
                Ok(Some(term))
            }
        }
        Term::Symbol(s) => {
            let sym = program.symbol(s);
            match &sym.kind {
                SymbolKind::Variable | SymbolKind::Type(_) => {
                    let ty = match sym.kind {
                        SymbolKind::Type(t) => t,
                        _ => sym.ty,
                    };
                    Ok(Some(root_type_or_type_expr(program, Term::Type(ty))?.unwrap_or(term)))
                }
                SymbolKind::Argument(formal) => {
                    if let Some(te) = formal.type_expr {
                        root_type_or_type_expr(program, Term::Expr(te))
                    } else if root_type_or_type_expr(program, Term::Type(sym.ty))?.is_some() {
                        Ok(Some(Term::Type(sym.ty)))
                    } else {
                        Ok(Some(term))
                    }
                }
                SymbolKind::Function(_) | SymbolKind::Module { .. } => Ok(Some(term)),
            }
        }
        Term::Expr(e) => match program.kind(e) {
            Expr::Def { sym, type_expr, init } => {
                if let Some(init) = init {
                    root_type_or_type_expr(program, Term::Expr(*init))
                } else if let Some(te) = type_expr {
                    root_type_or_type_expr(program, Term::Expr(*te))
                } else {
                    root_type_or_type_expr(program, Term::Symbol(*sym))
                }
            }
            Expr::SymRef(s) => root_type_or_type_expr(program, Term::Symbol(*s)),
            Expr::Call(_) => Ok(Some(term)),
            Expr::Block(block) => match block.stmts.first() {
                Some(&first) => root_type_or_type_expr(program, Term::Expr(first)),
                None => Ok(None),
            },
            Expr::Unresolved(_) => Ok(Some(Term::Type(TypeLattice::UNKNOWN))),
            Expr::Named { actual, .. } => root_type_or_type_expr(program, Term::Expr(*actual)),
            Expr::Cond { .. } | Expr::Goto { .. } => Err(InternalError::Unimplemented {
                what: "type root of a control-flow statement".to_string(),
                span: program.expr(e).span,
            }),
        },
    }
}

// ── Closure ────────────────────────────────────────────────────────────

/// Union-find over normalized terms with structural propagation.
pub struct CongruenceClosure {
    table: InPlaceUnificationTable<NodeKey>,
    nodes: Vec<CcNode>,
    /// Nodes by identity key, in insertion order.
    by_key: FxHashMap<u32, Vec<NodeKey>>,
}

impl CongruenceClosure {
    pub fn new() -> Self {
        CongruenceClosure {
            table: InPlaceUnificationTable::new(),
            nodes: Vec::new(),
            by_key: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, key: NodeKey) -> &CcNode {
        &self.nodes[key.0 as usize]
    }

    /// Find the node for `term`, inserting it (and its children) if no node
    /// with the same key and child classes exists yet.
    pub fn find_or_insert(&mut self, program: &Program, term: Term) -> Result<NodeKey, InternalError> {
        let term = root_type_or_type_expr(program, term)?.unwrap_or(term);
        let mut key = term.identity(program);
        let mut children = Vec::new();

        if let Term::Expr(e) = term {
            if let Expr::Call(call) = program.kind(e) {
                let base = self.find_or_insert(program, Term::Expr(call.base))?;
                let base_rep = self.table.find(base);
                key = self.node(base_rep).key;
                for &arg in &call.args {
                    let child = self.find_or_insert(program, Term::Expr(arg))?;
                    children.push(self.table.find(child));
                }
            }
        }

        if let Some(existing) = self.lookup(key, &children) {
            return Ok(existing);
        }

        let node = self.table.new_key(MinIdentity(key));
        debug_assert_eq!(node.0 as usize, self.nodes.len());
        for &child in &children {
            self.nodes[child.0 as usize].contained_by.push(node);
        }
        self.nodes.push(CcNode { key, term, contains: children, contained_by: Vec::new() });
        self.by_key.entry(key).or_default().push(node);
        Ok(node)
    }

    /// Most recently inserted node with `key` whose children are in the same
    /// classes as `children`.
    fn lookup(&mut self, key: u32, children: &[NodeKey]) -> Option<NodeKey> {
        let candidates = self.by_key.get(&key)?.clone();
        for candidate in candidates.into_iter().rev() {
            let contains = self.node(candidate).contains.clone();
            if contains.len() != children.len() {
                continue;
            }
            if contains.iter().zip(children).all(|(&a, &b)| self.table.unioned(a, b)) {
                return Some(candidate);
            }
        }
        None
    }

    pub fn is_equal(&mut self, program: &Program, a: Term, b: Term) -> Result<bool, InternalError> {
        let a = self.find_or_insert(program, a)?;
        let b = self.find_or_insert(program, b)?;
        Ok(self.table.unioned(a, b))
    }

    /// The term at the root of `term`'s class.
    pub fn representative_term(&mut self, program: &Program, term: Term) -> Result<Term, InternalError> {
        let node = self.find_or_insert(program, term)?;
        let root = self.table.find(node);
        Ok(self.node(root).term)
    }

    /// Record `a == b` and everything it implies structurally.
    pub fn equate(&mut self, program: &Program, a: Term, b: Term) -> Result<(), InternalError> {
        let a = self.find_or_insert(program, a)?;
        let b = self.find_or_insert(program, b)?;
        self.equate_nodes(a, b)
    }

    fn equate_nodes(&mut self, a: NodeKey, b: NodeKey) -> Result<(), InternalError> {
        let ra = self.table.find(a);
        let rb = self.table.find(b);
        if ra == rb {
            return Ok(());
        }

        let contains_a = self.node(a).contains.clone();
        let contains_b = self.node(b).contains.clone();
        if !contains_a.is_empty() && !contains_b.is_empty() && contains_a.len() != contains_b.len() {
            return Err(InternalError::MismatchedShape { left: contains_a.len(), right: contains_b.len() });
        }

        let parents_a = self.node(ra).contained_by.clone();
        let parents_b = self.node(rb).contained_by.clone();

        self.table.union(ra, rb);
        let root = self.table.find(ra);
        let mut merged = parents_a.clone();
        for &p in &parents_b {
            if !merged.contains(&p) {
                merged.push(p);
            }
        }
        self.nodes[root.0 as usize].contained_by = merged;

        if contains_a.len() == contains_b.len() {
            for (&ca, &cb) in contains_a.iter().zip(&contains_b) {
                self.equate_nodes(ca, cb)?;
            }
        }

        for &pa in &parents_a {
            for &pb in &parents_b {
                self.equate_if_children_match(pa, pb)?;
            }
        }
        Ok(())
    }

    /// Children are compared by current class, but the base is compared by
    /// `key`, which was fixed at insertion. Two calls whose bases were only
    /// unioned afterwards keep different keys and are not merged here.
    fn equate_if_children_match(&mut self, a: NodeKey, b: NodeKey) -> Result<(), InternalError> {
        if self.table.unioned(a, b) {
            return Ok(());
        }
        if self.node(a).key != self.node(b).key {
            return Ok(());
        }
        let contains_a = self.node(a).contains.clone();
        let contains_b = self.node(b).contains.clone();
        if contains_a.len() != contains_b.len() {
            return Ok(());
        }
        for (&ca, &cb) in contains_a.iter().zip(&contains_b) {
            if !self.table.unioned(ca, cb) {
                return Ok(());
            }
        }
        self.equate_nodes(a, b)
    }
}

impl Default for CongruenceClosure {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FormalDecl;

    fn untyped_var(p: &mut Program, name: &str) -> ExprId {
        let root = p.root();
        let s = p.add_variable(root, name, None, None);
        p.sym_ref(s)
    }

    #[test]
    fn reflexive_and_symmetric() {
        let mut p = Program::new();
        let x = untyped_var(&mut p, "x");
        let y = untyped_var(&mut p, "y");
        let mut cc = CongruenceClosure::new();
        assert!(cc.is_equal(&p, Term::Expr(x), Term::Expr(x)).unwrap());
        assert!(!cc.is_equal(&p, Term::Expr(x), Term::Expr(y)).unwrap());
        cc.equate(&p, Term::Expr(x), Term::Expr(y)).unwrap();
        assert!(cc.is_equal(&p, Term::Expr(x), Term::Expr(y)).unwrap());
        assert!(cc.is_equal(&p, Term::Expr(y), Term::Expr(x)).unwrap());
    }

    #[test]
    fn transitive() {
        let mut p = Program::new();
        let a = untyped_var(&mut p, "a");
        let b = untyped_var(&mut p, "b");
        let c = untyped_var(&mut p, "c");
        let mut cc = CongruenceClosure::new();
        cc.equate(&p, Term::Expr(a), Term::Expr(b)).unwrap();
        cc.equate(&p, Term::Expr(b), Term::Expr(c)).unwrap();
        assert!(cc.is_equal(&p, Term::Expr(a), Term::Expr(c)).unwrap());
    }

    #[test]
    fn equal_arguments_make_equal_calls() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let x = untyped_var(&mut p, "x");
        let y = untyped_var(&mut p, "y");
        let fx_base = p.sym_ref(f);
        let fx = p.call(fx_base, vec![x]);
        let fy_base = p.sym_ref(f);
        let fy = p.call(fy_base, vec![y]);

        let mut cc = CongruenceClosure::new();
        cc.find_or_insert(&p, Term::Expr(fx)).unwrap();
        cc.find_or_insert(&p, Term::Expr(fy)).unwrap();
        assert!(!cc.is_equal(&p, Term::Expr(fx), Term::Expr(fy)).unwrap());

        cc.equate(&p, Term::Expr(x), Term::Expr(y)).unwrap();
        assert!(cc.is_equal(&p, Term::Expr(fx), Term::Expr(fy)).unwrap());
    }

    #[test]
    fn calls_inserted_after_equate_collapse() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let x = untyped_var(&mut p, "x");
        let y = untyped_var(&mut p, "y");
        let mut cc = CongruenceClosure::new();
        cc.equate(&p, Term::Expr(x), Term::Expr(y)).unwrap();

        let b1 = p.sym_ref(f);
        let fx = p.call(b1, vec![x]);
        let b2 = p.sym_ref(f);
        let fy = p.call(b2, vec![y]);
        assert!(cc.is_equal(&p, Term::Expr(fx), Term::Expr(fy)).unwrap());
    }

    #[test]
    fn equal_calls_equate_their_arguments() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let x = untyped_var(&mut p, "x");
        let y = untyped_var(&mut p, "y");
        let b1 = p.sym_ref(f);
        let fx = p.call(b1, vec![x]);
        let b2 = p.sym_ref(f);
        let fy = p.call(b2, vec![y]);
        let mut cc = CongruenceClosure::new();
        cc.equate(&p, Term::Expr(fx), Term::Expr(fy)).unwrap();
        assert!(cc.is_equal(&p, Term::Expr(x), Term::Expr(y)).unwrap());
    }

    #[test]
    fn lower_identity_becomes_representative() {
        let mut p = Program::new();
        let x = untyped_var(&mut p, "x");
        let mut cc = CongruenceClosure::new();
        cc.equate(&p, Term::Expr(x), Term::Type(TypeLattice::INTEGER)).unwrap();
        assert_eq!(
            cc.representative_term(&p, Term::Expr(x)).unwrap(),
            Term::Type(TypeLattice::INTEGER)
        );
    }

    #[test]
    fn annotations_normalize_to_their_type() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let formal = p.add_formal(f, "n", FormalDecl::typed(TypeLattice::INTEGER));
        let r = p.sym_ref(formal);
        let lit = p.literal("1", TypeLattice::INTEGER);
        let mut cc = CongruenceClosure::new();
        assert!(cc.is_equal(&p, Term::Expr(r), Term::Expr(lit)).unwrap());
        assert!(cc.is_equal(&p, Term::Symbol(formal), Term::Type(TypeLattice::INTEGER)).unwrap());
    }

    #[test]
    fn mismatched_shapes_are_internal_errors() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let x = untyped_var(&mut p, "x");
        let y = untyped_var(&mut p, "y");
        let z = untyped_var(&mut p, "z");
        let b1 = p.sym_ref(f);
        let one = p.call(b1, vec![x]);
        let b2 = p.sym_ref(f);
        let two = p.call(b2, vec![y, z]);
        let mut cc = CongruenceClosure::new();
        let err = cc.equate(&p, Term::Expr(one), Term::Expr(two)).unwrap_err();
        assert_eq!(err, InternalError::MismatchedShape { left: 1, right: 2 });
    }
}
