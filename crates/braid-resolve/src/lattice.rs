//! Type lattice for call resolution.
//!
//! Types are nodes in a DAG of dispatch-parent edges. Identity is node
//! identity: two `TypeId`s denote the same type iff they are equal. The
//! rest of the resolver asks the lattice one question, whether a type is at
//! least as specific as another, through [`TypeLattice::is_subtype`] and
//! [`TypeLattice::is_strict_subtype`].

use serde::Serialize;

use crate::ast::SymbolId;

/// Index of a type node in the [`TypeLattice`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

/// A single node of the lattice.
#[derive(Clone, Debug)]
pub struct TypeNode {
    /// Program-wide identity value (shared counter with symbols and expressions).
    pub id: u32,
    pub name: String,
    /// Declared direct supertypes.
    pub dispatch_parents: Vec<TypeId>,
    /// Generic types stand for a family of types to be fixed by instantiation.
    pub is_generic: bool,
    /// The type symbol naming this type, if any.
    pub symbol: Option<SymbolId>,
    /// The function that constructs default values of this type.
    pub default_constructor: Option<SymbolId>,
}

/// The set of all types known to one compilation.
#[derive(Clone, Debug)]
pub struct TypeLattice {
    nodes: Vec<TypeNode>,
}

impl TypeLattice {
    /// Not yet determined.
    pub const UNKNOWN: TypeId = TypeId(0);
    /// Wildcard: every other type is a strict subtype of `Any`.
    pub const ANY: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    /// The generic numeric family above boolean, integer and float.
    pub const NUMERIC: TypeId = TypeId(3);
    pub const BOOLEAN: TypeId = TypeId(4);
    pub const INTEGER: TypeId = TypeId(5);
    pub const FLOAT: TypeId = TypeId(6);
    pub const STRING: TypeId = TypeId(7);

    const BUILTIN_NAMES: [&'static str; 8] = [
        "Unknown", "Any", "Void", "Numeric", "Boolean", "Integer", "Float", "String",
    ];

    /// Create a lattice holding only the distinguished types. Their identity
    /// values are `0..BUILTIN_COUNT`.
    pub fn new() -> Self {
        let nodes = Self::BUILTIN_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| TypeNode {
                id: i as u32,
                name: (*name).to_string(),
                dispatch_parents: Vec::new(),
                is_generic: i as u32 == Self::NUMERIC.0,
                symbol: None,
                default_constructor: None,
            })
            .collect();
        TypeLattice { nodes }
    }

    /// Number of distinguished types created by [`TypeLattice::new`].
    pub const BUILTIN_COUNT: u32 = 8;

    /// Every distinguished type, in identity order.
    pub fn builtins() -> impl Iterator<Item = TypeId> {
        (0..Self::BUILTIN_COUNT).map(TypeId)
    }

    /// Add a type node. `id` is the program-wide identity value.
    pub fn add(&mut self, id: u32, name: impl Into<String>, parents: &[TypeId], is_generic: bool) -> TypeId {
        let ty = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            id,
            name: name.into(),
            dispatch_parents: parents.to_vec(),
            is_generic,
            symbol: None,
            default_constructor: None,
        });
        ty
    }

    /// Add a dispatch-parent edge. Edges are never removed.
    pub fn add_dispatch_parent(&mut self, sub: TypeId, parent: TypeId) {
        debug_assert!(
            !self.is_subtype(parent, sub),
            "dispatch-parent edge {} -> {} would create a cycle",
            self.name(sub),
            self.name(parent)
        );
        let parents = &mut self.nodes[sub.0 as usize].dispatch_parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    pub fn get(&self, ty: TypeId) -> &TypeNode {
        &self.nodes[ty.0 as usize]
    }

    pub fn get_mut(&mut self, ty: TypeId) -> &mut TypeNode {
        &mut self.nodes[ty.0 as usize]
    }

    pub fn name(&self, ty: TypeId) -> &str {
        &self.nodes[ty.0 as usize].name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_generic(&self, ty: TypeId) -> bool {
        self.nodes[ty.0 as usize].is_generic
    }

    /// Whether `ty` still needs a concrete instantiation before code can be
    /// generated for it.
    pub fn is_concrete(&self, ty: TypeId) -> bool {
        ty != Self::UNKNOWN && !self.is_generic(ty)
    }

    /// Find a type by name. Linear; only used by callers outside the hot path.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| TypeId(i as u32))
    }

    // ── Subtyping ───────────────────────────────────────────────────────

    /// Whether using a `sub` where a `ty` is expected needs an implicit
    /// numeric promotion (and therefore a coercion at the use site).
    pub fn is_promotion(&self, sub: TypeId, ty: TypeId) -> bool {
        matches!(
            (sub, ty),
            (Self::BOOLEAN, Self::INTEGER) | (Self::BOOLEAN, Self::FLOAT) | (Self::INTEGER, Self::FLOAT)
        )
    }

    /// `sub` is strictly more specific than `ty`.
    pub fn is_strict_subtype(&self, sub: TypeId, ty: TypeId) -> bool {
        if sub != Self::ANY && ty == Self::ANY {
            return true;
        }
        if ty == Self::NUMERIC && matches!(sub, Self::BOOLEAN | Self::INTEGER | Self::FLOAT) {
            return true;
        }
        if self.is_promotion(sub, ty) {
            return true;
        }
        self.nodes[sub.0 as usize]
            .dispatch_parents
            .iter()
            .any(|&parent| parent == ty || self.is_strict_subtype(parent, ty))
    }

    /// `sub` is `ty` or strictly more specific than it.
    pub fn is_subtype(&self, sub: TypeId, ty: TypeId) -> bool {
        sub == ty || self.is_strict_subtype(sub, ty)
    }
}

impl Default for TypeLattice {
    fn default() -> Self {
        Self::new()
    }
}
