//! Synthesized functions: instantiations, default wrappers, order wrappers.
//!
//! Each kind is memoized on the original function plus the shape of the
//! binding that required it, so repeated calls of the same shape share one
//! synthesized function. New functions are declared right after the
//! original and become visible through the index on its next refresh.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{FnOrigin, Formal, Program, SymbolId};
use crate::candidates::{Actual, Binding};
use crate::lattice::{TypeId, TypeLattice};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum WrapperKey {
    Instance { of: SymbolId, types: Vec<TypeId> },
    Defaults { of: SymbolId, used: Vec<bool> },
    Order { of: SymbolId, permutation: Vec<usize> },
}

#[derive(Debug, Default)]
pub struct WrapperCache {
    cache: FxHashMap<WrapperKey, SymbolId>,
    synthesized: Vec<SymbolId>,
}

impl WrapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every synthesized function, in creation order.
    pub fn synthesized(&self) -> &[SymbolId] {
        &self.synthesized
    }

    fn remember(&mut self, key: WrapperKey, f: SymbolId) {
        self.cache.insert(key, f);
        self.synthesized.push(f);
    }
}

/// Whether `f` still has formals whose type must be fixed by a call site.
pub fn needs_instantiation(program: &Program, f: SymbolId) -> bool {
    program.formals(f).iter().any(|&formal| {
        let ty = program.symbol(formal).ty;
        let is_type_param = program.formal(formal).is_some_and(|p| p.is_type_param);
        ty == TypeLattice::UNKNOWN || program.types.is_generic(ty) || (is_type_param && !program.types.is_concrete(ty))
    })
}

/// Clone `f` with formal types fixed by the bound actuals. Returns `None`
/// when no formal type would change. The binding stays valid for the clone.
pub fn instantiate(
    program: &mut Program,
    cache: &mut WrapperCache,
    f: SymbolId,
    binding: &Binding,
    actuals: &[Actual],
) -> Option<SymbolId> {
    let formals = program.formals(f).to_vec();
    let mut types = Vec::with_capacity(formals.len());
    let mut type_args: Vec<Option<TypeId>> = Vec::with_capacity(formals.len());
    for (j, &formal) in formals.iter().enumerate() {
        let declared = program.symbol(formal).ty;
        let parts = program.formal(formal).cloned().unwrap_or_default();
        let open = declared == TypeLattice::UNKNOWN || program.types.is_generic(declared);
        let (ty, type_arg) = match binding.formal_to_actual[j] {
            Some(i) if parts.is_type_param && actuals[i].denoted.is_some() => (actuals[i].denoted.unwrap_or(declared), actuals[i].denoted),
            Some(i) if open && program.types.is_concrete(actuals[i].ty) => (actuals[i].ty, None),
            None if open => {
                let from_default = parts.default.map_or(TypeLattice::UNKNOWN, |d| program.type_of(d));
                (if program.types.is_concrete(from_default) { from_default } else { declared }, None)
            }
            _ => (declared, None),
        };
        types.push(ty);
        type_args.push(type_arg);
    }
    let unchanged = formals.iter().zip(&types).all(|(&formal, &ty)| program.symbol(formal).ty == ty)
        && type_args.iter().all(Option::is_none);
    if unchanged {
        return None;
    }

    let key = WrapperKey::Instance { of: f, types: types.clone() };
    if let Some(&existing) = cache.cache.get(&key) {
        return Some(existing);
    }

    let mut map = FxHashMap::default();
    for (&formal, type_arg) in formals.iter().zip(&type_args) {
        if let Some(type_sym) = type_arg.and_then(|t| program.type_symbol(t)) {
            map.insert(formal, type_sym);
        }
    }

    let mut new_formals = Vec::with_capacity(formals.len());
    for ((&formal, &ty), type_arg) in formals.iter().zip(&types).zip(&type_args) {
        let parts = program.formal(formal).cloned().unwrap_or_default();
        let sym = program.symbol(formal).clone();
        let cloned = Formal {
            type_expr: parts.type_expr.map(|te| program.deep_clone(te, &mut map)),
            default: parts.default.map(|d| program.deep_clone(d, &mut map)),
            is_type_param: parts.is_type_param,
        };
        let copy = program.new_formal_symbol(&sym.name, cloned, ty, sym.span);
        if type_arg.is_none() {
            map.insert(formal, copy);
        }
        new_formals.push(copy);
    }

    let original = program.function(f).cloned()?;
    let ret_type_expr = original.ret_type_expr.map(|r| program.deep_clone(r, &mut map));
    let body = program.deep_clone(original.body, &mut map);
    let instance = program.add_synthesized_function(f, new_formals, body, ret_type_expr, FnOrigin::Instance(f));
    debug!(function = program.name(f), "instantiated");
    cache.remember(key, instance);
    Some(instance)
}

/// Wrap `f` so that formals left unbound by `binding` take their default
/// values. Returns the wrapper and the binding rewritten onto its formals.
pub fn default_wrapper(
    program: &mut Program,
    cache: &mut WrapperCache,
    f: SymbolId,
    binding: &Binding,
) -> (SymbolId, Binding) {
    let used: Vec<bool> = binding.formal_to_actual.iter().map(Option::is_some).collect();
    let rebound = rebind_onto_used(binding, &used);
    let key = WrapperKey::Defaults { of: f, used: used.clone() };
    if let Some(&existing) = cache.cache.get(&key) {
        return (existing, rebound);
    }

    let formals = program.formals(f).to_vec();
    let mut map = FxHashMap::default();
    let mut wrapper_formals = Vec::new();
    for (&formal, &is_used) in formals.iter().zip(&used) {
        if !is_used {
            continue;
        }
        let copy = clone_formal_without_default(program, formal, &mut map);
        wrapper_formals.push(copy);
    }

    let mut stmts = Vec::new();
    for (&formal, &is_used) in formals.iter().zip(&used) {
        if is_used {
            continue;
        }
        let Some(default) = program.formal(formal).and_then(|p| p.default) else {
            continue;
        };
        let value = program.deep_clone(default, &mut map);
        let name = program.name(formal).to_string();
        let ty = program.symbol(formal).ty;
        let (local, def) = program.new_local(&name, ty, value);
        map.insert(formal, local);
        stmts.push(def);
    }

    let forward = forward_call(program, f, &formals, &map);
    stmts.push(forward);
    let body = program.new_block(stmts);
    let ret_type_expr = program.function(f).and_then(|func| func.ret_type_expr);
    let ret_type_expr = ret_type_expr.map(|r| program.deep_clone(r, &mut map));
    let wrapper = program.add_synthesized_function(f, wrapper_formals, body, ret_type_expr, FnOrigin::DefaultWrapper(f));
    debug!(function = program.name(f), defaults = used.iter().filter(|u| !**u).count(), "default wrapper");
    cache.remember(key, wrapper);
    (wrapper, rebound)
}

/// Wrap `f` with its formals permuted into call order. The wrapper forwards
/// in declaration order; the returned binding is positional.
pub fn order_wrapper(
    program: &mut Program,
    cache: &mut WrapperCache,
    f: SymbolId,
    binding: &Binding,
) -> (SymbolId, Binding) {
    let permutation = binding.actual_to_formal.clone();
    let rebound = Binding { needs_coercion: binding.needs_coercion, ..Binding::positional(permutation.len()) };
    let key = WrapperKey::Order { of: f, permutation: permutation.clone() };
    if let Some(&existing) = cache.cache.get(&key) {
        return (existing, rebound);
    }

    let formals = program.formals(f).to_vec();
    let mut map = FxHashMap::default();
    let wrapper_formals: Vec<SymbolId> = permutation
        .iter()
        .map(|&j| clone_formal_without_default(program, formals[j], &mut map))
        .collect();
    let forward = forward_call(program, f, &formals, &map);
    let body = program.new_block(vec![forward]);
    let ret_type_expr = program.function(f).and_then(|func| func.ret_type_expr);
    let ret_type_expr = ret_type_expr.map(|r| program.deep_clone(r, &mut map));
    let wrapper = program.add_synthesized_function(f, wrapper_formals, body, ret_type_expr, FnOrigin::OrderWrapper(f));
    debug!(function = program.name(f), ?permutation, "order wrapper");
    cache.remember(key, wrapper);
    (wrapper, rebound)
}

fn clone_formal_without_default(
    program: &mut Program,
    formal: SymbolId,
    map: &mut FxHashMap<SymbolId, SymbolId>,
) -> SymbolId {
    let parts = program.formal(formal).cloned().unwrap_or_default();
    let sym = program.symbol(formal).clone();
    let cloned = Formal {
        type_expr: parts.type_expr.map(|te| program.deep_clone(te, map)),
        default: None,
        is_type_param: parts.is_type_param,
    };
    let copy = program.new_formal_symbol(&sym.name, cloned, sym.ty, sym.span);
    map.insert(formal, copy);
    copy
}

/// `return f(args...)` with one argument per formal of `f`, each a
/// reference to whatever `map` binds that formal to.
fn forward_call(
    program: &mut Program,
    f: SymbolId,
    formals: &[SymbolId],
    map: &FxHashMap<SymbolId, SymbolId>,
) -> crate::ast::ExprId {
    let args = formals
        .iter()
        .map(|formal| {
            let target = map.get(formal).copied().unwrap_or(*formal);
            program.sym_ref(target)
        })
        .collect();
    let base = program.sym_ref(f);
    let call = program.call(base, args);
    program.ret(call)
}

/// Rewrite a binding onto the formals of a default wrapper, whose formals
/// are the used formals of the original in declaration order.
fn rebind_onto_used(binding: &Binding, used: &[bool]) -> Binding {
    let mut position = Vec::with_capacity(used.len());
    let mut next = 0;
    for &u in used {
        position.push(next);
        if u {
            next += 1;
        }
    }
    let actual_to_formal: Vec<usize> = binding.actual_to_formal.iter().map(|&j| position[j]).collect();
    let mut formal_to_actual = vec![None; next];
    for (i, &j) in actual_to_formal.iter().enumerate() {
        formal_to_actual[j] = Some(i);
    }
    Binding { actual_to_formal, formal_to_actual, needs_coercion: binding.needs_coercion }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, FormalDecl};
    use crate::candidates::{actuals_of, bind};

    fn forwarded_args(p: &Program, wrapper: SymbolId) -> (SymbolId, Vec<SymbolId>) {
        let body = p.function_body(wrapper).unwrap();
        let ret = *p.block(body).unwrap().stmts.last().unwrap();
        let inner = p.as_call(ret).unwrap().args[0];
        let call = p.as_call(inner).unwrap();
        let target = match p.kind(call.base) {
            Expr::SymRef(s) => *s,
            other => panic!("unexpected base {other:?}"),
        };
        let args = call
            .args
            .iter()
            .map(|&a| match p.kind(a) {
                Expr::SymRef(s) => *s,
                other => panic!("unexpected arg {other:?}"),
            })
            .collect();
        (target, args)
    }

    #[test]
    fn default_wrapper_keeps_bound_formals() {
        let mut p = Program::new();
        let zero = p.literal("0", TypeLattice::INTEGER);
        let f = p.add_function(p.root(), "f");
        p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
        p.add_formal(f, "y", FormalDecl::typed_default(TypeLattice::INTEGER, zero));
        let five = p.literal("5", TypeLattice::INTEGER);
        let call = p.call_named("f", vec![five]);
        let actuals = actuals_of(&p, call);
        let binding = bind(&p, &actuals, f).unwrap();

        let mut cache = WrapperCache::new();
        let (wrapper, rebound) = default_wrapper(&mut p, &mut cache, f, &binding);
        assert_eq!(p.formals(wrapper).len(), 1);
        assert_eq!(p.name(p.formals(wrapper)[0]), "x");
        assert_eq!(rebound, Binding::positional(1));
        assert_eq!(p.function(wrapper).unwrap().origin, FnOrigin::DefaultWrapper(f));

        let (target, args) = forwarded_args(&p, wrapper);
        assert_eq!(target, f);
        assert_eq!(args[0], p.formals(wrapper)[0]);
        assert_eq!(p.name(args[1]), "y");

        let (again, _) = default_wrapper(&mut p, &mut cache, f, &binding);
        assert_eq!(again, wrapper);
        assert_eq!(cache.synthesized(), &[wrapper]);
    }

    #[test]
    fn wrapper_is_declared_after_original() {
        let mut p = Program::new();
        let zero = p.literal("0", TypeLattice::INTEGER);
        let f = p.add_function(p.root(), "f");
        let g = p.add_function(p.root(), "g");
        p.add_formal(f, "y", FormalDecl::typed_default(TypeLattice::INTEGER, zero));
        let binding = Binding { actual_to_formal: vec![], formal_to_actual: vec![None], needs_coercion: false };
        let mut cache = WrapperCache::new();
        let (wrapper, _) = default_wrapper(&mut p, &mut cache, f, &binding);
        let stmts = &p.block(p.root()).unwrap().stmts;
        let order: Vec<SymbolId> = stmts
            .iter()
            .filter_map(|&s| match p.kind(s) {
                Expr::Def { sym, .. } => Some(*sym),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![f, wrapper, g]);
    }

    #[test]
    fn order_wrapper_forwards_in_declaration_order() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        let x = p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
        let y = p.add_formal(f, "y", FormalDecl::typed(TypeLattice::INTEGER));
        let binding = Binding {
            actual_to_formal: vec![1, 0],
            formal_to_actual: vec![Some(1), Some(0)],
            needs_coercion: false,
        };
        let mut cache = WrapperCache::new();
        let (wrapper, rebound) = order_wrapper(&mut p, &mut cache, f, &binding);
        let names: Vec<&str> = p.formals(wrapper).iter().map(|&s| p.name(s)).collect();
        assert_eq!(names, vec!["y", "x"]);
        assert!(rebound.is_in_declaration_order());

        let (target, args) = forwarded_args(&p, wrapper);
        assert_eq!(target, f);
        assert_eq!(p.name(args[0]), "x");
        assert_eq!(p.name(args[1]), "y");
        assert_ne!(args[0], x);
        assert_ne!(args[1], y);
    }

    #[test]
    fn instantiation_fixes_unknown_formals() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "id");
        let x = p.add_formal(f, "x", FormalDecl::untyped());
        let xr = p.sym_ref(x);
        let ret = p.ret(xr);
        p.push_body_stmt(f, ret);
        assert!(needs_instantiation(&p, f));

        let s = p.literal("\"a\"", TypeLattice::STRING);
        let call = p.call_named("id", vec![s]);
        let actuals = actuals_of(&p, call);
        let binding = bind(&p, &actuals, f).unwrap();
        let mut cache = WrapperCache::new();
        let inst = instantiate(&mut p, &mut cache, f, &binding, &actuals).unwrap();
        assert!(!needs_instantiation(&p, inst));
        assert_eq!(p.symbol(p.formals(inst)[0]).ty, TypeLattice::STRING);
        assert_eq!(instantiate(&mut p, &mut cache, f, &binding, &actuals), Some(inst));

        // The body refers to the clone's formal, not the original's.
        let body = p.function_body(inst).unwrap();
        let ret = p.block(body).unwrap().stmts[0];
        let arg = p.as_call(ret).unwrap().args[0];
        assert!(matches!(p.kind(arg), Expr::SymRef(s) if *s == p.formals(inst)[0]));
    }

    #[test]
    fn type_parameters_bind_to_the_named_type() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "make");
        let t = p.add_formal(f, "T", FormalDecl::type_param());
        let t_ref = p.sym_ref(t);
        let v = p.add_formal(f, "v", FormalDecl::annotated(t_ref));
        assert_eq!(p.symbol(v).ty, TypeLattice::UNKNOWN);

        let ty = p.type_ref(TypeLattice::FLOAT).unwrap();
        let one = p.literal("1.0", TypeLattice::FLOAT);
        let call = p.call_named("make", vec![ty, one]);
        let actuals = actuals_of(&p, call);
        let binding = bind(&p, &actuals, f).unwrap();
        let mut cache = WrapperCache::new();
        let inst = instantiate(&mut p, &mut cache, f, &binding, &actuals).unwrap();
        let inst_v = p.formals(inst)[1];
        let te = p.formal(inst_v).unwrap().type_expr.unwrap();
        assert_eq!(p.annotation_type(te), TypeLattice::FLOAT);
        assert_eq!(p.symbol(inst_v).ty, TypeLattice::FLOAT);
        assert!(!needs_instantiation(&p, inst));
    }

    #[test]
    fn concrete_functions_are_not_instantiated() {
        let mut p = Program::new();
        let f = p.add_function(p.root(), "f");
        p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
        let one = p.literal("1", TypeLattice::INTEGER);
        let call = p.call_named("f", vec![one]);
        let actuals = actuals_of(&p, call);
        let binding = bind(&p, &actuals, f).unwrap();
        let mut cache = WrapperCache::new();
        assert!(!needs_instantiation(&p, f));
        assert_eq!(instantiate(&mut p, &mut cache, f, &binding, &actuals), None);
    }
}
