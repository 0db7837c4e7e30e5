//! Actual-to-formal binding and candidate ranking.
//!
//! Binding runs in three phases: named actuals claim formals by name,
//! unnamed actuals claim the first compatible free formal left to right,
//! and every formal left unclaimed must have a default value. Ranking is a
//! pairwise dominance scan over the candidates that bound successfully.

use tracing::trace;

use crate::ast::{Expr, ExprId, Program, SymbolId};
use crate::error::InternalError;
use crate::lattice::{TypeId, TypeLattice};

/// One actual argument of a call, with any name wrapper peeled off.
#[derive(Clone, Debug)]
pub struct Actual {
    pub name: Option<String>,
    pub expr: ExprId,
    pub ty: TypeId,
    /// The type this actual names, when it is a reference to a type.
    pub denoted: Option<TypeId>,
}

/// Collect the actuals of `call` in source order.
pub fn actuals_of(program: &Program, call: ExprId) -> Vec<Actual> {
    let Some(c) = program.as_call(call) else {
        return Vec::new();
    };
    c.args
        .iter()
        .map(|&arg| {
            let (name, expr) = match program.kind(arg) {
                Expr::Named { name, actual } => (Some(name.clone()), *actual),
                _ => (None, arg),
            };
            Actual { name, expr, ty: program.type_of(expr), denoted: program.denoted_type(expr) }
        })
        .collect()
}

/// How a call's actuals map onto one candidate's formals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Formal index bound by each actual.
    pub actual_to_formal: Vec<usize>,
    /// Actual index bound to each formal; `None` means the default is used.
    pub formal_to_actual: Vec<Option<usize>>,
    /// Some actual relies on an implicit numeric promotion.
    pub needs_coercion: bool,
}

impl Binding {
    pub fn uses_defaults(&self) -> bool {
        self.formal_to_actual.iter().any(Option::is_none)
    }

    /// Actuals appear in the same order as the formals they bind.
    pub fn is_in_declaration_order(&self) -> bool {
        self.actual_to_formal.iter().enumerate().all(|(i, &f)| i == f)
    }

    /// Identity binding of `n` actuals to `n` formals.
    pub fn positional(n: usize) -> Self {
        Binding {
            actual_to_formal: (0..n).collect(),
            formal_to_actual: (0..n).map(Some).collect(),
            needs_coercion: false,
        }
    }
}

/// The resolver's compatibility rule between an actual and a formal.
pub fn actual_formal_compatible(program: &Program, actual: &Actual, formal: SymbolId) -> bool {
    let formal_ty = program.symbol(formal).ty;
    let is_type_param = program.formal(formal).is_some_and(|f| f.is_type_param);
    if is_type_param && actual.denoted.is_some() {
        return true;
    }
    if program.types.is_subtype(actual.ty, formal_ty) {
        return true;
    }
    formal_ty == TypeLattice::UNKNOWN
}

/// Bind `actuals` to the formals of `function` using the resolver's
/// compatibility rule.
pub fn bind(program: &Program, actuals: &[Actual], function: SymbolId) -> Option<Binding> {
    let result = bind_with(program, actuals, function, |i, formal| {
        Ok(actual_formal_compatible(program, &actuals[i], formal))
    });
    result.ok().flatten()
}

/// Bind with a caller-supplied compatibility test, called with the actual's
/// index and the formal symbol.
pub fn bind_with<F>(
    program: &Program,
    actuals: &[Actual],
    function: SymbolId,
    mut compatible: F,
) -> Result<Option<Binding>, InternalError>
where
    F: FnMut(usize, SymbolId) -> Result<bool, InternalError>,
{
    let formals = program.formals(function);
    let mut actual_to_formal: Vec<Option<usize>> = vec![None; actuals.len()];
    let mut formal_to_actual: Vec<Option<usize>> = vec![None; formals.len()];

    // Named phase.
    for (i, actual) in actuals.iter().enumerate() {
        let Some(name) = &actual.name else {
            continue;
        };
        let Some(j) = formals.iter().position(|&f| program.name(f) == name.as_str()) else {
            return Ok(None);
        };
        if formal_to_actual[j].is_some() || !compatible(i, formals[j])? {
            return Ok(None);
        }
        actual_to_formal[i] = Some(j);
        formal_to_actual[j] = Some(i);
    }

    // Positional phase.
    for (i, actual) in actuals.iter().enumerate() {
        if actual.name.is_some() {
            continue;
        }
        let mut bound = false;
        for (j, &formal) in formals.iter().enumerate() {
            if formal_to_actual[j].is_some() {
                continue;
            }
            if compatible(i, formal)? {
                actual_to_formal[i] = Some(j);
                formal_to_actual[j] = Some(i);
                bound = true;
                break;
            }
            if !has_default(program, formal) {
                break;
            }
        }
        if !bound {
            return Ok(None);
        }
    }

    // Completeness.
    for (j, &formal) in formals.iter().enumerate() {
        if formal_to_actual[j].is_none() && !has_default(program, formal) {
            return Ok(None);
        }
    }

    let actual_to_formal: Vec<usize> = actual_to_formal.into_iter().flatten().collect();
    let needs_coercion = actual_to_formal
        .iter()
        .zip(actuals)
        .any(|(&j, actual)| program.types.is_promotion(actual.ty, program.symbol(formals[j]).ty));
    Ok(Some(Binding { actual_to_formal, formal_to_actual, needs_coercion }))
}

fn has_default(program: &Program, formal: SymbolId) -> bool {
    program.formal(formal).is_some_and(|f| f.default.is_some())
}

// ── Ranking ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Candidate {
    pub function: SymbolId,
    pub binding: Binding,
}

/// Eliminate dominated candidates and return the indices of the survivors.
///
/// Candidates are compared pairwise in order. `j` is better than `i` if
/// `i` needs defaults and `j` does not, or if some actual binds to a
/// strictly more specific formal in `j`; it is worse in the mirrored cases.
/// A candidate that is better without also being worse eliminates the
/// other. An `i` eliminated partway through its row still finishes it.
pub fn rank(program: &Program, candidates: &[Candidate], actual_count: usize) -> Vec<usize> {
    let mut alive = vec![true; candidates.len()];
    if candidates.len() > 1 {
        for i in 0..candidates.len() {
            if !alive[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if !alive[j] {
                    continue;
                }
                let (j_better, j_worse) = compare(program, &candidates[i], &candidates[j], actual_count);
                if j_worse && !j_better {
                    trace!(loser = program.name(candidates[j].function), "dominated candidate");
                    alive[j] = false;
                }
                if j_better && !j_worse {
                    trace!(loser = program.name(candidates[i].function), "dominated candidate");
                    alive[i] = false;
                }
            }
        }
    }
    alive
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect()
}

fn compare(program: &Program, i: &Candidate, j: &Candidate, actual_count: usize) -> (bool, bool) {
    let mut j_better = false;
    let mut j_worse = false;

    let i_defaults = program.formals(i.function).len() > actual_count;
    let j_defaults = program.formals(j.function).len() > actual_count;
    if i_defaults && !j_defaults {
        j_better = true;
    }
    if !i_defaults && j_defaults {
        j_worse = true;
    }

    let i_formals = program.formals(i.function);
    let j_formals = program.formals(j.function);
    for k in 0..actual_count {
        let i_ty = program.symbol(i_formals[i.binding.actual_to_formal[k]]).ty;
        let j_ty = program.symbol(j_formals[j.binding.actual_to_formal[k]]).ty;
        if program.types.is_strict_subtype(j_ty, i_ty) {
            j_better = true;
        }
        if program.types.is_strict_subtype(i_ty, j_ty) {
            j_worse = true;
        }
    }
    (j_better, j_worse)
}

/// Human-readable signature, e.g. `f(x: Integer, y: Float = ..)`.
pub fn signature(program: &Program, function: SymbolId) -> String {
    let formals: Vec<String> = program
        .formals(function)
        .iter()
        .map(|&f| {
            let sym = program.symbol(f);
            let formal = program.formal(f);
            let mut s = if formal.is_some_and(|p| p.is_type_param) {
                format!("type {}", sym.name)
            } else {
                format!("{}: {}", sym.name, program.types.name(sym.ty))
            };
            if formal.is_some_and(|p| p.default.is_some()) {
                s.push_str(" = ..");
            }
            s
        })
        .collect();
    format!("{}({})", program.name(function), formals.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FormalDecl;

    fn function(p: &mut Program, name: &str, formals: &[(&str, FormalDecl)]) -> SymbolId {
        let f = p.add_function(p.root(), name);
        for (n, decl) in formals {
            p.add_formal(f, n, decl.clone());
        }
        f
    }

    fn positional(p: &mut Program, tys: &[TypeId]) -> Vec<Actual> {
        tys.iter()
            .enumerate()
            .map(|(i, &ty)| {
                let expr = p.literal(i.to_string(), ty);
                Actual { name: None, expr, ty, denoted: None }
            })
            .collect()
    }

    #[test]
    fn positional_binding_is_identity() {
        let mut p = Program::new();
        let f = function(
            &mut p,
            "f",
            &[("a", FormalDecl::typed(TypeLattice::INTEGER)), ("b", FormalDecl::typed(TypeLattice::STRING))],
        );
        let actuals = positional(&mut p, &[TypeLattice::INTEGER, TypeLattice::STRING]);
        let binding = bind(&p, &actuals, f).expect("binds");
        assert_eq!(binding, Binding::positional(2));
        assert!(!binding.uses_defaults());
    }

    #[test]
    fn named_actuals_bind_by_name() {
        let mut p = Program::new();
        let f = function(
            &mut p,
            "f",
            &[("x", FormalDecl::typed(TypeLattice::INTEGER)), ("y", FormalDecl::typed(TypeLattice::INTEGER))],
        );
        let mut actuals = positional(&mut p, &[TypeLattice::INTEGER, TypeLattice::INTEGER]);
        actuals[0].name = Some("y".into());
        actuals[1].name = Some("x".into());
        let binding = bind(&p, &actuals, f).expect("binds");
        assert_eq!(binding.actual_to_formal, vec![1, 0]);
        assert!(!binding.is_in_declaration_order());

        actuals[1].name = Some("z".into());
        assert!(bind(&p, &actuals, f).is_none());
        actuals[1].name = Some("y".into());
        assert!(bind(&p, &actuals, f).is_none(), "formal bound twice");
    }

    #[test]
    fn defaults_may_stay_unbound() {
        let mut p = Program::new();
        let zero = p.literal("0", TypeLattice::INTEGER);
        let f = function(
            &mut p,
            "f",
            &[
                ("x", FormalDecl::typed(TypeLattice::INTEGER)),
                ("y", FormalDecl::typed_default(TypeLattice::INTEGER, zero)),
            ],
        );
        let actuals = positional(&mut p, &[TypeLattice::INTEGER]);
        let binding = bind(&p, &actuals, f).expect("binds");
        assert_eq!(binding.formal_to_actual, vec![Some(0), None]);
        assert!(binding.uses_defaults());

        let none = positional(&mut p, &[]);
        assert!(bind(&p, &none, f).is_none(), "x is required");
    }

    #[test]
    fn incompatible_defaulted_formal_is_skipped() {
        let mut p = Program::new();
        let empty = p.literal("\"\"", TypeLattice::STRING);
        let f = function(
            &mut p,
            "f",
            &[
                ("s", FormalDecl::typed_default(TypeLattice::STRING, empty)),
                ("n", FormalDecl::typed(TypeLattice::INTEGER)),
            ],
        );
        let actuals = positional(&mut p, &[TypeLattice::INTEGER]);
        let binding = bind(&p, &actuals, f).expect("binds");
        assert_eq!(binding.actual_to_formal, vec![1]);
    }

    #[test]
    fn too_many_actuals_fail() {
        let mut p = Program::new();
        let f = function(&mut p, "f", &[("x", FormalDecl::typed(TypeLattice::INTEGER))]);
        let actuals = positional(&mut p, &[TypeLattice::INTEGER, TypeLattice::INTEGER]);
        assert!(bind(&p, &actuals, f).is_none());
    }

    #[test]
    fn promotion_marks_coercion() {
        let mut p = Program::new();
        let f = function(&mut p, "f", &[("x", FormalDecl::typed(TypeLattice::FLOAT))]);
        let actuals = positional(&mut p, &[TypeLattice::INTEGER]);
        assert!(bind(&p, &actuals, f).expect("binds").needs_coercion);
    }

    #[test]
    fn unknown_and_type_param_formals_accept_anything_fitting() {
        let mut p = Program::new();
        let t = function(&mut p, "g", &[("T", FormalDecl::type_param())]);
        let ty_ref = p.type_ref(TypeLattice::STRING).unwrap();
        let actual = Actual { name: None, expr: ty_ref, ty: TypeLattice::STRING, denoted: Some(TypeLattice::STRING) };
        assert!(bind(&p, &[actual], t).is_some());

        let u = function(&mut p, "h", &[("x", FormalDecl::untyped())]);
        let actuals = positional(&mut p, &[TypeLattice::BOOLEAN]);
        assert!(bind(&p, &actuals, u).is_some());
    }

    #[test]
    fn more_specific_candidate_wins() {
        let mut p = Program::new();
        let fi = function(&mut p, "f", &[("x", FormalDecl::typed(TypeLattice::INTEGER))]);
        let ff = function(&mut p, "f", &[("x", FormalDecl::typed(TypeLattice::FLOAT))]);
        let actuals = positional(&mut p, &[TypeLattice::INTEGER]);
        let candidates: Vec<Candidate> = [ff, fi]
            .iter()
            .map(|&function| Candidate { function, binding: bind(&p, &actuals, function).unwrap() })
            .collect();
        let survivors = rank(&p, &candidates, 1);
        assert_eq!(survivors, vec![1]);
        assert_eq!(candidates[survivors[0]].function, fi);
    }

    #[test]
    fn candidate_without_defaults_wins() {
        let mut p = Program::new();
        let zero = p.literal("0", TypeLattice::INTEGER);
        let plain = function(&mut p, "f", &[("x", FormalDecl::typed(TypeLattice::INTEGER))]);
        let with_default = function(
            &mut p,
            "f",
            &[
                ("x", FormalDecl::typed(TypeLattice::INTEGER)),
                ("y", FormalDecl::typed_default(TypeLattice::INTEGER, zero)),
            ],
        );
        let actuals = positional(&mut p, &[TypeLattice::INTEGER]);
        let candidates: Vec<Candidate> = [with_default, plain]
            .iter()
            .map(|&function| Candidate { function, binding: bind(&p, &actuals, function).unwrap() })
            .collect();
        assert_eq!(rank(&p, &candidates, 1), vec![1]);
    }

    #[test]
    fn crossing_specificity_is_ambiguous() {
        let mut p = Program::new();
        let a = function(
            &mut p,
            "f",
            &[("x", FormalDecl::typed(TypeLattice::INTEGER)), ("y", FormalDecl::typed(TypeLattice::FLOAT))],
        );
        let b = function(
            &mut p,
            "f",
            &[("x", FormalDecl::typed(TypeLattice::FLOAT)), ("y", FormalDecl::typed(TypeLattice::INTEGER))],
        );
        let actuals = positional(&mut p, &[TypeLattice::INTEGER, TypeLattice::INTEGER]);
        let candidates: Vec<Candidate> = [a, b]
            .iter()
            .map(|&function| Candidate { function, binding: bind(&p, &actuals, function).unwrap() })
            .collect();
        assert_eq!(rank(&p, &candidates, 2), vec![0, 1]);
    }

    #[test]
    fn signatures_render_formals() {
        let mut p = Program::new();
        let zero = p.literal("0", TypeLattice::INTEGER);
        let f = function(
            &mut p,
            "f",
            &[
                ("x", FormalDecl::typed(TypeLattice::INTEGER)),
                ("y", FormalDecl::typed_default(TypeLattice::FLOAT, zero)),
                ("T", FormalDecl::type_param()),
            ],
        );
        assert_eq!(signature(&p, f), "f(x: Integer, y: Float = .., type T)");
    }
}
