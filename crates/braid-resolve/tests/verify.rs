//! Early verification against annotated signatures and where clauses.

use braid_resolve::verify::{CONJUNCTION, EQUALITY};
use braid_resolve::{
    verify_program, ExprId, FormalDecl, InternalError, Program, ResolveConfig, ResolveError, SymbolId, TypeId,
    TypeLattice,
};

// ── Helpers ────────────────────────────────────────────────────────────

/// Declare a function marked for early verification with an annotated
/// return type.
fn verified_fn(p: &mut Program, name: &str, ret: TypeId) -> SymbolId {
    let f = p.add_function(p.root(), name);
    p.set_return_type(f, ret);
    p.mark_early_verify(f);
    f
}

fn returns(p: &mut Program, f: SymbolId, value: ExprId) {
    let ret = p.ret(value);
    p.push_body_stmt(f, ret);
}

fn verify(p: &Program) -> Result<(), ResolveError> {
    verify_program(p, &ResolveConfig::default())
}

/// `fn f(type t, x: t) -> Integer { return x }`, optionally constrained
/// by `where t == Integer`.
fn generic_identity(p: &mut Program, constrained: bool) -> SymbolId {
    let f = verified_fn(p, "f", TypeLattice::INTEGER);
    let t = p.add_formal(f, "t", FormalDecl::type_param());
    let t_ref = p.sym_ref(t);
    let x = p.add_formal(f, "x", FormalDecl::annotated(t_ref));
    let x_ref = p.sym_ref(x);
    returns(p, f, x_ref);
    if constrained {
        let lhs = p.sym_ref(t);
        let rhs = p.type_ref(TypeLattice::INTEGER).unwrap();
        let eq = p.call_named(EQUALITY, vec![lhs, rhs]);
        p.set_where_clause(f, vec![eq]);
    }
    f
}

// ── Where clauses ──────────────────────────────────────────────────────

#[test]
fn where_clause_equality_is_honored() {
    let mut p = Program::new();
    generic_identity(&mut p, true);
    verify(&p).unwrap();
}

#[test]
fn unconstrained_type_parameter_does_not_match() {
    let mut p = Program::new();
    generic_identity(&mut p, false);
    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::ReturnMismatch { ref function, .. } if function == "f"));
}

#[test]
fn conjunction_of_constraints() {
    let mut p = Program::new();
    let f = generic_identity(&mut p, false);
    let t = p.formals(f)[0];
    let lhs = p.sym_ref(t);
    let rhs = p.type_ref(TypeLattice::INTEGER).unwrap();
    let eq = p.call_named(EQUALITY, vec![lhs, rhs]);
    let both = p.call_named(CONJUNCTION, vec![eq]);
    p.set_where_clause(f, vec![both]);
    verify(&p).unwrap();
}

// ── Calls ──────────────────────────────────────────────────────────────

#[test]
fn calls_are_checked_against_callee_annotations() {
    let mut p = Program::new();
    let g = p.add_function(p.root(), "g");
    p.add_formal(g, "n", FormalDecl::typed(TypeLattice::INTEGER));
    p.set_return_type(g, TypeLattice::STRING);
    let n = p.sym_ref(p.formals(g)[0]);
    let text = p.primitive("to_string", vec![n]);
    returns(&mut p, g, text);

    let f = verified_fn(&mut p, "f", TypeLattice::STRING);
    let x = p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
    let x_ref = p.sym_ref(x);
    let call = p.call_named("g", vec![x_ref]);
    returns(&mut p, f, call);

    verify(&p).unwrap();
}

#[test]
fn call_with_wrong_actual_type_is_a_signature_mismatch() {
    let mut p = Program::new();
    let g = p.add_function(p.root(), "g");
    p.add_formal(g, "n", FormalDecl::typed(TypeLattice::INTEGER));
    p.set_return_type(g, TypeLattice::INTEGER);

    let f = verified_fn(&mut p, "f", TypeLattice::INTEGER);
    let s = p.add_formal(f, "s", FormalDecl::typed(TypeLattice::STRING));
    let s_ref = p.sym_ref(s);
    let call = p.call_named("g", vec![s_ref]);
    returns(&mut p, f, call);

    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::SignatureMismatch { ref name, .. } if name == "g"));
}

#[test]
fn callee_without_annotations_is_an_internal_error() {
    let mut p = Program::new();
    let g = p.add_function(p.root(), "g");
    p.add_formal(g, "n", FormalDecl::typed(TypeLattice::INTEGER));

    let f = verified_fn(&mut p, "f", TypeLattice::INTEGER);
    let one = p.literal("1", TypeLattice::INTEGER);
    let call = p.call_named("g", vec![one]);
    returns(&mut p, f, call);

    let err = verify(&p).unwrap_err();
    assert!(err.is_internal());
    assert!(matches!(
        err,
        ResolveError::Internal(InternalError::MissingReturnAnnotation { ref function, .. }) if function == "g"
    ));
}

// ── Primitives and declarations ────────────────────────────────────────

#[test]
fn primitive_return_rules() {
    let mut p = Program::new();
    let f = verified_fn(&mut p, "inc", TypeLattice::INTEGER);
    let x = p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
    let x_ref = p.sym_ref(x);
    let one = p.literal("1", TypeLattice::INTEGER);
    let sum = p.primitive("+", vec![x_ref, one]);
    returns(&mut p, f, sum);
    verify(&p).unwrap();

    let mut p = Program::new();
    let f = verified_fn(&mut p, "less", TypeLattice::INTEGER);
    let x = p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
    let x_ref = p.sym_ref(x);
    let one = p.literal("1", TypeLattice::INTEGER);
    let lt = p.primitive("<", vec![x_ref, one]);
    returns(&mut p, f, lt);
    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::ReturnMismatch { .. }));
}

#[test]
fn declaration_annotation_must_match_initializer() {
    let mut p = Program::new();
    let f = verified_fn(&mut p, "f", TypeLattice::VOID);
    let body = p.function_body(f).unwrap();
    let annotation = p.type_ref(TypeLattice::INTEGER);
    let s = p.literal("\"s\"", TypeLattice::STRING);
    p.add_variable(body, "v", annotation, Some(s));

    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::DeclarationMismatch { ref name, .. } if name == "v"));
}

#[test]
fn declaration_without_type_or_value_is_internal() {
    let mut p = Program::new();
    let f = verified_fn(&mut p, "f", TypeLattice::VOID);
    let body = p.function_body(f).unwrap();
    p.add_variable(body, "v", None, None);

    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::Internal(InternalError::EmptyDefinition { .. })));
}

#[test]
fn unresolved_names_are_internal() {
    let mut p = Program::new();
    let f = verified_fn(&mut p, "f", TypeLattice::INTEGER);
    let ghost = p.unresolved("ghost");
    returns(&mut p, f, ghost);

    let err = verify(&p).unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Internal(InternalError::UnresolvedReference { ref name, .. }) if name == "ghost"
    ));
}

#[test]
fn conditional_branches_are_checked() {
    let mut p = Program::new();
    let f = verified_fn(&mut p, "pick", TypeLattice::INTEGER);
    let x = p.add_formal(f, "x", FormalDecl::typed(TypeLattice::INTEGER));
    let cond = p.literal("true", TypeLattice::BOOLEAN);
    let x_ref = p.sym_ref(x);
    let good = p.ret(x_ref);
    let s = p.literal("\"no\"", TypeLattice::STRING);
    let bad = p.ret(s);
    let branch = p.cond(cond, good, Some(bad));
    p.push_body_stmt(f, branch);

    let err = verify(&p).unwrap_err();
    assert!(matches!(err, ResolveError::ReturnMismatch { ref function, .. } if function == "pick"));
}
