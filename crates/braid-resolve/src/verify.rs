//! Early verification of annotated signatures.
//!
//! Functions marked for early verification are checked before resolution:
//! every formal and the return type must be annotated, the where clause is
//! loaded into the congruence closure, and the body is walked comparing
//! the type term of each returned value and each call actual against the
//! annotations. Equality is congruence-closure equality, so a where clause
//! `T == Integer` makes a formal of type `T` accept an `Integer` actual.

use tracing::debug;

use crate::ast::{Call, Expr, ExprId, Primitive, Program, SymbolId, SymbolKind};
use crate::builtins::{self, ReturnRule};
use crate::candidates::{actuals_of, bind_with};
use crate::config::ResolveConfig;
use crate::congruence::Term;
use crate::context::{ResolveCtx, VerifyState};
use crate::error::{InternalError, ResolveError};
use crate::lattice::TypeLattice;

/// Name of the where-clause equality constraint.
pub const EQUALITY: &str = "==";
/// Name of the where-clause conjunction; each argument is a constraint.
pub const CONJUNCTION: &str = "_tuple";

/// Verify every function marked for early verification.
pub fn verify_program(program: &Program, config: &ResolveConfig) -> Result<(), ResolveError> {
    let mut ctx = ResolveCtx::new(program, config);
    verify_with(&mut ctx, program)
}

pub(crate) fn verify_with(ctx: &mut ResolveCtx, program: &Program) -> Result<(), ResolveError> {
    let flagged: Vec<SymbolId> = program
        .functions()
        .iter()
        .copied()
        .filter(|&f| program.function(f).is_some_and(|func| func.early_verify))
        .collect();
    for f in flagged {
        check_fn(ctx, program, f)?;
    }
    Ok(())
}

/// The function whose body is being checked.
struct Scope {
    function: SymbolId,
    ret: Term,
}

/// Check `f` once and return its declared return type term. A function
/// reached again while its own check is in progress is assumed correct.
fn check_fn(ctx: &mut ResolveCtx, program: &Program, f: SymbolId) -> Result<Term, ResolveError> {
    let Some(func) = program.function(f) else {
        return Err(InternalError::Unimplemented {
            what: format!("verification of non-function `{}`", program.name(f)),
            span: program.symbol(f).span,
        }
        .into());
    };

    for &formal in &func.formals {
        let annotated = program.formal(formal).is_some_and(|p| p.type_expr.is_some() || p.is_type_param);
        if !annotated {
            return Err(InternalError::MissingFormalAnnotation {
                function: program.name(f).to_string(),
                formal: program.name(formal).to_string(),
                span: program.symbol(formal).span,
            }
            .into());
        }
    }
    let Some(ret_type_expr) = func.ret_type_expr else {
        return Err(InternalError::MissingReturnAnnotation {
            function: program.name(f).to_string(),
            span: program.symbol(f).span,
        }
        .into());
    };
    let ret = Term::Expr(ret_type_expr);

    if ctx.verified.contains_key(&f) {
        return Ok(ret);
    }
    ctx.verified.insert(f, VerifyState::InProgress);

    if let Some(clause) = func.where_clause {
        let constraints = program.block(clause).map(|b| b.stmts.clone()).unwrap_or_default();
        for constraint in constraints {
            load_constraint(ctx, program, constraint)?;
        }
    }

    let scope = Scope { function: f, ret };
    check_expr(ctx, program, func.body, &scope)?;

    ctx.verified.insert(f, VerifyState::Done);
    debug!(function = program.name(f), "verified");
    Ok(ret)
}

fn load_constraint(ctx: &mut ResolveCtx, program: &Program, e: ExprId) -> Result<(), ResolveError> {
    let span = program.expr(e).span;
    let unsupported = |what: String| ResolveError::from(InternalError::UnsupportedWhereClause { what, span });
    let Some(call) = program.as_call(e) else {
        return Err(unsupported("non-call constraint".to_string()));
    };
    let name = match program.kind(call.base) {
        Expr::Unresolved(name) => name.as_str(),
        Expr::SymRef(s) => program.name(*s),
        _ => return Err(unsupported("computed constraint".to_string())),
    };
    match name {
        EQUALITY if call.args.len() == 2 => {
            ctx.cc.equate(program, Term::Expr(call.args[0]), Term::Expr(call.args[1]))?;
            Ok(())
        }
        CONJUNCTION => {
            for &arg in &call.args {
                load_constraint(ctx, program, arg)?;
            }
            Ok(())
        }
        other => Err(unsupported(other.to_string())),
    }
}

/// The type term of `e`, or `None` if it has none.
fn check_expr(ctx: &mut ResolveCtx, program: &Program, e: ExprId, scope: &Scope) -> Result<Option<Term>, ResolveError> {
    let span = program.expr(e).span;
    match program.kind(e) {
        Expr::SymRef(s) => symbol_term(ctx, program, *s, scope),
        Expr::Call(call) => check_call(ctx, program, e, call, scope),
        Expr::Unresolved(name) => Err(InternalError::UnresolvedReference { name: name.clone(), span }.into()),
        Expr::Named { actual, .. } => check_expr(ctx, program, *actual, scope),
        Expr::Def { sym, type_expr, init } => {
            if matches!(
                program.symbol(*sym).kind,
                SymbolKind::Function(_) | SymbolKind::Type(_) | SymbolKind::Module { .. }
            ) {
                return Ok(None);
            }
            match (*type_expr, *init) {
                (Some(te), Some(init)) => {
                    let declared = Term::Expr(te);
                    let matches = match check_expr(ctx, program, init, scope)? {
                        Some(init_term) => ctx.cc.is_equal(program, declared, init_term)?,
                        None => false,
                    };
                    if !matches {
                        return Err(ResolveError::DeclarationMismatch { name: program.name(*sym).to_string(), span });
                    }
                    Ok(Some(declared))
                }
                (Some(te), None) => Ok(Some(Term::Expr(te))),
                (None, Some(init)) => check_expr(ctx, program, init, scope),
                (None, None) => {
                    Err(InternalError::EmptyDefinition { name: program.name(*sym).to_string(), span }.into())
                }
            }
        }
        Expr::Block(block) => {
            let mut last = None;
            for &stmt in &block.stmts {
                last = check_expr(ctx, program, stmt, scope)?;
            }
            Ok(last)
        }
        Expr::Cond { cond, then_branch, else_branch } => {
            check_expr(ctx, program, *cond, scope)?;
            let term = check_expr(ctx, program, *then_branch, scope)?;
            if let Some(else_branch) = else_branch {
                check_expr(ctx, program, *else_branch, scope)?;
            }
            Ok(term)
        }
        Expr::Goto { label } => {
            check_expr(ctx, program, *label, scope)?;
            Ok(None)
        }
    }
}

fn symbol_term(ctx: &mut ResolveCtx, program: &Program, s: SymbolId, scope: &Scope) -> Result<Option<Term>, ResolveError> {
    let sym = program.symbol(s);
    if sym.ty != TypeLattice::UNKNOWN {
        return Ok(Some(Term::Type(sym.ty)));
    }
    if let SymbolKind::Argument(formal) = &sym.kind {
        if let Some(te) = formal.type_expr {
            return Ok(Some(ctx.cc.representative_term(program, Term::Expr(te))?));
        }
    }
    match sym.def_point {
        Some(def) => check_expr(ctx, program, def, scope),
        None => Ok(None),
    }
}

fn check_call(
    ctx: &mut ResolveCtx,
    program: &Program,
    e: ExprId,
    call: &Call,
    scope: &Scope,
) -> Result<Option<Term>, ResolveError> {
    let span = program.expr(e).span;
    match &call.primitive {
        Some(Primitive::Return) => {
            let value = match call.args.first() {
                Some(&arg) => check_expr(ctx, program, arg, scope)?,
                None => Some(Term::Type(TypeLattice::VOID)),
            };
            let matches = match value {
                Some(term) => ctx.cc.is_equal(program, term, scope.ret)?,
                None => false,
            };
            if !matches {
                return Err(ResolveError::ReturnMismatch { function: program.name(scope.function).to_string(), span });
            }
            return Ok(value);
        }
        Some(Primitive::Op(op)) => return primitive_term(ctx, program, op, &call.args, span, scope),
        None => {}
    }

    let name = match program.kind(call.base) {
        Expr::Unresolved(name) => {
            if builtins::return_rule(name).is_some() {
                return primitive_term(ctx, program, name, &call.args, span, scope);
            }
            name.clone()
        }
        Expr::SymRef(s) => program.name(*s).to_string(),
        _ => {
            return Err(InternalError::Unimplemented { what: "call through a computed base".to_string(), span }.into());
        }
    };

    let actuals = actuals_of(program, e);
    let mut terms = Vec::with_capacity(actuals.len());
    for actual in &actuals {
        terms.push(check_expr(ctx, program, actual.expr, scope)?);
    }

    let candidates = match (program.kind(call.base), call.qualifier) {
        (Expr::SymRef(s), _) if program.is_function(*s) => vec![*s],
        (_, Some(module)) => match program.module_block(module) {
            Some(block) => ctx.index.declared_in(program, block, &name),
            None => Vec::new(),
        },
        (_, None) => match program.visibility_block(e) {
            Some(block) => ctx.index.find_visible(program, block, &name),
            None => Vec::new(),
        },
    };

    for f in candidates {
        let cc = &mut ctx.cc;
        let binding = bind_with(program, &actuals, f, |i, formal| {
            let Some(actual_term) = terms[i] else {
                return Ok(false);
            };
            match program.formal(formal) {
                Some(p) if p.is_type_param => Ok(actuals[i].denoted.is_some()),
                Some(p) => match p.type_expr {
                    Some(te) => cc.is_equal(program, actual_term, Term::Expr(te)),
                    None => Ok(false),
                },
                None => Ok(false),
            }
        })?;
        if binding.is_some() {
            return Ok(Some(check_fn(ctx, program, f)?));
        }
    }
    Err(ResolveError::SignatureMismatch { name, span })
}

fn primitive_term(
    ctx: &mut ResolveCtx,
    program: &Program,
    op: &str,
    args: &[ExprId],
    span: braid_common::Span,
    scope: &Scope,
) -> Result<Option<Term>, ResolveError> {
    let Some(rule) = builtins::return_rule(op) else {
        return Err(InternalError::Unimplemented { what: format!("primitive `{op}`"), span }.into());
    };
    let mut first = None;
    for (i, &arg) in args.iter().enumerate() {
        let term = check_expr(ctx, program, arg, scope)?;
        if i == 0 {
            first = term;
        }
    }
    Ok(match rule {
        ReturnRule::SameAsFirst => first,
        ReturnRule::Boolean => Some(Term::Type(TypeLattice::BOOLEAN)),
        ReturnRule::Fixed(ty) => Some(Term::Type(ty)),
        ReturnRule::Void => Some(Term::Type(TypeLattice::VOID)),
    })
}
