//! Fixed-point call resolution.
//!
//! Starting from the entry function, every call reached is resolved to one
//! concrete function, and that function's body is traversed in turn unless
//! it was traversed before or still has formals awaiting instantiation.
//! Functions never reached are detached from the tree afterwards.

use tracing::{debug, trace};

use crate::ast::{Expr, ExprId, Primitive, Program, SymbolId, SymbolKind};
use crate::candidates::{actuals_of, bind, rank, signature, Actual, Candidate};
use crate::config::ResolveConfig;
use crate::context::ResolveCtx;
use crate::error::{InternalError, ResolveError};
use crate::lattice::{TypeId, TypeLattice};
use crate::report::{FunctionEntry, ResolutionReport};
use crate::verify;
use crate::wrappers::{default_wrapper, instantiate, needs_instantiation, order_wrapper};

/// Resolve every call reachable from the configured entry point.
///
/// Runs early verification first when enabled. On success every retained
/// call's base is a reference to a resolved function, every retained
/// function has a return type, and unreachable functions are detached.
pub fn resolve_program(program: &mut Program, config: &ResolveConfig) -> Result<ResolutionReport, ResolveError> {
    let mut ctx = ResolveCtx::new(program, config);

    if config.early_verification {
        verify::verify_with(&mut ctx, program)?;
    }

    let entry = program
        .find_function(&config.entry_point)
        .ok_or_else(|| ResolveError::MissingEntryPoint { name: config.entry_point.clone() })?;
    debug!(entry = %config.entry_point, "resolving program");

    ctx.mark_resolved(entry);
    traverse_function(&mut ctx, program, entry)?;
    settle_return_types(&ctx, program)?;

    let mut report = ResolutionReport {
        entry: config.entry_point.clone(),
        coerced_calls: std::mem::take(&mut ctx.coerced_calls),
        ..Default::default()
    };
    if config.eliminate_dead_code {
        eliminate_dead_code(&ctx, program, &mut report);
    }
    report.resolved = ctx.resolution_order().iter().map(|&f| FunctionEntry::new(program, f)).collect();
    report.synthesized = ctx.wrappers.synthesized().iter().map(|&f| FunctionEntry::new(program, f)).collect();
    Ok(report)
}

/// Resolve `f`'s body unless it is already resolved or not yet fully typed.
/// Calls never reach a function in the second state; `resolve_call` reports
/// them as unresolved first.
pub fn resolve_function(ctx: &mut ResolveCtx, program: &mut Program, f: SymbolId) -> Result<(), ResolveError> {
    if ctx.is_resolved(f) {
        return Ok(());
    }
    if needs_instantiation(program, f) {
        trace!(function = program.name(f), "deferred until instantiated");
        return Ok(());
    }
    ctx.mark_resolved(f);
    traverse_function(ctx, program, f)
}

fn traverse_function(ctx: &mut ResolveCtx, program: &mut Program, f: SymbolId) -> Result<(), ResolveError> {
    if let Some(body) = program.function_body(f) {
        resolve_expr(ctx, program, body)?;
    }
    resolve_return_type(program, f)
}

/// Post-order walk. Nested function definitions are not entered; they are
/// resolved when a call reaches them.
fn resolve_expr(ctx: &mut ResolveCtx, program: &mut Program, e: ExprId) -> Result<(), ResolveError> {
    for child in program.children(e) {
        resolve_expr(ctx, program, child)?;
    }
    if program.as_call(e).is_some() {
        return resolve_call(ctx, program, e);
    }
    if let Expr::Def { sym, init: Some(init), .. } = program.kind(e) {
        let (sym, init) = (*sym, *init);
        let symbol = program.symbol(sym);
        if matches!(symbol.kind, SymbolKind::Variable) && symbol.ty == TypeLattice::UNKNOWN {
            let ty = program.type_of(init);
            program.set_symbol_type(sym, ty);
        }
    }
    Ok(())
}

enum Callee {
    Bound(SymbolId),
    Named(String),
}

fn resolve_call(ctx: &mut ResolveCtx, program: &mut Program, call: ExprId) -> Result<(), ResolveError> {
    let Some(c) = program.as_call(call).cloned() else {
        return Ok(());
    };
    if c.primitive.is_some() {
        return Ok(());
    }
    let span = program.expr(call).span;

    let callee = match program.kind(c.base) {
        Expr::SymRef(s) if program.is_function(*s) => Callee::Bound(*s),
        Expr::SymRef(s) => Callee::Named(program.name(*s).to_string()),
        Expr::Unresolved(name) => Callee::Named(name.clone()),
        _ => {
            return Err(InternalError::Unimplemented { what: "call through a computed base".to_string(), span }.into());
        }
    };
    let actuals = actuals_of(program, call);
    let name = match callee {
        Callee::Bound(f) if needs_instantiation(program, f) => {
            return Err(unresolved(program, program.name(f), &actuals, span));
        }
        Callee::Bound(f) => return resolve_function(ctx, program, f),
        Callee::Named(name) => name,
    };

    let visible = match c.qualifier {
        Some(module) => match program.module_block(module) {
            Some(block) => ctx.index.declared_in(program, block, &name),
            None => Vec::new(),
        },
        None => match program.visibility_block(call) {
            Some(scope) => ctx.index.find_visible(program, scope, &name),
            None => Vec::new(),
        },
    };

    let candidates: Vec<Candidate> = visible
        .into_iter()
        .filter(|&f| program.function(f).is_some_and(|func| !func.is_synthesized()))
        .filter_map(|f| bind(program, &actuals, f).map(|binding| Candidate { function: f, binding }))
        .collect();
    trace!(call = %name, viable = candidates.len(), "bound candidates");

    let survivors = rank(program, &candidates, actuals.len());
    let chosen = match survivors.as_slice() {
        [] => return Err(unresolved(program, &name, &actuals, span)),
        [only] => candidates[*only].clone(),
        many => {
            return Err(ResolveError::AmbiguousCall {
                name,
                arg_types: type_names(program, &actuals),
                candidates: many.iter().map(|&i| signature(program, candidates[i].function)).collect(),
                span,
            });
        }
    };

    let mut best = chosen.function;
    let mut binding = chosen.binding;
    if binding.needs_coercion {
        debug!(call = %name, "actual needs implicit numeric coercion");
        ctx.coerced_calls.push(signature(program, best));
    }
    if let Some(instance) = instantiate(program, &mut ctx.wrappers, best, &binding, &actuals) {
        best = instance;
    }
    if binding.uses_defaults() {
        (best, binding) = default_wrapper(program, &mut ctx.wrappers, best, &binding);
    }
    if !binding.is_in_declaration_order() {
        (best, binding) = order_wrapper(program, &mut ctx.wrappers, best, &binding);
    }
    debug_assert!(binding.is_in_declaration_order());

    // An actual of unknown or generic type left a formal open.
    if needs_instantiation(program, best) {
        debug!(call = %name, target = %signature(program, best), "callee still needs instantiation");
        return Err(unresolved(program, &name, &actuals, span));
    }
    program.set_call_base(call, best);
    program.strip_named_args(call);
    debug!(call = %name, target = %signature(program, best), "resolved call");
    resolve_function(ctx, program, best)
}

fn type_names(program: &Program, actuals: &[Actual]) -> Vec<String> {
    actuals.iter().map(|a| program.types.name(a.ty).to_string()).collect()
}

fn unresolved(program: &Program, name: &str, actuals: &[Actual], span: braid_common::Span) -> ResolveError {
    ResolveError::UnresolvedCall { name: name.to_string(), arg_types: type_names(program, actuals), span }
}

// ── Return types ───────────────────────────────────────────────────────

/// Set `f`'s return type from its annotation, or from the `return`
/// statements of its body. Returns of still-unknown type (recursive calls)
/// are ignored; no returns at all means `Void`. When every return is still
/// unknown the return type stays `Unknown` for [`settle_return_types`].
pub fn resolve_return_type(program: &mut Program, f: SymbolId) -> Result<(), ResolveError> {
    let Some(func) = program.function(f) else {
        return Ok(());
    };
    if func.ret_type != TypeLattice::UNKNOWN {
        return Ok(());
    }

    let ty = match func.ret_type_expr {
        Some(te) => program.annotation_type(te),
        None => {
            let mut returns = Vec::new();
            collect_returns(program, func.body, &mut returns);
            if returns.is_empty() {
                TypeLattice::VOID
            } else {
                let mut found: Option<TypeId> = None;
                for ret in returns {
                    let Some(value) = program.as_call(ret).and_then(|c| c.args.first().copied()) else {
                        continue;
                    };
                    let ty = program.type_of(value);
                    if ty == TypeLattice::UNKNOWN {
                        continue;
                    }
                    match found {
                        None => found = Some(ty),
                        Some(prev) if prev != ty => {
                            return Err(ResolveError::ReturnTypeConflict {
                                function: program.name(f).to_string(),
                                first: program.types.name(prev).to_string(),
                                second: program.types.name(ty).to_string(),
                                span: program.expr(ret).span,
                            });
                        }
                        Some(_) => {}
                    }
                }
                match found {
                    Some(ty) => ty,
                    None => {
                        trace!(function = program.name(f), "return type pending");
                        return Ok(());
                    }
                }
            }
        }
    };

    if let Some(func) = program.function_mut(f) {
        func.ret_type = ty;
    }
    trace!(function = program.name(f), ret = program.types.name(ty), "return type");
    Ok(())
}

/// Retry resolved functions whose returns were all unknown when their body
/// was traversed, until none makes progress. What is left (recursion with
/// no typed return anywhere) returns `Void`.
fn settle_return_types(ctx: &ResolveCtx, program: &mut Program) -> Result<(), ResolveError> {
    let is_pending = |program: &Program, f: SymbolId| {
        program.function(f).is_some_and(|func| func.ret_type == TypeLattice::UNKNOWN)
    };
    let mut pending: Vec<SymbolId> =
        ctx.resolution_order().iter().copied().filter(|&f| is_pending(program, f)).collect();
    while !pending.is_empty() {
        let before = pending.len();
        for &f in &pending {
            resolve_return_type(program, f)?;
        }
        pending.retain(|&f| is_pending(program, f));
        if pending.len() == before {
            break;
        }
    }
    for f in pending {
        if let Some(func) = program.function_mut(f) {
            func.ret_type = TypeLattice::VOID;
        }
        debug!(function = program.name(f), "no typed return, defaulting to Void");
    }
    Ok(())
}

fn collect_returns(program: &Program, e: ExprId, out: &mut Vec<ExprId>) {
    if program.as_call(e).is_some_and(|c| c.primitive == Some(Primitive::Return)) {
        out.push(e);
    }
    for child in program.children(e) {
        collect_returns(program, child, out);
    }
}

// ── Dead-code elimination ──────────────────────────────────────────────

fn eliminate_dead_code(ctx: &ResolveCtx, program: &mut Program, report: &mut ResolutionReport) {
    for f in program.functions().to_vec() {
        if ctx.is_resolved(f) {
            continue;
        }
        let Some(def) = program.symbol(f).def_point else {
            continue;
        };
        if !program.is_attached(def) {
            continue;
        }

        let ret = program.function(f).map_or(TypeLattice::UNKNOWN, |func| {
            if func.ret_type != TypeLattice::UNKNOWN {
                func.ret_type
            } else {
                func.ret_type_expr.map_or(TypeLattice::UNKNOWN, |te| program.annotation_type(te))
            }
        });
        if program.types.get(ret).default_constructor == Some(f) {
            let type_def = program.type_symbol(ret).and_then(|s| program.symbol(s).def_point);
            if let Some(type_def) = type_def.filter(|&d| program.is_attached(d)) {
                program.detach(type_def);
                report.removed_types.push(program.types.name(ret).to_string());
                debug!(ty = program.types.name(ret), "removed type with dead constructor");
            }
        }

        program.detach(def);
        report.removed_functions.push(program.name(f).to_string());
        debug!(function = program.name(f), "removed unreachable function");
    }
}
