//! Debug views of the AST.

use std::fmt::Write;

use crate::ast::{Expr, ExprId, Primitive, Program, SymbolId, SymbolKind};
use crate::lattice::{TypeId, TypeLattice};

#[derive(Clone, Copy, Debug, Default)]
pub struct ViewOptions {
    /// Prefix each line with the node's identity value.
    pub ids: bool,
}

/// Render the subtree rooted at `e` as an indented outline, one node per
/// line. Function bodies are included.
pub fn print_view(program: &Program, e: ExprId, options: &ViewOptions) -> String {
    let mut out = String::new();
    write_expr(program, e, 0, options, &mut out);
    out
}

fn line(out: &mut String, depth: usize, id: Option<u32>, text: &str) {
    let _ = match id {
        Some(id) => writeln!(out, "{:indent$}#{id} {text}", "", indent = depth * 2),
        None => writeln!(out, "{:indent$}{text}", "", indent = depth * 2),
    };
}

fn type_suffix(program: &Program, ty: TypeId) -> String {
    if ty == TypeLattice::UNKNOWN {
        String::new()
    } else {
        format!(": {}", program.types.name(ty))
    }
}

fn write_expr(program: &Program, e: ExprId, depth: usize, options: &ViewOptions, out: &mut String) {
    let id = options.ids.then(|| program.expr_identity(e));
    match program.kind(e) {
        Expr::Block(block) => {
            let mut text = "block".to_string();
            if !block.uses.is_empty() {
                let uses: Vec<&str> = block.uses.iter().map(|&m| program.name(m)).collect();
                let _ = write!(text, " use {}", uses.join(", "));
            }
            line(out, depth, id, &text);
            for &stmt in &block.stmts {
                write_expr(program, stmt, depth + 1, options, out);
            }
        }
        Expr::Def { sym, init, .. } => write_def(program, *sym, *init, depth, id, options, out),
        Expr::Call(call) => {
            let text = match &call.primitive {
                Some(Primitive::Return) => "return".to_string(),
                Some(Primitive::Op(op)) => format!("prim {op}"),
                None => {
                    let target = match program.kind(call.base) {
                        Expr::SymRef(s) => program.name(*s).to_string(),
                        Expr::Unresolved(name) => format!("?{name}"),
                        _ => "<computed>".to_string(),
                    };
                    match call.qualifier {
                        Some(module) => format!("call {}.{target}", program.name(module)),
                        None => format!("call {target}"),
                    }
                }
            };
            line(out, depth, id, &text);
            for &arg in &call.args {
                write_expr(program, arg, depth + 1, options, out);
            }
        }
        Expr::SymRef(s) => {
            let sym = program.symbol(*s);
            line(out, depth, id, &format!("ref {}{}", sym.name, type_suffix(program, sym.ty)));
        }
        Expr::Unresolved(name) => line(out, depth, id, &format!("unresolved {name}")),
        Expr::Named { name, actual } => {
            line(out, depth, id, &format!("named {name}"));
            write_expr(program, *actual, depth + 1, options, out);
        }
        Expr::Cond { cond, then_branch, else_branch } => {
            line(out, depth, id, "if");
            write_expr(program, *cond, depth + 1, options, out);
            write_expr(program, *then_branch, depth + 1, options, out);
            if let Some(else_branch) = else_branch {
                write_expr(program, *else_branch, depth + 1, options, out);
            }
        }
        Expr::Goto { label } => {
            line(out, depth, id, "goto");
            write_expr(program, *label, depth + 1, options, out);
        }
    }
}

fn write_def(
    program: &Program,
    sym: SymbolId,
    init: Option<ExprId>,
    depth: usize,
    id: Option<u32>,
    options: &ViewOptions,
    out: &mut String,
) {
    let symbol = program.symbol(sym);
    match &symbol.kind {
        SymbolKind::Function(func) => {
            let params: Vec<String> = func
                .formals
                .iter()
                .map(|&f| {
                    let formal = program.symbol(f);
                    let mut text = format!("{}{}", formal.name, type_suffix(program, formal.ty));
                    if program.formal(f).is_some_and(|p| p.default.is_some()) {
                        text.push_str(" = ..");
                    }
                    text
                })
                .collect();
            line(
                out,
                depth,
                id,
                &format!("fn {}({}){}", symbol.name, params.join(", "), type_suffix(program, func.ret_type)),
            );
            write_expr(program, func.body, depth + 1, options, out);
        }
        SymbolKind::Module { block } => {
            line(out, depth, id, &format!("module {}", symbol.name));
            write_expr(program, *block, depth + 1, options, out);
        }
        SymbolKind::Type(_) => line(out, depth, id, &format!("type {}", symbol.name)),
        SymbolKind::Variable | SymbolKind::Argument(_) => {
            line(out, depth, id, &format!("var {}{}", symbol.name, type_suffix(program, symbol.ty)));
            if let Some(init) = init {
                write_expr(program, init, depth + 1, options, out);
            }
        }
    }
}

/// Any node that carries an identity value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewNode {
    Type(TypeId),
    Symbol(SymbolId),
    Expr(ExprId),
}

/// Look a node up by its identity value.
pub fn find_by_id(program: &Program, id: u32) -> Option<ViewNode> {
    if let Some(t) = (0..program.types.len() as u32).map(TypeId).find(|&t| program.types.get(t).id == id) {
        return Some(ViewNode::Type(t));
    }
    if let Some(s) = program.symbols().find(|&s| program.symbol(s).id == id) {
        return Some(ViewNode::Symbol(s));
    }
    program.exprs().find(|&e| program.expr_identity(e) == id).map(ViewNode::Expr)
}
