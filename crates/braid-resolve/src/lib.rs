//! Braid call resolution.
//!
//! Given a bound AST, this crate decides which function every call reaches,
//! synthesizes the wrapper functions needed to adapt call shapes to
//! declarations, and removes functions that are never reached. Functions
//! marked for early verification are checked against their annotated
//! signatures first, using congruence closure so where-clause equalities
//! are honored.
//!
//! # Architecture
//!
//! - [`lattice`]: Type nodes and the subtype / promotion relation
//! - [`ast`]: Arena AST, symbols, and the `Program` builder
//! - [`visibility`]: Scope-walking lookup of visible functions
//! - [`candidates`]: Binding actuals to formals and ranking candidates
//! - [`wrappers`]: Default, order, and instantiation wrappers
//! - [`driver`]: Fixed-point resolution from the entry point
//! - [`congruence`]: Congruence closure over type terms
//! - [`verify`]: Early verification of annotated signatures
//! - [`diagnostics`]: ariadne rendering of errors

pub mod ast;
pub mod builtins;
pub mod candidates;
pub mod config;
pub mod congruence;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod lattice;
pub mod report;
pub mod verify;
pub mod view;
pub mod visibility;
pub mod wrappers;

pub use ast::{Expr, ExprId, FnOrigin, FormalDecl, Program, SymbolId, SymbolKind};
pub use config::{ConfigError, ResolveConfig};
pub use driver::resolve_program;
pub use error::{InternalError, ResolveError};
pub use lattice::{TypeId, TypeLattice};
pub use report::{FunctionEntry, ResolutionReport};
pub use verify::verify_program;
