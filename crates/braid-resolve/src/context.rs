//! Per-compilation resolution state.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Program, SymbolId};
use crate::config::ResolveConfig;
use crate::congruence::CongruenceClosure;
use crate::visibility::VisibleFunctionIndex;
use crate::wrappers::WrapperCache;

/// Early-verification progress of one function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VerifyState {
    InProgress,
    Done,
}

/// Tables shared by every phase of one resolution run. Created at the
/// start of a run and dropped at its end.
pub struct ResolveCtx {
    pub config: ResolveConfig,
    pub index: VisibleFunctionIndex,
    pub wrappers: WrapperCache,
    pub cc: CongruenceClosure,
    /// Signature of the declared function chosen for each call that relies
    /// on an implicit numeric promotion.
    pub coerced_calls: Vec<String>,
    resolved: FxHashSet<SymbolId>,
    /// Resolved functions in the order they were marked.
    order: Vec<SymbolId>,
    pub(crate) verified: FxHashMap<SymbolId, VerifyState>,
}

impl ResolveCtx {
    pub fn new(program: &Program, config: &ResolveConfig) -> Self {
        ResolveCtx {
            config: config.clone(),
            index: VisibleFunctionIndex::with_standard_modules(program, &config.standard_modules),
            wrappers: WrapperCache::new(),
            cc: CongruenceClosure::new(),
            coerced_calls: Vec::new(),
            resolved: FxHashSet::default(),
            order: Vec::new(),
            verified: FxHashMap::default(),
        }
    }

    pub fn is_resolved(&self, f: SymbolId) -> bool {
        self.resolved.contains(&f)
    }

    /// Returns `false` if `f` was already marked.
    pub fn mark_resolved(&mut self, f: SymbolId) -> bool {
        if self.resolved.insert(f) {
            self.order.push(f);
            true
        } else {
            false
        }
    }

    pub fn resolution_order(&self) -> &[SymbolId] {
        &self.order
    }
}
