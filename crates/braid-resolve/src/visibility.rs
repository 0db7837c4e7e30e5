//! Visible-function lookup.
//!
//! The index maps each scope block to the functions declared directly in
//! it, grouped by name. It grows incrementally: every lookup first indexes
//! functions created since the previous one (instantiations and wrappers
//! appear in the middle of resolution). Nothing is ever removed.
//!
//! Walking outward from a call site is short-circuited by a skip cache:
//! blocks that declare no functions and use no modules are recorded as
//! jumping straight to the nearest block that does.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::ast::{ExprId, Program, SymbolId};

#[derive(Debug, Default)]
pub struct VisibleFunctionIndex {
    by_block: FxHashMap<ExprId, FxHashMap<String, Vec<SymbolId>>>,
    skip_cache: FxHashMap<ExprId, ExprId>,
    /// Number of `Program::functions()` already indexed.
    indexed: usize,
    /// Blocks of standard modules; their functions are filed under the root.
    standard_blocks: FxHashSet<ExprId>,
}

impl VisibleFunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that treats the named modules as part of the root block.
    pub fn with_standard_modules(program: &Program, modules: &[String]) -> Self {
        let mut index = Self::new();
        for name in modules {
            if let Some(block) = program.find_module(name).and_then(|m| program.module_block(m)) {
                index.standard_blocks.insert(block);
            }
        }
        index
    }

    fn canonical_block(&self, program: &Program, block: ExprId) -> ExprId {
        if self.standard_blocks.contains(&block) {
            program.root()
        } else {
            block
        }
    }

    /// Index every function created since the last refresh.
    pub fn refresh(&mut self, program: &Program) {
        let functions = program.functions();
        for &f in &functions[self.indexed.min(functions.len())..] {
            let Some(def) = program.symbol(f).def_point else {
                continue;
            };
            let Some(block) = program.visibility_block(def) else {
                continue;
            };
            let block = self.canonical_block(program, block);
            self.register(block, program.name(f), f);
        }
        self.indexed = functions.len();
    }

    fn register(&mut self, block: ExprId, name: &str, f: SymbolId) {
        if !self.by_block.contains_key(&block) {
            // A block that gains its first function can no longer be skipped.
            self.skip_cache.clear();
        }
        let fns = self.by_block.entry(block).or_default().entry(name.to_string()).or_default();
        if !fns.contains(&f) {
            fns.push(f);
        }
    }

    /// Functions named `name` declared directly in `block`.
    pub fn declared_in(&mut self, program: &Program, block: ExprId, name: &str) -> Vec<SymbolId> {
        self.refresh(program);
        let block = self.canonical_block(program, block);
        self.by_block
            .get(&block)
            .and_then(|names| names.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Every function named `name` visible from `scope`, in declaration and
    /// use traversal order.
    pub fn find_visible(&mut self, program: &Program, scope: ExprId, name: &str) -> Vec<SymbolId> {
        self.refresh(program);
        let mut found = Vec::new();
        let mut visited = FxHashSet::default();
        self.collect(program, scope, name, &mut found, &mut visited);
        trace!(name, count = found.len(), "visible functions");
        found
    }

    /// Returns the nearest non-skippable block at or above `block`, used to
    /// fill the skip cache of the caller.
    fn collect(
        &mut self,
        program: &Program,
        block: ExprId,
        name: &str,
        found: &mut Vec<SymbolId>,
        visited: &mut FxHashSet<ExprId>,
    ) -> Option<ExprId> {
        let block = self.canonical_block(program, block);
        if !visited.insert(block) {
            return None;
        }

        let mut can_skip = true;
        if let Some(names) = self.by_block.get(&block) {
            can_skip = false;
            if let Some(fns) = names.get(name) {
                for &f in fns {
                    if !found.contains(&f) {
                        found.push(f);
                    }
                }
            }
        }

        let uses = program.block(block).map(|b| b.uses.clone()).unwrap_or_default();
        for module in uses {
            can_skip = false;
            if let Some(module_block) = program.module_block(module) {
                self.collect(program, module_block, name, found, visited);
            }
        }

        if let Some(&next) = self.skip_cache.get(&block) {
            self.collect(program, next, name, found, visited);
            return Some(if can_skip { next } else { block });
        }

        if block != program.root() {
            if let Some(next) = program.visibility_block(block) {
                let nearest = self.collect(program, next, name, found, visited);
                if let Some(nearest) = nearest {
                    self.skip_cache.insert(block, nearest);
                }
                return if can_skip { nearest } else { Some(block) };
            }
        }
        None
    }

    pub fn skip_cache_len(&self) -> usize {
        self.skip_cache.len()
    }
}
