//! Summary of a resolution run.

use serde::Serialize;

use crate::ast::{FnOrigin, Program, SymbolId};
use crate::candidates::signature;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub name: String,
    pub signature: String,
    pub return_type: String,
    pub origin: FnOrigin,
}

impl FunctionEntry {
    pub fn new(program: &Program, f: SymbolId) -> Self {
        let (return_type, origin) = match program.function(f) {
            Some(func) => (program.types.name(func.ret_type).to_string(), func.origin),
            None => (String::new(), FnOrigin::Declared),
        };
        FunctionEntry { name: program.name(f).to_string(), signature: signature(program, f), return_type, origin }
    }
}

/// What the driver did: functions resolved (in resolution order), functions
/// it synthesized, and what dead-code elimination detached. Calls that bind
/// through an implicit numeric promotion are listed by their target's
/// signature, once per call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub entry: String,
    pub resolved: Vec<FunctionEntry>,
    pub synthesized: Vec<FunctionEntry>,
    pub removed_functions: Vec<String>,
    pub removed_types: Vec<String>,
    pub coerced_calls: Vec<String>,
}

impl ResolutionReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn resolved_names(&self) -> Vec<&str> {
        self.resolved.iter().map(|e| e.name.as_str()).collect()
    }
}
