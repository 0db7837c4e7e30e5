//! Return-type rules for primitive operations.

use crate::lattice::{TypeId, TypeLattice};

/// How the result type of a primitive is computed from its operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnRule {
    /// Same type as the first operand.
    SameAsFirst,
    Boolean,
    Fixed(TypeId),
    Void,
}

pub fn return_rule(op: &str) -> Option<ReturnRule> {
    let rule = match op {
        "+" | "-" | "*" | "/" | "%" | "neg" => ReturnRule::SameAsFirst,
        "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" | "!" => ReturnRule::Boolean,
        "to_string" | "concat" => ReturnRule::Fixed(TypeLattice::STRING),
        "print" | "assert" => ReturnRule::Void,
        _ => return None,
    };
    Some(rule)
}

/// Result type of primitive `op` applied to operands of `args` types.
/// `None` for unknown primitives or a missing first operand.
pub fn primitive_result_type(op: &str, args: &[TypeId]) -> Option<TypeId> {
    match return_rule(op)? {
        ReturnRule::SameAsFirst => args.first().copied(),
        ReturnRule::Boolean => Some(TypeLattice::BOOLEAN),
        ReturnRule::Fixed(ty) => Some(ty),
        ReturnRule::Void => Some(TypeLattice::VOID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_keeps_operand_type() {
        let ty = primitive_result_type("+", &[TypeLattice::FLOAT, TypeLattice::FLOAT]);
        assert_eq!(ty, Some(TypeLattice::FLOAT));
        assert_eq!(primitive_result_type("neg", &[]), None);
    }

    #[test]
    fn comparisons_are_boolean() {
        for op in ["==", "<", "&&"] {
            assert_eq!(
                primitive_result_type(op, &[TypeLattice::INTEGER, TypeLattice::INTEGER]),
                Some(TypeLattice::BOOLEAN)
            );
        }
    }

    #[test]
    fn unknown_primitive() {
        assert_eq!(return_rule("frobnicate"), None);
        assert_eq!(primitive_result_type("print", &[TypeLattice::STRING]), Some(TypeLattice::VOID));
    }
}
