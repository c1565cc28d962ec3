//! Constraints of a flattened model: a tag drawn from the closed vocabulary
//! of the flat modeling language, together with an argument vector.

use std::fmt::{self, Display};

use crate::{
	model::{Argument, VarRef},
	IntVal,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A constraint of a flattened model.
pub struct Constraint {
	/// The operator of the constraint.
	pub tag: ConstraintTag,
	/// The argument vector of the constraint.
	pub args: Vec<Argument>,
	/// Whether the constraint is still part of the model.
	///
	/// A deactivated constraint has been found redundant and must be treated
	/// as removed by all consumers of the model.
	pub active: bool,
	/// The variable whose value is defined by this constraint, if any.
	pub target_variable: Option<VarRef>,
	/// Guard for once-only propagations that would otherwise refire without
	/// making progress.
	pub propagation_done: bool,
	/// Whether the flattener requested strong propagation for this
	/// constraint.
	pub strong_propagation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Operator tags of the flat modeling language understood by the presolver.
///
/// The `Display` implementation yields the flat names (e.g. `int_lin_eq`).
/// The reified form of a comparison carries a `Reif` suffix; classification
/// methods such as [`ConstraintTag::is_reified`] replace the string
/// prefix/suffix tests a textual representation would use.
#[allow(missing_docs, reason = "variant names mirror the flat vocabulary")]
pub enum ConstraintTag {
	ArrayBoolAnd,
	ArrayBoolOr,
	ArrayIntElement,
	ArrayVarIntElement,
	Bool2Int,
	BoolClause,
	BoolEq,
	BoolEqReif,
	BoolGe,
	BoolGeReif,
	BoolGt,
	BoolGtReif,
	BoolLe,
	BoolLeReif,
	BoolLt,
	BoolLtReif,
	BoolNe,
	BoolNeReif,
	BoolNot,
	BoolXor,
	CountReif,
	/// The unsatisfiable constant constraint; its presence makes the model
	/// infeasible.
	FalseConstraint,
	IntAbs,
	IntDiv,
	IntEq,
	IntEqReif,
	IntGe,
	IntGeReif,
	IntGt,
	IntGtReif,
	IntLe,
	IntLeReif,
	IntLinEq,
	IntLinEqReif,
	IntLinGe,
	IntLinGeReif,
	IntLinGt,
	IntLinGtReif,
	IntLinLe,
	IntLinLeReif,
	IntLinLt,
	IntLinLtReif,
	IntLinNe,
	IntLinNeReif,
	IntLt,
	IntLtReif,
	IntMax,
	IntMin,
	IntMod,
	IntNe,
	IntNeReif,
	IntPlus,
	IntTimes,
	MaximumInt,
	MinimumInt,
	SetIn,
	SetInReif,
	SetNotIn,
	SetNotInReif,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Comparison relation underlying a comparison constraint tag.
pub enum RelOp {
	/// Equality.
	Eq,
	/// Greater than or equal.
	Ge,
	/// Strictly greater than.
	Gt,
	/// Less than or equal.
	Le,
	/// Strictly less than.
	Lt,
	/// Disequality.
	Ne,
}

impl Constraint {
	/// Create a new active constraint with the given tag and arguments.
	pub fn new(tag: ConstraintTag, args: Vec<Argument>) -> Self {
		Self {
			tag,
			args,
			active: true,
			target_variable: None,
			propagation_done: false,
			strong_propagation: false,
		}
	}

	/// Whether any argument of the constraint references the given variable.
	pub fn references(&self, var: VarRef) -> bool {
		self.vars().any(|v| v == var)
	}

	/// Iterator over all variables referenced by the constraint arguments.
	pub fn vars(&self) -> impl Iterator<Item = VarRef> + '_ {
		self.args.iter().flat_map(|arg| arg.vars().iter().copied())
	}
}

impl ConstraintTag {
	/// The tag of the comparison of integer variables by `op`.
	pub fn int_cmp(op: RelOp) -> Self {
		match op {
			RelOp::Eq => ConstraintTag::IntEq,
			RelOp::Ge => ConstraintTag::IntGe,
			RelOp::Gt => ConstraintTag::IntGt,
			RelOp::Le => ConstraintTag::IntLe,
			RelOp::Lt => ConstraintTag::IntLt,
			RelOp::Ne => ConstraintTag::IntNe,
		}
	}

	/// The tag of the linear integer comparison by `op`.
	pub fn int_lin_cmp(op: RelOp) -> Self {
		match op {
			RelOp::Eq => ConstraintTag::IntLinEq,
			RelOp::Ge => ConstraintTag::IntLinGe,
			RelOp::Gt => ConstraintTag::IntLinGt,
			RelOp::Le => ConstraintTag::IntLinLe,
			RelOp::Lt => ConstraintTag::IntLinLt,
			RelOp::Ne => ConstraintTag::IntLinNe,
		}
	}

	/// The tag of the reified linear integer comparison by `op`.
	pub fn int_lin_cmp_reif(op: RelOp) -> Self {
		match op {
			RelOp::Eq => ConstraintTag::IntLinEqReif,
			RelOp::Ge => ConstraintTag::IntLinGeReif,
			RelOp::Gt => ConstraintTag::IntLinGtReif,
			RelOp::Le => ConstraintTag::IntLinLeReif,
			RelOp::Lt => ConstraintTag::IntLinLtReif,
			RelOp::Ne => ConstraintTag::IntLinNeReif,
		}
	}

	/// The comparison relation underlying the tag, reified or not.
	///
	/// Both plain and linear comparison families yield their relation;
	/// non-comparison tags yield `None`.
	pub fn comparison(&self) -> Option<RelOp> {
		use ConstraintTag::*;
		Some(match self {
			BoolEq | BoolEqReif | IntEq | IntEqReif | IntLinEq | IntLinEqReif => RelOp::Eq,
			BoolGe | BoolGeReif | IntGe | IntGeReif | IntLinGe | IntLinGeReif => RelOp::Ge,
			BoolGt | BoolGtReif | IntGt | IntGtReif | IntLinGt | IntLinGtReif => RelOp::Gt,
			BoolLe | BoolLeReif | IntLe | IntLeReif | IntLinLe | IntLinLeReif => RelOp::Le,
			BoolLt | BoolLtReif | IntLt | IntLtReif | IntLinLt | IntLinLtReif => RelOp::Lt,
			BoolNe | BoolNeReif | IntNe | IntNeReif | IntLinNe | IntLinNeReif => RelOp::Ne,
			_ => return None,
		})
	}

	/// Whether the tag belongs to the linear comparison family.
	pub fn is_linear(&self) -> bool {
		use ConstraintTag::*;
		matches!(
			self,
			IntLinEq
				| IntLinEqReif | IntLinGe
				| IntLinGeReif | IntLinGt
				| IntLinGtReif | IntLinLe
				| IntLinLeReif | IntLinLt
				| IntLinLtReif | IntLinNe
				| IntLinNeReif
		)
	}

	/// Whether the tag is the reified form of a relation.
	pub fn is_reified(&self) -> bool {
		use ConstraintTag::*;
		matches!(
			self,
			BoolEqReif
				| BoolGeReif | BoolGtReif
				| BoolLeReif | BoolLtReif
				| BoolNeReif | CountReif
				| IntEqReif | IntGeReif
				| IntGtReif | IntLeReif
				| IntLinEqReif | IntLinGeReif
				| IntLinGtReif | IntLinLeReif
				| IntLinLtReif | IntLinNeReif
				| IntLtReif | IntNeReif
				| SetInReif | SetNotInReif
		)
	}

	/// The tag expressing the complement relation, used when a reification is
	/// found to be false.
	pub fn negated(&self) -> Option<Self> {
		use ConstraintTag::*;
		Some(match self {
			BoolEq => BoolNe,
			BoolGe => BoolLt,
			BoolGt => BoolLe,
			BoolLe => BoolGt,
			BoolLt => BoolGe,
			BoolNe => BoolEq,
			IntEq => IntNe,
			IntGe => IntLt,
			IntGt => IntLe,
			IntLe => IntGt,
			IntLinEq => IntLinNe,
			IntLinGe => IntLinLt,
			IntLinGt => IntLinLe,
			IntLinLe => IntLinGt,
			IntLinLt => IntLinGe,
			IntLinNe => IntLinEq,
			IntLt => IntGe,
			IntNe => IntEq,
			SetIn => SetNotIn,
			SetNotIn => SetIn,
			_ => return None,
		})
	}

	/// The non-reified tag of the same relation, for tags with a `Reif`
	/// suffix.
	pub fn unreified(&self) -> Option<Self> {
		use ConstraintTag::*;
		Some(match self {
			BoolEqReif => BoolEq,
			BoolGeReif => BoolGe,
			BoolGtReif => BoolGt,
			BoolLeReif => BoolLe,
			BoolLtReif => BoolLt,
			BoolNeReif => BoolNe,
			IntEqReif => IntEq,
			IntGeReif => IntGe,
			IntGtReif => IntGt,
			IntLeReif => IntLe,
			IntLinEqReif => IntLinEq,
			IntLinGeReif => IntLinGe,
			IntLinGtReif => IntLinGt,
			IntLinLeReif => IntLinLe,
			IntLinLtReif => IntLinLt,
			IntLinNeReif => IntLinNe,
			IntLtReif => IntLt,
			IntNeReif => IntNe,
			SetInReif => SetIn,
			SetNotInReif => SetNotIn,
			_ => return None,
		})
	}
}

impl Display for ConstraintTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use ConstraintTag::*;
		f.write_str(match self {
			ArrayBoolAnd => "array_bool_and",
			ArrayBoolOr => "array_bool_or",
			ArrayIntElement => "array_int_element",
			ArrayVarIntElement => "array_var_int_element",
			Bool2Int => "bool2int",
			BoolClause => "bool_clause",
			BoolEq => "bool_eq",
			BoolEqReif => "bool_eq_reif",
			BoolGe => "bool_ge",
			BoolGeReif => "bool_ge_reif",
			BoolGt => "bool_gt",
			BoolGtReif => "bool_gt_reif",
			BoolLe => "bool_le",
			BoolLeReif => "bool_le_reif",
			BoolLt => "bool_lt",
			BoolLtReif => "bool_lt_reif",
			BoolNe => "bool_ne",
			BoolNeReif => "bool_ne_reif",
			BoolNot => "bool_not",
			BoolXor => "bool_xor",
			CountReif => "count_reif",
			FalseConstraint => "false_constraint",
			IntAbs => "int_abs",
			IntDiv => "int_div",
			IntEq => "int_eq",
			IntEqReif => "int_eq_reif",
			IntGe => "int_ge",
			IntGeReif => "int_ge_reif",
			IntGt => "int_gt",
			IntGtReif => "int_gt_reif",
			IntLe => "int_le",
			IntLeReif => "int_le_reif",
			IntLinEq => "int_lin_eq",
			IntLinEqReif => "int_lin_eq_reif",
			IntLinGe => "int_lin_ge",
			IntLinGeReif => "int_lin_ge_reif",
			IntLinGt => "int_lin_gt",
			IntLinGtReif => "int_lin_gt_reif",
			IntLinLe => "int_lin_le",
			IntLinLeReif => "int_lin_le_reif",
			IntLinLt => "int_lin_lt",
			IntLinLtReif => "int_lin_lt_reif",
			IntLinNe => "int_lin_ne",
			IntLinNeReif => "int_lin_ne_reif",
			IntLt => "int_lt",
			IntLtReif => "int_lt_reif",
			IntMax => "int_max",
			IntMin => "int_min",
			IntMod => "int_mod",
			IntNe => "int_ne",
			IntNeReif => "int_ne_reif",
			IntPlus => "int_plus",
			IntTimes => "int_times",
			MaximumInt => "maximum_int",
			MinimumInt => "minimum_int",
			SetIn => "set_in",
			SetInReif => "set_in_reif",
			SetNotIn => "set_not_in",
			SetNotInReif => "set_not_in_reif",
		})
	}
}

impl RelOp {
	/// The mirrored relation, swapping the sides of the comparison.
	pub fn flip(&self) -> Self {
		match self {
			RelOp::Eq => RelOp::Eq,
			RelOp::Ge => RelOp::Le,
			RelOp::Gt => RelOp::Lt,
			RelOp::Le => RelOp::Ge,
			RelOp::Lt => RelOp::Gt,
			RelOp::Ne => RelOp::Ne,
		}
	}

	/// Whether `lhs OP rhs` holds for two known values.
	pub fn holds(&self, lhs: IntVal, rhs: IntVal) -> bool {
		match self {
			RelOp::Eq => lhs == rhs,
			RelOp::Ge => lhs >= rhs,
			RelOp::Gt => lhs > rhs,
			RelOp::Le => lhs <= rhs,
			RelOp::Lt => lhs < rhs,
			RelOp::Ne => lhs != rhs,
		}
	}

	/// The complement relation.
	pub fn negate(&self) -> Self {
		match self {
			RelOp::Eq => RelOp::Ne,
			RelOp::Ge => RelOp::Lt,
			RelOp::Gt => RelOp::Le,
			RelOp::Le => RelOp::Gt,
			RelOp::Lt => RelOp::Ge,
			RelOp::Ne => RelOp::Eq,
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::model::constraint::{ConstraintTag, RelOp};

	#[test]
	fn test_tag_classification() {
		assert!(ConstraintTag::IntLinEqReif.is_reified());
		assert!(ConstraintTag::IntLinEqReif.is_linear());
		assert!(!ConstraintTag::IntEq.is_reified());
		assert_eq!(
			ConstraintTag::IntLeReif.unreified(),
			Some(ConstraintTag::IntLe)
		);
		assert_eq!(ConstraintTag::IntLe.negated(), Some(ConstraintTag::IntGt));
		assert_eq!(
			ConstraintTag::SetIn.negated(),
			Some(ConstraintTag::SetNotIn)
		);
		assert_eq!(ConstraintTag::BoolNot.negated(), None);
	}

	#[test]
	fn test_rel_op() {
		assert!(RelOp::Le.holds(3, 3));
		assert!(!RelOp::Lt.holds(3, 3));
		assert_eq!(RelOp::Le.negate(), RelOp::Gt);
		assert_eq!(RelOp::Lt.flip(), RelOp::Gt);
		assert_eq!(RelOp::Eq.flip(), RelOp::Eq);
	}
}
