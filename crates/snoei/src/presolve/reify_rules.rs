//! Rewrite rules for reified constraints: dropping reifications whose
//! Boolean is fixed, deciding reified comparisons from domain information,
//! and cross-constraint merging of reified equalities.

use tracing::trace;

use crate::{
	model::{Argument, ConRef, ConstraintTag, Model, RelOp, VarRef},
	presolve::{int_rules::three_args, operand, Operand, PresolveError, Presolver},
	IntVal,
};

impl Presolver {
	/// Drop the reification of any constraint whose Boolean argument is
	/// fixed.
	///
	/// A true reification keeps the relation; a false reification inverts it
	/// (`eq <-> ne`, `le <-> gt`, `lt <-> ge`, `set_in <-> set_not_in`).
	pub(crate) fn unreify(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let ct = &model.constraints[con];
		let Some(unreified) = ct.tag.unreified() else {
			return Ok(false);
		};
		let Some(reif) = ct.args.last() else {
			return Err(PresolveError::InvalidNumArgs {
				name: "reified constraint",
				found: 0,
				expected: 3,
			});
		};
		let tag = match model.arg_value(reif) {
			Some(1) => unreified,
			Some(0) => {
				let Some(negated) = unreified.negated() else {
					return Ok(false);
				};
				negated
			}
			Some(_) => {
				return Err(PresolveError::InvalidArgumentType {
					expected: "Boolean value",
					found: format!("{:?}", reif),
				})
			}
			None => return Ok(false),
		};
		trace!(con = con.index(), from = %ct.tag, to = %tag, "unreifying constraint");
		let ct = &mut model.constraints[con];
		ct.tag = tag;
		let _ = ct.args.pop();
		Ok(true)
	}

	/// Decide a reified comparison from the identity of its operands or from
	/// their domains.
	///
	/// A comparison of a variable with itself is decided by the reflexivity
	/// of the relation. With one side fixed, the Boolean is decided when the
	/// variable domain lies entirely on one side of the constant or has
	/// already excluded it.
	pub(crate) fn propagate_reified_comparison(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("reified comparison rule dispatched on non-comparison tag");
		let [a, b, r] = three_args(model, con, "int_eq_reif")?;
		if let (Some(x), Some(y)) = (a.var(), b.var()) {
			if x == y {
				let reflexive = matches!(op, RelOp::Eq | RelOp::Le | RelOp::Ge);
				return Ok(self.decide(model, con, &r, IntVal::from(reflexive)));
			}
		}
		let decided = match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), Operand::Val(v)) => Some(op.holds(u, v)),
			(Operand::Free(x), Operand::Val(c)) => decide_against_bound(model, x, op, c),
			(Operand::Val(c), Operand::Free(x)) => decide_against_bound(model, x, op.flip(), c),
			(Operand::Free(_), Operand::Free(_)) => None,
		};
		match decided {
			Some(holds) => Ok(self.decide(model, con, &r, IntVal::from(holds))),
			None => Ok(false),
		}
	}

	/// Offer a reified integer comparison to the generic decision rule and
	/// the per-relation cross-constraint rules.
	pub(crate) fn presolve_int_cmp_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let mut changed = self.propagate_reified_comparison(model, con)?;
		if !model.constraints[con].active {
			return Ok(changed);
		}
		changed |= match model.constraints[con].tag {
			ConstraintTag::IntEqReif => self.store_int_eq_reif(model, con)?,
			ConstraintTag::IntNeReif => self.simplify_int_ne_reif(model, con)?,
			ConstraintTag::IntLeReif => self.remove_abs_from_int_le_reif(model, con)?,
			_ => false,
		};
		Ok(changed)
	}

	/// Memoize `int_eq_reif(x, y, b)`, and merge the Boolean output of a
	/// duplicate over the same variable pair.
	fn store_int_eq_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [Argument::Var(x), Argument::Var(y), Argument::Var(b)] =
			*model.constraints[con].args.as_slice()
		else {
			return Ok(false);
		};
		let key = (x.min(y), x.max(y));
		match self.int_eq_reif_map.get(&key) {
			Some(&b0) if model.variables[b0].active => {
				if b0 == b {
					return Ok(false);
				}
				trace!(con = con.index(), "merging duplicate reified equality");
				self.add_substitution(model, b, b0);
				model.deactivate(con);
				Ok(true)
			}
			_ => {
				let _ = self.int_eq_reif_map.insert(key, b);
				Ok(false)
			}
		}
	}

	/// Rewrite `int_ne_reif(x, y, b')` as `bool_not(b, b')` when an
	/// `int_eq_reif(x, y, b)` has been memoized for the same variable pair.
	fn simplify_int_ne_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [Argument::Var(x), Argument::Var(y), Argument::Var(b1)] =
			*model.constraints[con].args.as_slice()
		else {
			return Ok(false);
		};
		let key = (x.min(y), x.max(y));
		let Some(&b0) = self.int_eq_reif_map.get(&key) else {
			return Ok(false);
		};
		if !model.variables[b0].active {
			return Ok(false);
		}
		trace!(con = con.index(), "rewriting reified disequality as negation");
		let ct = &mut model.constraints[con];
		ct.tag = ConstraintTag::BoolNot;
		ct.args = vec![Argument::Var(b0), Argument::Var(b1)];
		self.index_constraint(model, con);
		Ok(true)
	}

	/// Rewrite `int_le_reif(x, c, b)` with `x = |y|` into a reified test on
	/// `y` itself: equality with zero for `c = 0`, set membership in
	/// `-c..c` otherwise.
	fn remove_abs_from_int_le_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b, r] = three_args(model, con, "int_le_reif")?;
		let Some(x) = a.var() else {
			return Ok(false);
		};
		let Some(c) = model.arg_value(&b) else {
			return Ok(false);
		};
		if c < 0 {
			return Ok(false);
		}
		let Some(&y) = self.abs_map.get(&x) else {
			return Ok(false);
		};
		if !model.variables[y].active || y == x {
			return Ok(false);
		}
		trace!(
			con = con.index(),
			origin = %model.variables[y].name,
			"rewriting absolute value bound"
		);
		let ct = &mut model.constraints[con];
		if c == 0 {
			ct.tag = ConstraintTag::IntEqReif;
			ct.args = vec![Argument::Var(y), Argument::IntValue(0), r];
		} else {
			ct.tag = ConstraintTag::SetInReif;
			ct.args = vec![Argument::Var(y), Argument::IntInterval(-c, c), r];
		}
		self.index_constraint(model, con);
		Ok(true)
	}
}

/// Decide `x OP c` from the domain of `x`, if the domain already settles the
/// relation.
fn decide_against_bound(model: &Model, x: VarRef, op: RelOp, c: IntVal) -> Option<bool> {
	let (lb, ub) = (model.var_min(x), model.var_max(x));
	match op {
		RelOp::Eq => (!model.var_contains(x, c)).then_some(false),
		RelOp::Ne => (!model.var_contains(x, c)).then_some(true),
		RelOp::Le if ub <= c => Some(true),
		RelOp::Le if lb > c => Some(false),
		RelOp::Lt if ub < c => Some(true),
		RelOp::Lt if lb >= c => Some(false),
		RelOp::Ge if lb >= c => Some(true),
		RelOp::Ge if ub < c => Some(false),
		RelOp::Gt if lb > c => Some(true),
		RelOp::Gt if ub <= c => Some(false),
		_ => None,
	}
}
