//! Rewrite rules for the Boolean channeling, array, and clause constraints.

use itertools::Itertools;
use tracing::trace;

use crate::{
	model::{Argument, ConRef, ConstraintTag, Model},
	presolve::{
		force_arg,
		int_rules::{three_args, two_args},
		operand, Operand, PresolveError, Presolver,
	},
	IntVal,
};

impl Presolver {
	/// Eliminate `bool2int` channeling.
	///
	/// When either side is fixed the constraint becomes a plain equality;
	/// otherwise the integer variable is replaced by the Boolean variable
	/// everywhere and the constraint is retired.
	pub(crate) fn presolve_bool2int(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [b, x] = two_args(model, con, "bool2int")?;
		match (operand(model, &b)?, operand(model, &x)?) {
			(Operand::Val(_), _) | (_, Operand::Val(_)) => {
				model.constraints[con].tag = ConstraintTag::IntEq;
				Ok(true)
			}
			(Operand::Free(b), Operand::Free(x)) => {
				trace!(
					bool = %model.variables[b].name,
					int = %model.variables[x].name,
					"merging bool2int channel"
				);
				if b != x {
					self.add_substitution(model, x, b);
				}
				model.deactivate(con);
				Ok(true)
			}
		}
	}

	/// Simplify `bool_not`.
	pub(crate) fn presolve_bool_not(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b] = two_args(model, con, "bool_not")?;
		match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), _) => Ok(self.decide(model, con, &b, 1 - u)),
			(_, Operand::Val(v)) => Ok(self.decide(model, con, &a, 1 - v)),
			(Operand::Free(x), Operand::Free(y)) => {
				if x == y {
					model.set_as_false(con);
					return Ok(true);
				}
				Ok(false)
			}
		}
	}

	/// Lower `bool_xor` to `bool_eq` or `bool_not` once any of its three
	/// arguments is fixed.
	pub(crate) fn presolve_bool_xor(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b, r] = three_args(model, con, "bool_xor")?;
		let ops = [
			operand(model, &a)?,
			operand(model, &b)?,
			operand(model, &r)?,
		];
		// a xor b = r; a fixed value flips the relation between b and r, and
		// symmetrically for the other arguments.
		let (val, lhs, rhs) = match ops {
			[Operand::Val(u), _, _] => (u, b, r),
			[_, Operand::Val(v), _] => (v, a, r),
			[_, _, Operand::Val(w)] => (w, a, b),
			_ => return Ok(false),
		};
		let ct = &mut model.constraints[con];
		ct.tag = if val == 1 {
			ConstraintTag::BoolNot
		} else {
			ConstraintTag::BoolEq
		};
		ct.args = vec![lhs, rhs];
		Ok(true)
	}

	/// Simplify `bool_clause`: prune falsified literals, retire satisfied
	/// clauses, and propagate unit clauses.
	pub(crate) fn presolve_bool_clause(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [pos_arg, neg_arg] = two_args(model, con, "bool_clause")?;
		let (Argument::VarArray(pos), Argument::VarArray(neg)) = (&pos_arg, &neg_arg) else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "variable array",
				found: format!("{:?}", model.constraints[con].args),
			});
		};
		if pos.iter().any(|&v| model.var_value(v) == Some(1))
			|| neg.iter().any(|&v| model.var_value(v) == Some(0))
		{
			model.deactivate(con);
			return Ok(true);
		}
		let live_pos = pos
			.iter()
			.copied()
			.filter(|&v| model.var_value(v) != Some(0))
			.collect_vec();
		let live_neg = neg
			.iter()
			.copied()
			.filter(|&v| model.var_value(v) != Some(1))
			.collect_vec();
		match (live_pos.as_slice(), live_neg.as_slice()) {
			([], []) => {
				model.set_as_false(con);
				Ok(true)
			}
			([x], []) => {
				let _ = model.set_var_value(*x, 1);
				model.deactivate(con);
				Ok(true)
			}
			([], [x]) => {
				let _ = model.set_var_value(*x, 0);
				model.deactivate(con);
				Ok(true)
			}
			_ => {
				if live_pos.len() != pos.len() || live_neg.len() != neg.len() {
					model.constraints[con].args =
						vec![Argument::VarArray(live_pos), Argument::VarArray(live_neg)];
					Ok(true)
				} else {
					Ok(false)
				}
			}
		}
	}

	/// Simplify `array_bool_or` and `array_bool_and`.
	///
	/// The two constraints are duals of each other; the rule body works in
	/// terms of the absorbing element (`1` for or, `0` for and) and handles
	/// both.
	pub(crate) fn presolve_array_bool(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [arr_arg, target] = two_args(model, con, "array_bool_or")?;
		let Argument::VarArray(elems) = &arr_arg else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "variable array",
				found: format!("{:?}", arr_arg),
			});
		};
		let elems = elems.clone();
		// `absorbing` is the element value that decides the array result on
		// its own; `neutral` is its complement.
		let (absorbing, neutral) = if model.constraints[con].tag == ConstraintTag::ArrayBoolOr {
			(1, 0)
		} else {
			(0, 1)
		};

		if let [single] = elems.as_slice() {
			let ct = &mut model.constraints[con];
			ct.tag = ConstraintTag::BoolEq;
			ct.args = vec![Argument::Var(*single), target];
			return Ok(true);
		}
		match operand(model, &target)? {
			Operand::Val(t) if t == neutral => {
				// The array result is neutral, so no element may be
				// absorbing.
				for &v in &elems {
					let _ = model.set_var_value(v, neutral);
				}
				model.deactivate(con);
				return Ok(true);
			}
			Operand::Val(t) if t == absorbing => {
				let unbound = elems
					.iter()
					.copied()
					.filter(|&v| model.var_value(v).is_none())
					.collect_vec();
				if elems.iter().all(|&v| model.var_value(v) == Some(neutral)) {
					model.set_as_false(con);
					return Ok(true);
				}
				if let [last] = unbound.as_slice() {
					if elems
						.iter()
						.all(|&v| v == *last || model.var_value(v) == Some(neutral))
					{
						let _ = model.set_var_value(*last, absorbing);
						model.deactivate(con);
						return Ok(true);
					}
				}
			}
			_ => {}
		}
		if elems
			.iter()
			.any(|&v| model.var_value(v) == Some(absorbing))
		{
			let _ = force_arg(model, con, &target, absorbing);
			if model.constraints[con].tag != ConstraintTag::FalseConstraint {
				model.deactivate(con);
			}
			return Ok(true);
		}
		if elems.iter().all(|&v| model.var_value(v) == Some(neutral)) {
			let _ = force_arg(model, con, &target, neutral);
			if model.constraints[con].tag != ConstraintTag::FalseConstraint {
				model.deactivate(con);
			}
			return Ok(true);
		}
		let live = elems
			.iter()
			.copied()
			.filter(|&v| model.var_value(v) != Some(neutral))
			.collect_vec();
		if live.len() != elems.len() {
			model.constraints[con].args = vec![Argument::VarArray(live), target];
			return Ok(true);
		}
		Ok(false)
	}

	/// Lower `bool_eq_reif` and `bool_ne_reif` to `bool_eq` or `bool_not`
	/// once an operand is fixed, and decide the reification for doubled
	/// operands.
	pub(crate) fn presolve_bool_eq_ne_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b, r] = three_args(model, con, "bool_eq_reif")?;
		let eq = model.constraints[con].tag == ConstraintTag::BoolEqReif;
		if let (Some(x), Some(y)) = (a.var(), b.var()) {
			if x == y {
				return Ok(self.decide(model, con, &r, IntVal::from(eq)));
			}
		}
		let (val, other) = match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), _) => (u, b),
			(_, Operand::Val(v)) => (v, a),
			_ => return Ok(false),
		};
		let ct = &mut model.constraints[con];
		// r <-> (other = val) for eq, r <-> (other != val) for ne.
		ct.tag = if (val == 1) == eq {
			ConstraintTag::BoolEq
		} else {
			ConstraintTag::BoolNot
		};
		ct.args = vec![other, r];
		Ok(true)
	}
}
