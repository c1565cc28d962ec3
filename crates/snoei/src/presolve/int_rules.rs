//! Rewrite rules for integer comparison, set membership, and arithmetic
//! constraints.
//!
//! The comparison rules also serve the Boolean comparison tags: a Boolean
//! variable is an integer variable with a `0..1` domain, so `bool_eq` and
//! friends share the integer rule bodies.

use rangelist::IntervalIterator;
use tracing::{trace, warn};

use crate::{
	model::{Argument, ConRef, ConstraintTag, Model, RelOp, VarRef},
	presolve::{operand, Operand, PresolveError, Presolver},
	IntSetVal, IntVal,
};

impl Presolver {
	/// Simplify `int_eq` and `bool_eq`.
	///
	/// A constant on one side tightens the other side to that value; two free
	/// variables are recorded as a substitution. An equality with zero whose
	/// variable is a known difference `y - z` is rewritten into the equality
	/// of `y` and `z`.
	pub(crate) fn presolve_int_eq(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b] = two_args(model, con, "int_eq")?;
		match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), Operand::Val(v)) => {
				if u == v {
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
				Ok(true)
			}
			(Operand::Free(x), Operand::Val(v)) | (Operand::Val(v), Operand::Free(x)) => {
				if v == 0 {
					if let Some(&(y, z)) = self.difference_map.get(&x) {
						if y != x && z != x && model.variables[y].active && model.variables[z].active
						{
							// x = y - z and x = 0, so y = z.
							trace!(
								var = %model.variables[x].name,
								"rewriting difference equality"
							);
							let _ = model.set_var_value(x, 0);
							model.constraints[con].args =
								vec![Argument::Var(y), Argument::Var(z)];
							self.index_constraint(model, con);
							return Ok(true);
						}
					}
				}
				let _ = model.set_var_value(x, v);
				model.deactivate(con);
				Ok(true)
			}
			(Operand::Free(x), Operand::Free(y)) => {
				if x != y {
					self.add_substitution(model, x, y);
				}
				model.deactivate(con);
				Ok(true)
			}
		}
	}

	/// Simplify `int_ne` and `bool_ne`.
	pub(crate) fn presolve_int_ne(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b] = two_args(model, con, "int_ne")?;
		match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), Operand::Val(v)) => {
				if u == v {
					model.set_as_false(con);
				} else {
					model.deactivate(con);
				}
				Ok(true)
			}
			(Operand::Free(x), Operand::Val(v)) | (Operand::Val(v), Operand::Free(x)) => {
				let _ = model.remove_var_value(x, v);
				model.deactivate(con);
				Ok(true)
			}
			(Operand::Free(x), Operand::Free(y)) => {
				if x == y {
					model.set_as_false(con);
					return Ok(true);
				}
				let overlap: IntSetVal =
					model.variables[x].domain.intersect(&model.variables[y].domain);
				if overlap.is_empty() {
					model.deactivate(con);
					return Ok(true);
				}
				Ok(false)
			}
		}
	}

	/// Simplify the strict and non-strict ordering constraints, both integer
	/// and Boolean.
	///
	/// A constant side becomes a bound on the other side and the constraint
	/// is retired. Two free variables cross-tighten each other's bounds; the
	/// constraint then stays active unless it has become entailed.
	pub(crate) fn presolve_inequality(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("inequality rule dispatched on non-comparison tag");
		let [a, b] = two_args(model, con, "int_le")?;
		match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), Operand::Val(v)) => {
				if op.holds(u, v) {
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
				Ok(true)
			}
			(Operand::Free(x), Operand::Val(c)) => {
				let _ = self.tighten_by_bound(model, x, op, c);
				model.deactivate(con);
				Ok(true)
			}
			(Operand::Val(c), Operand::Free(x)) => {
				let _ = self.tighten_by_bound(model, x, op.flip(), c);
				model.deactivate(con);
				Ok(true)
			}
			(Operand::Free(x), Operand::Free(y)) => {
				// Normalize to "x OP y" with OP in {<=, <}.
				let (x, y, strict) = match op {
					RelOp::Le => (x, y, false),
					RelOp::Lt => (x, y, true),
					RelOp::Ge => (y, x, false),
					RelOp::Gt => (y, x, true),
					RelOp::Eq | RelOp::Ne => unreachable!("not an ordering relation"),
				};
				if x == y {
					if strict {
						model.set_as_false(con);
					} else {
						model.deactivate(con);
					}
					return Ok(true);
				}
				let entailed = if strict {
					model.var_max(x) < model.var_min(y)
				} else {
					model.var_max(x) <= model.var_min(y)
				};
				if entailed {
					model.deactivate(con);
					return Ok(true);
				}
				let mut changed = false;
				let shift = IntVal::from(strict);
				changed |=
					model.intersect_var_below(x, model.var_max(y).saturating_sub(shift));
				changed |=
					model.intersect_var_above(y, model.var_min(x).saturating_add(shift));
				Ok(changed)
			}
		}
	}

	/// Tighten the domain of `x` by the bound `x OP c`.
	fn tighten_by_bound(&mut self, model: &mut Model, x: VarRef, op: RelOp, c: IntVal) -> bool {
		match op {
			RelOp::Le => model.intersect_var_below(x, c),
			RelOp::Lt => model.intersect_var_below(x, c.saturating_sub(1)),
			RelOp::Ge => model.intersect_var_above(x, c),
			RelOp::Gt => model.intersect_var_above(x, c.saturating_add(1)),
			RelOp::Eq | RelOp::Ne => unreachable!("not an ordering relation"),
		}
	}

	/// Apply `set_in` and `set_not_in`: intersect the variable domain with
	/// the value set, or remove the value set from it, and retire the
	/// constraint.
	///
	/// The set argument must be constant; a variable set is a contract
	/// violation by the caller.
	pub(crate) fn presolve_set_in(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [x_arg, set_arg] = two_args(model, con, "set_in")?;
		let negated = model.constraints[con].tag == ConstraintTag::SetNotIn;
		let mask = constant_set(&set_arg)?;
		match operand(model, &x_arg)? {
			Operand::Val(v) => {
				if mask.contains(&v) != negated {
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
			}
			Operand::Free(x) => {
				let _ = if negated {
					model.subtract_var_set(x, &mask)
				} else {
					model.intersect_var_set(x, &mask)
				};
				model.deactivate(con);
			}
		}
		Ok(true)
	}

	/// Decide `set_in_reif` and `set_not_in_reif` when the variable domain is
	/// entirely inside or entirely outside the value set.
	pub(crate) fn presolve_set_in_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [x_arg, set_arg, reif] = three_args(model, con, "set_in_reif")?;
		let negated = model.constraints[con].tag == ConstraintTag::SetNotInReif;
		let mask = constant_set(&set_arg)?;
		let inside = match operand(model, &x_arg)? {
			Operand::Val(v) => Some(mask.contains(&v)),
			Operand::Free(x) => {
				let dom = &model.variables[x].domain;
				let overlap: IntSetVal = dom.intersect(&mask);
				if overlap.is_empty() {
					Some(false)
				} else if &overlap == dom {
					Some(true)
				} else {
					None
				}
			}
		};
		match inside {
			Some(b) => Ok(self.decide(model, con, &reif, IntVal::from(b != negated))),
			None => Ok(false),
		}
	}

	/// Reduce the product target when both factors are fixed.
	///
	/// Overflowing products and products outside the target domain are left
	/// to the solver; the latter is logged as a caution rather than turned
	/// into infeasibility here.
	pub(crate) fn presolve_int_times(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		if model.constraints[con].propagation_done {
			return Ok(false);
		}
		let [a, b, c] = three_args(model, con, "int_times")?;
		let (Operand::Val(u), Operand::Val(v)) = (operand(model, &a)?, operand(model, &b)?)
		else {
			return Ok(false);
		};
		let Some(product) = u.checked_mul(v) else {
			trace!(con = con.index(), "product overflows, left to the solver");
			return Ok(false);
		};
		self.fix_result(model, con, &c, product, "product")
	}

	/// Reduce the quotient target when both operands are fixed.
	pub(crate) fn presolve_int_div(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		if model.constraints[con].propagation_done {
			return Ok(false);
		}
		let [a, b, c] = three_args(model, con, "int_div")?;
		let (Operand::Val(u), Operand::Val(v)) = (operand(model, &a)?, operand(model, &b)?)
		else {
			return Ok(false);
		};
		if v == 0 {
			return Ok(false);
		}
		let Some(quotient) = u.checked_div(v) else {
			trace!(con = con.index(), "quotient overflows, left to the solver");
			return Ok(false);
		};
		self.fix_result(model, con, &c, quotient, "quotient")
	}

	/// Install a computed result value for the constant-operand arithmetic
	/// rules, or leave the constraint to the solver when the value is
	/// incompatible with the result domain.
	fn fix_result(
		&mut self,
		model: &mut Model,
		con: ConRef,
		result: &Argument,
		val: IntVal,
		what: &'static str,
	) -> Result<bool, PresolveError> {
		match operand(model, result)? {
			Operand::Val(w) if w == val => {
				model.deactivate(con);
				Ok(true)
			}
			Operand::Free(z) if model.var_contains(z, val) => {
				let _ = model.set_var_value(z, val);
				model.deactivate(con);
				Ok(true)
			}
			_ => {
				// TODO: force infeasibility here once the downstream solver
				// accepts it from these rules.
				warn!(
					con = con.index(),
					what, "computed value incompatible with result domain"
				);
				model.constraints[con].propagation_done = true;
				Ok(false)
			}
		}
	}

	/// Propagate `int_mod` with fixed operands, and strip a target variable
	/// designation whose variable has become fixed.
	pub(crate) fn presolve_int_mod(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let mut changed = false;
		if let Some(t) = model.constraints[con].target_variable {
			if model.var_has_one_value(t) {
				model.remove_target(con);
				changed = true;
			}
		}
		let [a, b, c] = three_args(model, con, "int_mod")?;
		if let (Operand::Val(u), Operand::Val(v)) = (operand(model, &a)?, operand(model, &b)?) {
			if v != 0 {
				let remainder = u % v;
				match operand(model, &c)? {
					Operand::Val(w) => {
						if w == remainder {
							model.deactivate(con);
						} else {
							model.set_as_false(con);
						}
						return Ok(true);
					}
					Operand::Free(z) => {
						if model.var_contains(z, remainder) {
							let _ = model.set_var_value(z, remainder);
							model.deactivate(con);
						} else {
							model.set_as_false(con);
						}
						return Ok(true);
					}
				}
			}
		}
		Ok(changed)
	}

	/// Propagate `int_plus` when two of its three arguments are fixed.
	pub(crate) fn presolve_int_plus(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b, c] = three_args(model, con, "int_plus")?;
		let ops = [
			operand(model, &a)?,
			operand(model, &b)?,
			operand(model, &c)?,
		];
		// a + b = c; solve for the single free argument.
		let (free, val) = match ops {
			[Operand::Val(u), Operand::Val(v), free] => (free, u.checked_add(v)),
			[Operand::Val(u), free, Operand::Val(w)] => (free, w.checked_sub(u)),
			[free, Operand::Val(v), Operand::Val(w)] => (free, w.checked_sub(v)),
			_ => return Ok(false),
		};
		let Some(val) = val else {
			return Ok(false);
		};
		match free {
			Operand::Val(x) => {
				if x == val {
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
			}
			Operand::Free(z) => {
				if model.var_contains(z, val) {
					let _ = model.set_var_value(z, val);
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
			}
		}
		Ok(true)
	}

	/// Record the absolute value relation of `int_abs` and simplify it when
	/// the origin is fixed or known non-negative.
	pub(crate) fn presolve_int_abs(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b] = two_args(model, con, "int_abs")?;
		match (operand(model, &a)?, operand(model, &b)?) {
			(Operand::Val(u), result) => {
				let val = u.abs();
				match result {
					Operand::Val(w) => {
						if w == val {
							model.deactivate(con);
						} else {
							model.set_as_false(con);
						}
					}
					Operand::Free(z) => {
						if model.var_contains(z, val) {
							let _ = model.set_var_value(z, val);
							model.deactivate(con);
						} else {
							model.set_as_false(con);
						}
					}
				}
				Ok(true)
			}
			(Operand::Free(x), result) => {
				if let Operand::Val(w) = result {
					// |x| = w restricts x to the two candidate values.
					if w < 0 {
						model.set_as_false(con);
					} else {
						let _ = model.intersect_var_values(x, &[-w, w]);
						model.deactivate(con);
					}
					return Ok(true);
				}
				if model.var_min(x) >= 0 {
					model.constraints[con].tag = ConstraintTag::IntEq;
					return Ok(true);
				}
				if let (Argument::Var(origin), Argument::Var(abs)) = (&a, &b) {
					if !self.abs_map.contains_key(abs) {
						let _ = self.abs_map.insert(*abs, *origin);
					}
				}
				Ok(false)
			}
		}
	}

	/// Propagate `int_min` and `int_max` when both operands are fixed.
	///
	/// The doubled-operand chain starters (`int_min(x, x, y)`) are left
	/// untouched; they are regrouped into array form by the cleanup pass.
	pub(crate) fn presolve_int_min_max(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [a, b, c] = three_args(model, con, "int_min")?;
		if a == b {
			return Ok(false);
		}
		let (Operand::Val(u), Operand::Val(v)) = (operand(model, &a)?, operand(model, &b)?)
		else {
			return Ok(false);
		};
		let val = if model.constraints[con].tag == ConstraintTag::IntMin {
			u.min(v)
		} else {
			u.max(v)
		};
		match operand(model, &c)? {
			Operand::Val(w) => {
				if w == val {
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
			}
			Operand::Free(z) => {
				if model.var_contains(z, val) {
					let _ = model.set_var_value(z, val);
					model.deactivate(con);
				} else {
					model.set_as_false(con);
				}
			}
		}
		Ok(true)
	}
}

/// Extract the two arguments of a binary constraint.
pub(crate) fn two_args(
	model: &Model,
	con: ConRef,
	name: &'static str,
) -> Result<[Argument; 2], PresolveError> {
	model.constraints[con].args.clone().try_into().map_err(
		|args: Vec<Argument>| PresolveError::InvalidNumArgs {
			name,
			found: args.len(),
			expected: 2,
		},
	)
}

/// Extract the three arguments of a ternary constraint.
pub(crate) fn three_args(
	model: &Model,
	con: ConRef,
	name: &'static str,
) -> Result<[Argument; 3], PresolveError> {
	model.constraints[con].args.clone().try_into().map_err(
		|args: Vec<Argument>| PresolveError::InvalidNumArgs {
			name,
			found: args.len(),
			expected: 3,
		},
	)
}

/// Extract a constant set argument as a range list.
///
/// The flat language only permits constant sets in `set_in` constraints; any
/// other argument shape is a contract violation by the caller.
fn constant_set(arg: &Argument) -> Result<IntSetVal, PresolveError> {
	match arg {
		Argument::IntList(vs) => Ok(crate::model::domain::range_list_from_values(vs)),
		Argument::IntInterval(lb, ub) if lb <= ub => Ok((*lb..=*ub).into()),
		Argument::IntInterval(_, _) => Ok(crate::model::domain::range_list_from_values(&[])),
		Argument::IntValue(v) => Ok((*v..=*v).into()),
		_ => Err(PresolveError::InvalidArgumentType {
			expected: "constant set",
			found: format!("{:?}", arg),
		}),
	}
}
