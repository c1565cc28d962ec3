//! Rewrite rules for the integer linear constraint family: `int_lin_eq`,
//! `int_lin_le` and friends, and their reifications.
//!
//! Besides local simplification, the linear equality rules feed the
//! recognition maps of the presolver: two-variable equalities yield affine
//! index mappings and three-variable equalities yield two-dimensional index
//! mappings, both consumed by the element constraint rules.

use tracing::trace;

use crate::{
	helpers::{checked_linear_bounds, div_ceil},
	model::{Argument, ConRef, ConstraintTag, Model, RelOp, VarRef},
	presolve::{AffineMapping, Array2dMapping, PresolveError, Presolver},
	IntVal, NonZeroIntVal,
};

/// The decomposed argument vector of a linear constraint.
pub(crate) struct LinearParts {
	/// Coefficients of the summed terms.
	pub(crate) coefs: Vec<IntVal>,
	/// Variables of the summed terms.
	pub(crate) vars: Vec<VarRef>,
	/// Constant right-hand side.
	pub(crate) rhs: IntVal,
	/// Reification argument, for the reified tags.
	pub(crate) reif: Option<Argument>,
}

impl Presolver {
	/// Offer a linear constraint to the applicable linear rules in order.
	pub(crate) fn presolve_linear_family(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let mut changed = self.regroup_linear(model, con)?;
		changed |= self.canonicalize_strict_linear(model, con)?;
		changed |= self.presolve_linear(model, con)?;
		let tag = model.constraints[con].tag;
		if !model.constraints[con].active || !tag.is_linear() {
			return Ok(changed);
		}
		if tag.is_reified() {
			if tag == ConstraintTag::IntLinEqReif {
				changed |= self.check_int_lin_reif_bounds(model, con)?;
				if model.constraints[con].active {
					changed |= self.simplify_int_lin_eq_reif(model, con)?;
				}
			}
			return Ok(changed);
		}
		changed |= self.simplify_unary_linear(model, con)?;
		if !model.constraints[con].tag.is_linear() {
			return Ok(changed);
		}
		changed |= self.simplify_binary_linear(model, con)?;
		if !model.constraints[con].tag.is_linear() {
			return Ok(changed);
		}
		if model.constraints[con].tag == ConstraintTag::IntLinEq {
			changed |= self.create_linear_target(model, con)?;
			self.store_linear_mappings(model, con)?;
		}
		changed |= self.propagate_positive_linear(model, con)?;
		Ok(changed)
	}

	/// Combine repeated variables of a linear constraint: their coefficients
	/// are summed, and terms with a zero coefficient are dropped.
	fn regroup_linear(&mut self, model: &mut Model, con: ConRef) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		let target = model.constraints[con].target_variable;
		let mut coefs: Vec<IntVal> = Vec::with_capacity(parts.coefs.len());
		let mut vars: Vec<VarRef> = Vec::with_capacity(parts.vars.len());
		for (&c, &v) in parts.coefs.iter().zip(parts.vars.iter()) {
			if let Some(i) = vars.iter().position(|&w| w == v) {
				let Some(sum) = coefs[i].checked_add(c) else {
					return Ok(false);
				};
				coefs[i] = sum;
			} else {
				vars.push(v);
				coefs.push(c);
			}
		}
		let mut i = 0;
		while i < coefs.len() {
			// The target variable must remain among the arguments.
			if coefs[i] == 0 && target != Some(vars[i]) {
				let _ = coefs.remove(i);
				let _ = vars.remove(i);
			} else {
				i += 1;
			}
		}
		if coefs == parts.coefs && vars == parts.vars {
			return Ok(false);
		}
		trace!(con = con.index(), "regrouped linear constraint");
		let ct = &mut model.constraints[con];
		ct.args[0] = Argument::IntList(coefs);
		ct.args[1] = Argument::VarArray(vars);
		Ok(true)
	}

	/// Canonicalize the strict linear comparisons: `int_lin_gt(a, x, c)`
	/// becomes `int_lin_ge(a, x, c + 1)`, and dually for `lt`.
	fn canonicalize_strict_linear(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		use ConstraintTag::*;
		let (tag, delta) = match model.constraints[con].tag {
			IntLinGt => (IntLinGe, 1),
			IntLinGtReif => (IntLinGeReif, 1),
			IntLinLt => (IntLinLe, -1),
			IntLinLtReif => (IntLinLeReif, -1),
			_ => return Ok(false),
		};
		let parts = linear_parts(model, con)?;
		let Some(rhs) = parts.rhs.checked_add(delta) else {
			return Ok(false);
		};
		let ct = &mut model.constraints[con];
		ct.tag = tag;
		ct.args[2] = Argument::IntValue(rhs);
		Ok(true)
	}

	/// Evaluate a linear constraint whose variables are all fixed, and
	/// normalize the coefficient signs of one whose coefficients are all
	/// non-positive.
	fn presolve_linear(&mut self, model: &mut Model, con: ConRef) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("linear tags carry a comparison");

		if let Some(vals) = parts
			.vars
			.iter()
			.map(|&v| model.var_value(v))
			.collect::<Option<Vec<_>>>()
		{
			let mut sum: IntVal = 0;
			for (&c, &val) in parts.coefs.iter().zip(vals.iter()) {
				let Some(term) = c.checked_mul(val) else {
					return Ok(false);
				};
				let Some(s) = sum.checked_add(term) else {
					return Ok(false);
				};
				sum = s;
			}
			let holds = op.holds(sum, parts.rhs);
			match parts.reif {
				None => {
					if holds {
						model.deactivate(con);
					} else {
						model.set_as_false(con);
					}
				}
				Some(r) => {
					let ct = &mut model.constraints[con];
					ct.tag = ConstraintTag::BoolEq;
					ct.args = vec![r, Argument::IntValue(IntVal::from(holds))];
				}
			}
			return Ok(true);
		}

		let targeted = model.constraints[con]
			.target_variable
			.is_some_and(|t| parts.vars.contains(&t));
		if targeted
			|| parts.coefs.is_empty()
			|| parts.coefs.iter().any(|&c| c > 0)
			|| parts.coefs.iter().all(|&c| c == 0)
		{
			return Ok(false);
		}
		let coefs = parts
			.coefs
			.iter()
			.map(|c| c.checked_neg())
			.collect::<Option<Vec<_>>>();
		let (Some(coefs), Some(rhs)) = (coefs, parts.rhs.checked_neg()) else {
			return Ok(false);
		};
		let flipped = op.flip();
		let reified = model.constraints[con].tag.is_reified();
		trace!(con = con.index(), "normalized linear coefficient signs");
		let ct = &mut model.constraints[con];
		ct.tag = if reified {
			ConstraintTag::int_lin_cmp_reif(flipped)
		} else {
			ConstraintTag::int_lin_cmp(flipped)
		};
		ct.args[0] = Argument::IntList(coefs);
		ct.args[2] = Argument::IntValue(rhs);
		Ok(true)
	}

	/// Drop the linear wrapper of a single-term constraint: `c·x OP rhs`
	/// becomes `x OP rhs/c` when the division is exact.
	fn simplify_unary_linear(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		let [c] = parts.coefs.as_slice() else {
			return Ok(false);
		};
		let rhs = if *c == 1 {
			parts.rhs
		} else if *c > 0 && parts.rhs % c == 0 {
			parts.rhs / c
		} else {
			return Ok(false);
		};
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("linear tags carry a comparison");
		trace!(con = con.index(), "unwrapped unary linear constraint");
		let ct = &mut model.constraints[con];
		ct.tag = ConstraintTag::int_cmp(op);
		ct.args = vec![Argument::Var(parts.vars[0]), Argument::IntValue(rhs)];
		Ok(true)
	}

	/// Rewrite `x - y OP 0` and `-x + y OP 0` as the binary comparison of
	/// the two variables.
	fn simplify_binary_linear(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		if parts.rhs != 0 || parts.vars.len() != 2 {
			return Ok(false);
		}
		let (lhs, rhs) = match parts.coefs.as_slice() {
			[1, -1] => (parts.vars[0], parts.vars[1]),
			[-1, 1] => (parts.vars[1], parts.vars[0]),
			_ => return Ok(false),
		};
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("linear tags carry a comparison");
		trace!(con = con.index(), "unwrapped binary linear constraint");
		let ct = &mut model.constraints[con];
		ct.tag = ConstraintTag::int_cmp(op);
		ct.args = vec![Argument::Var(lhs), Argument::Var(rhs)];
		Ok(true)
	}

	/// Designate the `-1`-coefficient variable of a two-variable linear
	/// equality as the constraint target, when neither the constraint nor
	/// the variable is otherwise defined.
	fn create_linear_target(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		if model.constraints[con].target_variable.is_some() {
			return Ok(false);
		}
		let parts = linear_parts(model, con)?;
		if parts.vars.len() != 2 {
			return Ok(false);
		}
		let candidate = match parts.coefs.as_slice() {
			[-1, _] => parts.vars[0],
			[_, -1] => parts.vars[1],
			_ => return Ok(false),
		};
		if !model.variables[candidate].active
			|| model.variables[candidate].defining_constraint.is_some()
		{
			return Ok(false);
		}
		model.set_target(con, candidate);
		Ok(true)
	}

	/// Harvest affine and two-dimensional index mappings from linear
	/// equalities into the recognition maps.
	fn store_linear_mappings(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<(), PresolveError> {
		let parts = linear_parts(model, con)?;
		let Some(offset) = parts.rhs.checked_neg() else {
			return Ok(());
		};
		match (parts.coefs.as_slice(), parts.vars.as_slice()) {
			// -x + c·y = rhs: x = c·y - rhs
			(&[-1, c], &[x, y]) if c != 0 => {
				if !self.affine_map.contains_key(&x) {
					let _ = self.affine_map.insert(
						x,
						AffineMapping {
							var: y,
							coef: c,
							offset,
							constraint: con,
						},
					);
				}
			}
			// c·y - x = rhs: x = c·y - rhs
			(&[c, -1], &[y, x]) if c != 0 => {
				if !self.affine_map.contains_key(&x) {
					let _ = self.affine_map.insert(
						x,
						AffineMapping {
							var: y,
							coef: c,
							offset,
							constraint: con,
						},
					);
				}
			}
			// -x + c·y + z = rhs: x = c·y + z - rhs
			(&[-1, c, 1], &[x, y, z]) if c != 0 => {
				if !self.array2d_index_map.contains_key(&x) {
					let _ = self.array2d_index_map.insert(
						x,
						Array2dMapping {
							var1: y,
							coef: c,
							var2: z,
							offset,
							constraint: con,
						},
					);
				}
			}
			_ => {}
		}
		Ok(())
	}

	/// Bound the variables of a non-negative linear form: when the right-hand
	/// side, all coefficients and all variable minima are non-negative, each
	/// variable of an equality or `le` constraint is at most `rhs / coef`,
	/// and the variable of a unary `ge` constraint is at least
	/// `ceil(rhs / coef)`.
	fn propagate_positive_linear(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		if model.constraints[con].propagation_done {
			return Ok(false);
		}
		let parts = linear_parts(model, con)?;
		let op = model.constraints[con]
			.tag
			.comparison()
			.expect("linear tags carry a comparison");
		if parts.rhs < 0
			|| parts.coefs.iter().any(|&c| c < 0)
			|| parts.vars.iter().any(|&v| model.var_min(v) < 0)
		{
			return Ok(false);
		}
		let mut changed = false;
		match op {
			RelOp::Eq | RelOp::Le => {
				for (&c, &v) in parts.coefs.iter().zip(parts.vars.iter()) {
					if c > 0 {
						changed |= model.intersect_var_below(v, parts.rhs / c);
					}
				}
			}
			RelOp::Ge => {
				let (&[c], &[v]) = (parts.coefs.as_slice(), parts.vars.as_slice()) else {
					return Ok(false);
				};
				if c > 0 {
					let lb = div_ceil(parts.rhs, NonZeroIntVal::new(c).expect("checked above"));
					changed |= model.intersect_var_above(v, lb);
				}
			}
			_ => return Ok(false),
		}
		model.constraints[con].propagation_done = true;
		Ok(changed)
	}

	/// Decide the Boolean of `int_lin_eq_reif` from the exact bounds of the
	/// linear form.
	///
	/// Bound computations that would overflow, or involve an infinite
	/// domain, leave the constraint untouched.
	fn check_int_lin_reif_bounds(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		let bounds = parts
			.vars
			.iter()
			.map(|&v| (model.var_min(v), model.var_max(v)))
			.collect::<Vec<_>>();
		let Some((lb, ub)) = checked_linear_bounds(&parts.coefs, &bounds) else {
			return Ok(false);
		};
		let reif = parts.reif.expect("reified tag carries a reification");
		if parts.rhs < lb || parts.rhs > ub {
			return Ok(self.decide(model, con, &reif, 0));
		}
		if lb == ub && lb == parts.rhs {
			return Ok(self.decide(model, con, &reif, 1));
		}
		Ok(false)
	}

	/// Recognize `b1 + b2 = 1 <-> b0` over Boolean variables as
	/// `bool_ne_reif(b1, b2, b0)`, collapsing to `bool_eq` or `bool_not`
	/// when one operand is already fixed.
	fn simplify_int_lin_eq_reif(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let parts = linear_parts(model, con)?;
		if parts.rhs != 1 || parts.coefs != [1, 1] {
			return Ok(false);
		}
		let [b1, b2] = parts.vars.as_slice() else {
			return Ok(false);
		};
		let (b1, b2) = (*b1, *b2);
		let is_bool =
			|v: VarRef| model.var_min(v) >= 0 && model.var_max(v) <= 1;
		if !is_bool(b1) || !is_bool(b2) {
			return Ok(false);
		}
		let reif = parts.reif.expect("reified tag carries a reification");
		let ct_update = match (model.var_value(b1), model.var_value(b2)) {
			(None, None) => (
				ConstraintTag::BoolNeReif,
				vec![Argument::Var(b1), Argument::Var(b2), reif],
			),
			(Some(u), None) => (
				if u == 1 {
					ConstraintTag::BoolNot
				} else {
					ConstraintTag::BoolEq
				},
				vec![Argument::Var(b2), reif],
			),
			(None, Some(v)) => (
				if v == 1 {
					ConstraintTag::BoolNot
				} else {
					ConstraintTag::BoolEq
				},
				vec![Argument::Var(b1), reif],
			),
			// Both operands fixed is handled by the evaluation rule.
			(Some(_), Some(_)) => return Ok(false),
		};
		trace!(con = con.index(), "recognized Boolean sum reification");
		let ct = &mut model.constraints[con];
		ct.tag = ct_update.0;
		ct.args = ct_update.1;
		Ok(true)
	}
}

/// Decompose the argument vector of a linear constraint.
pub(crate) fn linear_parts(model: &Model, con: ConRef) -> Result<LinearParts, PresolveError> {
	let ct = &model.constraints[con];
	let expected = if ct.tag.is_reified() { 4 } else { 3 };
	if ct.args.len() != expected {
		return Err(PresolveError::InvalidNumArgs {
			name: "int_lin_eq",
			found: ct.args.len(),
			expected,
		});
	}
	let Argument::IntList(coefs) = &ct.args[0] else {
		return Err(PresolveError::InvalidArgumentType {
			expected: "coefficient list",
			found: format!("{:?}", ct.args[0]),
		});
	};
	let Argument::VarArray(vars) = &ct.args[1] else {
		return Err(PresolveError::InvalidArgumentType {
			expected: "variable array",
			found: format!("{:?}", ct.args[1]),
		});
	};
	let Some(rhs) = model.arg_value(&ct.args[2]) else {
		return Err(PresolveError::InvalidArgumentType {
			expected: "constant right-hand side",
			found: format!("{:?}", ct.args[2]),
		});
	};
	if coefs.len() != vars.len() {
		return Err(PresolveError::InvalidArgumentType {
			expected: "one coefficient per variable",
			found: format!("{} coefficients for {} variables", coefs.len(), vars.len()),
		});
	}
	Ok(LinearParts {
		coefs: coefs.clone(),
		vars: vars.clone(),
		rhs,
		reif: ct.tag.is_reified().then(|| ct.args[3].clone()),
	})
}
