//! Rewrite rules for the element constraints `array_int_element` and
//! `array_var_int_element`.
//!
//! Besides local domain reasoning, these rules consume the affine and
//! two-dimensional index mappings harvested from linear equalities: an
//! element access through a flattened index computation is rewritten to
//! index the (resampled) array directly, eliminating the intermediate index
//! variable.

use tracing::trace;

use crate::{
	helpers::is_sentinel,
	model::{Argument, ConRef, ConstraintTag, Model, VarRef},
	presolve::{
		int_rules::three_args, var_in_outputs, AffineMapping, Array2dMapping, PresolveError,
		Presolver,
	},
	IntVal,
};

impl Presolver {
	/// Simplify `array_int_element(index, values, target)`.
	pub(crate) fn presolve_array_int_element(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		if model.constraints[con].args.len() == 5 {
			// Already rewritten into the two-dimensional form.
			return Ok(false);
		}
		let [idx_arg, arr_arg, target] = three_args(model, con, "array_int_element")?;
		let Argument::IntList(values) = &arr_arg else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "integer array",
				found: format!("{:?}", arr_arg),
			});
		};
		let mut values = values.clone();
		let len = values.len() as IntVal;

		if let Some(i0) = model.arg_value(&idx_arg) {
			if (1..=len).contains(&i0) {
				let val = values[(i0 - 1) as usize];
				let ct = &mut model.constraints[con];
				ct.tag = ConstraintTag::IntEq;
				ct.args = vec![target, Argument::IntValue(val)];
			} else {
				model.set_as_false(con);
			}
			return Ok(true);
		}
		let Some(i) = idx_arg.var() else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "variable index",
				found: format!("{:?}", idx_arg),
			});
		};
		let mut changed = model.intersect_var_interval(i, 1, len);

		if let Some(&m) = self.affine_map.get(&i) {
			if self.rewrite_affine_element(model, con, i, m, &values, &target)? {
				return Ok(true);
			}
		}
		if let Some(&m) = self.array2d_index_map.get(&i) {
			if self.rewrite_array2d_element(model, con, i, m, &values, &target)? {
				return Ok(true);
			}
		}

		// Truncate the tail of the array that the index can no longer reach.
		let ub = model.var_max(i);
		if ub >= 1 && ub < len {
			values.truncate(ub as usize);
			model.constraints[con].args[1] = Argument::IntList(values.clone());
			changed = true;
		}

		// A contiguous run of increasing values makes the element constraint
		// a mere offset between target and index.
		if !values.is_empty() && values.windows(2).all(|w| w[1] == w[0] + 1) {
			let start = values[0];
			if let Some(tv) = model.arg_value(&target) {
				if let Some(iv) = tv.checked_sub(start).and_then(|d| d.checked_add(1)) {
					let _ = model.set_var_value(i, iv);
					model.deactivate(con);
					return Ok(true);
				}
			} else if let Some(t) = target.var() {
				trace!(con = con.index(), "element over contiguous values");
				let ct = &mut model.constraints[con];
				if start == 1 {
					ct.tag = ConstraintTag::IntEq;
					ct.args = vec![Argument::Var(t), Argument::Var(i)];
					return Ok(true);
				} else if let Some(offset) = 1_i64.checked_sub(start) {
					// target = index + start - 1
					ct.tag = ConstraintTag::IntLinEq;
					ct.args = vec![
						Argument::IntList(vec![-1, 1]),
						Argument::VarArray(vec![t, i]),
						Argument::IntValue(offset),
					];
					return Ok(true);
				}
			}
		}

		// Filter the target domain by the reachable values, and the index
		// domain by the values the target can still take.
		let in_range = |vi: IntVal| (1..=values.len() as IntVal).contains(&vi);
		if let Some(t) = target.var() {
			let reachable: Vec<IntVal> = model
				.var_values(i)
				.filter(|&vi| in_range(vi))
				.map(|vi| values[(vi - 1) as usize])
				.collect();
			changed |= model.intersect_var_values(t, &reachable);
			let valid: Vec<IntVal> = model
				.var_values(i)
				.filter(|&vi| in_range(vi) && model.var_contains(t, values[(vi - 1) as usize]))
				.collect();
			changed |= model.intersect_var_values(i, &valid);
		} else if let Some(tv) = model.arg_value(&target) {
			let valid: Vec<IntVal> = model
				.var_values(i)
				.filter(|&vi| in_range(vi) && values[(vi - 1) as usize] == tv)
				.collect();
			changed |= model.intersect_var_values(i, &valid);
		}
		Ok(changed)
	}

	/// Rewrite an element constraint whose index is a known affine function
	/// `i = coef·j + offset` to be indexed by `j` directly.
	///
	/// The array is resampled at the positions the mapping can reach, the
	/// mapping constraint is deactivated, and the now unused index variable
	/// is retired.
	fn rewrite_affine_element(
		&mut self,
		model: &mut Model,
		con: ConRef,
		index: VarRef,
		m: AffineMapping,
		values: &[IntVal],
		target: &Argument,
	) -> Result<bool, PresolveError> {
		let j = m.var;
		if j == index
			|| !model.variables[j].active
			|| !model.constraints[m.constraint].active
			|| m.constraint == con
			|| m.coef <= 0
		{
			return Ok(false);
		}
		if !self.var_used_only_by(model, index, &[con, m.constraint]) {
			return Ok(false);
		}
		if is_sentinel(model.var_min(j)) || is_sentinel(model.var_max(j)) {
			return Ok(false);
		}
		let len = values.len() as IntVal;
		let position = |vj: IntVal| m.coef.checked_mul(vj).and_then(|p| p.checked_add(m.offset));
		let valid: Vec<IntVal> = model
			.var_values(j)
			.filter(|&vj| {
				vj >= 1 && position(vj).is_some_and(|p| (1..=len).contains(&p))
			})
			.collect();
		let Some(&new_len) = valid.last() else {
			model.set_as_false(con);
			return Ok(true);
		};
		let _ = model.intersect_var_values(j, &valid);

		let mut new_values = Vec::with_capacity(new_len as usize);
		for vj in 1..=new_len {
			let val = match position(vj) {
				// Positions outside the array are unreachable after the
				// domain reduction of `j`; their slots are mere padding.
				Some(p) if (1..=len).contains(&p) => values[(p - 1) as usize],
				_ => values[0],
			};
			new_values.push(val);
		}
		trace!(
			con = con.index(),
			index = %model.variables[index].name,
			mapped = %model.variables[j].name,
			"rewriting element through affine index mapping"
		);
		let ct = &mut model.constraints[con];
		ct.args = vec![
			Argument::Var(j),
			Argument::IntList(new_values),
			target.clone(),
		];
		model.deactivate(m.constraint);
		debug_assert!(model.variables[index].defining_constraint.is_none());
		model.variables[index].active = false;
		let _ = self.affine_map.remove(&index);
		self.index_constraint(model, con);
		Ok(true)
	}

	/// Rewrite an element constraint whose index is a known two-dimensional
	/// index computation `i = coef·v1 + v2 + offset` into the
	/// two-dimensional element form: an index variable pair plus a
	/// coefficient pair and a base offset.
	fn rewrite_array2d_element(
		&mut self,
		model: &mut Model,
		con: ConRef,
		index: VarRef,
		m: Array2dMapping,
		values: &[IntVal],
		target: &Argument,
	) -> Result<bool, PresolveError> {
		if m.var1 == index
			|| m.var2 == index
			|| !model.variables[m.var1].active
			|| !model.variables[m.var2].active
			|| !model.constraints[m.constraint].active
			|| m.constraint == con
			|| m.coef <= 0
		{
			return Ok(false);
		}
		if !self.var_used_only_by(model, index, &[con, m.constraint]) {
			return Ok(false);
		}
		trace!(
			con = con.index(),
			index = %model.variables[index].name,
			"rewriting element through 2d index mapping"
		);
		let ct = &mut model.constraints[con];
		ct.args = vec![
			Argument::VarArray(vec![m.var1, m.var2]),
			Argument::IntList(values.to_vec()),
			target.clone(),
			Argument::IntList(vec![m.coef, 1]),
			Argument::IntValue(m.offset),
		];
		model.deactivate(m.constraint);
		debug_assert!(model.variables[index].defining_constraint.is_none());
		model.variables[index].active = false;
		let _ = self.array2d_index_map.remove(&index);
		self.index_constraint(model, con);
		Ok(true)
	}

	/// Simplify `array_var_int_element(index, vars, target)`: resolve a
	/// fixed index into a plain equality and downgrade to
	/// `array_int_element` once every element variable is fixed.
	pub(crate) fn presolve_array_var_int_element(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		let [idx_arg, arr_arg, target] = three_args(model, con, "array_var_int_element")?;
		let Argument::VarArray(elems) = &arr_arg else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "variable array",
				found: format!("{:?}", arr_arg),
			});
		};
		let elems = elems.clone();
		let len = elems.len() as IntVal;

		if let Some(i0) = model.arg_value(&idx_arg) {
			if (1..=len).contains(&i0) {
				let elem = elems[(i0 - 1) as usize];
				let ct = &mut model.constraints[con];
				ct.tag = ConstraintTag::IntEq;
				ct.args = vec![target, Argument::Var(elem)];
			} else {
				model.set_as_false(con);
			}
			return Ok(true);
		}
		let Some(i) = idx_arg.var() else {
			return Err(PresolveError::InvalidArgumentType {
				expected: "variable index",
				found: format!("{:?}", idx_arg),
			});
		};
		let changed = model.intersect_var_interval(i, 1, len);

		if let Some(values) = elems
			.iter()
			.map(|&v| model.var_value(v))
			.collect::<Option<Vec<_>>>()
		{
			trace!(con = con.index(), "downgrading element over fixed variables");
			let ct = &mut model.constraints[con];
			ct.tag = ConstraintTag::ArrayIntElement;
			ct.args[1] = Argument::IntList(values);
			return Ok(true);
		}
		Ok(changed)
	}

	/// Whether every active constraint referencing the variable is among the
	/// allowed ones, and the variable is visible to neither the search
	/// annotations nor the output specifications.
	pub(crate) fn var_used_only_by(
		&self,
		model: &Model,
		var: VarRef,
		allowed: &[ConRef],
	) -> bool {
		if self.decision_variables.contains(&var) || var_in_outputs(model, var) {
			return false;
		}
		let Some(referencing) = self.var_to_constraints.get(&var) else {
			return true;
		};
		referencing.iter().all(|&c| {
			allowed.contains(&c)
				|| !model.constraints[c].active
				|| !model.constraints[c].references(var)
		})
	}
}
