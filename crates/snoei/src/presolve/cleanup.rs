//! Terminal cleanup pass: normalize the presolved model into the shape the
//! downstream solver expects.
//!
//! The pass strips target variable designations that the solver cannot
//! honor, resolves variables that ended up defined by more than one
//! constraint, attaches targets to otherwise undefined reification Booleans,
//! and regroups chains of pairwise `int_min`/`int_max` and linear sums into
//! their array and pairwise-addition forms.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::{
	model::{Argument, ConRef, ConstraintTag, Model, VarRef},
	presolve::{linear_rules::linear_parts, PresolveError, Presolver},
};

impl Presolver {
	/// Run the terminal cleanup sub-passes in order.
	pub(crate) fn cleanup(&mut self, model: &mut Model) -> Result<(), PresolveError> {
		self.cleanup_targets(model)?;
		self.resolve_duplicate_targets(model);
		self.attach_reified_targets(model);
		self.regroup_min_max_chains(model);
		self.regroup_linear_sums(model)?;
		Ok(())
	}

	/// Strip target designations the downstream solver cannot honor, and
	/// canonicalize the coefficient sign of targeted linear equalities.
	fn cleanup_targets(&mut self, model: &mut Model) -> Result<(), PresolveError> {
		use ConstraintTag::*;
		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if !ct.active {
				continue;
			}
			let Some(target) = ct.target_variable else {
				continue;
			};
			if model.var_has_one_value(target) {
				model.remove_target(con);
				continue;
			}
			let strip = match ct.tag {
				ArrayVarIntElement | CountReif | SetInReif => true,
				BoolEqReif | BoolGeReif | BoolGtReif | BoolLeReif | BoolLtReif | BoolNeReif => {
					self.options.use_sat
				}
				// A table encoding will be used for large annotated
				// equalities; it cannot define a variable.
				IntLinEq => ct.strong_propagation && linear_parts(model, con)?.vars.len() > 3,
				_ => false,
			};
			if strip {
				trace!(con = con.index(), tag = %model.constraints[con].tag, "stripping target");
				model.remove_target(con);
				continue;
			}
			if model.constraints[con].tag == IntLinEq {
				self.normalize_target_coefficient(model, con)?;
			}
		}
		Ok(())
	}

	/// Negate a targeted linear equality whose target coefficient is `+1`,
	/// so that targets are uniformly carried with coefficient `-1`.
	fn normalize_target_coefficient(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<(), PresolveError> {
		let parts = linear_parts(model, con)?;
		let target = model.constraints[con]
			.target_variable
			.expect("caller checked the target");
		let Some(pos) = parts.vars.iter().position(|&v| v == target) else {
			return Ok(());
		};
		if parts.coefs[pos] != 1 {
			return Ok(());
		}
		let coefs = parts
			.coefs
			.iter()
			.map(|c| c.checked_neg())
			.collect::<Option<Vec<_>>>();
		let (Some(coefs), Some(rhs)) = (coefs, parts.rhs.checked_neg()) else {
			return Ok(());
		};
		let ct = &mut model.constraints[con];
		ct.args[0] = Argument::IntList(coefs);
		ct.args[2] = Argument::IntValue(rhs);
		Ok(())
	}

	/// For every variable targeted by more than one constraint, keep the
	/// smallest-arity definition (ties broken by non-reified over reified)
	/// and strip the target from the rest.
	fn resolve_duplicate_targets(&mut self, model: &mut Model) {
		let mut groups: BTreeMap<VarRef, Vec<ConRef>> = BTreeMap::new();
		for (con, ct) in model.constraints.iter_enumerated() {
			if ct.active {
				if let Some(t) = ct.target_variable {
					groups.entry(t).or_default().push(con);
				}
			}
		}
		for (var, cons) in groups {
			let keeper = cons
				.iter()
				.copied()
				.min_by_key(|&c| {
					let ct = &model.constraints[c];
					(ct.args.len(), ct.tag.is_reified(), c)
				})
				.expect("groups are non-empty");
			for c in cons {
				if c != keeper {
					debug!(con = c.index(), "multiple definitions, stripping target");
					model.constraints[c].target_variable = None;
				}
			}
			model.variables[var].defining_constraint = Some(keeper);
		}
	}

	/// Attach the Boolean argument of an untargeted reified comparison as
	/// its target, when that variable is not otherwise defined.
	fn attach_reified_targets(&mut self, model: &mut Model) {
		use ConstraintTag::*;
		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if !ct.active || ct.target_variable.is_some() {
				continue;
			}
			let eligible = match ct.tag {
				IntEqReif | IntGeReif | IntGtReif | IntLeReif | IntLtReif | IntNeReif => true,
				IntLinEqReif | IntLinGeReif | IntLinGtReif | IntLinLeReif | IntLinLtReif
				| IntLinNeReif => true,
				BoolEqReif | BoolGeReif | BoolGtReif | BoolLeReif | BoolLtReif | BoolNeReif => {
					!self.options.use_sat
				}
				_ => false,
			};
			if !eligible {
				continue;
			}
			let Some(&Argument::Var(b)) = ct.args.last() else {
				continue;
			};
			if model.variables[b].active
				&& model.variables[b].defining_constraint.is_none()
				&& !model.var_has_one_value(b)
			{
				trace!(con = con.index(), reif = %model.variables[b].name, "attaching target");
				model.set_target(con, b);
			}
		}
	}

	/// Regroup chains of pairwise `int_min`/`int_max` constraints into a
	/// single `minimum_int`/`maximum_int` over the collected operands.
	///
	/// A chain starts at a doubled-operand constraint `int_min(x, x, y)` and
	/// is extended by following constraints of the same tag that fold one
	/// new operand into the previous carry. The carries must be invisible
	/// outside the chain.
	fn regroup_min_max_chains(&mut self, model: &mut Model) {
		let mut chain: Vec<VarRef> = Vec::new();
		let mut carries: Vec<VarRef> = Vec::new();
		let mut chain_cons: Vec<ConRef> = Vec::new();
		let mut chain_tag = ConstraintTag::IntMin;

		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if !ct.active
				|| !matches!(ct.tag, ConstraintTag::IntMin | ConstraintTag::IntMax)
			{
				continue;
			}
			let [Argument::Var(a), Argument::Var(b), Argument::Var(c)] = *ct.args.as_slice()
			else {
				self.finalize_min_max_chain(model, &mut chain, &mut carries, &mut chain_cons);
				continue;
			};
			let tag = ct.tag;
			let extends = !chain_cons.is_empty()
				&& tag == chain_tag
				&& Some(&b) == carries.last()
				&& a != b && self.var_used_only_by(
					model,
					b,
					&[*chain_cons.last().expect("chain is non-empty"), con],
				);
			if extends {
				chain.push(a);
				carries.push(c);
				chain_cons.push(con);
				continue;
			}
			self.finalize_min_max_chain(model, &mut chain, &mut carries, &mut chain_cons);
			if a == b {
				// Chain starter: the doubled operand.
				chain.push(a);
				carries.push(c);
				chain_cons.push(con);
				chain_tag = tag;
			}
		}
		self.finalize_min_max_chain(model, &mut chain, &mut carries, &mut chain_cons);
	}

	/// Rewrite a completed min/max chain into its array form, retire the
	/// intermediate constraints, and deactivate the intermediate carries.
	fn finalize_min_max_chain(
		&mut self,
		model: &mut Model,
		chain: &mut Vec<VarRef>,
		carries: &mut Vec<VarRef>,
		chain_cons: &mut Vec<ConRef>,
	) {
		if chain_cons.len() < 2 {
			chain.clear();
			carries.clear();
			chain_cons.clear();
			return;
		}
		let start = chain_cons[0];
		let final_out = *carries.last().expect("chain is non-empty");
		debug!(
			con = start.index(),
			operands = chain.len(),
			"regrouping min/max chain"
		);
		for &c in &chain_cons[1..] {
			model.deactivate(c);
		}
		model.remove_target(start);
		let ct = &mut model.constraints[start];
		ct.tag = if ct.tag == ConstraintTag::IntMin {
			ConstraintTag::MinimumInt
		} else {
			ConstraintTag::MaximumInt
		};
		ct.args = vec![
			Argument::VarArray(chain.clone()),
			Argument::Var(final_out),
		];
		for &carry in &carries[..carries.len() - 1] {
			model.variables[carry].active = false;
		}
		if model.variables[final_out].defining_constraint.is_none() {
			model.set_target(start, final_out);
		}
		self.index_constraint(model, start);
		chain.clear();
		carries.clear();
		chain_cons.clear();
	}

	/// Rewrite chained linear sums into pairwise additions: when a linear
	/// sum extends a previously seen sum by one operand, the longer form
	/// becomes `int_plus(previous_carry, new_operand, new_carry)`.
	fn regroup_linear_sums(&mut self, model: &mut Model) -> Result<(), PresolveError> {
		let mut seen: Vec<(Vec<VarRef>, VarRef)> = Vec::new();
		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if !ct.active || ct.tag != ConstraintTag::IntLinEq {
				continue;
			}
			let parts = linear_parts(model, con)?;
			let n = parts.vars.len();
			if parts.rhs != 0
				|| n < 3
				|| parts.coefs[n - 1] != -1
				|| parts.coefs[..n - 1].iter().any(|&c| c != 1)
			{
				continue;
			}
			let xs = parts.vars[..n - 1].to_vec();
			let carry = parts.vars[n - 1];
			let matched = seen
				.iter()
				.find(|(prefix, _)| {
					prefix.len() + 1 == xs.len() && xs[..prefix.len()] == prefix[..]
				})
				.map(|&(_, prev_carry)| prev_carry);
			if let Some(prev_carry) = matched {
				if model.variables[prev_carry].active {
					let new_x = *xs.last().expect("sums have at least two operands");
					debug!(con = con.index(), "regrouping linear sum chain");
					if let Some(t) = model.constraints[con].target_variable {
						if t != carry && t != new_x && t != prev_carry {
							model.remove_target(con);
						}
					}
					let ct = &mut model.constraints[con];
					ct.tag = ConstraintTag::IntPlus;
					ct.args = vec![
						Argument::Var(prev_carry),
						Argument::Var(new_x),
						Argument::Var(carry),
					];
					self.index_constraint(model, con);
				}
			}
			seen.push((xs, carry));
		}
		Ok(())
	}
}
