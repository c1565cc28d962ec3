//! Variable equivalence bookkeeping: a union-find forest over variable
//! indices, and the pass that materializes recorded substitutions across the
//! whole model.
//!
//! Rules never collapse variables directly; they record equivalences through
//! [`Presolver::add_substitution`] and the driver flushes them with
//! [`Presolver::substitute_everywhere`] before any further rule runs. This
//! keeps every rule working on a consistent snapshot of the model.

use std::{collections::BTreeSet, mem};

use itertools::Itertools;
use tracing::trace;

use crate::{
	model::{Annotation, Argument, ConRef, Model, OutputSpec, VarRef},
	presolve::Presolver,
};

impl Presolver {
	/// Record that `from` has been found equal to `to` and can be replaced by
	/// it everywhere.
	///
	/// Both sides are first resolved to their current representatives. When
	/// exactly one side is a temporary variable, that side is eliminated, so
	/// that flattener-introduced variables disappear before model variables.
	/// Variables named in the search annotations are kept over unnamed ones
	/// for the same reason. The surviving variable absorbs the domain of the
	/// eliminated one and, if it had none, its defining constraint.
	pub(crate) fn add_substitution(&mut self, model: &mut Model, from: VarRef, to: VarRef) {
		let mut from = self.find_representative(from);
		let mut to = self.find_representative(to);
		if from == to {
			return;
		}
		let from_temp = model.variables[from].temporary;
		let to_temp = model.variables[to].temporary;
		if from_temp != to_temp {
			if to_temp {
				mem::swap(&mut from, &mut to);
			}
		} else if self.decision_variables.contains(&from)
			&& !self.decision_variables.contains(&to)
		{
			mem::swap(&mut from, &mut to);
		}

		trace!(
			from = %model.variables[from].name,
			to = %model.variables[to].name,
			"substituting variable"
		);
		match (
			model.variables[from].defining_constraint,
			model.variables[to].defining_constraint,
		) {
			(Some(c), Some(_)) => {
				// Both sides are defined; keep the definition of the survivor.
				model.variables[from].defining_constraint = None;
				model.constraints[c].target_variable = None;
			}
			(Some(c), None) => {
				model.variables[from].defining_constraint = None;
				model.variables[to].defining_constraint = Some(c);
				model.constraints[c].target_variable = Some(to);
			}
			(None, _) => {}
		}
		if model.variables[to].name.is_empty() {
			model.variables[to].name = model.variables[from].name.clone();
		}
		let mask = model.variables[from].domain.clone();
		let _ = model.intersect_var_set(to, &mask);
		model.variables[from].active = false;
		let _ = self.var_representative_map.insert(from, to);
		self.stats.vars_unified += 1;
	}

	/// Resolve a variable to the root of its equivalence class, compressing
	/// the path along the way.
	pub(crate) fn find_representative(&mut self, var: VarRef) -> VarRef {
		let mut root = var;
		while let Some(&parent) = self.var_representative_map.get(&root) {
			if parent == root {
				break;
			}
			root = parent;
		}
		let mut cur = var;
		while cur != root {
			let next = self.var_representative_map[&cur];
			let _ = self.var_representative_map.insert(cur, root);
			cur = next;
		}
		root
	}

	/// Materialize all recorded substitutions: rewrite every variable
	/// reference in constraints, search annotations, and output
	/// specifications to its representative, then merge the domains of each
	/// eliminated variable into its representative.
	///
	/// The union-find forest is cleared afterwards; eliminated variables are
	/// inactive and are never referenced again.
	pub(crate) fn substitute_everywhere(&mut self, model: &mut Model) {
		let froms = self.var_representative_map.keys().copied().collect_vec();
		let pairs = froms
			.into_iter()
			.map(|from| (from, self.find_representative(from)))
			.collect_vec();

		// Constraints referencing an eliminated variable, per reverse index.
		let mut cons: BTreeSet<ConRef> = BTreeSet::new();
		for (from, _) in &pairs {
			if let Some(referencing) = self.var_to_constraints.get(from) {
				cons.extend(referencing.iter().copied());
			}
		}
		for con in cons {
			if !model.constraints[con].active {
				continue;
			}
			let mut introduced = Vec::new();
			for arg in model.constraints[con].args.iter_mut() {
				match arg {
					Argument::Var(v) => {
						if let Some(r) = resolve(&pairs, *v) {
							*v = r;
							introduced.push(r);
						}
					}
					Argument::VarArray(vs) => {
						for v in vs.iter_mut() {
							if let Some(r) = resolve(&pairs, *v) {
								*v = r;
								introduced.push(r);
							}
						}
					}
					_ => {}
				}
			}
			if let Some(t) = model.constraints[con].target_variable {
				if let Some(r) = resolve(&pairs, t) {
					model.constraints[con].target_variable = Some(r);
				}
			}
			for v in introduced {
				let _ = self.var_to_constraints.entry(v).or_default().insert(con);
			}
		}

		let mut anns = mem::take(&mut model.search_annotations);
		for ann in anns.iter_mut() {
			substitute_annotation(&pairs, ann);
		}
		model.search_annotations = anns;

		for out in model.outputs.iter_mut() {
			match out {
				OutputSpec::Var { var, .. } => {
					if let Some(r) = resolve(&pairs, *var) {
						*var = r;
					}
				}
				OutputSpec::VarArray { vars, .. } => {
					for v in vars.iter_mut() {
						if let Some(r) = resolve(&pairs, *v) {
							*v = r;
						}
					}
				}
			}
		}

		for (from, to) in &pairs {
			if self.decision_variables.remove(from) {
				let _ = self.decision_variables.insert(*to);
			}
		}
		self.substitute_aux_maps(&pairs);

		// Preserve any tightening applied to an eliminated variable after its
		// merge.
		for (from, to) in &pairs {
			let mask = model.variables[*from].domain.clone();
			let _ = model.intersect_var_set(*to, &mask);
		}
		self.var_representative_map.clear();
	}

	/// Rewrite the variables recorded in the auxiliary maps to their
	/// representatives, so later map consumers do not resurrect eliminated
	/// variables.
	fn substitute_aux_maps(&mut self, pairs: &[(VarRef, VarRef)]) {
		for (_, (a, b)) in self.difference_map.iter_mut() {
			if let Some(r) = resolve(pairs, *a) {
				*a = r;
			}
			if let Some(r) = resolve(pairs, *b) {
				*b = r;
			}
		}
		for (_, v) in self.abs_map.iter_mut() {
			if let Some(r) = resolve(pairs, *v) {
				*v = r;
			}
		}
		for (_, m) in self.affine_map.iter_mut() {
			if let Some(r) = resolve(pairs, m.var) {
				m.var = r;
			}
		}
		for (_, m) in self.array2d_index_map.iter_mut() {
			if let Some(r) = resolve(pairs, m.var1) {
				m.var1 = r;
			}
			if let Some(r) = resolve(pairs, m.var2) {
				m.var2 = r;
			}
		}
		for (_, b) in self.int_eq_reif_map.iter_mut() {
			if let Some(r) = resolve(pairs, *b) {
				*b = r;
			}
		}
	}
}

/// Look up the representative of `var` among the resolved substitution pairs.
fn resolve(pairs: &[(VarRef, VarRef)], var: VarRef) -> Option<VarRef> {
	pairs
		.iter()
		.find_map(|&(from, to)| (from == var).then_some(to))
}

/// Rewrite the variables of an annotation tree to their representatives.
fn substitute_annotation(pairs: &[(VarRef, VarRef)], ann: &mut Annotation) {
	match ann {
		Annotation::Call(_, args) | Annotation::List(args) => {
			for arg in args.iter_mut() {
				substitute_annotation(pairs, arg);
			}
		}
		Annotation::Var(v) => {
			if let Some(r) = resolve(pairs, *v) {
				*v = r;
			}
		}
		Annotation::VarArray(vs) => {
			for v in vs.iter_mut() {
				if let Some(r) = resolve(pairs, *v) {
					*v = r;
				}
			}
		}
		Annotation::Identifier(_) | Annotation::IntValue(_) | Annotation::Interval(_, _) => {}
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		model::{Annotation, Argument, ConstraintTag, Model, OutputSpec},
		presolve::Presolver,
	};

	#[test]
	fn test_find_representative_compresses() {
		let mut prb = Model::default();
		let mut slv = Presolver::default();
		let a = prb.new_int_var("a", (0..=9).into());
		let b = prb.new_int_var("b", (0..=9).into());
		let c = prb.new_int_var("c", (0..=9).into());

		slv.add_substitution(&mut prb, a, b);
		slv.add_substitution(&mut prb, b, c);
		let root = slv.find_representative(a);
		assert_eq!(root, slv.find_representative(root));
		assert_eq!(slv.var_representative_map[&a], root);
	}

	#[test]
	fn test_temporary_side_is_eliminated() {
		let mut prb = Model::default();
		let mut slv = Presolver::default();
		let x = prb.new_int_var("x", (0..=9).into());
		let t = prb.new_temp_var("t", (2..=12).into());

		slv.add_substitution(&mut prb, x, t);
		assert!(!prb.variables[t].active);
		assert!(prb.variables[x].active);
		// The survivor holds the intersection of both domains.
		assert_eq!(prb.var_min(x), 2);
		assert_eq!(prb.var_max(x), 9);
	}

	#[test]
	fn test_substitute_everywhere() {
		let mut prb = Model::default();
		let mut slv = Presolver::default();
		let x = prb.new_int_var("x", (0..=9).into());
		let y = prb.new_temp_var("y", (0..=9).into());
		let z = prb.new_int_var("z", (0..=9).into());
		let con = prb.add_constraint(
			ConstraintTag::IntLinEq,
			vec![
				Argument::IntList(vec![1, 1]),
				Argument::VarArray(vec![y, z]),
				Argument::IntValue(5),
			],
		);
		prb.search_annotations = vec![Annotation::Call(
			"int_search".to_owned(),
			vec![Annotation::VarArray(vec![y, z])],
		)];
		prb.outputs = vec![OutputSpec::Var {
			name: "y".to_owned(),
			var: y,
		}];

		slv.build_reverse_index(&prb);
		slv.add_substitution(&mut prb, y, x);
		slv.substitute_everywhere(&mut prb);
		assert_eq!(
			prb.constraints[con].args[1],
			Argument::VarArray(vec![x, z])
		);
		assert_eq!(
			prb.search_annotations[0],
			Annotation::Call(
				"int_search".to_owned(),
				vec![Annotation::VarArray(vec![x, z])]
			)
		);
		assert_eq!(
			prb.outputs[0],
			OutputSpec::Var {
				name: "y".to_owned(),
				var: x
			}
		);
		assert!(slv.var_representative_map.is_empty());
	}
}
