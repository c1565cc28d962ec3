//! The rule-driven rewriting engine of the presolver.
//!
//! [`Presolver::run`] repeatedly offers every active constraint of a
//! [`Model`] to a library of rewrite rules until a full sweep no longer
//! changes the model. Rules tighten variable domains, rewrite constraints
//! into cheaper forms, deactivate redundant constraints, and record variable
//! equivalences. Whenever equivalences have been recorded, the current sweep
//! is aborted, the substitution is materialized across the entire model, and
//! the sweep restarts, so that no rule ever observes a reference to a
//! substituted-away variable.

pub(crate) mod bool_rules;
pub(crate) mod cleanup;
pub(crate) mod element_rules;
pub(crate) mod int_rules;
pub(crate) mod linear_rules;
pub(crate) mod reify_rules;
pub(crate) mod unify;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::{
	model::{Annotation, Argument, ConRef, ConstraintTag, Model, VarRef},
	IntVal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A discovered relation `var = coef · mapped + offset`, recorded so that
/// element constraints indexed by `var` can be rewritten to be indexed by the
/// mapped variable directly.
pub(crate) struct AffineMapping {
	/// The variable that `var` is an affine function of.
	pub(crate) var: VarRef,
	/// Multiplier of the mapped variable.
	pub(crate) coef: IntVal,
	/// Constant offset of the mapping.
	pub(crate) offset: IntVal,
	/// The constraint the mapping was harvested from.
	pub(crate) constraint: ConRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A discovered relation `var = coef · var1 + var2 + offset`, the index shape
/// produced by flattening two-dimensional array accesses.
pub(crate) struct Array2dMapping {
	/// The major (scaled) index variable.
	pub(crate) var1: VarRef,
	/// Multiplier of the major index variable.
	pub(crate) coef: IntVal,
	/// The minor index variable.
	pub(crate) var2: VarRef,
	/// Constant offset of the mapping.
	pub(crate) offset: IntVal,
	/// The constraint the mapping was harvested from.
	pub(crate) constraint: ConRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A constraint operand resolved against the current variable domains:
/// either a known value, or a variable whose value is still free.
pub(crate) enum Operand {
	/// The operand resolves to this single value.
	Val(IntVal),
	/// The operand is a variable with more than one possible value.
	Free(VarRef),
}

/// Resolve an argument that must be a single variable or value.
///
/// A variable whose domain holds exactly one value resolves to that value.
pub(crate) fn operand(model: &Model, arg: &Argument) -> Result<Operand, PresolveError> {
	if let Some(v) = model.arg_value(arg) {
		return Ok(Operand::Val(v));
	}
	match arg {
		Argument::Var(v) => Ok(Operand::Free(*v)),
		_ => Err(PresolveError::InvalidArgumentType {
			expected: "variable or value",
			found: format!("{:?}", arg),
		}),
	}
}

/// Whether the given variable is mentioned by any output specification.
pub(crate) fn var_in_outputs(model: &Model, var: VarRef) -> bool {
	model.outputs.iter().any(|out| match out {
		crate::model::OutputSpec::Var { var: v, .. } => *v == var,
		crate::model::OutputSpec::VarArray { vars, .. } => vars.contains(&var),
	})
}

/// Force an argument to take the given value.
///
/// A variable argument has its domain reduced (possibly to the empty domain,
/// which records infeasibility). A constant argument with a conflicting value
/// rewrites the constraint into the unsatisfiable constant constraint.
pub(crate) fn force_arg(model: &mut Model, con: ConRef, arg: &Argument, val: IntVal) -> bool {
	match arg {
		Argument::Var(v) => model.set_var_value(*v, val),
		_ => {
			if model.arg_value(arg) == Some(val) {
				false
			} else {
				model.set_as_false(con);
				true
			}
		}
	}
}

#[derive(Error, Debug)]
/// Errors raised when the model handed to the presolver violates the shape
/// contract of the flat modeling language.
///
/// Model infeasibility is never an error: it is recorded in the model itself,
/// as an unsatisfiable constant constraint or an empty variable domain, and
/// left for the downstream solver to detect.
pub enum PresolveError {
	#[error("argument found of type `{found}', expected `{expected}'")]
	/// A constraint carried an argument of the wrong type.
	InvalidArgumentType {
		/// Expected type of the argument.
		expected: &'static str,
		/// Type of the argument found.
		found: String,
	},
	#[error("constraints with identifier `{name}' must have {expected} arguments, found {found}")]
	/// A constraint carried an invalid number of arguments.
	InvalidNumArgs {
		/// Identifier of the constraint.
		name: &'static str,
		/// Number of arguments found.
		found: usize,
		/// Number of arguments expected.
		expected: usize,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Configuration of a [`Presolver`] instance.
pub struct PresolveOptions {
	/// Whether the downstream solver lowers reified Boolean constraints onto
	/// a SAT engine.
	///
	/// When set, the terminal cleanup pass strips target variable
	/// annotations from reified Boolean comparisons, as the SAT layer cannot
	/// honor them.
	pub use_sat: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
/// Statistical information about a presolver run.
pub struct PresolveStatistics {
	/// Number of constraints that were deactivated.
	deactivated: u32,
	/// Number of individual rule applications that changed the model.
	rule_applications: u32,
	/// Number of variables removed by substitution.
	vars_unified: u32,
}

#[derive(Debug, Default)]
/// The presolver: a library of rewrite rules, the auxiliary maps populated by
/// its recognition rules, and the variable equivalence bookkeeping.
///
/// A `Presolver` instance borrows a [`Model`] mutably for the duration of
/// [`Presolver::run`] and rewrites it in place. The auxiliary maps live for
/// the duration of a run.
pub struct Presolver {
	/// Configuration of the run.
	options: PresolveOptions,
	/// Map from a variable to `(a, b)` such that the variable equals `a - b`.
	pub(crate) difference_map: BTreeMap<VarRef, (VarRef, VarRef)>,
	/// Map from a variable to the variable it is the absolute value of.
	pub(crate) abs_map: BTreeMap<VarRef, VarRef>,
	/// Map from a variable to an affine mapping that defines it.
	pub(crate) affine_map: BTreeMap<VarRef, AffineMapping>,
	/// Map from a variable to a two-dimensional index mapping that defines
	/// it.
	pub(crate) array2d_index_map: BTreeMap<VarRef, Array2dMapping>,
	/// Memoized reified equalities: `(x, y)` (normalized) to the Boolean
	/// variable reifying `x = y`.
	pub(crate) int_eq_reif_map: BTreeMap<(VarRef, VarRef), VarRef>,
	/// Union-find forest recording variables replaced by a representative.
	pub(crate) var_representative_map: BTreeMap<VarRef, VarRef>,
	/// Reverse index from variables to the constraints referencing them.
	pub(crate) var_to_constraints: BTreeMap<VarRef, BTreeSet<ConRef>>,
	/// Variables that occur in the search annotations of the model.
	pub(crate) decision_variables: BTreeSet<VarRef>,
	/// Statistics of the current run.
	pub(crate) stats: PresolveStatistics,
}

impl Default for PresolveOptions {
	fn default() -> Self {
		Self { use_sat: true }
	}
}

impl PresolveStatistics {
	/// Returns the number of constraints deactivated by the run.
	pub fn deactivated_constraints(&self) -> u32 {
		self.deactivated
	}

	/// Returns the number of rule applications that changed the model.
	pub fn rule_applications(&self) -> u32 {
		self.rule_applications
	}

	/// Returns the number of variables removed by substitution.
	pub fn unified_variables(&self) -> u32 {
		self.vars_unified
	}
}

impl Presolver {
	/// Create a presolver with the given configuration.
	pub fn new(options: PresolveOptions) -> Self {
		Self {
			options,
			..Self::default()
		}
	}

	/// Rewrite the model into an equivalent but simpler one.
	///
	/// Returns the statistics of the run. Shape violations in the input
	/// model, e.g. a `set_in` constraint whose set argument is not constant,
	/// are reported as an error; an infeasible model is not an error and is
	/// instead recorded in the model itself.
	pub fn run(&mut self, model: &mut Model) -> Result<PresolveStatistics, PresolveError> {
		if self.var_to_constraints.is_empty() {
			self.build_reverse_index(model);
		}
		self.first_pass_scan(model);
		self.merge_reified_comparisons(model);
		if !self.var_representative_map.is_empty() {
			self.substitute_everywhere(model);
		}

		// Prime pass: eliminate bool2int channeling before the main loop so
		// that the remaining rules see a single variable per channel.
		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if ct.active && ct.tag == ConstraintTag::Bool2Int {
				let _ = self.presolve_bool2int(model, con)?;
			}
		}
		if !self.var_representative_map.is_empty() {
			self.substitute_everywhere(model);
		}

		loop {
			let mut changed = false;
			for con in (0..model.constraints.len()).map(ConRef::from_usize) {
				if !model.constraints[con].active {
					continue;
				}
				if self.presolve_one_constraint(model, con)? {
					changed = true;
					self.stats.rule_applications += 1;
				}
				if !self.var_representative_map.is_empty() {
					// Flush the recorded substitution before any other rule
					// can observe the substituted-away variables.
					break;
				}
			}
			if !self.var_representative_map.is_empty() {
				self.substitute_everywhere(model);
				changed = true;
			}
			if !changed {
				break;
			}
		}

		self.cleanup(model)?;
		self.stats.deactivated = model.constraints.iter().filter(|c| !c.active).count() as u32;
		debug!(
			rule_applications = self.stats.rule_applications,
			vars_unified = self.stats.vars_unified,
			deactivated = self.stats.deactivated,
			"presolve finished"
		);
		Ok(self.stats.clone())
	}

	/// Force the given argument to `val` and retire the constraint.
	///
	/// Used when a rule has fully decided a constraint: the remaining free
	/// argument is fixed and the constraint is deactivated, or rewritten into
	/// the unsatisfiable constant constraint when the argument is a
	/// conflicting constant.
	pub(crate) fn decide(
		&mut self,
		model: &mut Model,
		con: ConRef,
		arg: &Argument,
		val: IntVal,
	) -> bool {
		let _ = force_arg(model, con, arg, val);
		if model.constraints[con].tag != ConstraintTag::FalseConstraint {
			model.deactivate(con);
		}
		true
	}

	/// Populate the reverse index from variables to constraints.
	fn build_reverse_index(&mut self, model: &Model) {
		for (con, ct) in model.constraints.iter_enumerated() {
			if !ct.active {
				continue;
			}
			for v in ct.vars() {
				let _ = self.var_to_constraints.entry(v).or_default().insert(con);
			}
		}
	}

	/// Register the variables currently referenced by the constraint in the
	/// reverse index.
	///
	/// Called by rules after they rewrite constraint arguments. Stale entries
	/// for variables no longer referenced are harmless; consumers verify the
	/// reference before acting on it.
	pub(crate) fn index_constraint(&mut self, model: &Model, con: ConRef) {
		for v in model.constraints[con].vars() {
			let _ = self.var_to_constraints.entry(v).or_default().insert(con);
		}
	}

	/// Scan the model once before the main loop: populate the difference map
	/// and harvest the decision variables from the search annotations.
	fn first_pass_scan(&mut self, model: &Model) {
		for (con, ct) in model.constraints.iter_enumerated() {
			if ct.active && ct.tag == ConstraintTag::IntLinEq {
				self.store_difference(model, con);
			}
		}
		for ann in &model.search_annotations {
			self.harvest_decision_variables(ann);
		}
	}

	/// Collect every variable mentioned in an annotation tree.
	fn harvest_decision_variables(&mut self, ann: &Annotation) {
		match ann {
			Annotation::Call(_, args) | Annotation::List(args) => {
				for arg in args {
					self.harvest_decision_variables(arg);
				}
			}
			Annotation::Var(v) => {
				let _ = self.decision_variables.insert(*v);
			}
			Annotation::VarArray(vs) => {
				self.decision_variables.extend(vs.iter().copied());
			}
			Annotation::Identifier(_) | Annotation::IntValue(_) | Annotation::Interval(_, _) => {}
		}
	}

	/// Recognize three-term linear equalities defining a sum or difference of
	/// two other variables, and record the resulting difference relations.
	fn store_difference(&mut self, model: &Model, con: ConRef) {
		let ct = &model.constraints[con];
		let [Argument::IntList(coefs), Argument::VarArray(vars), rhs] = ct.args.as_slice() else {
			return;
		};
		if model.arg_value(rhs) != Some(0) || vars.len() != 3 {
			return;
		}
		let (d0, d2) = match coefs.as_slice() {
			// v0 - v1 + v2 = 0: v0 = v1 - v2 and v2 = v1 - v0
			[1, -1, 1] | [-1, 1, -1] => ((vars[0], (vars[1], vars[2])), (vars[2], (vars[1], vars[0]))),
			// v0 + v1 - v2 = 0: v0 = v2 - v1 and v1 = v2 - v0
			[1, 1, -1] | [-1, -1, 1] => ((vars[0], (vars[2], vars[1])), (vars[1], (vars[2], vars[0]))),
			_ => return,
		};
		for (var, diff) in [d0, d2] {
			if self.difference_map.contains_key(&var) {
				continue;
			}
			let _ = self.difference_map.insert(var, diff);
		}
	}

	/// Canonicalize duplicate reified equalities and disequalities over the
	/// same variable pair by merging their Boolean output variables.
	fn merge_reified_comparisons(&mut self, model: &mut Model) {
		let mut ne_map: BTreeMap<(VarRef, VarRef), VarRef> = BTreeMap::new();
		for con in (0..model.constraints.len()).map(ConRef::from_usize) {
			let ct = &model.constraints[con];
			if !ct.active
				|| !matches!(
					ct.tag,
					ConstraintTag::IntEqReif | ConstraintTag::IntNeReif
				) {
				continue;
			}
			let [Argument::Var(x), Argument::Var(y), Argument::Var(b)] = *ct.args.as_slice()
			else {
				continue;
			};
			let tag = ct.tag;
			let key = (x.min(y), x.max(y));
			let stored = if tag == ConstraintTag::IntEqReif {
				self.int_eq_reif_map.get(&key).copied()
			} else {
				ne_map.get(&key).copied()
			};
			match stored {
				Some(b0) => {
					debug!(con = con.index(), %tag, "merging duplicate reified comparison");
					if b0 != b {
						self.add_substitution(model, b, b0);
					}
					model.deactivate(con);
				}
				None => {
					let _ = if tag == ConstraintTag::IntEqReif {
						self.int_eq_reif_map.insert(key, b)
					} else {
						ne_map.insert(key, b)
					};
				}
			}
		}
	}

	/// Offer a single constraint to the rules applicable to its tag.
	///
	/// Returns whether any rule modified the model. Every rule is idempotent
	/// on its own rewritten output, so the fixed-point loop terminates.
	pub(crate) fn presolve_one_constraint(
		&mut self,
		model: &mut Model,
		con: ConRef,
	) -> Result<bool, PresolveError> {
		use ConstraintTag::*;

		let mut changed = false;
		if model.constraints[con].tag.is_reified() {
			changed |= self.unreify(model, con)?;
			if !model.constraints[con].active {
				return Ok(changed);
			}
		}
		let tag = model.constraints[con].tag;
		if tag.is_linear() {
			return Ok(changed | self.presolve_linear_family(model, con)?);
		}
		changed |= match tag {
			ArrayBoolAnd | ArrayBoolOr => self.presolve_array_bool(model, con)?,
			ArrayIntElement => self.presolve_array_int_element(model, con)?,
			ArrayVarIntElement => self.presolve_array_var_int_element(model, con)?,
			Bool2Int => self.presolve_bool2int(model, con)?,
			BoolClause => self.presolve_bool_clause(model, con)?,
			BoolEq | IntEq => self.presolve_int_eq(model, con)?,
			BoolEqReif | BoolNeReif => self.presolve_bool_eq_ne_reif(model, con)?,
			BoolGe | BoolGt | BoolLe | BoolLt | IntGe | IntGt | IntLe | IntLt => {
				self.presolve_inequality(model, con)?
			}
			BoolGeReif | BoolGtReif | BoolLeReif | BoolLtReif => {
				self.propagate_reified_comparison(model, con)?
			}
			BoolNe | IntNe => self.presolve_int_ne(model, con)?,
			BoolNot => self.presolve_bool_not(model, con)?,
			BoolXor => self.presolve_bool_xor(model, con)?,
			IntAbs => self.presolve_int_abs(model, con)?,
			IntDiv => self.presolve_int_div(model, con)?,
			IntEqReif | IntGeReif | IntGtReif | IntLeReif | IntLtReif | IntNeReif => {
				self.presolve_int_cmp_reif(model, con)?
			}
			IntMax | IntMin => self.presolve_int_min_max(model, con)?,
			IntMod => self.presolve_int_mod(model, con)?,
			IntPlus => self.presolve_int_plus(model, con)?,
			IntTimes => self.presolve_int_times(model, con)?,
			SetIn | SetNotIn => self.presolve_set_in(model, con)?,
			SetInReif | SetNotInReif => self.presolve_set_in_reif(model, con)?,
			CountReif | FalseConstraint | MaximumInt | MinimumInt => false,
			// Linear tags are dispatched before the match.
			_ => false,
		};
		Ok(changed)
	}
}
