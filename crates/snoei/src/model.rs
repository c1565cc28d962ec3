//! Representation of flattened constraint models: variables, constraints and
//! their arguments, search annotations, and output specifications.
//!
//! The model is an arena-based intermediate representation. Variables and
//! constraints are stored in [`index_vec::IndexVec`] arenas and referenced by
//! [`VarRef`] and [`ConRef`] indices, so that rewriting passes can substitute
//! and deactivate entries without invalidating references held elsewhere.

pub mod constraint;
pub(crate) mod domain;

use std::fmt::{self, Display};

use index_vec::IndexVec;

pub use crate::model::constraint::{Constraint, ConstraintTag, RelOp};
use crate::{IntSetVal, IntVal};

index_vec::define_index_type! {
	/// Reference to an integer decision variable stored in a [`Model`].
	pub struct VarRef = u32;
}

index_vec::define_index_type! {
	/// Reference to a constraint stored in a [`Model`].
	pub struct ConRef = u32;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A node in a search annotation tree.
///
/// Annotations are attached to the model by the flattener to communicate a
/// search strategy. The presolver only rewrites the variables they mention.
pub enum Annotation {
	/// Call of an annotation function, e.g. `int_search`.
	Call(String, Vec<Annotation>),
	/// Plain identifier, e.g. `first_fail`.
	Identifier(String),
	/// Integer literal argument.
	IntValue(IntVal),
	/// Interval literal argument.
	Interval(IntVal, IntVal),
	/// List of annotation arguments.
	List(Vec<Annotation>),
	/// Reference to a single decision variable.
	Var(VarRef),
	/// Reference to an array of decision variables.
	VarArray(Vec<VarRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Argument of a [`Constraint`]: a tagged union of values, value collections,
/// and variable references.
pub enum Argument {
	/// Inclusive interval of integer values.
	IntInterval(IntVal, IntVal),
	/// List of integer values.
	IntList(Vec<IntVal>),
	/// Single integer value.
	IntValue(IntVal),
	/// Reference to a decision variable.
	Var(VarRef),
	/// Reference to an array of decision variables.
	VarArray(Vec<VarRef>),
}

#[derive(Debug, Clone, Default)]
/// A flattened constraint model: the unit of work of the presolver.
pub struct Model {
	/// The constraints of the model, in the order posted by the flattener.
	pub constraints: IndexVec<ConRef, Constraint>,
	/// The decision variables of the model.
	pub variables: IndexVec<VarRef, Variable>,
	/// Search annotations attached to the model.
	pub search_annotations: Vec<Annotation>,
	/// Specifications of the values to be output by the solver.
	pub outputs: Vec<OutputSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Specification of a name under which solution values must be reported.
pub enum OutputSpec {
	/// Output of a single variable value.
	Var {
		/// Name under which the value is reported.
		name: String,
		/// The variable holding the value.
		var: VarRef,
	},
	/// Output of an array of variable values.
	VarArray {
		/// Name under which the values are reported.
		name: String,
		/// The variables holding the values.
		vars: Vec<VarRef>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Definition of an integer decision variable in a [`Model`].
///
/// Boolean variables are integer variables with a `0..1` domain.
pub struct Variable {
	/// Name of the variable, used for diagnostics and output.
	pub name: String,
	/// The set of possible values that the variable can take.
	pub domain: IntSetVal,
	/// Whether the variable is still part of the model.
	///
	/// An inactive variable has been substituted away and must not be
	/// referenced by any active constraint.
	pub active: bool,
	/// Whether the variable was introduced by the flattener.
	///
	/// Temporary variables are preferred for elimination when two variables
	/// are found to be equal.
	pub temporary: bool,
	/// The constraint that defines the value of this variable, if any.
	///
	/// If set, the referenced constraint has this variable as its
	/// [`Constraint::target_variable`].
	pub defining_constraint: Option<ConRef>,
}

impl Argument {
	/// Whether the argument is a reference to a single variable.
	pub fn is_variable(&self) -> bool {
		matches!(self, Argument::Var(_))
	}

	/// The referenced variable, if the argument is a single variable
	/// reference.
	pub fn var(&self) -> Option<VarRef> {
		match self {
			Argument::Var(v) => Some(*v),
			_ => None,
		}
	}

	/// The referenced variables, for both single references and arrays.
	pub fn vars(&self) -> &[VarRef] {
		match self {
			Argument::Var(v) => std::slice::from_ref(v),
			Argument::VarArray(vs) => vs.as_slice(),
			_ => &[],
		}
	}
}

impl Model {
	/// Add a constraint to the model and return its reference.
	pub fn add_constraint(&mut self, tag: ConstraintTag, args: Vec<Argument>) -> ConRef {
		self.constraints.push(Constraint::new(tag, args))
	}

	/// Add a constraint that defines the value of `target` and return its
	/// reference.
	///
	/// The target variable must occur among the argument variables of the
	/// constraint and must not yet have a defining constraint.
	pub fn add_defining_constraint(
		&mut self,
		tag: ConstraintTag,
		args: Vec<Argument>,
		target: VarRef,
	) -> ConRef {
		let con = self.add_constraint(tag, args);
		self.set_target(con, target);
		con
	}

	/// The value that `arg` resolves to, if it resolves to exactly one.
	pub fn arg_value(&self, arg: &Argument) -> Option<IntVal> {
		match arg {
			Argument::IntValue(v) => Some(*v),
			Argument::IntInterval(lb, ub) if lb == ub => Some(*lb),
			Argument::IntList(vs) if vs.len() == 1 => Some(vs[0]),
			Argument::Var(v) => self.var_value(*v),
			_ => None,
		}
	}

	/// Whether `arg` resolves to exactly one integer, either because it is a
	/// constant or because it references a variable with a singleton domain.
	pub fn arg_has_one_value(&self, arg: &Argument) -> bool {
		self.arg_value(arg).is_some()
	}

	/// Remove the constraint from further consideration.
	///
	/// The constraint is marked inactive and unlinked from its target
	/// variable, if it had one.
	pub fn deactivate(&mut self, con: ConRef) {
		self.remove_target(con);
		self.constraints[con].active = false;
	}

	/// Create a new Boolean variable (an integer variable with domain `0..1`).
	pub fn new_bool_var(&mut self, name: impl Into<String>) -> VarRef {
		self.new_int_var(name, (0..=1).into())
	}

	/// Create a new integer variable with the given domain.
	pub fn new_int_var(&mut self, name: impl Into<String>, domain: IntSetVal) -> VarRef {
		self.variables.push(Variable {
			name: name.into(),
			domain,
			active: true,
			temporary: false,
			defining_constraint: None,
		})
	}

	/// Create a new temporary integer variable with the given domain.
	///
	/// Temporary variables are introduced by the flattener and are preferred
	/// for elimination during substitution.
	pub fn new_temp_var(&mut self, name: impl Into<String>, domain: IntSetVal) -> VarRef {
		let var = self.new_int_var(name, domain);
		self.variables[var].temporary = true;
		var
	}

	/// Unlink the constraint from its target variable, if it has one.
	pub fn remove_target(&mut self, con: ConRef) {
		if let Some(var) = self.constraints[con].target_variable.take() {
			debug_assert_eq!(self.variables[var].defining_constraint, Some(con));
			self.variables[var].defining_constraint = None;
		}
	}

	/// Rewrite the constraint into the unsatisfiable constant constraint.
	///
	/// The model containing such a constraint is infeasible; detecting this is
	/// left to the downstream solver.
	pub fn set_as_false(&mut self, con: ConRef) {
		self.remove_target(con);
		let ct = &mut self.constraints[con];
		ct.tag = ConstraintTag::FalseConstraint;
		ct.args.clear();
	}

	/// Mark `target` as the variable defined by the constraint.
	pub fn set_target(&mut self, con: ConRef, target: VarRef) {
		debug_assert!(self.constraints[con].target_variable.is_none());
		debug_assert!(self.variables[target].defining_constraint.is_none());
		self.constraints[con].target_variable = Some(target);
		self.variables[target].defining_constraint = Some(con);
	}

	/// Format an argument for diagnostics, using variable names.
	fn fmt_arg(&self, f: &mut fmt::Formatter<'_>, arg: &Argument) -> fmt::Result {
		match arg {
			Argument::IntValue(v) => write!(f, "{}", v),
			Argument::IntInterval(lb, ub) => write!(f, "{}..{}", lb, ub),
			Argument::IntList(vs) => {
				write!(f, "[")?;
				for (i, v) in vs.iter().enumerate() {
					if i != 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}", v)?;
				}
				write!(f, "]")
			}
			Argument::Var(v) => write!(f, "{}", self.variables[*v].name),
			Argument::VarArray(vs) => {
				write!(f, "[")?;
				for (i, v) in vs.iter().enumerate() {
					if i != 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}", self.variables[*v].name)?;
				}
				write!(f, "]")
			}
		}
	}
}

impl Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for var in self.variables.iter().filter(|v| v.active) {
			write!(f, "var {}: ", var.name)?;
			domain::fmt_domain(f, &var.domain)?;
			if var.temporary {
				write!(f, " (temp)")?;
			}
			writeln!(f)?;
		}
		for ct in self.constraints.iter().filter(|c| c.active) {
			write!(f, "{}(", ct.tag)?;
			for (i, arg) in ct.args.iter().enumerate() {
				if i != 0 {
					write!(f, ", ")?;
				}
				self.fmt_arg(f, arg)?;
			}
			write!(f, ")")?;
			if let Some(target) = ct.target_variable {
				write!(f, " -> {}", self.variables[target].name)?;
			}
			writeln!(f)?;
		}
		Ok(())
	}
}
