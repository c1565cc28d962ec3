//! Manipulation of integer variable domains.
//!
//! Domains are represented as [`RangeList`] values: sorted sets of disjoint
//! inclusive ranges. The representation subsumes both plain intervals and
//! explicit value sets, and every operation yields the tightest expressible
//! result. An operation that empties a domain records the empty domain in the
//! model; detecting the resulting infeasibility is left to the downstream
//! solver.

use std::fmt;

use itertools::Itertools;
use rangelist::{IntervalIterator, RangeList};
use tracing::trace;

use crate::{
	model::{Model, VarRef},
	IntSetVal, IntVal, INT_MAX, INT_MIN,
};

/// Build the tightest [`RangeList`] containing exactly the given values.
///
/// The values may be unsorted and may contain duplicates.
pub(crate) fn range_list_from_values(values: &[IntVal]) -> IntSetVal {
	let mut ranges: Vec<std::ops::RangeInclusive<IntVal>> = Vec::new();
	for v in values.iter().copied().sorted().dedup() {
		match ranges.last_mut() {
			Some(r) if v > IntVal::MIN && *r.end() == v - 1 => *r = *r.start()..=v,
			_ => ranges.push(v..=v),
		}
	}
	RangeList::from_iter(ranges)
}

/// Format a domain for diagnostics, rendering the infinity sentinels.
pub(crate) fn fmt_domain(f: &mut fmt::Formatter<'_>, dom: &IntSetVal) -> fmt::Result {
	/// Format a single bound, rendering the infinity sentinels.
	fn bound(v: IntVal) -> String {
		match v {
			INT_MIN => "-inf".to_owned(),
			INT_MAX => "+inf".to_owned(),
			_ => v.to_string(),
		}
	}

	let ranges = dom.iter().collect_vec();
	match ranges.as_slice() {
		[] => write!(f, "{{}}"),
		[r] if r.start() == r.end() => write!(f, "{}", bound(*r.start())),
		[r] => write!(f, "{}..{}", bound(*r.start()), bound(*r.end())),
		_ => {
			write!(f, "{{")?;
			for (i, r) in ranges.iter().enumerate() {
				if i != 0 {
					write!(f, ", ")?;
				}
				if r.start() == r.end() {
					write!(f, "{}", bound(*r.start()))?;
				} else {
					write!(f, "{}..{}", bound(*r.start()), bound(*r.end()))?;
				}
			}
			write!(f, "}}")
		}
	}
}

impl Model {
	/// Ensure that the variable only takes values in the interval `lb..=ub`.
	///
	/// Returns whether the domain of the variable changed.
	pub fn intersect_var_interval(&mut self, var: VarRef, lb: IntVal, ub: IntVal) -> bool {
		let dom = &self.variables[var].domain;
		let new_dom: IntSetVal = RangeList::from_iter(dom.iter().filter_map(|r| {
			let lo = (*r.start()).max(lb);
			let hi = (*r.end()).min(ub);
			(lo <= hi).then_some(lo..=hi)
		}));
		self.replace_var_domain(var, new_dom)
	}

	/// Ensure that the variable only takes values in the given set.
	///
	/// Returns whether the domain of the variable changed.
	pub fn intersect_var_set(&mut self, var: VarRef, mask: &IntSetVal) -> bool {
		let new_dom: IntSetVal = self.variables[var].domain.intersect(mask);
		self.replace_var_domain(var, new_dom)
	}

	/// Ensure that the variable only takes values from the given list.
	///
	/// Returns whether the domain of the variable changed.
	pub fn intersect_var_values(&mut self, var: VarRef, values: &[IntVal]) -> bool {
		let mask = range_list_from_values(values);
		self.intersect_var_set(var, &mask)
	}

	/// Ensure that the variable cannot take values lower than `lb`.
	pub fn intersect_var_above(&mut self, var: VarRef, lb: IntVal) -> bool {
		self.intersect_var_interval(var, lb, INT_MAX)
	}

	/// Ensure that the variable cannot take values greater than `ub`.
	pub fn intersect_var_below(&mut self, var: VarRef, ub: IntVal) -> bool {
		self.intersect_var_interval(var, INT_MIN, ub)
	}

	/// Ensure that the variable cannot take any value in the given set.
	///
	/// Returns whether the domain of the variable changed.
	pub fn subtract_var_set(&mut self, var: VarRef, mask: &IntSetVal) -> bool {
		let new_dom: IntSetVal = self.variables[var].domain.diff(mask);
		self.replace_var_domain(var, new_dom)
	}

	/// Ensure that the variable cannot take the given value.
	///
	/// Returns whether the domain of the variable changed.
	pub fn remove_var_value(&mut self, var: VarRef, val: IntVal) -> bool {
		let mask = RangeList::from(val..=val);
		let new_dom: IntSetVal = self.variables[var].domain.diff(&mask);
		self.replace_var_domain(var, new_dom)
	}

	/// Install a new domain for the variable if it differs from the current
	/// one, and report whether it did.
	fn replace_var_domain(&mut self, var: VarRef, new_dom: IntSetVal) -> bool {
		let def = &mut self.variables[var];
		if def.domain == new_dom {
			return false;
		}
		if new_dom.is_empty() {
			trace!(var = %def.name, "domain wiped out, model is infeasible");
		}
		def.domain = new_dom;
		true
	}

	/// Fix the variable to the given value.
	///
	/// Returns whether the domain of the variable changed.
	pub fn set_var_value(&mut self, var: VarRef, val: IntVal) -> bool {
		self.intersect_var_interval(var, val, val)
	}

	/// Whether the given value is within the domain of the variable.
	pub fn var_contains(&self, var: VarRef, val: IntVal) -> bool {
		self.variables[var].domain.contains(&val)
	}

	/// Whether the domain of the variable holds exactly one value.
	pub fn var_has_one_value(&self, var: VarRef) -> bool {
		self.var_value(var).is_some()
	}

	/// The maximal value the variable can take, or [`INT_MIN`] for a variable
	/// whose domain has become empty.
	pub fn var_max(&self, var: VarRef) -> IntVal {
		self.variables[var]
			.domain
			.upper_bound()
			.copied()
			.unwrap_or(INT_MIN)
	}

	/// The minimal value the variable can take, or [`INT_MAX`] for a variable
	/// whose domain has become empty.
	pub fn var_min(&self, var: VarRef) -> IntVal {
		self.variables[var]
			.domain
			.lower_bound()
			.copied()
			.unwrap_or(INT_MAX)
	}

	/// The value of the variable, if its domain holds exactly one value.
	pub fn var_value(&self, var: VarRef) -> Option<IntVal> {
		let dom = &self.variables[var].domain;
		match (dom.lower_bound(), dom.upper_bound()) {
			(Some(lb), Some(ub)) if lb == ub => Some(*lb),
			_ => None,
		}
	}

	/// Iterator over the values of the domain of the variable.
	///
	/// Callers must ensure the domain is finite and reasonably small, e.g. an
	/// index domain bounded by an array length.
	pub(crate) fn var_values(&self, var: VarRef) -> impl Iterator<Item = IntVal> + '_ {
		self.variables[var].domain.iter().flatten()
	}
}

#[cfg(test)]
mod tests {
	use crate::{model::domain::range_list_from_values, IntSetVal, Model};

	#[test]
	fn test_range_list_from_values() {
		assert_eq!(
			range_list_from_values(&[3, 1, 2, 7, 7, 5]),
			IntSetVal::from_iter([1..=3, 5..=5, 7..=7])
		);
		assert!(range_list_from_values(&[]).is_empty());
	}

	#[test]
	fn test_intersections() {
		let mut prb = Model::default();
		let x = prb.new_int_var("x", (0..=10).into());
		assert!(prb.intersect_var_interval(x, 2, 6));
		assert!(!prb.intersect_var_interval(x, 0, 8));
		assert_eq!(prb.var_min(x), 2);
		assert_eq!(prb.var_max(x), 6);

		assert!(prb.intersect_var_values(x, &[0, 3, 5, 9]));
		assert_eq!(prb.variables[x].domain, IntSetVal::from_iter([3..=3, 5..=5]));

		assert!(prb.remove_var_value(x, 3));
		assert_eq!(prb.var_value(x), Some(5));
		assert!(prb.var_has_one_value(x));
	}

	#[test]
	fn test_empty_domain_recorded() {
		let mut prb = Model::default();
		let x = prb.new_int_var("x", (0..=3).into());
		assert!(prb.intersect_var_interval(x, 5, 7));
		assert!(prb.variables[x].domain.is_empty());
		assert_eq!(prb.var_value(x), None);
	}
}
