//! Module containing general, e.g. purely numeric, helpers used in multiple
//! places in the library and not exposed to the user.

use crate::{IntVal, NonZeroIntVal, INT_MAX, INT_MIN};

#[inline]
/// Integer division that rounds towards positive infinity.
pub(crate) fn div_ceil(a: IntVal, b: NonZeroIntVal) -> IntVal {
	let d = a / b.get();
	let r = a % b.get();
	if (r > 0 && b.get() > 0) || (r < 0 && b.get() < 0) {
		d + 1
	} else {
		d
	}
}

/// Integer division that rounds towards negative infinity.
pub(crate) fn div_floor(a: IntVal, b: NonZeroIntVal) -> IntVal {
	let d = a / b.get();
	let r = a % b.get();
	if (r > 0 && b.get() < 0) || (r < 0 && b.get() > 0) {
		d - 1
	} else {
		d
	}
}

/// Whether a bound value is one of the infinity sentinels.
pub(crate) fn is_sentinel(v: IntVal) -> bool {
	v == INT_MIN || v == INT_MAX
}

/// Multiply a coefficient with a variable bound, refusing sentinel operands
/// and overflowing products.
pub(crate) fn checked_term(coef: IntVal, bound: IntVal) -> Option<IntVal> {
	if is_sentinel(bound) {
		return None;
	}
	coef.checked_mul(bound)
}

/// Compute the lower and upper bound of a weighted sum of variable bounds.
///
/// Returns `None` when any variable has an infinite bound or when any partial
/// result overflows; callers must then leave the constraint to the solver.
pub(crate) fn checked_linear_bounds(
	coefs: &[IntVal],
	bounds: &[(IntVal, IntVal)],
) -> Option<(IntVal, IntVal)> {
	debug_assert_eq!(coefs.len(), bounds.len());
	let mut lb: IntVal = 0;
	let mut ub: IntVal = 0;
	for (&c, &(lo, hi)) in coefs.iter().zip(bounds.iter()) {
		let (term_lo, term_hi) = if c >= 0 {
			(checked_term(c, lo)?, checked_term(c, hi)?)
		} else {
			(checked_term(c, hi)?, checked_term(c, lo)?)
		};
		lb = lb.checked_add(term_lo)?;
		ub = ub.checked_add(term_hi)?;
	}
	Some((lb, ub))
}

#[cfg(test)]
mod tests {
	use crate::{
		helpers::{checked_linear_bounds, div_ceil, div_floor},
		IntVal, NonZeroIntVal, INT_MAX, INT_MIN,
	};

	#[test]
	fn test_div_ceil() {
		assert_eq!(div_ceil(8, NonZeroIntVal::new(3).unwrap()), 3);
		assert_eq!(div_ceil(-8, NonZeroIntVal::new(-3).unwrap()), 3);
		assert_eq!(div_ceil(8, NonZeroIntVal::new(-3).unwrap()), -2);
		assert_eq!(div_ceil(-8, NonZeroIntVal::new(3).unwrap()), -2);
	}

	#[test]
	fn test_div_floor() {
		assert_eq!(div_floor(8, NonZeroIntVal::new(3).unwrap()), 2);
		assert_eq!(div_floor(-8, NonZeroIntVal::new(-3).unwrap()), 2);
		assert_eq!(div_floor(8, NonZeroIntVal::new(-3).unwrap()), -3);
		assert_eq!(div_floor(-8, NonZeroIntVal::new(3).unwrap()), -3);
	}

	#[test]
	fn test_linear_bounds() {
		assert_eq!(
			checked_linear_bounds(&[2, -1], &[(1, 3), (0, 5)]),
			Some((-3, 6))
		);
		assert_eq!(checked_linear_bounds(&[1], &[(INT_MIN, 3)]), None);
		assert_eq!(checked_linear_bounds(&[1], &[(0, INT_MAX)]), None);
		assert_eq!(
			checked_linear_bounds(&[IntVal::MAX / 2, 1], &[(4, 4), (0, 1)]),
			None
		);
	}
}
