//! Integration tests exercising the presolver on small flattened models.
//!
//! Most tests render the presolved model with its [`std::fmt::Display`]
//! implementation and compare the result against an expected snapshot: the
//! rendering lists the active variables with their domains, followed by the
//! active constraints.

use expect_test::{expect, Expect};
use tracing_test::traced_test;

use crate::{
	model::{Annotation, Argument, ConstraintTag, Model, OutputSpec},
	presolve::PresolveError,
	Presolver,
};

/// Run the presolver on the model and compare the rendered result.
fn check(prb: &mut Model, expected: Expect) {
	let mut slv = Presolver::default();
	let _ = slv.run(prb).unwrap();
	assert_invariants(prb);
	expected.assert_eq(&prb.to_string());
}

/// Check the structural invariants that must hold after any run.
fn assert_invariants(prb: &Model) {
	for ct in prb.constraints.iter().filter(|c| c.active) {
		for v in ct.vars() {
			assert!(
				prb.variables[v].active,
				"active constraint references the inactive variable {}",
				prb.variables[v].name
			);
		}
		if let Some(t) = ct.target_variable {
			assert!(ct.references(t), "target variable must occur in the arguments");
		}
	}
	for (var, def) in prb.variables.iter_enumerated() {
		if !def.active {
			continue;
		}
		if let Some(c) = def.defining_constraint {
			assert_eq!(
				prb.constraints[c].target_variable,
				Some(var),
				"defining constraint must point back at {}",
				def.name
			);
		}
	}
}

#[test]
#[traced_test]
fn test_int_eq_constant() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntEq,
		vec![Argument::Var(x), Argument::IntValue(5)],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 5
"#]],
	);
}

#[test]
#[traced_test]
fn test_bool2int_substitution() {
	let mut prb = Model::default();
	let b = prb.new_bool_var("b");
	let x = prb.new_temp_var("x", (0..=1).into());
	let _ = prb.add_constraint(
		ConstraintTag::Bool2Int,
		vec![Argument::Var(b), Argument::Var(x)],
	);
	// A later use of the integer half of the channel; after substitution it
	// must constrain the Boolean instead.
	let _ = prb.add_constraint(
		ConstraintTag::IntNe,
		vec![Argument::Var(x), Argument::IntValue(0)],
	);
	check(
		&mut prb,
		expect![[r#"
    var b: 1
"#]],
	);
}

#[test]
#[traced_test]
fn test_array_bool_or_fixed_element() {
	let mut prb = Model::default();
	let b1 = prb.new_bool_var("b1");
	let b2 = prb.new_int_var("b2", (1..=1).into());
	let b3 = prb.new_bool_var("b3");
	let t = prb.new_bool_var("t");
	let _ = prb.add_constraint(
		ConstraintTag::ArrayBoolOr,
		vec![Argument::VarArray(vec![b1, b2, b3]), Argument::Var(t)],
	);
	check(
		&mut prb,
		expect![[r#"
    var b1: 0..1
    var b2: 1
    var b3: 0..1
    var t: 1
"#]],
	);
}

#[test]
#[traced_test]
fn test_array_bool_or_fixed_target() {
	let mut prb = Model::default();
	let b1 = prb.new_bool_var("b1");
	let b2 = prb.new_bool_var("b2");
	let b3 = prb.new_bool_var("b3");
	let _ = prb.add_constraint(
		ConstraintTag::ArrayBoolOr,
		vec![
			Argument::VarArray(vec![b1, b2, b3]),
			Argument::IntValue(0),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var b1: 0
    var b2: 0
    var b3: 0
"#]],
	);
}

#[test]
#[traced_test]
fn test_difference_recognition() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let y = prb.new_int_var("y", (0..=10).into());
	let z = prb.new_int_var("z", (0..=10).into());
	// x - y + z = 0, so x = y - z.
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEq,
		vec![
			Argument::IntList(vec![1, -1, 1]),
			Argument::VarArray(vec![x, y, z]),
			Argument::IntValue(0),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntEq,
		vec![Argument::Var(x), Argument::IntValue(0)],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 0
    var z: 0..10
"#]],
	);
}

#[test]
#[traced_test]
fn test_element_domain_filtering() {
	let mut prb = Model::default();
	let i = prb.new_int_var("i", (2..=3).into());
	let t = prb.new_int_var("t", (0..=100).into());
	let _ = prb.add_constraint(
		ConstraintTag::ArrayIntElement,
		vec![
			Argument::Var(i),
			Argument::IntList(vec![10, 20, 30, 40]),
			Argument::Var(t),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var i: 2..3
    var t: {20, 30}
    array_int_element(i, [10, 20, 30], t)
"#]],
	);
}

#[test]
#[traced_test]
fn test_min_chain_regrouping() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (1..=9).into());
	let y = prb.new_int_var("y", (1..=9).into());
	let z = prb.new_int_var("z", (1..=9).into());
	let t1 = prb.new_temp_var("t1", (1..=9).into());
	let t2 = prb.new_temp_var("t2", (1..=9).into());
	let t3 = prb.new_temp_var("t3", (1..=9).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntMin,
		vec![Argument::Var(x), Argument::Var(x), Argument::Var(t1)],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntMin,
		vec![Argument::Var(y), Argument::Var(t1), Argument::Var(t2)],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntMin,
		vec![Argument::Var(z), Argument::Var(t2), Argument::Var(t3)],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 1..9
    var y: 1..9
    var z: 1..9
    var t3: 1..9 (temp)
    minimum_int([x, y, z], t3) -> t3
"#]],
	);
}

#[test]
#[traced_test]
fn test_unreify() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let y = prb.new_int_var("y", (0..=10).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntLtReif,
		vec![
			Argument::Var(x),
			Argument::IntValue(5),
			Argument::IntValue(1),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntLeReif,
		vec![
			Argument::Var(y),
			Argument::IntValue(5),
			Argument::IntValue(0),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 0..4
    var y: 6..10
"#]],
	);
}

#[test]
#[traced_test]
fn test_linear_canonicalization() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	// 2x > 5 becomes 2x >= 6, then x >= 3.
	let _ = prb.add_constraint(
		ConstraintTag::IntLinGt,
		vec![
			Argument::IntList(vec![2]),
			Argument::VarArray(vec![x]),
			Argument::IntValue(5),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 3..10
"#]],
	);
}

#[test]
#[traced_test]
fn test_int_lin_eq_reif_bounds() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let y = prb.new_int_var("y", (0..=10).into());
	let b = prb.new_bool_var("b");
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEqReif,
		vec![
			Argument::IntList(vec![1, 1]),
			Argument::VarArray(vec![x, y]),
			Argument::IntValue(50),
			Argument::Var(b),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 0..10
    var y: 0..10
    var b: 0
"#]],
	);
}

#[test]
#[traced_test]
fn test_positive_linear_propagation() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=100).into());
	let y = prb.new_int_var("y", (0..=100).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntLinLe,
		vec![
			Argument::IntList(vec![1, 2]),
			Argument::VarArray(vec![x, y]),
			Argument::IntValue(6),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 0..6
    var y: 0..3
    int_lin_le([1, 2], [x, y], 6)
"#]],
	);
}

#[test]
#[traced_test]
fn test_merge_reified_equalities() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let y = prb.new_int_var("y", (0..=10).into());
	let b1 = prb.new_bool_var("b1");
	let b2 = prb.new_bool_var("b2");
	let b3 = prb.new_bool_var("b3");
	let _ = prb.add_constraint(
		ConstraintTag::IntEqReif,
		vec![Argument::Var(x), Argument::Var(y), Argument::Var(b1)],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntEqReif,
		vec![Argument::Var(x), Argument::Var(y), Argument::Var(b2)],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntNeReif,
		vec![Argument::Var(x), Argument::Var(y), Argument::Var(b3)],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 0..10
    var y: 0..10
    var b1: 0..1
    var b3: 0..1
    int_eq_reif(x, y, b1) -> b1
    bool_not(b1, b3)
"#]],
	);
}

#[test]
#[traced_test]
fn test_linear_sum_chain_regrouping() {
	let mut prb = Model::default();
	let x1 = prb.new_int_var("x1", (0..=5).into());
	let x2 = prb.new_int_var("x2", (0..=5).into());
	let x3 = prb.new_int_var("x3", (0..=5).into());
	let y2 = prb.new_temp_var("y2", (0..=15).into());
	let y3 = prb.new_temp_var("y3", (0..=15).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEq,
		vec![
			Argument::IntList(vec![1, 1, -1]),
			Argument::VarArray(vec![x1, x2, y2]),
			Argument::IntValue(0),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEq,
		vec![
			Argument::IntList(vec![1, 1, 1, -1]),
			Argument::VarArray(vec![x1, x2, x3, y3]),
			Argument::IntValue(0),
		],
	);
	check(
		&mut prb,
		expect![[r#"
    var x1: 0..5
    var x2: 0..5
    var x3: 0..5
    var y2: 0..15 (temp)
    var y3: 0..15 (temp)
    int_lin_eq([1, 1, -1], [x1, x2, y2], 0)
    int_plus(y2, x3, y3)
"#]],
	);
}

#[test]
#[traced_test]
fn test_set_in() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=4).into());
	let _ = prb.add_constraint(
		ConstraintTag::SetIn,
		vec![Argument::Var(x), Argument::IntList(vec![1, 3, 5, 7])],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: {1, 3}
"#]],
	);
}

#[test]
#[traced_test]
fn test_set_in_invalid_shape() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=4).into());
	let y = prb.new_int_var("y", (0..=4).into());
	let _ = prb.add_constraint(
		ConstraintTag::SetIn,
		vec![Argument::Var(x), Argument::Var(y)],
	);
	let mut slv = Presolver::default();
	assert!(matches!(
		slv.run(&mut prb),
		Err(PresolveError::InvalidArgumentType { .. })
	));
}

#[test]
#[traced_test]
fn test_infeasible_becomes_false_constraint() {
	let mut prb = Model::default();
	let x = prb.new_int_var("x", (0..=10).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEq,
		vec![
			Argument::IntList(vec![1]),
			Argument::VarArray(vec![x]),
			Argument::IntValue(3),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntNe,
		vec![Argument::IntValue(3), Argument::IntValue(3)],
	);
	check(
		&mut prb,
		expect![[r#"
    var x: 3
    false_constraint()
"#]],
	);
}

#[test]
#[traced_test]
fn test_idempotence() {
	let mut prb = Model::default();
	let i = prb.new_int_var("i", (1..=4).into());
	let t = prb.new_int_var("t", (0..=100).into());
	let b = prb.new_bool_var("b");
	let x = prb.new_int_var("x", (0..=10).into());
	let _ = prb.add_constraint(
		ConstraintTag::ArrayIntElement,
		vec![
			Argument::Var(i),
			Argument::IntList(vec![4, 8, 15, 16]),
			Argument::Var(t),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::IntLeReif,
		vec![Argument::Var(x), Argument::IntValue(20), Argument::Var(b)],
	);
	let mut slv = Presolver::default();
	let _ = slv.run(&mut prb).unwrap();
	let first = prb.to_string();
	let mut slv = Presolver::default();
	let _ = slv.run(&mut prb).unwrap();
	assert_eq!(first, prb.to_string());
}

#[test]
#[traced_test]
fn test_substitution_reaches_annotations_and_outputs() {
	let mut prb = Model::default();
	let b = prb.new_bool_var("b");
	let x = prb.new_temp_var("x", (0..=1).into());
	let _ = prb.add_constraint(
		ConstraintTag::Bool2Int,
		vec![Argument::Var(b), Argument::Var(x)],
	);
	prb.search_annotations = vec![Annotation::Call(
		"int_search".to_owned(),
		vec![
			Annotation::VarArray(vec![x]),
			Annotation::Identifier("first_fail".to_owned()),
		],
	)];
	prb.outputs = vec![OutputSpec::Var {
		name: "x".to_owned(),
		var: x,
	}];
	let mut slv = Presolver::default();
	let _ = slv.run(&mut prb).unwrap();
	assert_invariants(&prb);
	assert_eq!(
		prb.search_annotations[0],
		Annotation::Call(
			"int_search".to_owned(),
			vec![
				Annotation::VarArray(vec![b]),
				Annotation::Identifier("first_fail".to_owned()),
			]
		)
	);
	assert_eq!(
		prb.outputs[0],
		OutputSpec::Var {
			name: "x".to_owned(),
			var: b
		}
	);
}

#[test]
#[traced_test]
fn test_affine_element_rewrite() {
	let mut prb = Model::default();
	// index = 2 * j - 1: the element accesses the odd positions.
	let j = prb.new_int_var("j", (1..=3).into());
	let index = prb.new_temp_var("index", (1..=6).into());
	let t = prb.new_int_var("t", (0..=100).into());
	let _ = prb.add_constraint(
		ConstraintTag::IntLinEq,
		vec![
			Argument::IntList(vec![-1, 2]),
			Argument::VarArray(vec![index, j]),
			Argument::IntValue(1),
		],
	);
	let _ = prb.add_constraint(
		ConstraintTag::ArrayIntElement,
		vec![
			Argument::Var(index),
			Argument::IntList(vec![10, 20, 30, 40, 50, 60]),
			Argument::Var(t),
		],
	);
	let mut slv = Presolver::default();
	let _ = slv.run(&mut prb).unwrap();
	assert_invariants(&prb);
	let element = prb
		.constraints
		.iter()
		.find(|c| c.active && c.tag == ConstraintTag::ArrayIntElement)
		.expect("element constraint survives");
	assert_eq!(element.args[0], Argument::Var(j));
	assert_eq!(
		element.args[1],
		Argument::IntList(vec![10, 30, 50]),
		"array is resampled at the odd positions"
	);
	assert!(!prb.variables[index].active, "index variable is eliminated");
}
