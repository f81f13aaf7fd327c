//! Property tests for the solver using proptest.
//!
//! These tests stress invariants that must hold for ANY input systems,
//! not just hand-picked examples. Key properties:
//!
//! 1. Rollback round-trip: exiting a scope restores the observable state
//! 2. Occurs check: a candidate mentioning its own variable never binds
//! 3. Representative idempotence: rep(rep(v)) == rep(v) after any merges
//! 4. Determinism: solving the same system twice yields identical output
//! 5. Component independence: solving variables separately composes to
//!    the combined solution
//! 6. Canonicalization is idempotent

use proptest::prelude::*;
use vela_types::{LiteralProtocol, TupleElement, Type, TypeVarId};

use crate::{
    Constraint, ConstraintSystem, ConversionRestriction, FreeTypeVariablePolicy, Locator,
    Relation, ScoreKind, SolveError, Solution, Solver,
};

const VAR_COUNT: usize = 4;

// ---------------------------------------------------------------------------
// Strategies for generating types and operations
// ---------------------------------------------------------------------------

const CLASS_POOL: &[&str] = &["Int", "Float", "String", "Bool"];

fn arb_concrete_leaf() -> impl Strategy<Value = Type> {
    prop::sample::select(CLASS_POOL).prop_map(Type::class)
}

/// Concrete types of bounded depth; no type variables.
fn arb_concrete_type() -> BoxedStrategy<Type> {
    arb_concrete_leaf()
        .prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(Type::optional),
                inner.clone().prop_map(|ty| Type::tuple(vec![
                    TupleElement::labelled("value", ty)
                ])),
                (prop::collection::vec(inner.clone(), 0..2), inner)
                    .prop_map(|(params, ret)| Type::function(params, ret)),
            ]
        })
        .boxed()
}

/// Types that may mention the system's variables.
fn arb_type_with_vars() -> BoxedStrategy<Type> {
    let leaf = prop_oneof![
        3 => arb_concrete_leaf(),
        1 => (0..VAR_COUNT as u32).prop_map(|i| Type::Var(TypeVarId(i))),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(Type::optional),
            inner
                .clone()
                .prop_map(|ty| Type::tuple(vec![TupleElement::labelled("value", ty)])),
            (prop::collection::vec(inner.clone(), 0..2), inner)
                .prop_map(|(params, ret)| Type::function(params, ret)),
        ]
    })
    .boxed()
}

/// A speculative mutation performed inside a scope.
#[derive(Debug, Clone)]
enum Op {
    Assign(u32, Type),
    Merge(u32, u32),
    Compress(u32),
    AddConstraint(u8, u32, Type),
    Restriction(Type, Type),
    Score,
    Overload(Type),
}

fn arb_op() -> BoxedStrategy<Op> {
    let var = 0..VAR_COUNT as u32;
    prop_oneof![
        (var.clone(), arb_concrete_type()).prop_map(|(v, ty)| Op::Assign(v, ty)),
        (var.clone(), 0..VAR_COUNT as u32).prop_map(|(a, b)| Op::Merge(a, b)),
        var.clone().prop_map(Op::Compress),
        (0u8..4, var.clone(), arb_type_with_vars())
            .prop_map(|(rel, v, ty)| Op::AddConstraint(rel, v, ty)),
        (arb_concrete_type(), arb_concrete_type())
            .prop_map(|(a, b)| Op::Restriction(a, b)),
        Just(Op::Score),
        arb_concrete_type().prop_map(Op::Overload),
    ]
    .boxed()
}

fn relation_from(tag: u8) -> Relation {
    match tag {
        0 => Relation::Equal,
        1 => Relation::Subtype,
        2 => Relation::Conversion,
        _ => Relation::ConformsTo,
    }
}

/// Apply one operation, skipping anything the system's own invariants
/// forbid (double assignment, recursive bindings, merging fixed classes).
fn apply_op(cs: &mut ConstraintSystem, op: &Op) {
    match op {
        Op::Assign(v, ty) => {
            let var = TypeVarId(*v);
            if cs.fixed_type(var).is_some() {
                return;
            }
            if cs.check_type_of_binding(var, ty).is_none() {
                return;
            }
            cs.assign_fixed_type(var, ty.clone());
        }
        Op::Merge(a, b) => {
            let (a, b) = (TypeVarId(*a), TypeVarId(*b));
            if cs.rep_of(a) == cs.rep_of(b) {
                return;
            }
            if cs.fixed_type(b).is_some() {
                return;
            }
            cs.merge_equivalence(a, b);
        }
        Op::Compress(v) => {
            cs.representative(TypeVarId(*v));
        }
        Op::AddConstraint(rel, v, ty) => {
            let right = if relation_from(*rel) == Relation::ConformsTo {
                Type::literal_protocol(LiteralProtocol::Integer)
            } else {
                ty.clone()
            };
            cs.add_constraint(Constraint::relate(
                relation_from(*rel),
                Type::Var(TypeVarId(*v)),
                right,
                Locator::synthetic(),
            ));
        }
        Op::Restriction(a, b) => {
            cs.record_restriction(a.clone(), b.clone(), ConversionRestriction::Superclass);
        }
        Op::Score => cs.increase_score(ScoreKind::ValueConversion),
        Op::Overload(ty) => cs.resolve_overload(
            Locator::synthetic(),
            crate::OverloadChoice {
                name: "candidate".to_string(),
                index: 0,
                ty: ty.clone(),
            },
            ty.clone(),
        ),
    }
}

fn system_with_vars() -> ConstraintSystem {
    let mut cs = ConstraintSystem::new();
    for _ in 0..VAR_COUNT {
        cs.fresh_type_var();
    }
    cs
}

// ---------------------------------------------------------------------------
// Solvable system shapes for determinism and component independence
// ---------------------------------------------------------------------------

/// A miniature constraint-generation language whose systems the solver can
/// always attempt deterministically.
#[derive(Debug, Clone)]
enum ShapeConstraint {
    ConvertFrom(u8),
    EqualTo(u8),
    IntegerLiteral,
    Choice(u8, u8),
}

fn concrete(tag: u8) -> Type {
    Type::class(CLASS_POOL[tag as usize % CLASS_POOL.len()])
}

fn arb_shapes() -> impl Strategy<Value = Vec<Vec<ShapeConstraint>>> {
    let one = prop_oneof![
        (0u8..4).prop_map(ShapeConstraint::ConvertFrom),
        (0u8..4).prop_map(ShapeConstraint::EqualTo),
        Just(ShapeConstraint::IntegerLiteral),
        (0u8..4, 0u8..4).prop_map(|(a, b)| ShapeConstraint::Choice(a, b)),
    ];
    prop::collection::vec(prop::collection::vec(one, 1..3), 1..4)
}

/// Build a solver with one variable per shape group; group i's constraints
/// only mention variable i, so groups are independent components.
fn build_solver(shapes: &[Vec<ShapeConstraint>]) -> (Solver, Vec<TypeVarId>) {
    let mut solver = Solver::new();
    let vars: Vec<TypeVarId> = shapes.iter().map(|_| solver.cs.fresh_type_var()).collect();
    for (var, group) in vars.iter().zip(shapes) {
        for constraint in group {
            let c = match constraint {
                ShapeConstraint::ConvertFrom(tag) => Constraint::relate(
                    Relation::Conversion,
                    concrete(*tag),
                    Type::Var(*var),
                    Locator::synthetic(),
                ),
                ShapeConstraint::EqualTo(tag) => Constraint::relate(
                    Relation::Equal,
                    Type::Var(*var),
                    concrete(*tag),
                    Locator::synthetic(),
                ),
                ShapeConstraint::IntegerLiteral => Constraint::relate(
                    Relation::ConformsTo,
                    Type::Var(*var),
                    Type::literal_protocol(LiteralProtocol::Integer),
                    Locator::synthetic(),
                ),
                ShapeConstraint::Choice(a, b) => Constraint::disjunction(
                    vec![
                        Constraint::relate(
                            Relation::Bind,
                            Type::Var(*var),
                            concrete(*a),
                            Locator::synthetic(),
                        ),
                        Constraint::relate(
                            Relation::Bind,
                            Type::Var(*var),
                            concrete(*b),
                            Locator::synthetic(),
                        ),
                    ],
                    Locator::synthetic(),
                ),
            };
            solver.cs.add_constraint(c);
        }
    }
    (solver, vars)
}

fn same_outcome(a: &Result<Solution, SolveError>, b: &Result<Solution, SolveError>) -> bool {
    match (a, b) {
        (Ok(left), Ok(right)) => left == right,
        (
            Err(SolveError::Unsatisfiable { failed: left }),
            Err(SolveError::Unsatisfiable { failed: right }),
        ) => left == right,
        (
            Err(SolveError::Ambiguous { solutions: left }),
            Err(SolveError::Ambiguous { solutions: right }),
        ) => left == right,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Exiting a scope restores the observable state, no matter what
    /// happened inside it — including nested scopes.
    #[test]
    fn rollback_round_trip(
        ops in prop::collection::vec(arb_op(), 0..12),
        split in 0usize..12,
    ) {
        let mut cs = system_with_vars();
        cs.install_solver_state();
        let before = cs.snapshot();

        let outer = cs.begin_scope();
        let split = split.min(ops.len());
        for op in &ops[..split] {
            apply_op(&mut cs, op);
        }
        // Nest a scope over the remainder; it must restore its own entry
        // state before the outer scope restores the original.
        let nested_entry = cs.snapshot();
        let inner = cs.begin_scope();
        for op in &ops[split..] {
            apply_op(&mut cs, op);
        }
        cs.end_scope(inner);
        prop_assert_eq!(&nested_entry, &cs.snapshot());
        cs.end_scope(outer);

        prop_assert_eq!(&before, &cs.snapshot());
        cs.teardown_solver_state();
    }

    /// A candidate that mentions its own variable (through any number of
    /// representative hops) never passes the binding check.
    #[test]
    fn occurs_check_rejects_self_mentions(
        ty in arb_type_with_vars(),
        var in 0..VAR_COUNT as u32,
        merges in prop::collection::vec((0..VAR_COUNT as u32, 0..VAR_COUNT as u32), 0..4),
    ) {
        let mut cs = system_with_vars();
        for (a, b) in merges {
            apply_op(&mut cs, &Op::Merge(a, b));
        }
        let var = TypeVarId(var);

        // Wrap the generated type so it definitely mentions the variable.
        let ty = Type::tuple(vec![
            TupleElement::labelled("a", ty),
            TupleElement::labelled("b", Type::Var(var)),
        ]);
        prop_assert!(cs.check_type_of_binding(var, &ty).is_none());
    }

    /// Representatives are idempotent after arbitrary merges, with and
    /// without path compression.
    #[test]
    fn representative_idempotence(
        merges in prop::collection::vec((0..VAR_COUNT as u32, 0..VAR_COUNT as u32), 0..8),
        compress in prop::collection::vec(0..VAR_COUNT as u32, 0..4),
    ) {
        let mut cs = system_with_vars();
        for (a, b) in merges {
            apply_op(&mut cs, &Op::Merge(a, b));
        }
        for v in compress {
            cs.representative(TypeVarId(v));
        }
        for i in 0..VAR_COUNT as u32 {
            let var = TypeVarId(i);
            prop_assert_eq!(cs.rep_of(cs.rep_of(var)), cs.rep_of(var));
        }
    }

    /// Solving the same system twice yields an identical outcome: the same
    /// solution set in the same order with the same scores.
    #[test]
    fn solving_is_deterministic(shapes in arb_shapes()) {
        let (mut first, _) = build_solver(&shapes);
        let (mut second, _) = build_solver(&shapes);
        let left = first.solve(FreeTypeVariablePolicy::Disallow);
        let right = second.solve(FreeTypeVariablePolicy::Disallow);
        prop_assert!(
            same_outcome(&left, &right),
            "two solves diverged:\n{left:?}\nvs\n{right:?}"
        );
    }

    /// Constraint groups over disjoint variables solve independently: the
    /// combined system succeeds exactly when every group does, and the
    /// composed bindings agree with the separately solved ones.
    #[test]
    fn component_independence(shapes in arb_shapes()) {
        let (mut combined, vars) = build_solver(&shapes);
        let combined_result = combined.solve(FreeTypeVariablePolicy::Disallow);

        let mut separate: Vec<Result<Solution, SolveError>> = Vec::new();
        for group in &shapes {
            let (mut solo, _) = build_solver(std::slice::from_ref(group));
            separate.push(solo.solve(FreeTypeVariablePolicy::Disallow));
        }

        match combined_result {
            Ok(solution) => {
                for (i, var) in vars.iter().enumerate() {
                    let solo = separate[i]
                        .as_ref()
                        .expect("combined solved, so every component must");
                    prop_assert_eq!(
                        solution.binding_for(*var),
                        solo.binding_for(TypeVarId(0)),
                        "component {} disagrees", i
                    );
                }
            }
            Err(_) => {
                prop_assert!(
                    separate.iter().any(|result| result.is_err()),
                    "combined failed but every component solved"
                );
            }
        }
    }

    /// Canonicalization is idempotent and stable under display.
    #[test]
    fn canonical_is_idempotent(ty in arb_type_with_vars()) {
        let once = ty.canonical();
        prop_assert_eq!(&once, &once.canonical());
    }
}
