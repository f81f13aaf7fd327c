//! Tests for the constraint solver's search driver.
//!
//! Each test constructs a constraint system by hand and checks the solved
//! bindings, the failure shape, or the observable search trace. This is
//! verbose but precise — we know exactly what we're testing.

use std::sync::{Arc, Mutex};

use vela_ast::{FileId, Span};
use vela_types::{LiteralProtocol, TupleElement, Type, TypeVarId};

use crate::{
    Constraint, ConversionRestriction, Counter, FreeTypeVariablePolicy, Locator, OverloadChoice,
    PathElement, Relation, ScoreKind, SolveError, Solver, Solution,
};

// ---------------------------------------------------------------------------
// Helpers for constructing systems
// ---------------------------------------------------------------------------

fn int() -> Type {
    Type::class("Int")
}

fn float() -> Type {
    Type::class("Float")
}

fn string() -> Type {
    Type::class("String")
}

fn loc() -> Locator {
    Locator::new(Span::new(FileId(0), 0, 1))
}

/// Classes `C <: B <: A`.
fn class_chain() -> (Type, Type, Type) {
    let a = Type::class("A");
    let b = Type::class_with_superclass("B", a.clone());
    let c = Type::class_with_superclass("C", b.clone());
    (a, b, c)
}

fn integer_literal() -> Type {
    Type::literal_protocol(LiteralProtocol::Integer)
}

fn relate(relation: Relation, left: Type, right: Type) -> Constraint {
    Constraint::relate(relation, left, right, loc())
}

fn solve_ok(solver: &mut Solver) -> Solution {
    solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect("system should have a unique solution")
}

/// A debug writer tests can read back.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer lock").clone())
            .expect("debug output is utf-8")
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn debugging_solver() -> (Solver, SharedBuffer) {
    let mut solver = Solver::new();
    solver.cs = crate::ConstraintSystem::with_options(crate::SolverOptions {
        debug: true,
        ..Default::default()
    });
    let buffer = SharedBuffer::default();
    solver.cs.set_debug_writer(Box::new(buffer.clone()));
    (solver, buffer)
}

// ---------------------------------------------------------------------------
// Seed scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_bind_solves() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), int()));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert!(solution.score().is_zero());

    let stats = solver.cs.last_statistics();
    assert_eq!(stats.get(Counter::SolutionAttempts), 1);
    assert_eq!(stats.get(Counter::SimplifiedConstraints), 1);
    // Binding was immediate: no speculative states were needed.
    assert_eq!(stats.get(Counter::StatesExplored), 0);
}

#[test]
fn literal_default_binds_integer() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), integer_literal()));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));

    let stats = solver.cs.last_statistics();
    assert_eq!(stats.get(Counter::TypeVariablesBound), 1);
    assert!(stats.get(Counter::StatesExplored) >= 1);
}

#[test]
fn supertype_enumeration_visits_superclasses_in_order() {
    let (_, b, c) = class_chain();

    // The candidate below v0 is C, but only B conforms to Ordered, so the
    // search must walk C's supertypes.
    let mut solver = Solver::new();
    solver.host.add_conformance("B", "Ordered");

    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Subtype, c.clone(), Type::Var(v0)));
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), Type::protocol("Ordered")));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&b));
}

#[test]
fn supertype_enumeration_order_is_deterministic() {
    let (a, _, c) = class_chain();

    let (mut solver, buffer) = debugging_solver();
    solver.host.add_conformance("A", "Ordered");

    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Subtype, c, Type::Var(v0)));
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), Type::protocol("Ordered")));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&a));

    // The candidate order is pinned: C first, then its supertype B, then A.
    let output = buffer.contents();
    let c_at = output.find("(trying t0 := C").expect("tried C");
    let b_at = output.find("(trying t0 := B").expect("tried B");
    let a_at = output.find("(trying t0 := A").expect("tried A");
    assert!(c_at < b_at && b_at < a_at, "visit order was not C, B, A:\n{output}");
}

#[test]
fn disjunction_overload_picks_lower_score() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    let overload_loc = loc().with_element(PathElement::CallArgument(0));

    // The optional-typed candidate forces a value-to-optional injection, so
    // the plain Int candidate scores strictly better.
    let wrapping = OverloadChoice {
        name: "describe".to_string(),
        index: 0,
        ty: Type::optional(int()),
    };
    let plain = OverloadChoice {
        name: "describe".to_string(),
        index: 1,
        ty: int(),
    };
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            Constraint::relate(
                Relation::Bind,
                Type::Var(v0),
                wrapping.ty.clone(),
                overload_loc.clone(),
            )
            .with_overload(wrapping),
            Constraint::relate(Relation::Bind, Type::Var(v0), plain.ty.clone(), overload_loc.clone())
                .with_overload(plain.clone()),
        ],
        overload_loc.clone(),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert!(solution.score().is_zero());

    let selection = solution
        .overload_choices
        .get(&overload_loc)
        .expect("overload resolution was recorded");
    assert_eq!(selection.choice.index, 1);
    assert_eq!(selection.choice.name, "describe");
    assert_eq!(selection.opened_type, int());

    let stats = solver.cs.last_statistics();
    assert_eq!(stats.get(Counter::Disjunctions), 1);
    assert_eq!(stats.get(Counter::DisjunctionTerms), 2);
}

#[test]
fn independent_variables_split_into_components() {
    let (mut solver, buffer) = debugging_solver();
    let v0 = solver.cs.fresh_type_var();
    let v1 = solver.cs.fresh_type_var();

    solver
        .cs
        .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, string(), Type::Var(v1)));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert_eq!(solution.binding_for(v1), Some(&string()));

    let stats = solver.cs.last_statistics();
    assert_eq!(stats.get(Counter::ComponentsSplit), 1);
    assert!(buffer.contents().contains("(composed solution (0, 0, 0))"));
}

#[test]
fn conflicting_bindings_fail_and_report_the_constraint() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), int()));
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), string()));

    let error = solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect_err("conflicting bindings cannot both hold");
    match &error {
        SolveError::Unsatisfiable { failed: Some(constraint) } => {
            assert!(constraint.to_string().contains("String"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // No per-solve state survives the failed solve.
    assert!(!solver.cs.has_solver_state());

    let diag = error.to_diagnostic();
    assert_eq!(diag.category, crate::Category::TypeMismatch);
}

// ---------------------------------------------------------------------------
// Debug trace format
// ---------------------------------------------------------------------------

#[test]
fn debug_trace_uses_indented_try_markers() {
    let (mut solver, buffer) = debugging_solver();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), integer_literal()));

    solve_ok(&mut solver);

    let contents = buffer.contents();
    let lines: Vec<&str> = contents.lines().map(str::trim_end).collect();
    assert_eq!(
        lines,
        vec!["(trying t0 := Int", "  (found solution (0, 0, 0))", ")"],
    );
}

#[test]
fn structured_trace_records_binding_steps() {
    let mut solver = Solver::new();
    solver.cs.enable_tracing();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), integer_literal()));

    solve_ok(&mut solver);

    let trace = solver.cs.take_trace();
    assert!(trace
        .iter()
        .any(|step| matches!(step.action, crate::trace::SolveAction::TryBinding)
            && step.detail == "t0 := Int"));
    assert!(trace
        .iter()
        .any(|step| matches!(step.action, crate::trace::SolveAction::FoundSolution)));

    // The structured trace serializes for external tools.
    let serialized = serde_json::to_string(&trace).expect("trace serializes");
    assert!(serialized.contains("try_binding"));
}

// ---------------------------------------------------------------------------
// Variable choice and bindings
// ---------------------------------------------------------------------------

#[test]
fn binding_comparator_prefers_more_bindings_after_flag_ties() {
    // v0 and v1 both have candidates involving the other variable, so the
    // three flags tie; the negated binding count then prefers v1, which has
    // two candidates to v0's one. The system is unsatisfiable either way —
    // this test pins the choice order, not the outcome.
    let (mut solver, buffer) = debugging_solver();
    let v0 = solver.cs.fresh_type_var();
    let v1 = solver.cs.fresh_type_var();

    solver
        .cs
        .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, int(), Type::Var(v1)));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, float(), Type::Var(v1)));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, Type::Var(v0), Type::Var(v1)));

    let _ = solver.solve(FreeTypeVariablePolicy::Disallow);

    let output = buffer.contents();
    let first_try = output
        .lines()
        .find(|line| line.contains("(trying"))
        .expect("at least one binding attempt");
    assert!(
        first_try.contains("t1 :="),
        "expected the variable with more candidates to be tried first: {first_try}"
    );
}

#[test]
fn lvalue_candidates_decay_for_rvalue_variables() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(relate(
        Relation::Conversion,
        Type::lvalue(int()),
        Type::Var(v0),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
}

#[test]
fn single_element_tuple_conversions_unwrap_the_element() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    // v0 <c (value: Int) can bind v0 straight to Int.
    solver.cs.add_constraint(relate(
        Relation::Conversion,
        Type::Var(v0),
        Type::tuple(vec![TupleElement::labelled("value", int())]),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
}

#[test]
fn recursive_candidates_are_skipped_not_fatal() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    // The only candidate mentions v0 itself, so there is nothing to bind.
    solver.cs.add_constraint(relate(
        Relation::Conversion,
        Type::optional(Type::Var(v0)),
        Type::Var(v0),
    ));

    let error = solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect_err("no candidate survives the occurs check");
    assert!(matches!(error, SolveError::Unsatisfiable { .. }));
}

#[test]
fn alternative_literal_types_are_tried_on_retry() {
    // Int fails the extra conformance, but the Integer protocol's
    // alternative type Float passes it, at a score penalty.
    let mut solver = Solver::new();
    solver.host.add_conformance("Float", "Fractional");
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), integer_literal()));
    solver.cs.add_constraint(relate(
        Relation::ConformsTo,
        Type::Var(v0),
        Type::protocol("Fractional"),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&float()));
    assert_eq!(solution.score().get(ScoreKind::NonDefaultLiteral), 1);
}

// ---------------------------------------------------------------------------
// Disjunction heuristics
// ---------------------------------------------------------------------------

#[test]
fn tuple_to_tuple_restriction_stops_enumeration() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            relate(Relation::Bind, Type::Var(v0), int())
                .with_restriction(ConversionRestriction::TupleToTuple),
            relate(Relation::Bind, Type::Var(v0), float()),
        ],
        loc(),
    ));

    // Without the short-circuit both alternatives would solve at equal
    // scores and the system would be ambiguous.
    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert_eq!(
        solver.cs.last_statistics().get(Counter::DisjunctionTerms),
        1
    );
}

#[test]
fn optional_to_optional_alternatives_are_skipped_after_a_solution() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            relate(Relation::Bind, Type::Var(v0), int()),
            relate(Relation::Bind, Type::Var(v0), float())
                .with_restriction(ConversionRestriction::OptionalToOptional),
        ],
        loc(),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert_eq!(
        solver.cs.last_statistics().get(Counter::DisjunctionTerms),
        1
    );
}

#[test]
fn interpolation_argument_conversions_stop_after_success() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    let interp = loc().with_element(PathElement::InterpolationArgument);
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            Constraint::relate(Relation::Conversion, int(), Type::Var(v0), interp.clone()),
            Constraint::relate(Relation::Bind, Type::Var(v0), float(), interp.clone()),
        ],
        interp,
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert_eq!(
        solver.cs.last_statistics().get(Counter::DisjunctionTerms),
        1
    );
}

#[test]
fn smallest_disjunction_is_branched_first() {
    let (mut solver, buffer) = debugging_solver();
    let v0 = solver.cs.fresh_type_var();
    let v1 = solver.cs.fresh_type_var();

    // Connect both variables so they form one component, then offer a
    // three-way and a two-way disjunction. The two-way one must be branched
    // first.
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, Type::Var(v0), Type::Var(v1)));
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            relate(Relation::Bind, Type::Var(v0), int()),
            relate(Relation::Bind, Type::Var(v0), float()),
            relate(Relation::Bind, Type::Var(v0), string()),
        ],
        loc(),
    ));
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            relate(Relation::Bind, Type::Var(v1), int()),
            relate(Relation::Bind, Type::Var(v1), string()),
        ],
        loc().with_element(PathElement::CallArgument(1)),
    ));

    let _ = solver.solve(FreeTypeVariablePolicy::Disallow);

    let output = buffer.contents();
    let first_assume = output
        .lines()
        .find(|line| line.contains("(assuming"))
        .expect("at least one disjunction branch");
    assert!(
        first_assume.contains("t1 :="),
        "expected the two-way disjunction to be branched first: {first_assume}"
    );
}

// ---------------------------------------------------------------------------
// Composite constraints
// ---------------------------------------------------------------------------

#[test]
fn conjunctions_are_normalized_away_on_add() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    let v1 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::conjunction(
        vec![
            relate(Relation::Bind, Type::Var(v0), int()),
            relate(Relation::Bind, Type::Var(v1), string()),
        ],
        loc(),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
    assert_eq!(solution.binding_for(v1), Some(&string()));
}

#[test]
fn disjunction_of_conjunctions_assumes_all_children() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    let v1 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Equal, Type::Var(v0), float()));
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            Constraint::conjunction(
                vec![
                    relate(Relation::Bind, Type::Var(v0), int()),
                    relate(Relation::Bind, Type::Var(v1), float()),
                ],
                loc(),
            ),
            Constraint::conjunction(
                vec![
                    relate(Relation::Bind, Type::Var(v0), float()),
                    relate(Relation::Bind, Type::Var(v1), int()),
                ],
                loc(),
            ),
        ],
        loc(),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&float()));
    assert_eq!(solution.binding_for(v1), Some(&int()));
}

// ---------------------------------------------------------------------------
// Members, application, properties
// ---------------------------------------------------------------------------

#[test]
fn member_constraints_resolve_through_the_registry() {
    let mut solver = Solver::new();
    solver.host.add_member("Point", "x", int());
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::member(
        Type::class("Point"),
        crate::Label::new("x"),
        Type::Var(v0),
        loc(),
    ));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&int()));
}

#[test]
fn member_lookup_walks_the_superclass_chain() {
    let mut solver = Solver::new();
    solver.host.add_member("A", "id", string());
    let (_, _, c) = class_chain();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(Constraint::member(c, crate::Label::new("id"), Type::Var(v0), loc()));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v0), Some(&string()));
}

#[test]
fn missing_members_fail_with_member_category() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::member(
        Type::class("Point"),
        crate::Label::new("missing"),
        Type::Var(v0),
        loc(),
    ));

    let error = solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect_err("unknown member");
    assert_eq!(error.to_diagnostic().category, crate::Category::MemberNotFound);
}

#[test]
fn applicable_function_decomposes_the_call_site() {
    let mut solver = Solver::new();
    let result = solver.cs.fresh_type_var();
    let call_site = Type::function(vec![int(), int()], Type::Var(result));
    let callee = Type::function(vec![int(), int()], string());
    solver
        .cs
        .add_constraint(relate(Relation::ApplicableFunction, call_site, callee));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(result), Some(&string()));
}

#[test]
fn applicable_function_arity_mismatch_fails() {
    let mut solver = Solver::new();
    let result = solver.cs.fresh_type_var();
    let call_site = Type::function(vec![int()], Type::Var(result));
    let callee = Type::function(vec![int(), int()], string());
    solver
        .cs
        .add_constraint(relate(Relation::ApplicableFunction, call_site, callee));

    let error = solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect_err("arity mismatch");
    assert_eq!(
        error.to_diagnostic().category,
        crate::Category::InvalidApplication
    );
}

#[test]
fn property_predicates_check_the_simplified_type() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), Type::function(vec![], int())));
    solver.cs.add_constraint(Constraint::property(
        Type::Var(v0),
        crate::PropertyPredicate::IsFunction,
        loc(),
    ));

    solve_ok(&mut solver);
}

// ---------------------------------------------------------------------------
// Free type variables and finalization policies
// ---------------------------------------------------------------------------

#[test]
fn free_variable_policies_shape_the_solution() {
    let build = |solver: &mut Solver| {
        let v0 = solver.cs.fresh_type_var();
        solver.cs.add_constraint(relate(
            Relation::ConformsTo,
            Type::Var(v0),
            Type::protocol("Printable"),
        ));
        v0
    };

    // Disallow: a residual conformance over a free variable fails.
    let mut solver = Solver::new();
    build(&mut solver);
    assert!(solver.solve(FreeTypeVariablePolicy::Disallow).is_err());

    // Allow: the variable stays free.
    let mut solver = Solver::new();
    let v0 = build(&mut solver);
    let solution = solver
        .solve(FreeTypeVariablePolicy::Allow)
        .expect("free variables are allowed");
    assert_eq!(solution.binding_for(v0), Some(&Type::Var(v0)));

    // GenericParameters: the variable generalizes.
    let mut solver = Solver::new();
    let v0 = build(&mut solver);
    let solution = solver
        .solve(FreeTypeVariablePolicy::GenericParameters)
        .expect("free variables generalize");
    assert_eq!(solution.binding_for(v0), Some(&Type::GenericParam { index: 0 }));
}

// ---------------------------------------------------------------------------
// Scoring, restrictions, pruning
// ---------------------------------------------------------------------------

#[test]
fn value_to_optional_injection_is_scored_and_recorded() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), Type::optional(int())));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));

    let solution = solve_ok(&mut solver);
    assert_eq!(solution.score().get(ScoreKind::ValueToOptional), 1);
    assert!(solution
        .restrictions
        .iter()
        .any(|(_, _, restriction)| *restriction
            == ConversionRestriction::ValueToOptional));
}

#[test]
fn superclass_conversions_record_their_restriction() {
    let (_, b, c) = class_chain();
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), b.clone()));
    solver
        .cs
        .add_constraint(relate(Relation::Conversion, c.clone(), Type::Var(v0)));

    let solution = solve_ok(&mut solver);
    assert!(solution
        .restrictions
        .iter()
        .any(|(left, right, restriction)| {
            *restriction == ConversionRestriction::Superclass && left == &c && right == &b
        }));
}

#[test]
fn pruning_never_discards_better_solutions() {
    // Whichever order the alternatives are explored in, the zero-score
    // candidate must win: pruning only ever cuts branches that are already
    // worse than a recorded solution.
    for flipped in [false, true] {
        let mut solver = Solver::new();
        let v0 = solver.cs.fresh_type_var();
        let mut alternatives = vec![
            relate(Relation::Bind, Type::Var(v0), int()),
            relate(Relation::Bind, Type::Var(v0), Type::optional(int())),
        ];
        if flipped {
            alternatives.reverse();
        }
        solver
            .cs
            .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));
        solver
            .cs
            .add_constraint(Constraint::disjunction(alternatives, loc()));

        let solution = solve_ok(&mut solver);
        assert_eq!(solution.binding_for(v0), Some(&int()));
        assert!(solution.score().is_zero());
    }
}

#[test]
fn equal_score_alternatives_are_ambiguous() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::disjunction(
        vec![
            relate(Relation::Bind, Type::Var(v0), int()),
            relate(Relation::Bind, Type::Var(v0), float()),
        ],
        loc(),
    ));

    let error = solver
        .solve(FreeTypeVariablePolicy::Disallow)
        .expect_err("equal scores cannot be ranked");
    match &error {
        SolveError::Ambiguous { solutions } => {
            assert_eq!(solutions.len(), 2);
            assert_eq!(solutions[0].score(), solutions[1].score());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        error.to_diagnostic().category,
        crate::Category::AmbiguousExpression
    );
}

#[test]
fn state_limit_fails_deep_searches_cleanly() {
    let build = |options| {
        let mut solver = Solver::new();
        solver.cs = crate::ConstraintSystem::with_options(options);
        let v0 = solver.cs.fresh_type_var();
        let v1 = solver.cs.fresh_type_var();
        solver
            .cs
            .add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));
        solver
            .cs
            .add_constraint(relate(Relation::Conversion, Type::Var(v0), Type::Var(v1)));
        (solver, v1)
    };

    // Unlimited: two binding levels find v0 = v1 = Int.
    let (mut solver, v1) = build(crate::SolverOptions::default());
    let solution = solve_ok(&mut solver);
    assert_eq!(solution.binding_for(v1), Some(&int()));

    // A zero ceiling fails the nested level, and the failure unwinds
    // without leaving solver state behind.
    let (mut solver, _) = build(crate::SolverOptions {
        state_limit: Some(0),
        ..Default::default()
    });
    assert!(solver.solve(FreeTypeVariablePolicy::Disallow).is_err());
    assert!(!solver.cs.has_solver_state());
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[test]
fn scope_exit_restores_the_observable_state() {
    let mut solver = Solver::new();
    let cs = &mut solver.cs;
    let v0 = cs.fresh_type_var();
    let v1 = cs.fresh_type_var();
    let v2 = cs.fresh_type_var();
    cs.add_constraint(relate(Relation::Conversion, int(), Type::Var(v0)));

    cs.install_solver_state();
    let before = cs.snapshot();

    let scope = cs.begin_scope();
    cs.merge_equivalence(v0, v1);
    cs.assign_fixed_type(v2, string());
    cs.add_constraint(relate(Relation::Equal, Type::Var(v0), float()));
    cs.record_restriction(int(), float(), ConversionRestriction::Superclass);
    cs.increase_score(ScoreKind::ValueConversion);
    cs.resolve_overload(
        loc(),
        OverloadChoice {
            name: "f".to_string(),
            index: 0,
            ty: int(),
        },
        int(),
    );
    let during = cs.snapshot();
    assert_ne!(before, during, "mutations must be observable inside the scope");

    cs.end_scope(scope);
    assert_eq!(before, cs.snapshot(), "scope exit must restore the state exactly");
    cs.teardown_solver_state();
}

#[test]
fn statistics_fold_into_process_totals() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::Bind, Type::Var(v0), int()));
    solve_ok(&mut solver);

    let totals = crate::process_totals();
    assert!(totals.get(Counter::SolutionAttempts) >= 1);
    assert!(
        totals.get(Counter::SimplifiedConstraints)
            >= solver.cs.last_statistics().get(Counter::SimplifiedConstraints)
    );
}

#[test]
fn constraint_classification_partitions_the_kinds() {
    use crate::Classification;

    let v0 = TypeVarId(0);
    let cases = [
        (
            relate(Relation::Subtype, Type::Var(v0), int()),
            Classification::Relational,
        ),
        (
            Constraint::property(Type::Var(v0), crate::PropertyPredicate::IsClass, loc()),
            Classification::TypeProperty,
        ),
        (
            Constraint::member(int(), crate::Label::new("x"), Type::Var(v0), loc()),
            Classification::Member,
        ),
        (
            Constraint::conjunction(vec![], loc()),
            Classification::Conjunction,
        ),
        (
            Constraint::disjunction(vec![], loc()),
            Classification::Disjunction,
        ),
    ];
    for (constraint, expected) in cases {
        assert_eq!(constraint.classification(), expected);
    }
}

#[test]
fn largest_system_never_exceeds_process_totals() {
    let mut solver = Solver::new();
    let v0 = solver.cs.fresh_type_var();
    solver
        .cs
        .add_constraint(relate(Relation::ConformsTo, Type::Var(v0), integer_literal()));
    solve_ok(&mut solver);

    let (_, largest) = crate::largest_system();
    let totals = crate::process_totals();
    assert!(
        largest.get(Counter::StatesExplored) <= totals.get(Counter::StatesExplored),
        "the largest single system cannot beat the running totals"
    );
}

#[test]
fn type_variable_ids_stay_dense_and_ordered() {
    let mut solver = Solver::new();
    let vars: Vec<TypeVarId> = (0..4).map(|_| solver.cs.fresh_type_var()).collect();
    for (i, var) in vars.iter().enumerate() {
        assert_eq!(var.0 as usize, i);
    }
}
