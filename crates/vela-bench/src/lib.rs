//! Benchmark support for the Vela solver.
//!
//! System builders shared by the divan benchmarks; kept in a library so the
//! shapes can also be reused from scratch profiling binaries.

use vela_solve::{Constraint, Locator, Relation, Solver};
use vela_types::{LiteralProtocol, Type, TypeVarId};

/// A chain `Int <c t0 <c t1 <c ... <c t(n-1)`: each variable binds only
/// after its predecessor does, so the search explores `n` nested states.
pub fn conversion_chain(len: usize) -> Solver {
    let mut solver = Solver::new();
    let vars: Vec<TypeVarId> = (0..len).map(|_| solver.cs.fresh_type_var()).collect();
    solver.cs.add_constraint(Constraint::relate(
        Relation::Conversion,
        Type::class("Int"),
        Type::Var(vars[0]),
        Locator::synthetic(),
    ));
    for pair in vars.windows(2) {
        solver.cs.add_constraint(Constraint::relate(
            Relation::Conversion,
            Type::Var(pair[0]),
            Type::Var(pair[1]),
            Locator::synthetic(),
        ));
    }
    solver
}

/// `n` unconnected variables, each with one conversion candidate: exercises
/// component decomposition and solution composition.
pub fn independent_components(count: usize) -> Solver {
    let mut solver = Solver::new();
    for _ in 0..count {
        let var = solver.cs.fresh_type_var();
        solver.cs.add_constraint(Constraint::relate(
            Relation::Conversion,
            Type::class("Int"),
            Type::Var(var),
            Locator::synthetic(),
        ));
    }
    solver
}

/// One variable constrained by a `width`-way overload disjunction where
/// later alternatives cost an extra optional injection, so the first wins.
pub fn overload_fan(width: usize) -> Solver {
    let mut solver = Solver::new();
    let var = solver.cs.fresh_type_var();
    solver.cs.add_constraint(Constraint::relate(
        Relation::Conversion,
        Type::class("Int"),
        Type::Var(var),
        Locator::synthetic(),
    ));
    let mut alternatives = Vec::with_capacity(width);
    for i in 0..width {
        let mut ty = Type::class("Int");
        for _ in 0..i {
            ty = Type::optional(ty);
        }
        alternatives.push(Constraint::relate(
            Relation::Bind,
            Type::Var(var),
            ty,
            Locator::synthetic(),
        ));
    }
    solver
        .cs
        .add_constraint(Constraint::disjunction(alternatives, Locator::synthetic()));
    solver
}

/// `count` variables that all fall back to the integer-literal default.
pub fn literal_defaults(count: usize) -> Solver {
    let mut solver = Solver::new();
    for _ in 0..count {
        let var = solver.cs.fresh_type_var();
        solver.cs.add_constraint(Constraint::relate(
            Relation::ConformsTo,
            Type::Var(var),
            Type::literal_protocol(LiteralProtocol::Integer),
            Locator::synthetic(),
        ));
    }
    solver
}
