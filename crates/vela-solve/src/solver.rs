//! The constraint system and its backtracking search driver.
//!
//! A [`ConstraintSystem`] owns the mutable solver state: the type-variable
//! arena with its union-find representative structure, the binding journal,
//! the live constraint store with its worklist, the overload-resolution
//! stack, restrictions, and the current score. Every speculative mutation
//! goes through the journal or a scope-owned sideband so that
//! [`ConstraintSystem::end_scope`] restores the state observed at
//! [`ConstraintSystem::begin_scope`] exactly.
//!
//! [`Solver`] drives the search: simplify the system to a fixpoint, then
//! either finalize a solution, decompose into connected components, bind the
//! most promising type variable, or branch on a disjunction — rolling back
//! after each speculative branch.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use vela_types::{direct_supertypes, LiteralProtocol, Type, TypeVarId};

use crate::trace::{SolveAction, SolveStep};
use crate::{
    record_solve, Constraint, ConstraintKind, ConversionRestriction, Counter,
    FreeTypeVariablePolicy, Locator, OverloadChoice, OverloadSelection, PathElement,
    PropertyPredicate, Relation, ResolvedOverload, Score, ScoreKind, Solution, SolutionKind,
    SolverHost, SolverOptions, Statistics,
};

/// Process-global solution attempt numbering, used by `debug_attempt`
/// targeting and the largest-system statistics.
static SOLUTION_ATTEMPT: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Arena identities
// ---------------------------------------------------------------------------

/// Stable identity of a constraint within one system's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(u32);

struct ConstraintEntry {
    constraint: Constraint,
    /// Whether the constraint currently sits on the worklist.
    active: bool,
}

/// Mutable per-variable state. Entries live for the lifetime of the system;
/// the live-variable *list* is what scopes truncate.
struct TypeVariableInfo {
    /// Union-find parent; a representative points at itself.
    parent: TypeVarId,
    /// The fixed type, if one has been assigned. Only representatives carry
    /// fixed types.
    fixed: Option<Type>,
    can_bind_to_lvalue: bool,
}

/// One reversible mutation of a type variable's state.
struct SavedBinding {
    var: TypeVarId,
    parent: TypeVarId,
    fixed: Option<Type>,
}

// ---------------------------------------------------------------------------
// Solver state: per-solve sidebands
// ---------------------------------------------------------------------------

struct SolverState {
    attempt: u64,
    depth: usize,
    /// The binding journal. Scopes record its length and replay it in
    /// reverse on exit.
    saved_bindings: Vec<SavedBinding>,
    /// Constraints retired during the current solve, most recent last.
    retired: Vec<ConstraintId>,
    /// Conversion restrictions applied on the current branch.
    restrictions: Vec<(Type, Type, ConversionRestriction)>,
    /// One generated-constraint set per open scope; constraints added while
    /// a scope is open are removed from the store when it exits.
    generated: Vec<HashSet<ConstraintId>>,
    best_score: Option<Score>,
    stats: Statistics,
    /// `options.debug` before per-attempt debug targeting kicked in.
    old_debug: bool,
}

// ---------------------------------------------------------------------------
// The constraint system
// ---------------------------------------------------------------------------

/// The mutable state of one constraint solve.
pub struct ConstraintSystem {
    vars: Vec<TypeVariableInfo>,
    /// Live type variables, in creation order. Truncated on scope exit.
    type_variables: Vec<TypeVarId>,
    arena: Vec<ConstraintEntry>,
    /// Live constraints, in insertion order.
    store: Vec<ConstraintId>,
    worklist: VecDeque<ConstraintId>,
    resolved_overloads: Option<Rc<ResolvedOverload>>,
    failed_constraint: Option<ConstraintId>,
    current_score: Score,
    solver_state: Option<SolverState>,
    options: SolverOptions,
    debug_writer: Option<Box<dyn Write>>,
    tracing: bool,
    trace: Vec<SolveStep>,
    last_statistics: Statistics,
}

impl fmt::Debug for ConstraintSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintSystem")
            .field("type_variables", &self.type_variables.len())
            .field("live_constraints", &self.store.len())
            .field("score", &self.current_score)
            .finish()
    }
}

impl Default for ConstraintSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSystem {
    pub fn new() -> Self {
        Self::with_options(SolverOptions::default())
    }

    pub fn with_options(options: SolverOptions) -> Self {
        Self {
            vars: Vec::new(),
            type_variables: Vec::new(),
            arena: Vec::new(),
            store: Vec::new(),
            worklist: VecDeque::new(),
            resolved_overloads: None,
            failed_constraint: None,
            current_score: Score::zero(),
            solver_state: None,
            options,
            debug_writer: None,
            tracing: false,
            trace: Vec::new(),
            last_statistics: Statistics::new(),
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Inject the writer the debug trace is printed to. Without one, debug
    /// output goes to stderr.
    pub fn set_debug_writer(&mut self, writer: Box<dyn Write>) {
        self.debug_writer = Some(writer);
    }

    /// Enable structured trace recording. Zero overhead when disabled.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Take and clear the recorded structured trace.
    pub fn take_trace(&mut self) -> Vec<SolveStep> {
        std::mem::take(&mut self.trace)
    }

    /// Counters from the most recently finished solve.
    pub fn last_statistics(&self) -> &Statistics {
        &self.last_statistics
    }

    pub fn current_score(&self) -> Score {
        self.current_score
    }

    pub fn has_solver_state(&self) -> bool {
        self.solver_state.is_some()
    }

    // -----------------------------------------------------------------------
    // Type variables and the union-find representative structure
    // -----------------------------------------------------------------------

    /// Create a fresh type variable that cannot bind to l-values.
    pub fn fresh_type_var(&mut self) -> TypeVarId {
        self.fresh_type_var_with(false)
    }

    /// Create a fresh type variable with explicit l-value capability.
    pub fn fresh_type_var_with(&mut self, can_bind_to_lvalue: bool) -> TypeVarId {
        let id = TypeVarId(self.vars.len() as u32);
        self.vars.push(TypeVariableInfo {
            parent: id,
            fixed: None,
            can_bind_to_lvalue,
        });
        self.type_variables.push(id);
        id
    }

    pub fn can_bind_to_lvalue(&self, var: TypeVarId) -> bool {
        self.vars[var.0 as usize].can_bind_to_lvalue
    }

    fn info(&self, var: TypeVarId) -> &TypeVariableInfo {
        &self.vars[var.0 as usize]
    }

    /// Representative lookup without path compression. Usable from `&self`
    /// contexts; agrees with [`ConstraintSystem::representative`].
    pub fn rep_of(&self, var: TypeVarId) -> TypeVarId {
        let mut current = var;
        loop {
            let parent = self.info(current).parent;
            if parent == current {
                return current;
            }
            current = parent;
        }
    }

    /// Representative lookup with journaled path compression.
    pub fn representative(&mut self, var: TypeVarId) -> TypeVarId {
        let root = self.rep_of(var);
        // Compress the chain through the journal so rollback restores the
        // exact parent structure.
        let mut current = var;
        while current != root {
            let parent = self.info(current).parent;
            if parent != root {
                self.save_binding(current);
                self.vars[current.0 as usize].parent = root;
            }
            current = parent;
        }
        root
    }

    /// The fixed type of `var`'s representative, if one has been assigned.
    pub fn fixed_type(&self, var: TypeVarId) -> Option<Type> {
        let rep = self.rep_of(var);
        self.info(rep).fixed.clone()
    }

    /// Record the prior state of `var` in the journal, when solving.
    fn save_binding(&mut self, var: TypeVarId) {
        let info = self.info(var);
        let saved = SavedBinding {
            var,
            parent: info.parent,
            fixed: info.fixed.clone(),
        };
        if let Some(state) = self.solver_state.as_mut() {
            state.saved_bindings.push(saved);
        }
    }

    /// Assign a fixed type to `var`'s representative and reactivate the
    /// constraints that mention it.
    pub fn assign_fixed_type(&mut self, var: TypeVarId, ty: Type) {
        let rep = self.representative(var);
        debug_assert!(
            self.info(rep).fixed.is_none(),
            "type variable already has a fixed type"
        );
        self.save_binding(rep);
        self.vars[rep.0 as usize].fixed = Some(ty);
        self.activate_constraints_mentioning(&[rep]);
    }

    /// Merge the equivalence classes of two variables. The second class is
    /// folded into the first.
    pub fn merge_equivalence(&mut self, first: TypeVarId, second: TypeVarId) {
        let rep1 = self.representative(first);
        let rep2 = self.representative(second);
        if rep1 == rep2 {
            return;
        }
        debug_assert!(
            self.info(rep2).fixed.is_none(),
            "merging away a representative with a fixed type"
        );
        self.save_binding(rep2);
        self.vars[rep2.0 as usize].parent = rep1;
        self.activate_constraints_mentioning(&[rep1, rep2]);
    }

    /// Replay the journal down to `len` entries, restoring each mutation.
    fn restore_type_variable_bindings(&mut self, len: usize) {
        let saved = {
            let state = self
                .solver_state
                .as_mut()
                .expect("binding journal requires an active solve");
            assert!(
                len <= state.saved_bindings.len(),
                "binding journal shrank below a scope's restore point"
            );
            state.saved_bindings.split_off(len)
        };
        for binding in saved.into_iter().rev() {
            let info = &mut self.vars[binding.var.0 as usize];
            info.parent = binding.parent;
            info.fixed = binding.fixed;
        }
    }

    /// Whether any live type variable remains without a fixed type.
    pub fn has_free_type_variables(&self) -> bool {
        self.type_variables
            .iter()
            .any(|&var| self.fixed_type(var).is_none())
    }

    // -----------------------------------------------------------------------
    // Type simplification
    // -----------------------------------------------------------------------

    /// Apply the current bindings to a type: every variable is replaced by
    /// its representative's fixed type, recursively. Terminates because the
    /// occurs check keeps the binding structure acyclic.
    pub fn simplify_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(var) => {
                let rep = self.rep_of(*var);
                match &self.info(rep).fixed {
                    Some(fixed) => self.simplify_type(fixed),
                    None => Type::Var(rep),
                }
            }
            Type::Class(class) => Type::Class(vela_types::ClassType {
                name: class.name.clone(),
                superclass: class
                    .superclass
                    .as_deref()
                    .map(|superclass| Box::new(self.simplify_type(superclass))),
            }),
            Type::Protocol(_) | Type::GenericParam { .. } => ty.clone(),
            Type::Tuple(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|elt| vela_types::TupleElement {
                        label: elt.label.clone(),
                        ty: self.simplify_type(&elt.ty),
                        vararg: elt.vararg,
                    })
                    .collect(),
            ),
            Type::Function(func) => Type::Function(vela_types::FunctionType {
                params: func.params.iter().map(|p| self.simplify_type(p)).collect(),
                result: Box::new(self.simplify_type(&func.result)),
                auto_closure: func.auto_closure,
            }),
            Type::Optional(inner) => Type::Optional(Box::new(self.simplify_type(inner))),
            Type::LValue { object, implicit } => Type::LValue {
                object: Box::new(self.simplify_type(object)),
                implicit: *implicit,
            },
        }
    }

    /// Check whether `ty` can be used as a binding for `var`.
    ///
    /// Returns the simplified type to bind, or `None` when the occurs check
    /// fails or the candidate is a bare type variable. A `None` is a
    /// non-binding, not an error: the caller skips the candidate.
    pub fn check_type_of_binding(&self, var: TypeVarId, ty: &Type) -> Option<Type> {
        let ty = self.simplify_type(ty);
        let rep = self.rep_of(var);

        let mut mentioned = BTreeSet::new();
        ty.collect_type_vars(&mut mentioned);
        if mentioned.iter().any(|&v| self.rep_of(v) == rep) {
            return None;
        }

        if ty.rvalue_type().is_type_variable() {
            return None;
        }

        Some(ty)
    }

    // -----------------------------------------------------------------------
    // The constraint store, graph queries, and the worklist
    // -----------------------------------------------------------------------

    fn intern(&mut self, constraint: Constraint) -> ConstraintId {
        let id = ConstraintId(self.arena.len() as u32);
        self.arena.push(ConstraintEntry {
            constraint,
            active: false,
        });
        id
    }

    /// Allocate a constraint and track it in the current scope's generated
    /// set without putting it in the live store.
    pub(crate) fn intern_tracked(&mut self, constraint: Constraint) -> ConstraintId {
        let id = self.intern(constraint);
        self.note_generated(id);
        id
    }

    fn note_generated(&mut self, id: ConstraintId) {
        if let Some(state) = self.solver_state.as_mut() {
            if let Some(generated) = state.generated.last_mut() {
                generated.insert(id);
            }
        }
    }

    /// Add a constraint to the system: normalize conjunctions away, place it
    /// in the live store, and activate it for simplification.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        if let ConstraintKind::Conjunction(children) = constraint.kind {
            for child in children {
                self.add_constraint(child);
            }
            return;
        }
        let id = self.intern(constraint);
        self.store.push(id);
        self.note_generated(id);
        self.activate(id);
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.arena[id.0 as usize].constraint
    }

    pub fn store_is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store_ids(&self) -> Vec<ConstraintId> {
        self.store.clone()
    }

    pub(crate) fn is_active(&self, id: ConstraintId) -> bool {
        self.arena[id.0 as usize].active
    }

    pub(crate) fn set_inactive(&mut self, id: ConstraintId) {
        self.arena[id.0 as usize].active = false;
    }

    fn activate(&mut self, id: ConstraintId) {
        let entry = &mut self.arena[id.0 as usize];
        if !entry.active {
            entry.active = true;
            self.worklist.push_back(id);
        }
    }

    pub(crate) fn pop_worklist(&mut self) -> Option<ConstraintId> {
        self.worklist.pop_front()
    }

    /// Deactivate and discard everything left on the worklist.
    pub(crate) fn drain_worklist(&mut self) {
        while let Some(id) = self.worklist.pop_front() {
            debug_assert!(self.arena[id.0 as usize].active);
            self.arena[id.0 as usize].active = false;
        }
    }

    /// Retire a solved constraint: remove it from the live store and park it
    /// on the retired list so the enclosing scope can splice it back.
    pub(crate) fn retire_constraint(&mut self, id: ConstraintId) {
        let position = self
            .store
            .iter()
            .position(|&live| live == id)
            .expect("retiring a constraint that is not in the live store");
        self.store.remove(position);
        if let Some(state) = self.solver_state.as_mut() {
            state.retired.push(id);
        }
    }

    /// Move every live constraint to the retired list (failure path).
    pub(crate) fn retire_all_live(&mut self) {
        let live = std::mem::take(&mut self.store);
        if let Some(state) = self.solver_state.as_mut() {
            state.retired.extend(live);
        }
    }

    pub(crate) fn push_store(&mut self, id: ConstraintId) {
        self.store.push(id);
    }

    pub(crate) fn remove_from_store(&mut self, id: ConstraintId) -> usize {
        let position = self
            .store
            .iter()
            .position(|&live| live == id)
            .expect("removing a constraint that is not in the live store");
        self.store.remove(position);
        position
    }

    pub(crate) fn insert_into_store_at(&mut self, position: usize, id: ConstraintId) {
        assert!(position <= self.store.len());
        self.store.insert(position, id);
    }

    pub(crate) fn drain_store(&mut self) -> Vec<ConstraintId> {
        std::mem::take(&mut self.store)
    }

    pub(crate) fn extend_store(&mut self, ids: impl IntoIterator<Item = ConstraintId>) {
        self.store.extend(ids);
    }

    pub(crate) fn disjunction_len(&self, id: ConstraintId) -> usize {
        match &self.constraint(id).kind {
            ConstraintKind::Disjunction(children) => children.len(),
            _ => unreachable!("constraint is not a disjunction"),
        }
    }

    /// Every type mentioned by a constraint, including the children of
    /// composite constraints.
    fn constraint_types<'a>(constraint: &'a Constraint, out: &mut Vec<&'a Type>) {
        match &constraint.kind {
            ConstraintKind::Relate { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            ConstraintKind::Property { ty, .. } => out.push(ty),
            ConstraintKind::Member { base, member, .. } => {
                out.push(base);
                out.push(member);
            }
            ConstraintKind::Conjunction(children) | ConstraintKind::Disjunction(children) => {
                for child in children {
                    Self::constraint_types(child, out);
                }
            }
        }
    }

    /// The representatives of every type variable a constraint mentions, in
    /// first-mention order.
    fn constraint_rep_vars(&self, constraint: &Constraint) -> Vec<TypeVarId> {
        let mut types = Vec::new();
        Self::constraint_types(constraint, &mut types);
        let mut reps = Vec::new();
        let mut seen = BTreeSet::new();
        for ty in types {
            let mut vars = BTreeSet::new();
            ty.collect_type_vars(&mut vars);
            for var in vars {
                let rep = self.rep_of(var);
                if seen.insert(rep) {
                    reps.push(rep);
                }
            }
        }
        reps
    }

    /// The graph query: live constraints mentioning a variable whose
    /// representative is in `reps`. Each hit is activated onto the worklist.
    fn activate_constraints_mentioning(&mut self, reps: &[TypeVarId]) {
        let mut to_activate = Vec::new();
        for &id in &self.store {
            if self.arena[id.0 as usize].active {
                continue;
            }
            let mentioned = self.constraint_rep_vars(self.constraint(id));
            if mentioned.iter().any(|rep| reps.contains(rep)) {
                to_activate.push(id);
            }
        }
        for id in to_activate {
            self.activate(id);
        }
    }

    // -----------------------------------------------------------------------
    // Scores, restrictions, overloads, failure
    // -----------------------------------------------------------------------

    /// Penalize the current branch. Scores only ever increase inside a
    /// branch; scopes restore the previous value on exit.
    pub fn increase_score(&mut self, kind: ScoreKind) {
        self.current_score.bump(kind);
    }

    /// Record a conversion restriction applied on this branch.
    pub fn record_restriction(
        &mut self,
        left: Type,
        right: Type,
        restriction: ConversionRestriction,
    ) {
        if let Some(state) = self.solver_state.as_mut() {
            state.restrictions.push((left, right, restriction));
        }
    }

    /// Push an overload resolution onto the persistent resolution stack.
    pub fn resolve_overload(&mut self, locator: Locator, choice: OverloadChoice, opened_type: Type) {
        self.resolved_overloads = Some(Rc::new(ResolvedOverload {
            locator,
            choice,
            opened_type,
            previous: self.resolved_overloads.take(),
        }));
    }

    pub(crate) fn note_failed(&mut self, id: ConstraintId) {
        if self.failed_constraint.is_none() {
            self.failed_constraint = Some(id);
        }
    }

    pub fn failed_constraint(&self) -> Option<&Constraint> {
        self.failed_constraint.map(|id| self.constraint(id))
    }

    pub(crate) fn has_failed_constraint(&self) -> bool {
        self.failed_constraint.is_some()
    }

    pub(crate) fn worse_than_best_solution(&self) -> bool {
        self.solver_state
            .as_ref()
            .and_then(|state| state.best_score)
            .is_some_and(|best| self.current_score > best)
    }

    pub(crate) fn best_score(&self) -> Option<Score> {
        self.solver_state.as_ref().and_then(|state| state.best_score)
    }

    pub(crate) fn set_best_score(&mut self, score: Option<Score>) {
        if let Some(state) = self.solver_state.as_mut() {
            state.best_score = score;
        }
    }

    pub(crate) fn bump_stat(&mut self, counter: Counter) {
        if let Some(state) = self.solver_state.as_mut() {
            state.stats.bump(counter);
        }
    }

    pub(crate) fn state_limit_exceeded(&self) -> bool {
        let Some(limit) = self.options.state_limit else {
            return false;
        };
        self.solver_state
            .as_ref()
            .is_some_and(|state| state.stats.get(Counter::StatesExplored) > limit)
    }

    // -----------------------------------------------------------------------
    // Solver state lifecycle
    // -----------------------------------------------------------------------

    pub(crate) fn install_solver_state(&mut self) {
        assert!(
            self.solver_state.is_none(),
            "solve is not reentrant on one constraint system"
        );
        let attempt = SOLUTION_ATTEMPT.fetch_add(1, Ordering::Relaxed) + 1;
        let old_debug = self.options.debug;
        if self.options.debug_attempt == Some(attempt) {
            self.options.debug = true;
        }
        let mut stats = Statistics::new();
        stats.bump(Counter::SolutionAttempts);
        self.solver_state = Some(SolverState {
            attempt,
            depth: 0,
            saved_bindings: Vec::new(),
            retired: Vec::new(),
            restrictions: Vec::new(),
            generated: Vec::new(),
            best_score: None,
            stats,
            old_debug,
        });
        if self.options.debug && self.options.debug_attempt == Some(attempt) {
            self.debug_log(0, format_args!("---Constraint system #{attempt}---"));
        }
    }

    pub(crate) fn teardown_solver_state(&mut self) {
        let state = self
            .solver_state
            .take()
            .expect("tearing down a solve that never started");
        self.options.debug = state.old_debug;
        self.last_statistics = state.stats;
        record_solve(state.attempt, &state.stats);
    }

    pub(crate) fn depth(&self) -> usize {
        self.solver_state.as_ref().map_or(0, |state| state.depth)
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Open a new solver scope. Scopes nest strictly; exit order is LIFO.
    pub fn begin_scope(&mut self) -> SolverScope {
        let state = self
            .solver_state
            .as_mut()
            .expect("scopes require an active solve");
        state.depth += 1;
        state.stats.bump(Counter::StatesExplored);
        state.generated.push(HashSet::new());
        SolverScope {
            resolved_overloads: self.resolved_overloads.clone(),
            num_type_variables: self.type_variables.len(),
            num_saved_bindings: state.saved_bindings.len(),
            num_retired: state.retired.len(),
            num_restrictions: state.restrictions.len(),
            previous_score: self.current_score,
        }
    }

    /// Close a solver scope, restoring the state observed at
    /// [`ConstraintSystem::begin_scope`].
    pub fn end_scope(&mut self, scope: SolverScope) {
        {
            let state = self
                .solver_state
                .as_mut()
                .expect("scopes require an active solve");
            assert!(state.depth > 0, "scope exit without a matching entry");
            state.depth -= 1;
        }

        // Truncate the live-variable list.
        self.type_variables.truncate(scope.num_type_variables);

        // Replay the journal.
        self.restore_type_variable_bindings(scope.num_saved_bindings);

        // Splice constraints retired inside the scope back into the live
        // store, then drop the ones generated inside it.
        let revived = {
            let state = self.solver_state.as_mut().expect("solver state present");
            state.retired.split_off(scope.num_retired)
        };
        self.store.extend(revived);

        let generated = {
            let state = self.solver_state.as_mut().expect("solver state present");
            state
                .generated
                .pop()
                .expect("scope exit without a generated-constraint set")
        };
        if !generated.is_empty() {
            self.store.retain(|id| !generated.contains(id));
        }

        // Truncate restrictions.
        {
            let state = self.solver_state.as_mut().expect("solver state present");
            state.restrictions.truncate(scope.num_restrictions);
        }

        // Restore the overload head, the score, and clear failure state.
        self.resolved_overloads = scope.resolved_overloads;
        self.current_score = scope.previous_score;
        self.failed_constraint = None;

        // Any activations queued inside the scope are stale now.
        self.drain_worklist();
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    pub(crate) fn debug_log(&mut self, depth: usize, args: fmt::Arguments<'_>) {
        if !self.options.debug {
            return;
        }
        match self.debug_writer.as_mut() {
            Some(writer) => {
                let _ = writeln!(writer, "{:indent$}{args}", "", indent = depth * 2);
            }
            None => eprintln!("{:indent$}{args}", "", indent = depth * 2),
        }
    }

    pub(crate) fn debug_log_current_depth(&mut self, args: fmt::Arguments<'_>) {
        let depth = self.depth();
        self.debug_log(depth, args);
    }

    pub(crate) fn trace_step(&mut self, action: SolveAction, detail: String) {
        if !self.tracing {
            return;
        }
        let depth = self.depth();
        self.trace.push(SolveStep {
            depth,
            action,
            detail,
        });
    }

    /// A deep, allocation-identity-free snapshot of the observable solver
    /// state. Two snapshots compare equal exactly when the visible state is
    /// the same; rollback tests rely on this.
    pub fn snapshot(&self) -> SystemSnapshot {
        let variables = self
            .type_variables
            .iter()
            .map(|&var| {
                let info = self.info(var);
                (var, info.parent, info.fixed.clone())
            })
            .collect();
        let live_constraints = self
            .store
            .iter()
            .map(|&id| self.constraint(id).clone())
            .collect();
        let restrictions = self
            .solver_state
            .as_ref()
            .map(|state| state.restrictions.clone())
            .unwrap_or_default();
        let mut overload_depth = 0;
        let mut cursor = self.resolved_overloads.as_ref();
        while let Some(cell) = cursor {
            overload_depth += 1;
            cursor = cell.previous.as_ref();
        }
        SystemSnapshot {
            variables,
            live_constraints,
            restrictions,
            score: self.current_score,
            overload_depth,
        }
    }

    // -----------------------------------------------------------------------
    // Connected components
    // -----------------------------------------------------------------------

    /// Partition the live type variables by constraint connectivity.
    ///
    /// Returns the component count and a map from each representative
    /// mentioned by a live constraint to a component id in `[0, k)`.
    /// Representatives with fixed types do not connect components.
    pub(crate) fn compute_connected_components(
        &self,
    ) -> (usize, BTreeMap<TypeVarId, usize>) {
        let mut uf = DisjointSet::new(self.vars.len());
        let mut mentioned: BTreeSet<TypeVarId> = BTreeSet::new();

        for &id in &self.store {
            let reps: Vec<TypeVarId> = self
                .constraint_rep_vars(self.constraint(id))
                .into_iter()
                .filter(|&rep| self.info(rep).fixed.is_none())
                .collect();
            for rep in &reps {
                mentioned.insert(*rep);
            }
            for pair in reps.windows(2) {
                uf.union(pair[0].0 as usize, pair[1].0 as usize);
            }
        }

        // Number components in live-variable order so the result is
        // deterministic.
        let mut component_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components = BTreeMap::new();
        let mut next = 0;
        for &var in &self.type_variables {
            let rep = self.rep_of(var);
            if !mentioned.contains(&rep) {
                continue;
            }
            let root = uf.find(rep.0 as usize);
            let id = *component_of_root.entry(root).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            components.insert(rep, id);
        }
        (next, components)
    }

    pub(crate) fn constraint_component(
        &self,
        id: ConstraintId,
        components: &BTreeMap<TypeVarId, usize>,
    ) -> usize {
        self.constraint_rep_vars(self.constraint(id))
            .into_iter()
            .find_map(|rep| components.get(&rep).copied())
            .unwrap_or(0)
    }

    /// Restrict the live-variable list to one component plus variables
    /// outside every component (already-resolved ones). Returns the full
    /// list for later restoration.
    pub(crate) fn restrict_type_variables(
        &mut self,
        component: usize,
        components: &BTreeMap<TypeVarId, usize>,
    ) -> Vec<TypeVarId> {
        let all = std::mem::take(&mut self.type_variables);
        self.type_variables = all
            .iter()
            .copied()
            .filter(|&var| {
                components
                    .get(&self.rep_of(var))
                    .is_none_or(|&c| c == component)
            })
            .collect();
        all
    }

    pub(crate) fn restore_type_variables(&mut self, all: Vec<TypeVarId>) {
        self.type_variables = all;
    }

    // -----------------------------------------------------------------------
    // Finalization and re-application of solutions
    // -----------------------------------------------------------------------

    /// Build a [`Solution`] from an empty store and update the best score.
    pub(crate) fn finalize(&mut self, policy: FreeTypeVariablePolicy) -> Solution {
        let current = self.current_score;
        let mut solution = Solution::empty(current);

        if let Some(state) = self.solver_state.as_mut() {
            debug_assert!(
                state.best_score.is_none_or(|best| current <= best),
                "finalizing a solution worse than the best known"
            );
            state.best_score = Some(current);
        }

        // Deal with type variables that still have no fixed type.
        let mut index = 0u32;
        for var in self.type_variables.clone() {
            if self.fixed_type(var).is_some() {
                continue;
            }
            match policy {
                FreeTypeVariablePolicy::Disallow => {
                    unreachable!("solver left free type variables")
                }
                FreeTypeVariablePolicy::Allow => {}
                FreeTypeVariablePolicy::GenericParameters => {
                    self.assign_fixed_type(var, Type::GenericParam { index });
                    index += 1;
                }
            }
        }

        // Record the substituted canonical type of every variable.
        for &var in &self.type_variables {
            solution
                .type_bindings
                .insert(var, self.simplify_type(&Type::Var(var)).canonical());
        }

        // Snapshot the overload choices by walking the resolution stack.
        let mut cursor = self.resolved_overloads.as_ref();
        while let Some(cell) = cursor {
            solution.overload_choices.insert(
                cell.locator.clone(),
                OverloadSelection {
                    choice: cell.choice.clone(),
                    opened_type: cell.opened_type.clone(),
                },
            );
            cursor = cell.previous.as_ref();
        }

        // Snapshot the restrictions with both sides simplified to canonical
        // form.
        if let Some(state) = self.solver_state.as_ref() {
            let applied: Vec<_> = state
                .restrictions
                .iter()
                .map(|(left, right, restriction)| {
                    (
                        self.simplify_type(left).canonical(),
                        self.simplify_type(right).canonical(),
                        *restriction,
                    )
                })
                .collect();
            solution.restrictions = applied;
        }

        solution
    }

    /// Re-apply a partial solution inside the current scope, during
    /// component recombination.
    pub(crate) fn apply_solution(&mut self, solution: &Solution) {
        self.current_score += solution.score;

        let known: HashSet<TypeVarId> = self.type_variables.iter().copied().collect();
        for (&var, ty) in &solution.type_bindings {
            if !known.contains(&var) {
                self.type_variables.push(var);
            }
            if self.fixed_type(var).is_none() && !ty.has_type_variables() {
                self.assign_fixed_type(var, ty.clone());
            }
        }

        for (locator, selection) in &solution.overload_choices {
            self.resolve_overload(
                locator.clone(),
                selection.choice.clone(),
                selection.opened_type.clone(),
            );
        }

        for (left, right, restriction) in &solution.restrictions {
            self.record_restriction(left.clone(), right.clone(), *restriction);
        }
    }
}

/// A restore point for the solver state. Created by
/// [`ConstraintSystem::begin_scope`]; must be passed back to
/// [`ConstraintSystem::end_scope`] in LIFO order.
pub struct SolverScope {
    resolved_overloads: Option<Rc<ResolvedOverload>>,
    num_type_variables: usize,
    num_saved_bindings: usize,
    num_retired: usize,
    num_restrictions: usize,
    previous_score: Score,
}

/// Observable solver state, for deep comparison in rollback tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSnapshot {
    variables: Vec<(TypeVarId, TypeVarId, Option<Type>)>,
    live_constraints: Vec<Constraint>,
    restrictions: Vec<(Type, Type, ConversionRestriction)>,
    score: Score,
    overload_depth: usize,
}

// ---------------------------------------------------------------------------
// Scratch disjoint-set structure for component computation
// ---------------------------------------------------------------------------

/// Union find with path compression and union by size. Scratch state only:
/// component computation builds one per query, so it needs no rollback.
struct DisjointSet {
    parents: Vec<usize>,
    sizes: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parents: (0..len).collect(),
            sizes: vec![1; len],
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parents[index] != index {
            let parent = self.parents[index];
            self.parents[index] = self.parents[parent];
            index = parent;
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return;
        }
        let (root, inner) = if self.sizes[a] >= self.sizes[b] {
            (a, b)
        } else {
            (b, a)
        };
        self.parents[inner] = root;
        self.sizes[root] += self.sizes[inner];
    }
}

// ---------------------------------------------------------------------------
// Per-variable constraint info and potential bindings
// ---------------------------------------------------------------------------

/// The constraints that mention one representative type variable, bucketed
/// the way the binding step consumes them.
#[derive(Debug, Clone)]
struct TypeVariableConstraints {
    var: TypeVarId,
    /// Relational constraints `var REL T`: types above the variable.
    above: Vec<(ConstraintId, Type)>,
    /// Relational constraints `T REL var`: types below the variable.
    below: Vec<(ConstraintId, Type)>,
    conforms_to: Vec<ConstraintId>,
    /// Set when a constraint fully determines the variable from elsewhere.
    fully_bound: bool,
    /// Set when the variable is referenced by a constraint it does not
    /// dominate.
    has_non_concrete: bool,
}

impl TypeVariableConstraints {
    fn new(var: TypeVarId) -> Self {
        Self {
            var,
            above: Vec::new(),
            below: Vec::new(),
            conforms_to: Vec::new(),
            fully_bound: false,
            has_non_concrete: false,
        }
    }
}

#[derive(Debug, Clone)]
struct PotentialBinding {
    ty: Type,
    /// The binding is a literal-protocol default or alternative; it is
    /// opened before use.
    literal: bool,
    /// The binding is a non-default alternative literal type.
    alternative: bool,
}

/// Candidate bindings for one type variable, with the flags the variable
/// choice heuristic compares.
#[derive(Debug, Clone)]
struct PotentialBindings {
    bindings: Vec<PotentialBinding>,
    fully_bound: bool,
    involves_type_variables: bool,
    has_literal_bindings: bool,
}

impl PotentialBindings {
    fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Lexicographic comparison key; smaller is a better variable to bind.
    /// The binding count is negated, so more bindings win once the three
    /// flags tie.
    fn comparison_key(&self) -> (bool, bool, bool, i64) {
        (
            self.fully_bound,
            self.involves_type_variables,
            self.has_literal_bindings,
            -(self.bindings.len() as i64),
        )
    }
}

// ---------------------------------------------------------------------------
// The search driver
// ---------------------------------------------------------------------------

/// The backtracking search driver over a [`ConstraintSystem`].
///
/// The host supplies constraint semantics and solution ranking; the driver
/// owns branching, scoring, pruning, and rollback.
pub struct Solver<H: SolverHost = StructuralHost> {
    pub host: H,
    pub cs: ConstraintSystem,
}

impl Default for Solver<StructuralHost> {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver<StructuralHost> {
    pub fn new() -> Self {
        Self::with_host(StructuralHost::new())
    }
}

impl<H: SolverHost> Solver<H> {
    pub fn with_host(host: H) -> Self {
        Self {
            host,
            cs: ConstraintSystem::new(),
        }
    }

    /// Solve the system: enumerate satisfying assignments and return the
    /// unique best one.
    ///
    /// `Err(Unsatisfiable)` reports the first constraint that failed on the
    /// last explored branch; `Err(Ambiguous)` carries every solution that
    /// survived ranking.
    pub fn solve(
        &mut self,
        policy: FreeTypeVariablePolicy,
    ) -> Result<Solution, crate::SolveError> {
        self.cs.install_solver_state();

        let mut solutions = Vec::new();
        self.solve_rec(&mut solutions, policy);

        // If more than one system is viable, attempt to pick the best.
        if solutions.len() > 1 {
            if let Some(best) = self.host.find_best_solution(&mut solutions, false) {
                if best != 0 {
                    solutions.swap(0, best);
                }
                solutions.truncate(1);
            }
        }

        let failed = self.cs.failed_constraint().cloned();
        self.cs.teardown_solver_state();

        match solutions.len() {
            1 => Ok(solutions.pop().expect("length checked above")),
            0 => Err(crate::SolveError::Unsatisfiable { failed }),
            _ => Err(crate::SolveError::Ambiguous { solutions }),
        }
    }

    /// One recursive solving step. Returns true when the branch admits no
    /// solutions.
    fn solve_rec(
        &mut self,
        solutions: &mut Vec<Solution>,
        policy: FreeTypeVariablePolicy,
    ) -> bool {
        // If we already failed, or simplification fails, we're done.
        if self.cs.has_failed_constraint() || self.simplify() {
            return true;
        }

        // If no constraints remain, this branch is a solution.
        if self.cs.store_is_empty() {
            if self.cs.worse_than_best_solution() {
                self.cs.trace_step(SolveAction::Prune, String::new());
                return true;
            }
            if policy == FreeTypeVariablePolicy::Disallow && self.cs.has_free_type_variables() {
                return true;
            }
            let solution = self.cs.finalize(policy);
            self.cs
                .debug_log_current_depth(format_args!("(found solution {})", solution.score()));
            self.cs
                .trace_step(SolveAction::FoundSolution, solution.score().to_string());
            solutions.push(solution);
            return false;
        }

        // An outer ceiling on search states, when configured.
        if self.cs.state_limit_exceeded() {
            return true;
        }

        let (num_components, components) = self.cs.compute_connected_components();
        if num_components < 2 {
            return self.solve_simplified(solutions, policy);
        }
        self.solve_components(num_components, &components, solutions, policy)
    }

    /// Process the worklist to a fixpoint. Returns true on failure.
    fn simplify(&mut self) -> bool {
        self.cs.bump_stat(Counter::SimplifyIterations);
        while let Some(id) = self.cs.pop_worklist() {
            debug_assert!(self.cs.is_active(id), "worklist constraint is not active");

            match self.simplify_one(id) {
                SolutionKind::Error => {
                    self.cs.note_failed(id);
                    self.cs.trace_step(
                        SolveAction::Fail,
                        self.cs.constraint(id).to_string(),
                    );
                }
                SolutionKind::Solved => {
                    self.cs.bump_stat(Counter::SimplifiedConstraints);
                    self.cs.retire_constraint(id);
                }
                SolutionKind::Unsolved => {
                    self.cs.bump_stat(Counter::UnsimplifiedConstraints);
                }
            }

            // Deactivation is delayed until after simplification so the
            // constraint cannot re-insert itself.
            self.cs.set_inactive(id);

            if self.cs.has_failed_constraint() {
                self.cs.drain_worklist();
                self.cs.retire_all_live();
                return true;
            }

            // If the current score is already worse than the best solution,
            // there is no point in continuing.
            if self.cs.worse_than_best_solution() {
                return true;
            }
        }
        false
    }

    fn simplify_one(&mut self, id: ConstraintId) -> SolutionKind {
        let constraint = self.cs.constraint(id).clone();
        let outcome = self.host.simplify_constraint(&mut self.cs, &constraint);
        if outcome == SolutionKind::Solved {
            self.note_overload(&constraint);
        }
        outcome
    }

    /// Record an overload resolution when a tagged constraint discharges.
    fn note_overload(&mut self, constraint: &Constraint) {
        let Some(choice) = constraint.overload.clone() else {
            return;
        };
        let opened = match &constraint.kind {
            ConstraintKind::Relate { right, .. } => self.cs.simplify_type(right),
            _ => choice.ty.clone(),
        };
        self.cs
            .resolve_overload(constraint.locator.clone(), choice, opened);
    }

    // -----------------------------------------------------------------------
    // Component decomposition
    // -----------------------------------------------------------------------

    fn solve_components(
        &mut self,
        num_components: usize,
        components: &BTreeMap<TypeVarId, usize>,
        solutions: &mut Vec<Solution>,
        policy: FreeTypeVariablePolicy,
    ) -> bool {
        self.cs.bump_stat(Counter::ComponentsSplit);

        // Sort the constraints into buckets based on component number.
        let mut buckets: Vec<Vec<ConstraintId>> = vec![Vec::new(); num_components];
        for id in self.cs.drain_store() {
            let component = self.cs.constraint_component(id, components);
            buckets[component].push(id);
        }

        // Compute the partial solutions produced for each component.
        let mut partials: Vec<Vec<Solution>> = vec![Vec::new(); num_components];
        let previous_best = self.cs.best_score();
        let mut any_failed = false;

        for component in 0..num_components {
            debug_assert!(
                self.cs.store_is_empty(),
                "some constraints were not transferred"
            );
            let bucket = std::mem::take(&mut buckets[component]);
            self.cs.extend_store(bucket);

            let all_type_variables = self.cs.restrict_type_variables(component, components);

            self.cs
                .debug_log_current_depth(format_args!("(solving component #{component}"));
            self.cs
                .trace_step(SolveAction::SolveComponent, component.to_string());

            let scope = self.cs.begin_scope();
            let failed = self.solve_simplified(&mut partials[component], policy);
            self.cs.end_scope(scope);

            // Put the constraints back into their bucket.
            buckets[component] = self.cs.drain_store();
            self.cs.restore_type_variables(all_type_variables);

            if failed {
                self.cs
                    .debug_log_current_depth(format_args!("failed component #{component})"));
                any_failed = true;
                break;
            }
            self.cs
                .debug_log_current_depth(format_args!("finished component #{component})"));
            debug_assert!(
                !partials[component].is_empty(),
                "component reported success without solutions"
            );

            // Partial-solution scores are relative: subtract off the current
            // score, which every combination re-adds.
            let current = self.cs.current_score();
            for solution in &mut partials[component] {
                solution.score -= current;
            }

            // Each component prunes against its own best, not its siblings'.
            self.cs.set_best_score(previous_best);
        }

        // Move the constraints back; the system is whole again.
        for bucket in &mut buckets {
            let ids = std::mem::take(bucket);
            self.cs.extend_store(ids);
        }

        if any_failed {
            return true;
        }

        // Rank each component's partials; in the common case this leaves a
        // single combination to compose.
        for partial in &mut partials {
            if let Some(best) = self.host.find_best_solution(partial, true) {
                if best > 0 {
                    partial.swap(0, best);
                }
                partial.truncate(1);
            }
        }

        // Produce all combinations of partial solutions.
        let mut indices = vec![0usize; num_components];
        let mut done = false;
        let mut any_solutions = false;
        while !done {
            let scope = self.cs.begin_scope();
            for component in 0..num_components {
                let solution = partials[component][indices[component]].clone();
                self.cs.apply_solution(&solution);
            }

            if !self.cs.worse_than_best_solution() {
                let solution = self.cs.finalize(policy);
                self.cs.debug_log_current_depth(format_args!(
                    "(composed solution {})",
                    solution.score()
                ));
                self.cs
                    .trace_step(SolveAction::ComposedSolution, solution.score().to_string());
                solutions.push(solution);
                any_solutions = true;
            }
            self.cs.end_scope(scope);

            // Find the next combination.
            let mut n = num_components;
            while n > 0 {
                indices[n - 1] += 1;
                if indices[n - 1] < partials[n - 1].len() {
                    break;
                }
                if n == 1 {
                    done = true;
                    break;
                }
                for slot in &mut indices[n - 1..] {
                    *slot = 0;
                }
                n -= 1;
            }
        }

        !any_solutions
    }

    // -----------------------------------------------------------------------
    // Per-variable constraint collection
    // -----------------------------------------------------------------------

    fn collect_constraints_for_type_variables(
        &mut self,
    ) -> (Vec<TypeVariableConstraints>, Vec<ConstraintId>) {
        let mut tvcs: Vec<TypeVariableConstraints> = Vec::new();
        let mut index: HashMap<TypeVarId, usize> = HashMap::new();
        let mut referenced: Vec<TypeVarId> = Vec::new();
        let mut disjunctions = Vec::new();

        fn tvc_mut<'a>(
            tvcs: &'a mut Vec<TypeVariableConstraints>,
            index: &mut HashMap<TypeVarId, usize>,
            var: TypeVarId,
        ) -> &'a mut TypeVariableConstraints {
            let slot = *index.entry(var).or_insert_with(|| {
                tvcs.push(TypeVariableConstraints::new(var));
                tvcs.len() - 1
            });
            &mut tvcs[slot]
        }

        fn simplified_vars(cs: &ConstraintSystem, ty: &Type) -> Vec<TypeVarId> {
            let simplified = cs.simplify_type(ty);
            let mut vars = BTreeSet::new();
            simplified.collect_type_vars(&mut vars);
            vars.into_iter().collect()
        }

        for id in self.cs.store_ids() {
            let constraint = self.cs.constraint(id).clone();
            match &constraint.kind {
                ConstraintKind::Relate {
                    relation,
                    left,
                    right,
                } => {
                    let first = self.cs.simplify_type(left);
                    match relation {
                        Relation::ConformsTo | Relation::SelfObjectOfProtocol => {
                            // Conformance constraints are stored separately;
                            // they seed literal bindings.
                            if let Some(var) = first.as_var() {
                                tvc_mut(&mut tvcs, &mut index, var).conforms_to.push(id);
                            }
                        }
                        Relation::ApplicableFunction => {
                            // Applicable-function constraints fully bind the
                            // type variables of the call-site side.
                            let mut vars = BTreeSet::new();
                            first.collect_type_vars(&mut vars);
                            for var in vars {
                                tvc_mut(&mut tvcs, &mut index, var).fully_bound = true;
                            }
                            referenced.extend(simplified_vars(&self.cs, right));
                        }
                        _ => {
                            let second = self.cs.simplify_type(right);
                            let first_var = first.as_var();
                            let second_var = second.as_var();

                            match first_var {
                                Some(var) => tvc_mut(&mut tvcs, &mut index, var)
                                    .above
                                    .push((id, second.clone())),
                                None => {
                                    let mut vars = BTreeSet::new();
                                    first.collect_type_vars(&mut vars);
                                    referenced.extend(vars);
                                }
                            }
                            match second_var {
                                Some(var) => tvc_mut(&mut tvcs, &mut index, var)
                                    .below
                                    .push((id, first.clone())),
                                None => {
                                    let mut vars = BTreeSet::new();
                                    second.collect_type_vars(&mut vars);
                                    referenced.extend(vars);
                                }
                            }
                            if let (Some(first_var), Some(second_var)) = (first_var, second_var) {
                                referenced.push(first_var);
                                referenced.push(second_var);
                            }
                        }
                    }
                }
                ConstraintKind::Property { ty, .. } => {
                    let first = self.cs.simplify_type(ty);
                    if !first.is_type_variable() {
                        let mut vars = BTreeSet::new();
                        first.collect_type_vars(&mut vars);
                        referenced.extend(vars);
                    }
                }
                ConstraintKind::Member { base, member, .. } => {
                    let base_vars = simplified_vars(&self.cs, base);
                    let member_vars = simplified_vars(&self.cs, member);

                    // If the member side shares no variables with the base
                    // side, the member variables are fully bound by the
                    // member lookup.
                    let base_set: BTreeSet<TypeVarId> = base_vars.into_iter().collect();
                    let intersects = !base_set.is_empty()
                        && member_vars.iter().any(|var| base_set.contains(var));
                    if intersects {
                        referenced.extend(member_vars);
                    } else {
                        for var in member_vars {
                            tvc_mut(&mut tvcs, &mut index, var).fully_bound = true;
                        }
                    }
                }
                ConstraintKind::Conjunction(_) => {
                    unreachable!("conjunction constraints are normalized away before solving")
                }
                ConstraintKind::Disjunction(nested) => {
                    disjunctions.push(id);
                    // Reference every variable mentioned by the alternatives,
                    // flattening one level of conjunction.
                    for alternative in nested {
                        let inner: &[Constraint] = match &alternative.kind {
                            ConstraintKind::Conjunction(children) => children,
                            _ => std::slice::from_ref(alternative),
                        };
                        for child in inner {
                            let mut types = Vec::new();
                            ConstraintSystem::constraint_types(child, &mut types);
                            for ty in types {
                                referenced.extend(simplified_vars(&self.cs, ty));
                            }
                        }
                    }
                }
            }
        }

        // Mark referenced variables as having non-concrete constraints.
        let mut seen = HashSet::new();
        for var in referenced {
            let rep = self.cs.rep_of(var);
            if !seen.insert(rep) {
                continue;
            }
            if let Some(&slot) = index.get(&rep) {
                tvcs[slot].has_non_concrete = true;
            }
        }

        (tvcs, disjunctions)
    }

    // -----------------------------------------------------------------------
    // Potential bindings
    // -----------------------------------------------------------------------

    fn potential_bindings(&self, tvc: &TypeVariableConstraints) -> PotentialBindings {
        let mut result = PotentialBindings {
            bindings: Vec::new(),
            fully_bound: tvc.fully_bound,
            involves_type_variables: tvc.has_non_concrete,
            has_literal_bindings: false,
        };
        let mut exact_types: HashSet<Type> = HashSet::new();

        // Types below this variable.
        for (_, ty) in &tvc.below {
            match self.cs.check_type_of_binding(tvc.var, ty) {
                Some(ty) => {
                    if ty.has_type_variables() {
                        result.involves_type_variables = true;
                    }
                    if exact_types.insert(ty.canonical()) {
                        result.bindings.push(PotentialBinding {
                            ty,
                            literal: false,
                            alternative: false,
                        });
                    }
                }
                // A recursive candidate obviously involves type variables.
                None => result.involves_type_variables = true,
            }
        }

        // Types above this variable.
        for (id, ty) in &tvc.above {
            let mut ty = match self.cs.check_type_of_binding(tvc.var, ty) {
                Some(ty) => {
                    if ty.has_type_variables() {
                        result.involves_type_variables = true;
                    }
                    ty
                }
                None => {
                    result.involves_type_variables = true;
                    continue;
                }
            };

            // A conversion to a one-element non-variadic tuple can bind the
            // variable to the element type directly.
            if matches!(
                self.cs.constraint(*id).relation(),
                Some(Relation::Conversion | Relation::Subtype | Relation::TrivialSubtype)
            ) {
                if let Type::Tuple(elements) = &ty {
                    if let [element] = elements.as_slice() {
                        if !element.vararg {
                            ty = element.ty.clone();
                        }
                    }
                }
            }

            if exact_types.insert(ty.canonical()) {
                result.bindings.push(PotentialBinding {
                    ty,
                    literal: false,
                    alternative: false,
                });
            }
        }

        // Conformance to a literal protocol contributes the protocol's
        // default type as a literal binding.
        for id in &tvc.conforms_to {
            let Some(kind) = Self::literal_protocol_of(self.cs.constraint(*id)) else {
                continue;
            };
            let default = kind.default_type();
            if exact_types.insert(default.canonical()) {
                result.has_literal_bindings = true;
                result.bindings.push(PotentialBinding {
                    ty: default,
                    literal: true,
                    alternative: false,
                });
            }
        }

        result
    }

    fn literal_protocol_of(constraint: &Constraint) -> Option<LiteralProtocol> {
        match &constraint.kind {
            ConstraintKind::Relate { right, .. } => {
                right.as_protocol().and_then(|proto| proto.literal)
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // The binding step
    // -----------------------------------------------------------------------

    /// Try each candidate binding for one type variable, widening to
    /// alternative literal types and then direct supertypes until a solution
    /// appears or no new candidates are produced. Returns true when there
    /// are no solutions.
    fn try_type_variable_bindings(
        &mut self,
        depth: usize,
        tvc: &TypeVariableConstraints,
        initial: Vec<PotentialBinding>,
        solutions: &mut Vec<Solution>,
        policy: FreeTypeVariablePolicy,
    ) -> bool {
        let var = tvc.var;
        let mut any_solved = false;
        let mut explored: HashSet<Type> = HashSet::new();
        let mut bindings = initial;
        let mut try_count = 0usize;

        self.cs.bump_stat(Counter::TypeVariablesBound);

        while !any_solved && !bindings.is_empty() {
            self.cs.bump_stat(Counter::TypeVariableBindings);
            let mut saw_first_literal_binding = false;

            for binding in &bindings {
                let mut ty = binding.ty.clone();

                // If the variable can't bind to an l-value, don't pick one.
                if !self.cs.can_bind_to_lvalue(var) {
                    ty = ty.rvalue_type();
                }

                self.cs
                    .debug_log(depth, format_args!("(trying {var} := {ty}"));
                self.cs
                    .trace_step(SolveAction::TryBinding, format!("{var} := {ty}"));

                let scope = self.cs.begin_scope();
                let mut stop_at_literals = false;
                if binding.literal {
                    // Once a solution exists, default-literal bindings have
                    // nothing better to offer; stop at the first one.
                    if !saw_first_literal_binding {
                        saw_first_literal_binding = true;
                        if any_solved {
                            stop_at_literals = true;
                        }
                    }
                    if !stop_at_literals {
                        if binding.alternative {
                            self.cs.increase_score(ScoreKind::NonDefaultLiteral);
                        }
                        ty = self.host.open_binding_type(&mut self.cs, &ty);
                    }
                }
                if stop_at_literals {
                    self.cs.end_scope(scope);
                    break;
                }

                self.cs.add_constraint(Constraint::relate(
                    Relation::Bind,
                    Type::Var(var),
                    ty,
                    Locator::synthetic(),
                ));
                if !self.solve_rec(solutions, policy) {
                    any_solved = true;
                }

                self.cs.debug_log(depth, format_args!(")"));
                self.cs.end_scope(scope);
            }

            if any_solved {
                break;
            }

            // None of the children had solutions; widen the candidate set.
            let mut new_bindings: Vec<PotentialBinding> = Vec::new();

            if try_count == 0 {
                // Note which bindings we already visited.
                for binding in &bindings {
                    explored.insert(binding.ty.canonical());
                }

                // On the first retry, expand the alternative literal types of
                // every literal protocol this variable must conform to.
                for id in &tvc.conforms_to {
                    let Some(kind) = Self::literal_protocol_of(self.cs.constraint(*id)) else {
                        continue;
                    };
                    for alternative in kind.alternative_types() {
                        if explored.insert(alternative.canonical()) {
                            new_bindings.push(PotentialBinding {
                                ty: alternative,
                                literal: true,
                                alternative: true,
                            });
                        }
                    }
                }

                if !new_bindings.is_empty() {
                    bindings = new_bindings;
                    try_count += 1;
                    continue;
                }
            }

            // Enumerate the direct supertypes of each type we tried.
            for binding in &bindings {
                for supertype in direct_supertypes(&binding.ty) {
                    let Some(supertype) = self.cs.check_type_of_binding(var, &supertype) else {
                        continue;
                    };
                    if explored.insert(supertype.canonical()) {
                        new_bindings.push(PotentialBinding {
                            ty: supertype,
                            literal: false,
                            alternative: false,
                        });
                    }
                }
            }

            if new_bindings.is_empty() {
                break;
            }
            bindings = new_bindings;
            try_count += 1;
        }

        !any_solved
    }

    // -----------------------------------------------------------------------
    // The single-component step
    // -----------------------------------------------------------------------

    /// Solve a system that forms a single connected component: bind the best
    /// type variable, or branch on the smallest disjunction. Returns true
    /// when there are no solutions.
    fn solve_simplified(
        &mut self,
        solutions: &mut Vec<Solution>,
        policy: FreeTypeVariablePolicy,
    ) -> bool {
        let depth = self.cs.depth();
        let (tvcs, disjunctions) = self.collect_constraints_for_type_variables();

        if !tvcs.is_empty() {
            // Look for the best type variable to bind.
            let mut best_index = 0;
            let mut best = self.potential_bindings(&tvcs[0]);
            for (i, tvc) in tvcs.iter().enumerate().skip(1) {
                let bindings = self.potential_bindings(tvc);
                if bindings.is_empty() {
                    continue;
                }
                if best.is_empty() || bindings.comparison_key() < best.comparison_key() {
                    best_index = i;
                    best = bindings;
                }
            }

            // Bind the variable when its candidates are concrete, or when
            // there is no disjunction to fall back to.
            if !best.is_empty()
                && (disjunctions.is_empty()
                    || (!best.involves_type_variables && !best.fully_bound))
            {
                let tvc = tvcs[best_index].clone();
                return self.try_type_variable_bindings(
                    depth,
                    &tvc,
                    best.bindings,
                    solutions,
                    policy,
                );
            }
        }

        if disjunctions.is_empty() {
            // With free variables allowed, a residue of pure conformance and
            // member constraints still counts as solved.
            if policy != FreeTypeVariablePolicy::Disallow && self.cs.has_free_type_variables() {
                let mut any_non_conformance = false;
                for id in self.cs.store_ids() {
                    match &self.cs.constraint(id).kind {
                        ConstraintKind::Relate {
                            relation:
                                Relation::ConformsTo | Relation::SelfObjectOfProtocol,
                            ..
                        } => continue,
                        ConstraintKind::Member { .. } => continue,
                        _ => {
                            any_non_conformance = true;
                            break;
                        }
                    }
                }

                if self.cs.worse_than_best_solution() {
                    return true;
                }

                if !any_non_conformance {
                    let solution = self.cs.finalize(policy);
                    self.cs
                        .debug_log_current_depth(format_args!("(found solution)"));
                    self.cs
                        .trace_step(SolveAction::FoundSolution, solution.score().to_string());
                    solutions.push(solution);
                    return false;
                }
            }
            return true;
        }

        self.solve_disjunction(&disjunctions, solutions, policy)
    }

    /// Branch over the alternatives of the smallest disjunction. Returns
    /// true when there are no solutions.
    fn solve_disjunction(
        &mut self,
        disjunctions: &[ConstraintId],
        solutions: &mut Vec<Solution>,
        policy: FreeTypeVariablePolicy,
    ) -> bool {
        // Pick the disjunction with the fewest alternatives; stop scanning
        // once one of size 2 turns up.
        let mut disjunction = disjunctions[0];
        let mut best_size = self.cs.disjunction_len(disjunction);
        if best_size > 2 {
            for &contender in &disjunctions[1..] {
                let new_size = self.cs.disjunction_len(contender);
                if new_size < best_size {
                    best_size = new_size;
                    disjunction = contender;
                    if best_size == 2 {
                        break;
                    }
                }
            }
        }

        // Take the disjunction out of the store, remembering its position.
        let position = self.cs.remove_from_store(disjunction);
        let nested: Vec<Constraint> = match &self.cs.constraint(disjunction).kind {
            ConstraintKind::Disjunction(children) => children.clone(),
            _ => unreachable!("picked constraint is not a disjunction"),
        };
        let disjunction_locator = self.cs.constraint(disjunction).locator.clone();

        let mut any_solved = false;
        self.cs.bump_stat(Counter::Disjunctions);

        for alternative in nested {
            // Optional-to-optional conversions add nothing once a solution
            // exists.
            if any_solved
                && alternative.restriction == Some(ConversionRestriction::OptionalToOptional)
            {
                break;
            }

            let scope = self.cs.begin_scope();
            self.cs.bump_stat(Counter::DisjunctionTerms);
            self.cs
                .debug_log_current_depth(format_args!("(assuming {alternative}"));
            self.cs
                .trace_step(SolveAction::Assume, alternative.to_string());

            // Assume this alternative: simplify it immediately, keeping it
            // as residual when it cannot make progress yet.
            if let ConstraintKind::Conjunction(children) = &alternative.kind {
                for child in children {
                    self.cs.add_constraint(child.clone());
                }
            } else {
                let alt_id = self.cs.intern_tracked(alternative.clone());
                match self.host.simplify_constraint(&mut self.cs, &alternative) {
                    SolutionKind::Error => self.cs.note_failed(alt_id),
                    SolutionKind::Solved => self.note_overload(&alternative),
                    SolutionKind::Unsolved => self.cs.push_store(alt_id),
                }
            }

            if !self.solve_rec(solutions, policy) {
                any_solved = true;

                // A successful tuple-to-tuple conversion ends the search.
                if alternative.restriction == Some(ConversionRestriction::TupleToTuple) {
                    self.cs.end_scope(scope);
                    break;
                }

                // So does a conversion applied to an interpolation argument.
                if disjunction_locator.last_element()
                    == Some(&PathElement::InterpolationArgument)
                    && alternative.relation() == Some(Relation::Conversion)
                {
                    self.cs.end_scope(scope);
                    break;
                }
            }

            self.cs.debug_log_current_depth(format_args!(")"));
            self.cs.end_scope(scope);
        }

        // Put the disjunction back in its place.
        self.cs.insert_into_store_at(position, disjunction);

        !any_solved
    }
}

// ---------------------------------------------------------------------------
// The structural host
// ---------------------------------------------------------------------------

/// [`SolverHost`] implementation covering the structural rules of the Vela
/// type language.
///
/// Conformances and member tables are registries seeded with the literal
/// protocols' default and alternative types; the front end registers class
/// conformances and members on top.
pub struct StructuralHost {
    /// (type name, protocol name) pairs known to conform.
    conformances: BTreeSet<(String, String)>,
    /// (class name, member name) to the member's type.
    members: BTreeMap<(String, String), Type>,
}

impl Default for StructuralHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralHost {
    pub fn new() -> Self {
        let mut conformances = BTreeSet::new();
        // Every literal protocol's default and alternative types conform to
        // it by construction.
        for protocol in LiteralProtocol::ALL {
            let mut types = vec![protocol.default_type()];
            types.extend(protocol.alternative_types());
            for ty in types {
                if let Some(class) = ty.as_class() {
                    conformances.insert((class.name.clone(), protocol.name().to_string()));
                }
            }
        }
        Self {
            conformances,
            members: BTreeMap::new(),
        }
    }

    pub fn add_conformance(&mut self, type_name: impl Into<String>, protocol: impl Into<String>) {
        self.conformances.insert((type_name.into(), protocol.into()));
    }

    pub fn add_member(
        &mut self,
        class_name: impl Into<String>,
        member: impl Into<String>,
        ty: Type,
    ) {
        self.members.insert((class_name.into(), member.into()), ty);
    }

    fn conforms(&self, type_name: &str, protocol: &str) -> bool {
        self.conformances
            .contains(&(type_name.to_string(), protocol.to_string()))
    }

    // -----------------------------------------------------------------------
    // Relational simplification
    // -----------------------------------------------------------------------

    fn match_types(
        &mut self,
        cs: &mut ConstraintSystem,
        relation: Relation,
        left: &Type,
        right: &Type,
        parent: &Constraint,
    ) -> SolutionKind {
        let left = cs.simplify_type(left);
        let right = cs.simplify_type(right);

        match relation {
            Relation::ConformsTo | Relation::SelfObjectOfProtocol => {
                return self.simplify_conformance(cs, &left, &right)
            }
            Relation::ApplicableFunction => {
                return self.simplify_applicable(cs, &left, &right, parent)
            }
            _ => {}
        }

        match (left.as_var(), right.as_var()) {
            (Some(left_var), Some(right_var)) => {
                if left_var == right_var {
                    return SolutionKind::Solved;
                }
                match relation {
                    Relation::Equal | Relation::Bind => {
                        cs.merge_equivalence(left_var, right_var);
                        SolutionKind::Solved
                    }
                    // A subtyping relation between two variables cannot make
                    // progress yet.
                    _ => SolutionKind::Unsolved,
                }
            }
            (Some(var), None) => self.bind_or_defer(cs, relation, var, &right),
            (None, Some(var)) => self.bind_or_defer(cs, relation, var, &left),
            (None, None) => self.match_concrete(cs, relation, &left, &right, parent),
        }
    }

    /// One side is a variable representative, the other concrete.
    fn bind_or_defer(
        &mut self,
        cs: &mut ConstraintSystem,
        relation: Relation,
        var: TypeVarId,
        ty: &Type,
    ) -> SolutionKind {
        match relation {
            Relation::Equal | Relation::Bind => {
                let mut mentioned = BTreeSet::new();
                ty.collect_type_vars(&mut mentioned);
                if mentioned.iter().any(|&v| cs.rep_of(v) == var) {
                    // Occurs check: the binding would produce a recursive
                    // type.
                    return SolutionKind::Error;
                }
                cs.assign_fixed_type(var, ty.clone());
                SolutionKind::Solved
            }
            // Subtyping around an unresolved variable stays residual; the
            // binding step consumes it as an above/below candidate.
            _ => SolutionKind::Unsolved,
        }
    }

    fn match_concrete(
        &mut self,
        cs: &mut ConstraintSystem,
        relation: Relation,
        left: &Type,
        right: &Type,
        parent: &Constraint,
    ) -> SolutionKind {
        if left.canonical() == right.canonical() {
            return SolutionKind::Solved;
        }

        // L-values: equal l-values match object types; otherwise the left
        // side decays to its object type, and nothing produces an l-value
        // from an r-value.
        if let (
            Type::LValue { object: left_object, .. },
            Type::LValue { object: right_object, .. },
        ) = (left, right)
        {
            return self.match_types(cs, relation, &**left_object, &**right_object, parent);
        }
        if let Type::LValue { object, .. } = left {
            if relation == Relation::Equal {
                return SolutionKind::Error;
            }
            if relation == Relation::Conversion {
                cs.record_restriction(
                    left.clone(),
                    right.clone(),
                    ConversionRestriction::LValueToRValue,
                );
            }
            return self.match_types(cs, relation, &**object, right, parent);
        }
        if right.is_lvalue() {
            return SolutionKind::Error;
        }

        // Optionals.
        if let (Type::Optional(left_inner), Type::Optional(right_inner)) = (left, right) {
            if relation == Relation::Conversion {
                cs.record_restriction(
                    left.clone(),
                    right.clone(),
                    ConversionRestriction::OptionalToOptional,
                );
            }
            return self.match_types(cs, relation, &**left_inner, &**right_inner, parent);
        }
        if let Type::Optional(right_inner) = right {
            // Injecting a value into an optional is a conversion, and a
            // scored one.
            if relation == Relation::Conversion {
                cs.record_restriction(
                    left.clone(),
                    right.clone(),
                    ConversionRestriction::ValueToOptional,
                );
                cs.increase_score(ScoreKind::ValueToOptional);
                return self.match_types(cs, Relation::Conversion, left, &**right_inner, parent);
            }
            return SolutionKind::Error;
        }

        // Tuples.
        if let (Type::Tuple(left_elements), Type::Tuple(right_elements)) = (left, right) {
            return self.match_tuples(cs, relation, left, right, left_elements, right_elements, parent);
        }
        if let Type::Tuple(right_elements) = right {
            // Scalar-to-tuple conversion when the target is a one-element
            // labelled tuple.
            if matches!(relation, Relation::Conversion | Relation::Subtype) {
                if let [element] = right_elements.as_slice() {
                    if element.label.is_some() && !element.vararg {
                        if relation == Relation::Conversion {
                            cs.record_restriction(
                                left.clone(),
                                right.clone(),
                                ConversionRestriction::ScalarToTuple,
                            );
                        }
                        cs.add_constraint(Constraint::relate(
                            relation,
                            left.clone(),
                            element.ty.clone(),
                            parent.locator.clone().with_element(PathElement::TupleElement(0)),
                        ));
                        return SolutionKind::Solved;
                    }
                }
            }
            return SolutionKind::Error;
        }

        // Functions.
        if let (Type::Function(left_func), Type::Function(right_func)) = (left, right) {
            if left_func.params.len() != right_func.params.len() {
                return SolutionKind::Error;
            }
            if relation == Relation::Equal && left_func.auto_closure != right_func.auto_closure {
                return SolutionKind::Error;
            }
            for (i, (left_param, right_param)) in left_func
                .params
                .iter()
                .zip(&right_func.params)
                .enumerate()
            {
                cs.add_constraint(Constraint::relate(
                    Relation::Equal,
                    left_param.clone(),
                    right_param.clone(),
                    parent
                        .locator
                        .clone()
                        .with_element(PathElement::CallArgument(i as u32)),
                ));
            }
            let result_relation = match relation {
                Relation::Equal | Relation::Bind => Relation::Equal,
                other => other,
            };
            cs.add_constraint(Constraint::relate(
                result_relation,
                (*left_func.result).clone(),
                (*right_func.result).clone(),
                parent
                    .locator
                    .clone()
                    .with_element(PathElement::FunctionResult),
            ));
            return SolutionKind::Solved;
        }
        if let Type::Function(right_func) = right {
            // A conversion can wrap a value into an implicit auto-closure
            // thunk of its result type.
            if relation == Relation::Conversion && right_func.auto_closure {
                cs.add_constraint(Constraint::relate(
                    Relation::Conversion,
                    left.clone(),
                    (*right_func.result).clone(),
                    parent
                        .locator
                        .clone()
                        .with_element(PathElement::FunctionResult),
                ));
                return SolutionKind::Solved;
            }
            return SolutionKind::Error;
        }

        // Classes.
        if let (Type::Class(left_class), Type::Class(right_class)) = (left, right) {
            if left_class.name == right_class.name {
                return SolutionKind::Solved;
            }
            if matches!(
                relation,
                Relation::TrivialSubtype | Relation::Subtype | Relation::Conversion
            ) {
                let mut cursor = left_class.superclass.as_deref();
                while let Some(superclass) = cursor {
                    let Some(class) = superclass.as_class() else {
                        break;
                    };
                    if class.name == right_class.name {
                        if relation == Relation::Conversion {
                            cs.record_restriction(
                                left.clone(),
                                right.clone(),
                                ConversionRestriction::Superclass,
                            );
                        }
                        return SolutionKind::Solved;
                    }
                    cursor = class.superclass.as_deref();
                }
            }
            return SolutionKind::Error;
        }

        // A class can be used where a protocol existential is expected.
        if let (Type::Class(class), Type::Protocol(proto)) = (left, right) {
            if matches!(relation, Relation::Subtype | Relation::Conversion)
                && self.conforms(&class.name, &proto.name)
            {
                return SolutionKind::Solved;
            }
            return SolutionKind::Error;
        }

        if let (Type::Protocol(left_proto), Type::Protocol(right_proto)) = (left, right) {
            if left_proto.name == right_proto.name {
                return SolutionKind::Solved;
            }
            return SolutionKind::Error;
        }

        if let (
            Type::GenericParam { index: left_index },
            Type::GenericParam { index: right_index },
        ) = (left, right)
        {
            if left_index == right_index {
                return SolutionKind::Solved;
            }
        }

        SolutionKind::Error
    }

    #[allow(clippy::too_many_arguments)]
    fn match_tuples(
        &mut self,
        cs: &mut ConstraintSystem,
        relation: Relation,
        left: &Type,
        right: &Type,
        left_elements: &[vela_types::TupleElement],
        right_elements: &[vela_types::TupleElement],
        parent: &Constraint,
    ) -> SolutionKind {
        if left_elements.len() != right_elements.len() {
            return SolutionKind::Error;
        }
        let shapes_match = left_elements
            .iter()
            .zip(right_elements)
            .all(|(l, r)| l.label == r.label && l.vararg == r.vararg);
        if !shapes_match {
            return SolutionKind::Error;
        }
        if relation == Relation::Conversion {
            cs.record_restriction(
                left.clone(),
                right.clone(),
                ConversionRestriction::TupleToTuple,
            );
        }
        let element_relation = match relation {
            Relation::Equal | Relation::Bind => Relation::Equal,
            other => other,
        };
        for (i, (left_elt, right_elt)) in
            left_elements.iter().zip(right_elements).enumerate()
        {
            cs.add_constraint(Constraint::relate(
                element_relation,
                left_elt.ty.clone(),
                right_elt.ty.clone(),
                parent
                    .locator
                    .clone()
                    .with_element(PathElement::TupleElement(i as u32)),
            ));
        }
        SolutionKind::Solved
    }

    fn simplify_conformance(
        &mut self,
        cs: &mut ConstraintSystem,
        left: &Type,
        right: &Type,
    ) -> SolutionKind {
        let Some(protocol) = right.as_protocol() else {
            return SolutionKind::Error;
        };
        match left {
            Type::Var(_) => SolutionKind::Unsolved,
            Type::Class(class) => {
                // Conformance is exact: the registry decides, per class. A
                // subclass does not conform just because its superclass
                // does — the front end registers each conforming class.
                if self.conforms(&class.name, &protocol.name) {
                    SolutionKind::Solved
                } else {
                    SolutionKind::Error
                }
            }
            Type::Protocol(proto) if proto.name == protocol.name => SolutionKind::Solved,
            Type::LValue { object, .. } => {
                let object = (**object).clone();
                self.simplify_conformance(cs, &object, right)
            }
            _ => SolutionKind::Error,
        }
    }

    fn simplify_applicable(
        &mut self,
        cs: &mut ConstraintSystem,
        left: &Type,
        right: &Type,
        parent: &Constraint,
    ) -> SolutionKind {
        // The left side is the call site: its params are the argument types
        // and its result is the expected result type.
        let Some(call) = left.as_function() else {
            return SolutionKind::Error;
        };
        match right {
            Type::Var(_) => SolutionKind::Unsolved,
            Type::LValue { object, .. } => {
                let object = (**object).clone();
                self.simplify_applicable(cs, left, &object, parent)
            }
            Type::Function(callee) => {
                if call.params.len() != callee.params.len() {
                    return SolutionKind::Error;
                }
                for (i, (arg, param)) in call.params.iter().zip(&callee.params).enumerate() {
                    cs.add_constraint(Constraint::relate(
                        Relation::Conversion,
                        arg.clone(),
                        param.clone(),
                        parent
                            .locator
                            .clone()
                            .with_element(PathElement::CallArgument(i as u32)),
                    ));
                }
                cs.add_constraint(Constraint::relate(
                    Relation::Equal,
                    (*call.result).clone(),
                    (*callee.result).clone(),
                    parent
                        .locator
                        .clone()
                        .with_element(PathElement::FunctionResult),
                ));
                SolutionKind::Solved
            }
            _ => SolutionKind::Error,
        }
    }

    fn simplify_member(
        &mut self,
        cs: &mut ConstraintSystem,
        base: &Type,
        name: &vela_types::Label,
        member: &Type,
        parent: &Constraint,
    ) -> SolutionKind {
        let base = cs.simplify_type(base);
        match &base {
            Type::Var(_) => SolutionKind::Unsolved,
            Type::LValue { object, .. } => {
                let object = (**object).clone();
                self.simplify_member(cs, &object, name, member, parent)
            }
            Type::Class(class) => {
                // Look the member up along the superclass chain.
                let mut current = Some(class);
                while let Some(cursor) = current {
                    if let Some(ty) = self
                        .members
                        .get(&(cursor.name.clone(), name.as_str().to_string()))
                    {
                        cs.add_constraint(Constraint::relate(
                            Relation::Equal,
                            member.clone(),
                            ty.clone(),
                            parent.locator.clone().with_element(PathElement::MemberRef),
                        ));
                        return SolutionKind::Solved;
                    }
                    current = cursor
                        .superclass
                        .as_deref()
                        .and_then(|superclass| superclass.as_class());
                }
                SolutionKind::Error
            }
            Type::Tuple(elements) => {
                for element in elements {
                    if element.label.as_ref() == Some(name) {
                        cs.add_constraint(Constraint::relate(
                            Relation::Equal,
                            member.clone(),
                            element.ty.clone(),
                            parent.locator.clone().with_element(PathElement::MemberRef),
                        ));
                        return SolutionKind::Solved;
                    }
                }
                SolutionKind::Error
            }
            _ => SolutionKind::Error,
        }
    }

    fn simplify_property(
        &mut self,
        cs: &mut ConstraintSystem,
        ty: &Type,
        predicate: PropertyPredicate,
    ) -> SolutionKind {
        let ty = cs.simplify_type(ty);
        if ty.is_type_variable() {
            return SolutionKind::Unsolved;
        }
        let holds = match predicate {
            PropertyPredicate::IsTuple => matches!(ty, Type::Tuple(_)),
            PropertyPredicate::IsFunction => matches!(ty, Type::Function(_)),
            PropertyPredicate::IsClass => matches!(ty, Type::Class(_)),
        };
        if holds {
            SolutionKind::Solved
        } else {
            SolutionKind::Error
        }
    }
}

impl SolverHost for StructuralHost {
    fn simplify_constraint(
        &mut self,
        cs: &mut ConstraintSystem,
        constraint: &Constraint,
    ) -> SolutionKind {
        match &constraint.kind {
            ConstraintKind::Relate {
                relation,
                left,
                right,
            } => self.match_types(cs, *relation, left, right, constraint),
            ConstraintKind::Property { ty, predicate } => {
                self.simplify_property(cs, ty, *predicate)
            }
            ConstraintKind::Member { base, name, member } => {
                self.simplify_member(cs, base, name, member, constraint)
            }
            ConstraintKind::Conjunction(_) => {
                unreachable!("conjunction constraints are normalized away before solving")
            }
            // Disjunctions are branched by the driver, never simplified in
            // place.
            ConstraintKind::Disjunction(_) => SolutionKind::Unsolved,
        }
    }
}
