//! Constraint solving for the Vela type checker.
//!
//! This crate implements:
//! - A constraint system over type variables with a reversible binding
//!   journal (every speculative mutation can be rolled back in O(1) per
//!   entry)
//! - A worklist-driven simplifier that reduces constraints to solved,
//!   residual, or failed
//! - A backtracking search driver with connected-component decomposition,
//!   supertype enumeration for candidate bindings, and lexicographic
//!   scoring of solutions
//!
//! The solver is designed to be host-extensible: constraint simplification,
//! solution ranking, and literal-type opening go through the [`SolverHost`]
//! trait. [`StructuralHost`] implements the structural rules for the Vela
//! type language and is what the rest of the compiler uses.

use std::fmt;
use std::rc::Rc;
use std::sync::Mutex;

use vela_ast::Span;
use vela_types::{Type, TypeVarId};

pub mod trace;

mod solver;

pub use solver::{ConstraintId, ConstraintSystem, Solver, SolverScope, StructuralHost, SystemSnapshot};

// Re-export for convenience.
pub use vela_diag::{Category, Diagnostic, DiagnosticError, SourceLocation};
pub use vela_types::Label;

// ---------------------------------------------------------------------------
// Locators: where a constraint came from
// ---------------------------------------------------------------------------

/// One step of a locator path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathElement {
    /// The i-th argument of a call.
    CallArgument(u32),
    /// The i-th element of a tuple expression.
    TupleElement(u32),
    /// A member reference on a base expression.
    MemberRef,
    /// The result position of a function application.
    FunctionResult,
    /// A segment of a string interpolation.
    InterpolationArgument,
    /// An implicit r-value adjustment.
    RvalueAdjustment,
}

/// A stable identifier for a constraint's source position.
///
/// Locators key overload-choice maps and drive a handful of search
/// heuristics; they are ordered so they can be used in `BTreeMap`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub anchor: Span,
    pub path: Vec<PathElement>,
}

impl Locator {
    pub fn new(anchor: Span) -> Self {
        Self {
            anchor,
            path: Vec::new(),
        }
    }

    /// A locator for solver-generated constraints with no source position.
    pub fn synthetic() -> Self {
        Self::new(Span::synthetic())
    }

    pub fn with_element(mut self, element: PathElement) -> Self {
        self.path.push(element);
        self
    }

    pub fn last_element(&self) -> Option<&PathElement> {
        self.path.last()
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// A binary relation between two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// The two types must be exactly equal.
    Equal,
    /// The left side (a type variable) is bound directly to the type on
    /// the right.
    Bind,
    /// Trivial subtyping: no representation change allowed.
    TrivialSubtype,
    /// Subtyping, possibly changing representation.
    Subtype,
    /// Conversion: subtyping plus implicit conversions.
    Conversion,
    /// The first type is a function call site applicable to the callee type
    /// on the right.
    ApplicableFunction,
    /// The first type conforms to the protocol on the right.
    ConformsTo,
    /// The first type is usable as the `Self` object of the protocol on the
    /// right.
    SelfObjectOfProtocol,
}

impl Relation {
    fn symbol(self) -> &'static str {
        match self {
            Relation::Equal => "==",
            Relation::Bind => ":=",
            Relation::TrivialSubtype => "<t",
            Relation::Subtype => "<s",
            Relation::Conversion => "<c",
            Relation::ApplicableFunction => "applies to",
            Relation::ConformsTo => "conforms to",
            Relation::SelfObjectOfProtocol => "self object of",
        }
    }
}

/// A unary predicate over a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyPredicate {
    IsTuple,
    IsFunction,
    IsClass,
}

impl PropertyPredicate {
    fn as_str(self) -> &'static str {
        match self {
            PropertyPredicate::IsTuple => "is tuple",
            PropertyPredicate::IsFunction => "is function",
            PropertyPredicate::IsClass => "is class",
        }
    }
}

/// A conversion strategy applied while discharging a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversionRestriction {
    TupleToTuple,
    ScalarToTuple,
    Superclass,
    ValueToOptional,
    OptionalToOptional,
    LValueToRValue,
}

/// The shape of a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A binary relation between two types.
    Relate {
        relation: Relation,
        left: Type,
        right: Type,
    },
    /// A unary predicate that a type must satisfy.
    Property {
        ty: Type,
        predicate: PropertyPredicate,
    },
    /// The member `name` of `base` has type `member`.
    Member {
        base: Type,
        name: Label,
        member: Type,
    },
    /// All children must hold. Normalized away when added to a system;
    /// never present in a live constraint store.
    Conjunction(Vec<Constraint>),
    /// Exactly one child must hold.
    Disjunction(Vec<Constraint>),
}

/// Broad classification of a constraint, used when indexing constraints by
/// the type variables they mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Relational,
    TypeProperty,
    Member,
    Conjunction,
    Disjunction,
}

/// A single typing constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    /// The conversion strategy this constraint commits to, if any.
    pub restriction: Option<ConversionRestriction>,
    /// Where this constraint came from.
    pub locator: Locator,
    /// The overload choice this constraint resolves when discharged, if any.
    pub overload: Option<OverloadChoice>,
}

impl Constraint {
    pub fn relate(relation: Relation, left: Type, right: Type, locator: Locator) -> Self {
        Self {
            kind: ConstraintKind::Relate {
                relation,
                left,
                right,
            },
            restriction: None,
            locator,
            overload: None,
        }
    }

    pub fn property(ty: Type, predicate: PropertyPredicate, locator: Locator) -> Self {
        Self {
            kind: ConstraintKind::Property { ty, predicate },
            restriction: None,
            locator,
            overload: None,
        }
    }

    pub fn member(base: Type, name: Label, member: Type, locator: Locator) -> Self {
        Self {
            kind: ConstraintKind::Member { base, name, member },
            restriction: None,
            locator,
            overload: None,
        }
    }

    pub fn conjunction(children: Vec<Constraint>, locator: Locator) -> Self {
        Self {
            kind: ConstraintKind::Conjunction(children),
            restriction: None,
            locator,
            overload: None,
        }
    }

    pub fn disjunction(children: Vec<Constraint>, locator: Locator) -> Self {
        Self {
            kind: ConstraintKind::Disjunction(children),
            restriction: None,
            locator,
            overload: None,
        }
    }

    pub fn with_restriction(mut self, restriction: ConversionRestriction) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn with_overload(mut self, choice: OverloadChoice) -> Self {
        self.overload = Some(choice);
        self
    }

    pub fn classification(&self) -> Classification {
        match &self.kind {
            ConstraintKind::Relate { .. } => Classification::Relational,
            ConstraintKind::Property { .. } => Classification::TypeProperty,
            ConstraintKind::Member { .. } => Classification::Member,
            ConstraintKind::Conjunction(_) => Classification::Conjunction,
            ConstraintKind::Disjunction(_) => Classification::Disjunction,
        }
    }

    pub fn relation(&self) -> Option<Relation> {
        match &self.kind {
            ConstraintKind::Relate { relation, .. } => Some(*relation),
            _ => None,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstraintKind::Relate {
                relation,
                left,
                right,
            } => write!(f, "{left} {} {right}", relation.symbol()),
            ConstraintKind::Property { ty, predicate } => {
                write!(f, "{ty} {}", predicate.as_str())
            }
            ConstraintKind::Member { base, name, member } => {
                write!(f, "{base}.{name} == {member}")
            }
            ConstraintKind::Conjunction(children) => {
                write!(f, "all of [")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "]")
            }
            ConstraintKind::Disjunction(children) => {
                write!(f, "one of [")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Overload resolution
// ---------------------------------------------------------------------------

/// One candidate of an overload set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadChoice {
    /// The declaration the candidate refers to.
    pub name: String,
    /// The candidate's position within its overload set.
    pub index: usize,
    /// The candidate's declared type.
    pub ty: Type,
}

/// A resolved overload set: a cell of the persistent resolution stack.
///
/// Each resolution is an immutable cons cell pointing at the previous head;
/// rolling back a scope restores only the head pointer, so cells are shared
/// freely across speculative branches.
#[derive(Debug)]
pub struct ResolvedOverload {
    pub locator: Locator,
    pub choice: OverloadChoice,
    /// The candidate's type after opening, as seen by this solution branch.
    pub opened_type: Type,
    pub previous: Option<Rc<ResolvedOverload>>,
}

/// The overload decision recorded in a finalized solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadSelection {
    pub choice: OverloadChoice,
    pub opened_type: Type,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// The number of score components.
pub const SCORE_KINDS: usize = 3;

/// The kinds of "bad choices" a solution is penalized for, in decreasing
/// order of significance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreKind {
    /// An implicit value conversion was applied.
    ValueConversion = 0,
    /// A value was implicitly injected into an optional.
    ValueToOptional = 1,
    /// A literal was typed with a non-default literal type.
    NonDefaultLiteral = 2,
}

/// A lexicographically ordered penalty tuple.
///
/// Smaller is strictly better. Along any branch of the search the score is
/// monotonically non-decreasing, which is what makes pruning against the
/// best known solution sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Score([u32; SCORE_KINDS]);

impl Score {
    pub const fn zero() -> Self {
        Self([0; SCORE_KINDS])
    }

    pub fn get(&self, kind: ScoreKind) -> u32 {
        self.0[kind as usize]
    }

    pub fn bump(&mut self, kind: ScoreKind) {
        self.0[kind as usize] += 1;
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }
}

impl std::ops::Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        let mut out = self.0;
        for (slot, value) in out.iter_mut().zip(rhs.0) {
            *slot += value;
        }
        Score(out)
    }
}

impl std::ops::AddAssign for Score {
    fn add_assign(&mut self, rhs: Score) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Score {
    type Output = Score;

    fn sub(self, rhs: Score) -> Score {
        let mut out = self.0;
        for (slot, value) in out.iter_mut().zip(rhs.0) {
            debug_assert!(*slot >= value, "score subtraction would underflow");
            *slot = slot.saturating_sub(value);
        }
        Score(out)
    }
}

impl std::ops::SubAssign for Score {
    fn sub_assign(&mut self, rhs: Score) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Solutions
// ---------------------------------------------------------------------------

/// How the solver treats type variables that remain free in a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeTypeVariablePolicy {
    /// Free type variables fail the branch.
    Disallow,
    /// Free type variables are left in the solution.
    Allow,
    /// Free type variables are bound to fresh generic parameters.
    GenericParameters,
}

/// A finalized assignment of types to every type variable in the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// The substituted canonical type of every type variable.
    pub type_bindings: std::collections::BTreeMap<TypeVarId, Type>,
    /// The overload chosen at each locator.
    pub overload_choices: std::collections::BTreeMap<Locator, OverloadSelection>,
    /// The conversion restrictions applied, with both sides simplified to
    /// canonical form.
    pub restrictions: Vec<(Type, Type, ConversionRestriction)>,
    pub(crate) score: Score,
}

impl Solution {
    pub(crate) fn empty(score: Score) -> Self {
        Self {
            type_bindings: std::collections::BTreeMap::new(),
            overload_choices: std::collections::BTreeMap::new(),
            restrictions: Vec::new(),
            score,
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn binding_for(&self, var: TypeVarId) -> Option<&Type> {
        self.type_bindings.get(&var)
    }
}

// ---------------------------------------------------------------------------
// Host interface
// ---------------------------------------------------------------------------

/// Outcome of simplifying one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionKind {
    /// The constraint is discharged and can be retired.
    Solved,
    /// The constraint cannot make progress yet; keep it as residual.
    Unsolved,
    /// The constraint cannot be satisfied; the current branch fails.
    Error,
}

/// The callbacks the solver core requires from its host.
///
/// The driver owns search and rollback; the host owns the meaning of
/// individual constraints and the ranking of finished solutions.
pub trait SolverHost {
    /// Reduce one constraint against the current bindings. May bind type
    /// variables, merge equivalence classes, record restrictions, adjust
    /// the score, and add new constraints through `cs`.
    fn simplify_constraint(&mut self, cs: &mut ConstraintSystem, constraint: &Constraint)
        -> SolutionKind;

    /// Pick the best of several solutions, if one is strictly better.
    ///
    /// When `minimize` is true and no unique best exists, the set is
    /// reduced to the solutions tied for the best score. The default
    /// implementation ranks purely by [`Score`].
    fn find_best_solution(&self, solutions: &mut Vec<Solution>, minimize: bool) -> Option<usize> {
        let best_score = solutions.iter().map(Solution::score).min()?;
        let mut tied = solutions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.score() == best_score);
        let best = tied.next().map(|(i, _)| i)?;
        if tied.next().is_none() {
            return Some(best);
        }
        if minimize {
            solutions.retain(|s| s.score() == best_score);
        }
        None
    }

    /// Produce a fresh specialization of a literal default type before it is
    /// used as a binding. The default is the identity, which is correct for
    /// non-generic literal types.
    fn open_binding_type(&mut self, cs: &mut ConstraintSystem, ty: &Type) -> Type {
        let _ = cs;
        ty.clone()
    }
}

// ---------------------------------------------------------------------------
// Solver configuration
// ---------------------------------------------------------------------------

/// Tunable knobs for a solve. Conservative defaults; everything here is
/// optional behavior layered over the core algorithm.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Print the search trace to the injected debug writer.
    pub debug: bool,
    /// Turn on `debug` only for the numbered solution attempt.
    pub debug_attempt: Option<u64>,
    /// Fail any branch once this many states have been explored.
    pub state_limit: Option<u64>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            debug: false,
            debug_attempt: None,
            state_limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a solve did not produce a unique solution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SolveError {
    /// No assignment of types satisfies the constraint system.
    #[error("constraint system is unsatisfiable")]
    Unsatisfiable {
        /// The first constraint that failed on the last explored branch.
        failed: Option<Constraint>,
    },
    /// More than one solution survived ranking.
    #[error("expression is ambiguous: {} candidate solutions", .solutions.len())]
    Ambiguous { solutions: Vec<Solution> },
}

impl SolveError {
    /// Render this failure as a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            SolveError::Unsatisfiable { failed: None } => Diagnostic::error(
                Category::TypeError,
                "expression does not type check".to_string(),
            ),
            SolveError::Unsatisfiable {
                failed: Some(constraint),
            } => {
                let category = match &constraint.kind {
                    ConstraintKind::Relate { relation, .. } => match relation {
                        Relation::ConformsTo | Relation::SelfObjectOfProtocol => {
                            Category::ConformanceFailure
                        }
                        Relation::ApplicableFunction => Category::InvalidApplication,
                        _ => Category::TypeMismatch,
                    },
                    ConstraintKind::Member { .. } => Category::MemberNotFound,
                    _ => Category::TypeError,
                };
                let mut diag =
                    Diagnostic::error(category, format!("cannot satisfy `{constraint}`"));
                let anchor = constraint.locator.anchor;
                if !anchor.is_synthetic() {
                    diag = diag.at(SourceLocation {
                        file_id: anchor.file.0,
                        start: anchor.start,
                        end: anchor.end,
                    });
                }
                diag
            }
            SolveError::Ambiguous { solutions } => Diagnostic::error(
                Category::AmbiguousExpression,
                format!(
                    "expression is ambiguous: {} candidate typings score equally well",
                    solutions.len()
                ),
            )
            .with_help("add a type annotation to pick one of the candidate typings"),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-solve counters exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    SolutionAttempts,
    SimplifiedConstraints,
    UnsimplifiedConstraints,
    StatesExplored,
    TypeVariablesBound,
    TypeVariableBindings,
    Disjunctions,
    DisjunctionTerms,
    ComponentsSplit,
    SimplifyIterations,
}

impl Counter {
    pub const COUNT: usize = 10;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::SolutionAttempts,
        Counter::SimplifiedConstraints,
        Counter::UnsimplifiedConstraints,
        Counter::StatesExplored,
        Counter::TypeVariablesBound,
        Counter::TypeVariableBindings,
        Counter::Disjunctions,
        Counter::DisjunctionTerms,
        Counter::ComponentsSplit,
        Counter::SimplifyIterations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::SolutionAttempts => "NumSolutionAttempts",
            Counter::SimplifiedConstraints => "NumSimplifiedConstraints",
            Counter::UnsimplifiedConstraints => "NumUnsimplifiedConstraints",
            Counter::StatesExplored => "NumStatesExplored",
            Counter::TypeVariablesBound => "NumTypeVariablesBound",
            Counter::TypeVariableBindings => "NumTypeVariableBindings",
            Counter::Disjunctions => "NumDisjunctions",
            Counter::DisjunctionTerms => "NumDisjunctionTerms",
            Counter::ComponentsSplit => "NumComponentsSplit",
            Counter::SimplifyIterations => "NumSimplifyIterations",
        }
    }
}

/// A table of [`Counter`] values for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics([u64; Counter::COUNT]);

impl Statistics {
    pub const fn new() -> Self {
        Self([0; Counter::COUNT])
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.0[counter as usize]
    }

    pub fn bump(&mut self, counter: Counter) {
        self.0[counter as usize] += 1;
    }

    pub fn merge(&mut self, other: &Statistics) {
        for (slot, value) in self.0.iter_mut().zip(other.0) {
            *slot += value;
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for counter in Counter::ALL {
            writeln!(f, "{:<28} {}", counter.name(), self.get(counter))?;
        }
        Ok(())
    }
}

/// Process-global running totals across every solve.
static PROCESS_TOTALS: Mutex<Statistics> = Mutex::new(Statistics::new());

/// Counters of the largest system observed so far, with its attempt number.
static LARGEST_SYSTEM: Mutex<(u64, Statistics)> = Mutex::new((0, Statistics::new()));

/// Fold one solve's counters into the process-global tables.
pub(crate) fn record_solve(attempt: u64, stats: &Statistics) {
    let mut totals = PROCESS_TOTALS
        .lock()
        .expect("statistics mutex poisoned");
    totals.merge(stats);
    drop(totals);

    let mut largest = LARGEST_SYSTEM
        .lock()
        .expect("statistics mutex poisoned");
    if stats.get(Counter::StatesExplored) > largest.1.get(Counter::StatesExplored) {
        *largest = (attempt, *stats);
    }
}

/// Running totals of every solve performed by this process.
pub fn process_totals() -> Statistics {
    *PROCESS_TOTALS.lock().expect("statistics mutex poisoned")
}

/// The attempt number and counters of the largest system solved so far.
pub fn largest_system() -> (u64, Statistics) {
    *LARGEST_SYSTEM.lock().expect("statistics mutex poisoned")
}

#[cfg(test)]
mod prop_tests;

#[cfg(test)]
mod solver_tests;
