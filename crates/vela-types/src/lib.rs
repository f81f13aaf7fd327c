//! Type representations for Vela.
//!
//! This crate defines the semantic types consumed by the constraint solver.
//! Types are immutable values: the solver never mutates a term, it only
//! builds new ones. Everything the solver needs from the type language is
//! here — structural queries, canonicalization, free-variable enumeration,
//! direct-supertype enumeration, and the literal-protocol tables that drive
//! default typing of literals.

use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a type variable during solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub u32);

impl fmt::Display for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A tuple-element or member label. Uses String for now; can switch to
/// interned strings later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Literal protocols
// ---------------------------------------------------------------------------

/// The protocols a literal expression can require conformance to.
///
/// Each carries a default concrete type (what an unconstrained literal
/// becomes) and an ordered list of alternative types to try when the default
/// does not lead to a solution. Order is part of the public contract: the
/// solver enumerates alternatives in exactly this sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LiteralProtocol {
    Integer,
    FloatingPoint,
    String,
}

impl LiteralProtocol {
    pub const ALL: [LiteralProtocol; 3] = [
        LiteralProtocol::Integer,
        LiteralProtocol::FloatingPoint,
        LiteralProtocol::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LiteralProtocol::Integer => "IntegerLiteral",
            LiteralProtocol::FloatingPoint => "FloatingPointLiteral",
            LiteralProtocol::String => "StringLiteral",
        }
    }

    /// The concrete type an unconstrained literal of this protocol becomes.
    pub fn default_type(self) -> Type {
        match self {
            LiteralProtocol::Integer => Type::class("Int"),
            LiteralProtocol::FloatingPoint => Type::class("Float"),
            LiteralProtocol::String => Type::class("String"),
        }
    }

    /// Additional types to try for this protocol, in order, when no solution
    /// was found with the default.
    pub fn alternative_types(self) -> Vec<Type> {
        match self {
            LiteralProtocol::Integer => vec![Type::class("Int64"), Type::class("Float")],
            LiteralProtocol::FloatingPoint => vec![Type::class("Float64")],
            LiteralProtocol::String => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An element of a tuple type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleElement {
    pub label: Option<Label>,
    pub ty: Type,
    pub vararg: bool,
}

impl TupleElement {
    pub fn unlabelled(ty: Type) -> Self {
        Self {
            label: None,
            ty,
            vararg: false,
        }
    }

    pub fn labelled(label: impl Into<String>, ty: Type) -> Self {
        Self {
            label: Some(Label::new(label)),
            ty,
            vararg: false,
        }
    }

    pub fn vararg(label: impl Into<String>, ty: Type) -> Self {
        Self {
            label: Some(Label::new(label)),
            ty,
            vararg: true,
        }
    }
}

/// A function type. `auto_closure` marks parameterless thunks inserted
/// implicitly at the use site; they can be viewed as a scalar of the result
/// type for subtyping purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Box<Type>,
    pub auto_closure: bool,
}

/// A nominal class type. The superclass, when present, is a direct supertype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassType {
    pub name: String,
    pub superclass: Option<Box<Type>>,
}

/// A protocol identity. Literal protocols additionally carry their
/// [`LiteralProtocol`] kind so the solver can look up defaults.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolType {
    pub name: String,
    pub literal: Option<LiteralProtocol>,
}

/// A semantic type in Vela.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Unresolved type variable. Never appears in final solutions.
    Var(TypeVarId),
    /// Nominal class, possibly with a superclass.
    Class(ClassType),
    /// Protocol used as a type (conformance constraints, existentials).
    Protocol(ProtocolType),
    Tuple(Vec<TupleElement>),
    Function(FunctionType),
    /// `T?` — either a value of `T` or none.
    Optional(Box<Type>),
    /// A mutable location holding a value of the object type. Implicit
    /// l-values decay to their object type.
    LValue { object: Box<Type>, implicit: bool },
    /// Fresh generic parameter assigned at finalization when free variables
    /// are allowed to generalize.
    GenericParam { index: u32 },
}

impl Type {
    pub fn var(id: TypeVarId) -> Type {
        Type::Var(id)
    }

    pub fn class(name: impl Into<String>) -> Type {
        Type::Class(ClassType {
            name: name.into(),
            superclass: None,
        })
    }

    pub fn class_with_superclass(name: impl Into<String>, superclass: Type) -> Type {
        Type::Class(ClassType {
            name: name.into(),
            superclass: Some(Box::new(superclass)),
        })
    }

    pub fn protocol(name: impl Into<String>) -> Type {
        Type::Protocol(ProtocolType {
            name: name.into(),
            literal: None,
        })
    }

    pub fn literal_protocol(kind: LiteralProtocol) -> Type {
        Type::Protocol(ProtocolType {
            name: kind.name().to_string(),
            literal: Some(kind),
        })
    }

    pub fn function(params: Vec<Type>, result: Type) -> Type {
        Type::Function(FunctionType {
            params,
            result: Box::new(result),
            auto_closure: false,
        })
    }

    pub fn auto_closure(result: Type) -> Type {
        Type::Function(FunctionType {
            params: Vec::new(),
            result: Box::new(result),
            auto_closure: true,
        })
    }

    pub fn tuple(elements: Vec<TupleElement>) -> Type {
        Type::Tuple(elements)
    }

    /// A parenthesized type: a one-element unlabelled non-vararg tuple.
    /// Canonicalization strips this sugar.
    pub fn paren(ty: Type) -> Type {
        Type::Tuple(vec![TupleElement::unlabelled(ty)])
    }

    pub fn optional(ty: Type) -> Type {
        Type::Optional(Box::new(ty))
    }

    pub fn lvalue(object: Type) -> Type {
        Type::LValue {
            object: Box::new(object),
            implicit: false,
        }
    }

    pub fn implicit_lvalue(object: Type) -> Type {
        Type::LValue {
            object: Box::new(object),
            implicit: true,
        }
    }

    pub fn as_var(&self) -> Option<TypeVarId> {
        match self {
            Type::Var(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_type_variable(&self) -> bool {
        matches!(self, Type::Var(_))
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> Option<&ProtocolType> {
        match self {
            Type::Protocol(proto) => Some(proto),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[TupleElement]> {
        match self {
            Type::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self, Type::LValue { .. })
    }

    /// The type of the value stored in this type, stripping an outer l-value.
    pub fn rvalue_type(&self) -> Type {
        match self {
            Type::LValue { object, .. } => (**object).clone(),
            other => other.clone(),
        }
    }

    /// Whether any type variable occurs anywhere in this type.
    pub fn has_type_variables(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Class(class) => class
                .superclass
                .as_deref()
                .is_some_and(Type::has_type_variables),
            Type::Protocol(_) | Type::GenericParam { .. } => false,
            Type::Tuple(elements) => elements.iter().any(|elt| elt.ty.has_type_variables()),
            Type::Function(func) => {
                func.params.iter().any(Type::has_type_variables)
                    || func.result.has_type_variables()
            }
            Type::Optional(inner) => inner.has_type_variables(),
            Type::LValue { object, .. } => object.has_type_variables(),
        }
    }

    /// Collect every type variable occurring in this type into `out`.
    pub fn collect_type_vars(&self, out: &mut BTreeSet<TypeVarId>) {
        match self {
            Type::Var(id) => {
                out.insert(*id);
            }
            Type::Class(class) => {
                if let Some(superclass) = class.superclass.as_deref() {
                    superclass.collect_type_vars(out);
                }
            }
            Type::Protocol(_) | Type::GenericParam { .. } => {}
            Type::Tuple(elements) => {
                for elt in elements {
                    elt.ty.collect_type_vars(out);
                }
            }
            Type::Function(func) => {
                for param in &func.params {
                    param.collect_type_vars(out);
                }
                func.result.collect_type_vars(out);
            }
            Type::Optional(inner) => inner.collect_type_vars(out),
            Type::LValue { object, .. } => object.collect_type_vars(out),
        }
    }

    /// Canonical form for hashing and exact-match deduplication.
    ///
    /// Strips parenthesis sugar (one-element unlabelled non-vararg tuples)
    /// recursively. Everything else in the representation is already
    /// canonical.
    pub fn canonical(&self) -> Type {
        match self {
            Type::Var(id) => Type::Var(*id),
            Type::Class(class) => Type::Class(ClassType {
                name: class.name.clone(),
                superclass: class
                    .superclass
                    .as_deref()
                    .map(|superclass| Box::new(superclass.canonical())),
            }),
            Type::Protocol(proto) => Type::Protocol(proto.clone()),
            Type::Tuple(elements) => {
                if let [elt] = elements.as_slice() {
                    if elt.label.is_none() && !elt.vararg {
                        return elt.ty.canonical();
                    }
                }
                Type::Tuple(
                    elements
                        .iter()
                        .map(|elt| TupleElement {
                            label: elt.label.clone(),
                            ty: elt.ty.canonical(),
                            vararg: elt.vararg,
                        })
                        .collect(),
                )
            }
            Type::Function(func) => Type::Function(FunctionType {
                params: func.params.iter().map(Type::canonical).collect(),
                result: Box::new(func.result.canonical()),
                auto_closure: func.auto_closure,
            }),
            Type::Optional(inner) => Type::Optional(Box::new(inner.canonical())),
            Type::LValue { object, implicit } => Type::LValue {
                object: Box::new(object.canonical()),
                implicit: *implicit,
            },
            Type::GenericParam { index } => Type::GenericParam { index: *index },
        }
    }
}

/// Free-variable enumeration as a standalone set.
pub fn free_type_vars(ty: &Type) -> BTreeSet<TypeVarId> {
    let mut out = BTreeSet::new();
    ty.collect_type_vars(&mut out);
    out
}

// ---------------------------------------------------------------------------
// Direct supertypes
// ---------------------------------------------------------------------------

/// Enumerate the direct supertypes of a type in Vela's subtyping lattice.
///
/// The order is fixed: tuple unwrapping, then auto-closure results, then
/// superclasses, then implicit l-value decay. Callers rely on this order
/// being deterministic when retrying variable bindings.
pub fn direct_supertypes(ty: &Type) -> Vec<Type> {
    let mut result = Vec::new();

    if let Type::Tuple(elements) = ty {
        // A tuple constructible from a scalar has that scalar type as a
        // supertype: a single vararg element contributes its base type, a
        // single labelled element contributes the element type. A single
        // unlabelled element is parenthesis sugar, not a distinct type.
        if let [elt] = elements.as_slice() {
            if elt.vararg {
                result.push(elt.ty.clone());
            } else if elt.label.is_some() {
                result.push(elt.ty.clone());
            }
        }
    }

    if let Type::Function(func) = ty {
        // An auto-closure function type can be viewed as a scalar of its
        // result type.
        if func.auto_closure {
            result.push((*func.result).clone());
        }
    }

    if let Type::Class(class) = ty {
        if let Some(superclass) = class.superclass.as_deref() {
            result.push(superclass.clone());
        }
    }

    if let Type::LValue { object, implicit } = ty {
        if *implicit {
            result.push((**object).clone());
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Var(id) => write!(f, "{id}"),
            Type::Class(class) => write!(f, "{}", class.name),
            Type::Protocol(proto) => write!(f, "{}", proto.name),
            Type::Tuple(elements) => {
                write!(f, "(")?;
                for (i, elt) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(label) = &elt.label {
                        write!(f, "{label}: ")?;
                    }
                    write!(f, "{}", elt.ty)?;
                    if elt.vararg {
                        write!(f, "...")?;
                    }
                }
                write!(f, ")")
            }
            Type::Function(func) => {
                if func.auto_closure {
                    write!(f, "@autoclosure ")?;
                }
                write!(f, "(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {}", func.result)
            }
            Type::Optional(inner) => match inner.as_ref() {
                Type::Function(_) | Type::LValue { .. } => write!(f, "({inner})?"),
                _ => write!(f, "{inner}?"),
            },
            Type::LValue { object, .. } => write!(f, "@lvalue {object}"),
            Type::GenericParam { index } => write!(f, "g{index}"),
        }
    }
}
