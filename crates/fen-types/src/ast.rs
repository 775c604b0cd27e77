//! Decorated AST handed to the back end.
//!
//! The tree is already type checked and desugared. Every expression carries
//! its static [`Type`], and every type carries its [`Layout`] plus field
//! offsets for aggregates, so the code generator never computes layouts on
//! its own. Large recursive nodes are boxed to keep enum sizes reasonable.

use std::fmt;

use crate::layout::{
    Layout, LayoutBuilder, LayoutError, MemoryAlign, MemoryOffset, MemorySize, BOOL_LAYOUT,
    CHAR_LAYOUT, INT_LAYOUT, POINTER_LAYOUT, UNION_TAG_SIZE, UNIT_LAYOUT,
};
use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A fully decorated package: every function that goes into one pack.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
    pub externals: Vec<ExternalFunctionDecl>,
    /// Type information chunk produced by the front end, copied through verbatim.
    pub type_info: Vec<u8>,
}

/// A function with a body to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Fully qualified name, e.g. `main.isCold`.
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Type,
    /// Index of the function's signature in the type info chunk.
    pub type_index: TypeId,
    pub body: Expr,
    pub span: Span,
}

/// A host-provided function; only its ABI is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFunctionDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Ident::new(name, Span::synthetic()),
            ty,
        }
    }
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

/// Index of a type in the type info chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeId(pub u16);

/// A static type together with its memory layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Unit,
    Int,
    /// 16.16 fixed point, stored as `i32`.
    Fixed,
    Bool,
    Char,
    String,
    List(Box<Type>),
    Array(Box<Type>),
    /// Elements are named `"0"`, `"1"`, … in order.
    Tuple(Vec<Field>),
    /// Fields sorted by name.
    Record(Vec<Field>),
    Union(UnionType),
    Function(FunctionType),
}

/// A laid-out field of a record, tuple or variant payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub offset: MemoryOffset,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub name: String,
    pub variants: Vec<Variant>,
}

/// A union variant. Field offsets are relative to the start of the union.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub tag: u8,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    /// Type info index of this signature (the `Curry` operand).
    pub type_id: TypeId,
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl Type {
    fn primitive(kind: TypeKind, layout: Layout) -> Self {
        Self { kind, layout }
    }

    pub fn unit() -> Self {
        Self::primitive(TypeKind::Unit, UNIT_LAYOUT)
    }

    pub fn int() -> Self {
        Self::primitive(TypeKind::Int, INT_LAYOUT)
    }

    pub fn fixed() -> Self {
        Self::primitive(TypeKind::Fixed, INT_LAYOUT)
    }

    pub fn bool() -> Self {
        Self::primitive(TypeKind::Bool, BOOL_LAYOUT)
    }

    pub fn char() -> Self {
        Self::primitive(TypeKind::Char, CHAR_LAYOUT)
    }

    pub fn string() -> Self {
        Self::primitive(TypeKind::String, POINTER_LAYOUT)
    }

    pub fn list(item: Type) -> Self {
        Self::primitive(TypeKind::List(Box::new(item)), POINTER_LAYOUT)
    }

    pub fn array(item: Type) -> Self {
        Self::primitive(TypeKind::Array(Box::new(item)), POINTER_LAYOUT)
    }

    pub fn function(type_id: TypeId, params: Vec<Type>, ret: Type) -> Self {
        Self::primitive(
            TypeKind::Function(FunctionType {
                type_id,
                params,
                ret: Box::new(ret),
            }),
            POINTER_LAYOUT,
        )
    }

    /// Record with fields laid out in name order.
    pub fn record<N: Into<String>>(fields: Vec<(N, Type)>) -> Self {
        let mut named: Vec<(String, Type)> =
            fields.into_iter().map(|(n, t)| (n.into(), t)).collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));

        let mut builder = LayoutBuilder::new();
        let fields = named
            .into_iter()
            .map(|(name, ty)| Field {
                offset: builder.place(ty.layout),
                name,
                ty,
            })
            .collect();
        Self {
            kind: TypeKind::Record(fields),
            layout: builder.finish(),
        }
    }

    pub fn tuple(elements: Vec<Type>) -> Self {
        let mut builder = LayoutBuilder::new();
        let fields = elements
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Field {
                name: i.to_string(),
                offset: builder.place(ty.layout),
                ty,
            })
            .collect();
        Self {
            kind: TypeKind::Tuple(fields),
            layout: builder.finish(),
        }
    }

    /// Tagged union; variant tags follow declaration order.
    pub fn union<N: Into<String>>(
        name: impl Into<String>,
        variants: Vec<(N, Vec<Type>)>,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        let payload_align = variants
            .iter()
            .flat_map(|(_, fields)| fields.iter().map(|t| t.layout.align))
            .max()
            .unwrap_or(MemoryAlign::ONE);
        let payload_offset = MemoryOffset(UNION_TAG_SIZE.0).align_up(payload_align);

        let mut end = MemoryOffset(UNION_TAG_SIZE.0);
        let variants = variants
            .into_iter()
            .enumerate()
            .map(|(index, (variant_name, field_types))| {
                let tag = u8::try_from(index)
                    .ok()
                    .filter(|tag| *tag != u8::MAX)
                    .ok_or_else(|| LayoutError::TooManyVariants {
                        name: name.clone(),
                        count: index + 1,
                    })?;
                let mut builder = LayoutBuilder::starting_at(payload_offset);
                let fields = field_types
                    .into_iter()
                    .enumerate()
                    .map(|(i, ty)| Field {
                        name: i.to_string(),
                        offset: builder.place(ty.layout),
                        ty,
                    })
                    .collect();
                end = end.max(builder.end());
                Ok(Variant {
                    name: variant_name.into(),
                    tag,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, LayoutError>>()?;

        let size = end.align_up(payload_align);
        Ok(Self {
            kind: TypeKind::Union(UnionType { name, variants }),
            layout: Layout::new(MemorySize(size.0), payload_align),
        })
    }

    pub fn size(&self) -> MemorySize {
        self.layout.size
    }

    pub fn align(&self) -> MemoryAlign {
        self.layout.align
    }

    /// Field of a record or tuple.
    pub fn field(&self, name: &str) -> Option<&Field> {
        match &self.kind {
            TypeKind::Record(fields) | TypeKind::Tuple(fields) => {
                fields.iter().find(|f| f.name == name)
            }
            _ => None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Record(fields) | TypeKind::Tuple(fields) => fields,
            _ => &[],
        }
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        match &self.kind {
            TypeKind::Union(union) => union.variants.iter().find(|v| v.name == name),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match &self.kind {
            TypeKind::Function(function) => Some(function),
            _ => None,
        }
    }

    /// Element type of a list or array.
    pub fn item(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::List(item) | TypeKind::Array(item) => Some(item),
            _ => None,
        }
    }

    /// `Int` and `Fixed` share the integer instructions.
    pub fn is_integer_like(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Fixed)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Unit => write!(f, "()"),
            TypeKind::Int => write!(f, "Int"),
            TypeKind::Fixed => write!(f, "Fixed"),
            TypeKind::Bool => write!(f, "Bool"),
            TypeKind::Char => write!(f, "Char"),
            TypeKind::String => write!(f, "String"),
            TypeKind::List(item) => write!(f, "List<{item}>"),
            TypeKind::Array(item) => write!(f, "Array<{item}>"),
            TypeKind::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field.ty)?;
                }
                write!(f, ")")
            }
            TypeKind::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, " }}")
            }
            TypeKind::Union(union) => write!(f, "{}", union.name),
            TypeKind::Function(function) => {
                for param in &function.params {
                    write!(f, "{param} -> ")?;
                }
                write!(f, "{}", function.ret)
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// A decorated expression: kind, static type and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    IntLit(i32),
    /// Raw 16.16 bits.
    FixedLit(i32),
    BoolLit(bool),
    CharLit(u8),
    StringLit(String),

    // ── References ──
    /// A let binding, parameter or case binding.
    Variable(Ident),
    /// A named function (local or external) used as a value or call target.
    FunctionRef(Ident),

    // ── Operators ──
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    // ── Control flow ──
    If(IfExpr),
    Guard(GuardExpr),
    CaseUnion(CaseUnionExpr),
    CaseLiteral(CaseLiteralExpr),

    // ── Aggregates ──
    RecordLit(Vec<FieldInit>),
    RecordUpdate {
        base: Box<Expr>,
        updates: Vec<FieldInit>,
    },
    /// `r.f1.f2…`
    FieldAccess {
        base: Box<Expr>,
        path: Vec<Ident>,
    },
    ListLit(Vec<Expr>),
    ArrayLit(Vec<Expr>),
    TupleLit(Vec<Expr>),
    /// `V a b`; the union is the expression's own type.
    VariantConstructor {
        variant: Ident,
        args: Vec<Expr>,
    },

    // ── Functions ──
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Self tail call of the enclosing function.
    Recur(Vec<Expr>),
    /// Partial application; the expression type is the resulting function.
    Curry {
        function: Box<Expr>,
        args: Vec<Expr>,
    },

    // ── Bindings ──
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },

    // ── Desugared surface forms ──
    /// `|>` / `<|`, carrying the call form arranged by the decorator.
    Pipe(Option<Box<Expr>>),
    /// String interpolation, carrying the decorator's expansion.
    Interpolation(Option<Box<Expr>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// `++` on strings and lists.
    Append,
    /// `::`
    Cons,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    BitwiseNot,
}

/// `if c then t else e`
#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub condition: Box<Expr>,
    pub then_branch: Box<Expr>,
    pub else_branch: Box<Expr>,
}

/// `| c1 -> e1 | c2 -> e2 | _ -> d`
#[derive(Debug, Clone, PartialEq)]
pub struct GuardExpr {
    pub arms: Vec<GuardArm>,
    pub default: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardArm {
    pub condition: Expr,
    pub body: Expr,
}

/// `case subject of V a b -> … | _ -> …` on a tagged union.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseUnionExpr {
    pub subject: Box<Expr>,
    pub arms: Vec<UnionArm>,
    pub default: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionArm {
    pub variant: Ident,
    /// One entry per payload field; `None` for `_`.
    pub bindings: Vec<Option<Ident>>,
    pub body: Expr,
}

/// `case subject of 1 -> … | 2 -> … | _ -> …` on integers, runes or strings.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseLiteralExpr {
    pub subject: Box<Expr>,
    pub arms: Vec<LiteralArm>,
    pub default: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralArm {
    pub pattern: LiteralPattern,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralPattern {
    Int(i32),
    Char(u8),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: Ident,
    pub value: Expr,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Expression without a source span (used by tests and the decorator).
    pub fn synthetic(kind: ExprKind, ty: Type) -> Self {
        Self::new(kind, ty, Span::synthetic())
    }

    pub fn int(value: i32) -> Self {
        Self::synthetic(ExprKind::IntLit(value), Type::int())
    }

    pub fn bool(value: bool) -> Self {
        Self::synthetic(ExprKind::BoolLit(value), Type::bool())
    }

    pub fn char(value: u8) -> Self {
        Self::synthetic(ExprKind::CharLit(value), Type::char())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::StringLit(value.into()), Type::string())
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Self::synthetic(ExprKind::Variable(Ident::new(name, Span::synthetic())), ty)
    }

    pub fn function_ref(name: impl Into<String>, ty: Type) -> Self {
        Self::synthetic(ExprKind::FunctionRef(Ident::new(name, Span::synthetic())), ty)
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr, ty: Type) -> Self {
        Self::synthetic(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Self::synthetic(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn if_else(condition: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        let ty = then_branch.ty.clone();
        Self::synthetic(
            ExprKind::If(IfExpr {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }),
            ty,
        )
    }

    pub fn call(function: Expr, args: Vec<Expr>) -> Self {
        let ty = function
            .ty
            .as_function()
            .map(|f| (*f.ret).clone())
            .unwrap_or_else(Type::unit);
        Self::synthetic(
            ExprKind::Call {
                function: Box::new(function),
                args,
            },
            ty,
        )
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::IntLit(_) => "int literal",
            ExprKind::FixedLit(_) => "fixed literal",
            ExprKind::BoolLit(_) => "bool literal",
            ExprKind::CharLit(_) => "char literal",
            ExprKind::StringLit(_) => "string literal",
            ExprKind::Variable(_) => "variable",
            ExprKind::FunctionRef(_) => "function reference",
            ExprKind::Binary { .. } => "binary operator",
            ExprKind::Unary { .. } => "unary operator",
            ExprKind::If(_) => "if",
            ExprKind::Guard(_) => "guard",
            ExprKind::CaseUnion(_) => "case",
            ExprKind::CaseLiteral(_) => "case",
            ExprKind::RecordLit(_) => "record literal",
            ExprKind::RecordUpdate { .. } => "record update",
            ExprKind::FieldAccess { .. } => "field access",
            ExprKind::ListLit(_) => "list literal",
            ExprKind::ArrayLit(_) => "array literal",
            ExprKind::TupleLit(_) => "tuple literal",
            ExprKind::VariantConstructor { .. } => "variant constructor",
            ExprKind::Call { .. } => "call",
            ExprKind::Recur(_) => "recur",
            ExprKind::Curry { .. } => "curry",
            ExprKind::Let { .. } => "let",
            ExprKind::Pipe(_) => "pipe",
            ExprKind::Interpolation(_) => "string interpolation",
        }
    }
}
