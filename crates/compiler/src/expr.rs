//! Single-line expression parsing, checking and emission
//!
//! Expressions appear on the right-hand side of declarations and
//! assignments, in conditions, and as statement calls. A line of
//! expression text is tokenized and parsed into an [`Expr`] tree by
//! [`parse_expression`] during the build pass; [`Expr::process`] resolves
//! names and infers types during the process pass; [`Expr::ops`] renders
//! the TEAL opcode lines during code generation.
//!
//! Binary operators are parsed as a flat left-associative chain with a
//! single precedence level; parentheses group explicitly.

use crate::avm::{self, Op};
use crate::errors::CompileError;
use crate::scope::{ScopeId, Scopes, Var};
use crate::types::{AvmType, Type, TypeRegistry};

const BINOPS: &[&str] = &[
    "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "&&", "||",
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int { value: u64, raw: String },
    Str { raw: String, len: usize },
    Hex { raw: String, len: usize },
    Sym(&'static str),
}

fn tokenize(input: &str) -> Result<Vec<Tok>, String> {
    let mut toks = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let start = i;
            i += 1;
            let mut len = 0;
            let mut closed = false;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    len += 1;
                } else if chars[i] == '"' {
                    i += 1;
                    closed = true;
                    break;
                } else {
                    i += 1;
                    len += 1;
                }
            }
            if !closed {
                return Err(format!("Unterminated string in \"{}\"", input));
            }
            let raw: String = chars[start..i].iter().collect();
            toks.push(Tok::Str { raw, len });
            continue;
        }
        if c == '0' && i + 1 < chars.len() && chars[i + 1] == 'x' {
            let start = i;
            i += 2;
            while i < chars.len() && chars[i].is_ascii_hexdigit() {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            let digits = raw.len() - 2;
            if digits == 0 || digits % 2 != 0 {
                return Err(format!("Invalid hex literal \"{}\"", raw));
            }
            toks.push(Tok::Hex {
                len: digits / 2,
                raw,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            let value: u64 = raw
                .replace('_', "")
                .parse()
                .map_err(|_| format!("Invalid int literal \"{}\"", raw))?;
            toks.push(Tok::Int { value, raw });
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        // two-character operators before their one-character prefixes
        let rest: String = chars[i..].iter().take(2).collect();
        let two = ["==", "!=", "<=", ">=", "&&", "||"]
            .iter()
            .find(|s| **s == rest)
            .copied();
        if let Some(sym) = two {
            toks.push(Tok::Sym(sym));
            i += 2;
            continue;
        }
        let one = ["(", ")", "[", "]", ",", ".", "!", "+", "-", "*", "/", "%", "<", ">"]
            .iter()
            .find(|s| s.chars().next() == Some(c))
            .copied();
        if let Some(sym) = one {
            toks.push(Tok::Sym(sym));
            i += 1;
            continue;
        }
        return Err(format!("Unexpected character '{}' in \"{}\"", c, input));
    }
    Ok(toks)
}

/// Result type of an expression: no value, one value, or the value list of
/// a multi-return function call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprTy {
    None,
    Single(Type),
    Multi(Vec<Type>),
}

impl ExprTy {
    /// The value types produced, top-level order.
    pub fn types(&self) -> Vec<Type> {
        match self {
            ExprTy::None => Vec::new(),
            ExprTy::Single(t) => vec![t.clone()],
            ExprTy::Multi(ts) => ts.clone(),
        }
    }
}

impl std::fmt::Display for ExprTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprTy::None => write!(f, "none"),
            ExprTy::Single(t) => write!(f, "{}", t),
            ExprTy::Multi(ts) => {
                let names: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", names.join(", "))
            }
        }
    }
}

/// How a bare name resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Var(Var),
    Const { name: String, ty: Type },
    AvmConst { name: String, value: u64 },
}

/// How a `name.field` read resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBinding {
    /// Struct blob in a scratch slot: extract the field's byte range
    Scratch {
        var_name: String,
        slot: usize,
        offset: usize,
        size: usize,
        ty: Type,
    },
    /// Struct layout over an external box
    BoxField {
        var_name: String,
        slot: usize,
        offset: usize,
        size: usize,
        ty: Type,
    },
    /// Transaction/global field read, emitted by base keyword
    TxnLike,
}

/// Resolved call target.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Op(&'static str),
    UserFunc { label: String, returns: Vec<Type> },
    Cast { ty: Type },
    FromBytes { ty: Type },
    Rpad { pad: usize },
    Lpad { pad: usize },
    ToBytes { is_int: bool },
    SizeOf { size: usize },
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit {
        value: u64,
        raw: String,
    },
    BytesLit {
        raw: String,
        len: usize,
    },
    HexLit {
        raw: String,
        len: usize,
    },
    Name {
        name: String,
        binding: Option<Binding>,
    },
    FieldRead {
        base: String,
        field: String,
        index: Option<u64>,
        resolved: Option<FieldBinding>,
    },
    GroupTxnField {
        base: String,
        index: u64,
        field: String,
    },
    Group(Box<Expr>),
    Not {
        operand: Box<Expr>,
    },
    Binary {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        type_arg: Option<String>,
        size_arg: Option<u64>,
        target: Option<CallTarget>,
    },
}

/// Parse a single-line expression into an [`Expr`].
pub fn parse_expression(line: &str) -> Result<Expr, String> {
    let toks = tokenize(line)?;
    let mut parser = ExprParser { toks, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.toks.len() {
        return Err(format!("Cannot parse \"{}\" as Expression", line));
    }
    Ok(expr)
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        match self.advance() {
            Some(Tok::Sym(s)) if s == sym => Ok(()),
            other => Err(format!("Expected '{}', got {:?}", sym, other)),
        }
    }

    fn peek_binop(&self) -> Option<&'static str> {
        if let Some(Tok::Sym(s)) = self.peek() {
            BINOPS.iter().find(|b| *b == s).copied()
        } else {
            None
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_operand()?;
        while let Some(op) = self.peek_binop() {
            self.pos += 1;
            let rhs = self.parse_operand()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_operand(&mut self) -> Result<Expr, String> {
        if let Some(Tok::Sym("!")) = self.peek() {
            self.pos += 1;
            let operand = self.parse_operand()?;
            return Ok(Expr::Not {
                operand: Box::new(operand),
            });
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Tok::Sym("(")) => {
                let inner = self.parse_expr()?;
                self.expect_sym(")")?;
                Ok(Expr::Group(Box::new(inner)))
            }
            Some(Tok::Int { value, raw }) => Ok(Expr::IntLit { value, raw }),
            Some(Tok::Str { raw, len }) => Ok(Expr::BytesLit { raw, len }),
            Some(Tok::Hex { raw, len }) => Ok(Expr::HexLit { raw, len }),
            Some(Tok::Ident(name)) => self.parse_ident_tail(name),
            other => Err(format!("Unexpected token {:?}", other)),
        }
    }

    fn parse_ident_tail(&mut self, name: String) -> Result<Expr, String> {
        match self.peek() {
            Some(Tok::Sym("(")) => self.parse_call(name),
            Some(Tok::Sym("[")) => {
                // Gtxn[i].Field
                self.pos += 1;
                let index = match self.advance() {
                    Some(Tok::Int { value, .. }) => value,
                    other => return Err(format!("Expected group index, got {:?}", other)),
                };
                self.expect_sym("]")?;
                self.expect_sym(".")?;
                let field = match self.advance() {
                    Some(Tok::Ident(f)) => f,
                    other => return Err(format!("Expected field name, got {:?}", other)),
                };
                Ok(Expr::GroupTxnField {
                    base: name,
                    index,
                    field,
                })
            }
            Some(Tok::Sym(".")) => {
                self.pos += 1;
                let field = match self.advance() {
                    Some(Tok::Ident(f)) => f,
                    other => return Err(format!("Expected field name, got {:?}", other)),
                };
                let index = if let Some(Tok::Sym("[")) = self.peek() {
                    self.pos += 1;
                    let index = match self.advance() {
                        Some(Tok::Int { value, .. }) => value,
                        other => return Err(format!("Expected array index, got {:?}", other)),
                    };
                    self.expect_sym("]")?;
                    Some(index)
                } else {
                    None
                };
                Ok(Expr::FieldRead {
                    base: name,
                    field,
                    index,
                    resolved: None,
                })
            }
            _ => Ok(Expr::Name {
                name,
                binding: None,
            }),
        }
    }

    /// Parse a type name argument: `int`, `uint8`, `bytes[32]`, `Item`, ...
    fn parse_type_name(&mut self) -> Result<String, String> {
        let base = match self.advance() {
            Some(Tok::Ident(name)) => name,
            other => return Err(format!("Expected type name, got {:?}", other)),
        };
        if let Some(Tok::Sym("[")) = self.peek() {
            self.pos += 1;
            let n = match self.advance() {
                Some(Tok::Int { value, .. }) => value,
                other => return Err(format!("Expected size, got {:?}", other)),
            };
            self.expect_sym("]")?;
            return Ok(format!("{}[{}]", base, n));
        }
        Ok(base)
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, String> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        let mut type_arg = None;
        let mut size_arg = None;
        match name.as_str() {
            "Cast" | "FromBytes" => {
                args.push(self.parse_expr()?);
                self.expect_sym(",")?;
                type_arg = Some(self.parse_type_name()?);
            }
            "Rpad" | "Lpad" => {
                args.push(self.parse_expr()?);
                self.expect_sym(",")?;
                size_arg = Some(match self.advance() {
                    Some(Tok::Int { value, .. }) => value,
                    other => return Err(format!("Expected pad size, got {:?}", other)),
                });
            }
            "SizeOf" => {
                type_arg = Some(self.parse_type_name()?);
            }
            _ => {
                if !matches!(self.peek(), Some(Tok::Sym(")"))) {
                    loop {
                        args.push(self.parse_expr()?);
                        if let Some(Tok::Sym(",")) = self.peek() {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
        self.expect_sym(")")?;
        Ok(Expr::Call {
            name,
            args,
            type_arg,
            size_arg,
            target: None,
        })
    }
}

/// Context handed to [`Expr::process`]: read access to the symbol tables
/// and the registry, plus the statement's line number for diagnostics.
pub struct ExprCtx<'a> {
    pub scopes: &'a Scopes,
    pub registry: &'a TypeRegistry,
    pub scope: ScopeId,
    pub line_no: usize,
}

impl ExprCtx<'_> {
    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, Some(self.line_no))
    }
}

/// Smallest unsigned width in bytes that holds `value`.
fn int_literal_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn avm_compatible(a: AvmType, b: AvmType) -> bool {
    a == AvmType::Any || b == AvmType::Any || a == b
}

impl Expr {
    /// Resolve names, infer and check types. Returns the expression's
    /// value type(s).
    pub fn process(&mut self, ctx: &ExprCtx) -> Result<ExprTy, CompileError> {
        match self {
            Expr::IntLit { value, .. } => {
                Ok(ExprTy::Single(Type::UInt(int_literal_width(*value))))
            }
            Expr::BytesLit { len, .. } => Ok(ExprTy::Single(Type::Bytes(Some(*len)))),
            Expr::HexLit { len, .. } => Ok(ExprTy::Single(Type::Bytes(Some(*len)))),
            Expr::Name { name, binding } => {
                if let Some(var) = ctx.scopes.lookup_var(ctx.scope, name) {
                    let ty = var.ty.clone();
                    *binding = Some(Binding::Var(var.clone()));
                    Ok(ExprTy::Single(ty))
                } else if let Some(def) = ctx.scopes.lookup_const(ctx.scope, name) {
                    let ty = def.ty.clone();
                    *binding = Some(Binding::Const {
                        name: name.clone(),
                        ty: ty.clone(),
                    });
                    Ok(ExprTy::Single(ty))
                } else if let Some(value) = avm::lookup_constant(name) {
                    *binding = Some(Binding::AvmConst {
                        name: name.clone(),
                        value,
                    });
                    Ok(ExprTy::Single(Type::Int))
                } else {
                    Err(ctx.err(format!("Unknown name \"{}\"", name)))
                }
            }
            Expr::FieldRead {
                base,
                field,
                index,
                resolved,
            } => {
                if matches!(base.as_str(), "Txn" | "Global" | "Itxn") {
                    *resolved = Some(FieldBinding::TxnLike);
                    return Ok(ExprTy::Single(Type::Any));
                }
                let var = ctx
                    .scopes
                    .lookup_var(ctx.scope, base)
                    .ok_or_else(|| ctx.err(format!("Unknown name \"{}\"", base)))?;
                if index.is_some() {
                    return Err(ctx.err(format!(
                        "\"{}.{}\" does not take an array index",
                        base, field
                    )));
                }
                let (struct_name, is_box) = match &var.ty {
                    Type::Struct(s) => (s.clone(), false),
                    Type::Box(s) => (s.clone(), true),
                    _ => {
                        return Err(
                            ctx.err(format!("\"{}\" is not a struct or Box reference", base))
                        )
                    }
                };
                let struct_type = ctx
                    .registry
                    .get_struct(&struct_name)
                    .ok_or_else(|| ctx.err(format!("Unknown struct \"{}\"", struct_name)))?;
                let f = struct_type.field(field).ok_or_else(|| {
                    ctx.err(format!(
                        "Unknown field \"{}\" of struct {}",
                        field, struct_name
                    ))
                })?;
                let binding = if is_box {
                    FieldBinding::BoxField {
                        var_name: base.clone(),
                        slot: var.slot,
                        offset: f.offset,
                        size: f.size,
                        ty: f.ty.clone(),
                    }
                } else {
                    FieldBinding::Scratch {
                        var_name: base.clone(),
                        slot: var.slot,
                        offset: f.offset,
                        size: f.size,
                        ty: f.ty.clone(),
                    }
                };
                let ty = f.ty.clone();
                *resolved = Some(binding);
                Ok(ExprTy::Single(ty))
            }
            Expr::GroupTxnField { base, .. } => {
                if base != "Gtxn" {
                    return Err(ctx.err(format!("Unknown name \"{}\"", base)));
                }
                Ok(ExprTy::Single(Type::Any))
            }
            Expr::Group(inner) => inner.process(ctx),
            Expr::Not { operand } => {
                let t = operand.process_single(ctx, "!")?;
                if !t.is_int() && t != Type::Any {
                    return Err(ctx.err(format!("Incorrect type for !. Expected int, got {}", t)));
                }
                Ok(ExprTy::Single(Type::Int))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lt = lhs.process_single(ctx, op)?;
                let rt = rhs.process_single(ctx, op)?;
                match *op {
                    "==" | "!=" => {
                        if !avm_compatible(lt.avm_type(), rt.avm_type()) {
                            return Err(
                                ctx.err(format!("Cannot compare {} with {}", lt, rt))
                            );
                        }
                    }
                    _ => {
                        for t in [&lt, &rt] {
                            if !t.is_int() && *t != Type::Any {
                                return Err(ctx.err(format!(
                                    "Incorrect type for {}. Expected int, got {}",
                                    op, t
                                )));
                            }
                        }
                    }
                }
                Ok(ExprTy::Single(Type::Int))
            }
            Expr::Call {
                name,
                args,
                type_arg,
                size_arg,
                target,
            } => Self::process_call(ctx, name, args, type_arg, size_arg, target),
        }
    }

    fn process_call(
        ctx: &ExprCtx,
        name: &str,
        args: &mut [Expr],
        type_arg: &Option<String>,
        size_arg: &Option<u64>,
        target: &mut Option<CallTarget>,
    ) -> Result<ExprTy, CompileError> {
        match name {
            "error" => {
                if !args.is_empty() {
                    return Err(ctx.err("error() takes no arguments"));
                }
                *target = Some(CallTarget::Error);
                Ok(ExprTy::None)
            }
            "Cast" => {
                let src = args[0].process_single(ctx, "Cast")?;
                let ty = Self::resolve_type_arg(ctx, type_arg)?;
                if !ty.can_hold_with_cast(&src) {
                    return Err(ctx.err(format!("Cannot cast {} to {}", src, ty)));
                }
                *target = Some(CallTarget::Cast { ty: ty.clone() });
                Ok(ExprTy::Single(ty))
            }
            "FromBytes" => {
                let src = args[0].process_single(ctx, "FromBytes")?;
                if !src.is_bytes() && src != Type::Any {
                    return Err(ctx.err(format!(
                        "Incorrect type for FromBytes. Expected bytes, got {}",
                        src
                    )));
                }
                let ty = Self::resolve_type_arg(ctx, type_arg)?;
                if !ty.is_int() {
                    return Err(ctx.err(format!("FromBytes requires an int type, got {}", ty)));
                }
                *target = Some(CallTarget::FromBytes { ty: ty.clone() });
                Ok(ExprTy::Single(ty))
            }
            "Rpad" | "Lpad" => {
                let src = args[0].process_single(ctx, name)?;
                let current = src
                    .fixed_size(ctx.registry)
                    .map_err(|_| ctx.err(format!("Cannot pad {} (unknown length)", src)))?;
                if !src.is_bytes() {
                    return Err(ctx.err(format!(
                        "Incorrect type for {}. Expected bytes, got {}",
                        name, src
                    )));
                }
                let size = size_arg.unwrap_or(0) as usize;
                if size < current {
                    return Err(ctx.err(format!(
                        "Cannot pad bytes[{}] down to bytes[{}]",
                        current, size
                    )));
                }
                let pad = size - current;
                *target = Some(if name == "Rpad" {
                    CallTarget::Rpad { pad }
                } else {
                    CallTarget::Lpad { pad }
                });
                Ok(ExprTy::Single(Type::Bytes(Some(size))))
            }
            "ToBytes" => {
                if args.len() != 1 {
                    return Err(ctx.err("ToBytes takes exactly one argument"));
                }
                let src = args[0].process_single(ctx, "ToBytes")?;
                let is_int = src.is_int();
                *target = Some(CallTarget::ToBytes { is_int });
                if is_int {
                    Ok(ExprTy::Single(Type::Bytes(Some(8))))
                } else if src == Type::Any {
                    Ok(ExprTy::Single(Type::Bytes(None)))
                } else {
                    Ok(ExprTy::Single(src))
                }
            }
            "SizeOf" => {
                let ty = Self::resolve_type_arg(ctx, type_arg)?;
                let size = ty
                    .fixed_size(ctx.registry)
                    .map_err(|e| ctx.err(e))?;
                *target = Some(CallTarget::SizeOf { size });
                Ok(ExprTy::Single(Type::Int))
            }
            _ => {
                if let Some(op) = avm::lookup_op(name) {
                    Self::process_op_call(ctx, op, args)?;
                    *target = Some(CallTarget::Op(op.name));
                    return Ok(match op.returns {
                        [] => ExprTy::None,
                        [AvmType::Int] => ExprTy::Single(Type::Int),
                        [AvmType::Bytes] => ExprTy::Single(Type::Bytes(None)),
                        _ => ExprTy::Single(Type::Any),
                    });
                }
                let sig = ctx
                    .scopes
                    .lookup_func(ctx.scope, name)
                    .cloned()
                    .ok_or_else(|| ctx.err(format!("Unknown function \"{}\"", name)))?;
                if args.len() != sig.args.len() {
                    return Err(ctx.err(format!(
                        "Incorrect number of arguments for {}. Expected {}, got {}",
                        name,
                        sig.args.len(),
                        args.len()
                    )));
                }
                for (arg, (arg_name, expected)) in args.iter_mut().zip(&sig.args) {
                    let t = arg.process_single(ctx, name)?;
                    if !expected.can_hold(&t) {
                        return Err(ctx.err(format!(
                            "Incorrect type for argument \"{}\" of {}. Expected {}, got {}",
                            arg_name, name, expected, t
                        )));
                    }
                }
                let returns = sig.returns.clone();
                *target = Some(CallTarget::UserFunc {
                    label: sig.label,
                    returns: returns.clone(),
                });
                Ok(match returns.len() {
                    0 => ExprTy::None,
                    1 => ExprTy::Single(returns[0].clone()),
                    _ => ExprTy::Multi(returns),
                })
            }
        }
    }

    fn process_op_call(ctx: &ExprCtx, op: &Op, args: &mut [Expr]) -> Result<(), CompileError> {
        if args.len() != op.args.len() {
            return Err(ctx.err(format!(
                "Incorrect number of arguments for {}. Expected {}, got {}",
                op.name,
                op.args.len(),
                args.len()
            )));
        }
        for (i, (arg, expected)) in args.iter_mut().zip(op.args).enumerate() {
            let t = arg.process_single(ctx, op.name)?;
            if !avm_compatible(t.avm_type(), *expected) {
                return Err(ctx.err(format!(
                    "Incorrect type for argument {} of {}. Expected {}, got {}",
                    i + 1,
                    op.name,
                    expected,
                    t
                )));
            }
        }
        Ok(())
    }

    fn resolve_type_arg(
        ctx: &ExprCtx,
        type_arg: &Option<String>,
    ) -> Result<Type, CompileError> {
        let name = type_arg
            .as_deref()
            .ok_or_else(|| ctx.err("Missing type argument"))?;
        ctx.registry
            .get_type_instance(name)
            .map_err(|e| ctx.err(e))
    }

    /// Process and require exactly one value.
    fn process_single(&mut self, ctx: &ExprCtx, what: &str) -> Result<Type, CompileError> {
        match self.process(ctx)? {
            ExprTy::Single(t) => Ok(t),
            ExprTy::None => Err(ctx.err(format!("Expression used in {} has no value", what))),
            ExprTy::Multi(ts) => Err(ctx.err(format!(
                "Expression used in {} has {} values",
                what,
                ts.len()
            ))),
        }
    }

    /// Render the TEAL opcode lines for this expression. Requires a
    /// successful `process` pass; unresolved names are internal errors.
    pub fn ops(&self) -> Result<Vec<String>, String> {
        let mut out = Vec::new();
        self.emit(&mut out)?;
        Ok(out)
    }

    fn emit(&self, out: &mut Vec<String>) -> Result<(), String> {
        match self {
            Expr::IntLit { value, .. } => out.push(format!("pushint {}", value)),
            Expr::BytesLit { raw, .. } => out.push(format!("pushbytes {}", raw)),
            Expr::HexLit { raw, .. } => out.push(format!("pushbytes {}", raw)),
            Expr::Name { name, binding } => match binding {
                Some(Binding::Var(var)) => out.push(format!("load {} // {}", var.slot, name)),
                Some(Binding::Const { name, ty }) => {
                    if ty.is_int() {
                        out.push(format!("pushint {}", name));
                    } else {
                        out.push(format!("pushbytes {}", name));
                    }
                }
                Some(Binding::AvmConst { name, value }) => {
                    out.push(format!("pushint {} // {}", value, name));
                }
                None => return Err(format!("Unresolved name \"{}\"", name)),
            },
            Expr::FieldRead {
                base,
                field,
                index,
                resolved,
            } => match resolved {
                Some(FieldBinding::TxnLike) => {
                    let keyword = match base.as_str() {
                        "Txn" => "txn",
                        "Global" => "global",
                        _ => "itxn",
                    };
                    match index {
                        Some(i) => out.push(format!("{}a {} {}", keyword, field, i)),
                        None => out.push(format!("{} {}", keyword, field)),
                    }
                }
                Some(FieldBinding::Scratch {
                    var_name,
                    slot,
                    offset,
                    size,
                    ty,
                }) => {
                    out.push(format!("load {} // {}", slot, var_name));
                    out.push(format!("extract {} {} // .{}", offset, size, field));
                    if ty.is_int() {
                        out.push("btoi".to_string());
                    }
                }
                Some(FieldBinding::BoxField {
                    var_name,
                    slot,
                    offset,
                    size,
                    ty,
                }) => {
                    out.push(format!("load {} // box:{}", slot, var_name));
                    out.push(format!("pushint {}", offset));
                    out.push(format!("pushint {}", size));
                    out.push(format!("box_extract // .{}", field));
                    if ty.is_int() {
                        out.push("btoi".to_string());
                    }
                }
                None => return Err(format!("Unresolved field read \"{}.{}\"", base, field)),
            },
            Expr::GroupTxnField { index, field, .. } => {
                out.push(format!("gtxn {} {}", index, field));
            }
            Expr::Group(inner) => inner.emit(out)?,
            Expr::Not { operand } => {
                operand.emit(out)?;
                out.push("!".to_string());
            }
            Expr::Binary { op, lhs, rhs } => {
                lhs.emit(out)?;
                rhs.emit(out)?;
                out.push((*op).to_string());
            }
            Expr::Call {
                name,
                args,
                target,
                ..
            } => match target {
                Some(CallTarget::Op(op)) => {
                    for arg in args {
                        arg.emit(out)?;
                    }
                    out.push((*op).to_string());
                }
                Some(CallTarget::UserFunc { label, .. }) => {
                    for arg in args {
                        arg.emit(out)?;
                    }
                    out.push(format!("callsub {}", label));
                }
                Some(CallTarget::Cast { .. }) => args[0].emit(out)?,
                Some(CallTarget::FromBytes { .. }) => {
                    args[0].emit(out)?;
                    out.push("btoi".to_string());
                }
                Some(CallTarget::Rpad { pad }) => {
                    args[0].emit(out)?;
                    if *pad > 0 {
                        out.push(format!("pushbytes 0x{}", "00".repeat(*pad)));
                        out.push("concat".to_string());
                    }
                }
                Some(CallTarget::Lpad { pad }) => {
                    if *pad > 0 {
                        out.push(format!("pushbytes 0x{}", "00".repeat(*pad)));
                    }
                    args[0].emit(out)?;
                    if *pad > 0 {
                        out.push("concat".to_string());
                    }
                }
                Some(CallTarget::ToBytes { is_int }) => {
                    args[0].emit(out)?;
                    if *is_int {
                        out.push("itob".to_string());
                    }
                }
                Some(CallTarget::SizeOf { size }) => {
                    out.push(format!("pushint {}", size));
                }
                Some(CallTarget::Error) => out.push("err".to_string()),
                None => return Err(format!("Unresolved call \"{}\"", name)),
            },
        }
        Ok(())
    }

    /// Re-render this expression as surface source text.
    pub fn unparse(&self) -> String {
        match self {
            Expr::IntLit { raw, .. } => raw.clone(),
            Expr::BytesLit { raw, .. } => raw.clone(),
            Expr::HexLit { raw, .. } => raw.clone(),
            Expr::Name { name, .. } => name.clone(),
            Expr::FieldRead {
                base,
                field,
                index,
                ..
            } => match index {
                Some(i) => format!("{}.{}[{}]", base, field, i),
                None => format!("{}.{}", base, field),
            },
            Expr::GroupTxnField { base, index, field } => {
                format!("{}[{}].{}", base, index, field)
            }
            Expr::Group(inner) => format!("({})", inner.unparse()),
            Expr::Not { operand } => format!("!{}", operand.unparse()),
            Expr::Binary { op, lhs, rhs } => {
                format!("{} {} {}", lhs.unparse(), op, rhs.unparse())
            }
            Expr::Call {
                name,
                args,
                type_arg,
                size_arg,
                ..
            } => {
                let mut parts: Vec<String> = args.iter().map(|a| a.unparse()).collect();
                if let Some(t) = type_arg {
                    parts.push(t.clone());
                }
                if let Some(s) = size_arg {
                    parts.push(s.to_string());
                }
                format!("{}({})", name, parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{FuncSig, Scopes};
    use crate::types::{StructType, TypeRegistry};

    fn ctx_fixture() -> (Scopes, TypeRegistry) {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.declare_var(root, "x", Type::Int).unwrap();
        scopes
            .declare_var(root, "data", Type::Bytes(Some(4)))
            .unwrap();

        let mut registry = TypeRegistry::new();
        let mut item = StructType::new("Item");
        item.add_field("asset_id", Type::Int, &registry).unwrap();
        item.add_field("seller", Type::Bytes(Some(32)), &registry)
            .unwrap();
        registry.define_struct(item).unwrap();
        scopes
            .declare_var(root, "item", Type::Struct("Item".to_string()))
            .unwrap();
        scopes
            .declare_func(
                root,
                FuncSig {
                    name: "get_price".to_string(),
                    label: "__func__get_price".to_string(),
                    args: vec![("asset_id".to_string(), Type::Int)],
                    returns: vec![Type::Int],
                    public: false,
                    on_completion: "NoOp".to_string(),
                },
            )
            .unwrap();
        (scopes, registry)
    }

    fn process_and_emit(src: &str) -> (ExprTy, Vec<String>) {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 1,
        };
        let mut e = parse_expression(src).unwrap();
        let ty = e.process(&ctx).unwrap();
        (ty, e.ops().unwrap())
    }

    #[test]
    fn test_int_literal() {
        let (ty, ops) = process_and_emit("5");
        assert_eq!(ty, ExprTy::Single(Type::UInt(1)));
        assert_eq!(ops, vec!["pushint 5"]);
    }

    #[test]
    fn test_int_literal_with_separators() {
        let (_, ops) = process_and_emit("1_000_000");
        assert_eq!(ops, vec!["pushint 1000000"]);
    }

    #[test]
    fn test_bytes_literal() {
        let (ty, ops) = process_and_emit("\"abc\"");
        assert_eq!(ty, ExprTy::Single(Type::Bytes(Some(3))));
        assert_eq!(ops, vec!["pushbytes \"abc\""]);
    }

    #[test]
    fn test_hex_literal() {
        let (ty, ops) = process_and_emit("0x151f7c75");
        assert_eq!(ty, ExprTy::Single(Type::Bytes(Some(4))));
        assert_eq!(ops, vec!["pushbytes 0x151f7c75"]);
    }

    #[test]
    fn test_var_load() {
        let (ty, ops) = process_and_emit("x");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["load 0 // x"]);
    }

    #[test]
    fn test_comparison() {
        let (ty, ops) = process_and_emit("x == 1");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["load 0 // x", "pushint 1", "=="]);
    }

    #[test]
    fn test_left_assoc_chain() {
        let (_, ops) = process_and_emit("1 + 2 + 3");
        assert_eq!(
            ops,
            vec!["pushint 1", "pushint 2", "+", "pushint 3", "+"]
        );
    }

    #[test]
    fn test_grouped_rhs() {
        let (_, ops) = process_and_emit("x * (1 + 2)");
        assert_eq!(
            ops,
            vec!["load 0 // x", "pushint 1", "pushint 2", "+", "*"]
        );
    }

    #[test]
    fn test_math_rejects_bytes() {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 7,
        };
        let mut e = parse_expression("data + 1").unwrap();
        let err = e.process(&ctx).unwrap_err();
        assert!(err.message.contains("Expected int"));
        assert_eq!(err.line_no, Some(7));
    }

    #[test]
    fn test_compare_int_with_bytes_rejected() {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 1,
        };
        let mut e = parse_expression("x == data").unwrap();
        assert!(e.process(&ctx).is_err());
    }

    #[test]
    fn test_struct_field_read() {
        let (ty, ops) = process_and_emit("item.asset_id");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(
            ops,
            vec![
                "load 2 // item",
                "extract 0 8 // .asset_id",
                "btoi"
            ]
        );
    }

    #[test]
    fn test_txn_field_read() {
        let (_, ops) = process_and_emit("Txn.ApplicationArgs[1]");
        assert_eq!(ops, vec!["txna ApplicationArgs 1"]);
        let (_, ops) = process_and_emit("Txn.Sender");
        assert_eq!(ops, vec!["txn Sender"]);
        let (_, ops) = process_and_emit("Global.LatestTimestamp");
        assert_eq!(ops, vec!["global LatestTimestamp"]);
        let (_, ops) = process_and_emit("Gtxn[0].Amount");
        assert_eq!(ops, vec!["gtxn 0 Amount"]);
    }

    #[test]
    fn test_op_call() {
        let (ty, ops) = process_and_emit("btoi(data)");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["load 1 // data", "btoi"]);
    }

    #[test]
    fn test_op_call_arity_error() {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 1,
        };
        let mut e = parse_expression("btoi(data, data)").unwrap();
        let err = e.process(&ctx).unwrap_err();
        assert!(err.message.contains("Incorrect number of arguments"));
    }

    #[test]
    fn test_user_func_call() {
        let (ty, ops) = process_and_emit("get_price(1)");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["pushint 1", "callsub __func__get_price"]);
    }

    #[test]
    fn test_cast() {
        let (ty, ops) = process_and_emit("Cast(btoi(data), uint8)");
        assert_eq!(ty, ExprTy::Single(Type::UInt(1)));
        assert_eq!(ops, vec!["load 1 // data", "btoi"]);
    }

    #[test]
    fn test_cast_rejects_cross_representation() {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 1,
        };
        let mut e = parse_expression("Cast(x, bytes)").unwrap();
        let err = e.process(&ctx).unwrap_err();
        assert!(err.message.contains("Cannot cast"));
    }

    #[test]
    fn test_from_bytes() {
        let (ty, ops) = process_and_emit("FromBytes(Txn.ApplicationArgs[1], int)");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["txna ApplicationArgs 1", "btoi"]);
    }

    #[test]
    fn test_rpad() {
        let (ty, ops) = process_and_emit("Rpad(\"ab\", 4)");
        assert_eq!(ty, ExprTy::Single(Type::Bytes(Some(4))));
        assert_eq!(
            ops,
            vec!["pushbytes \"ab\"", "pushbytes 0x0000", "concat"]
        );
    }

    #[test]
    fn test_sizeof() {
        let (ty, ops) = process_and_emit("SizeOf(Item)");
        assert_eq!(ty, ExprTy::Single(Type::Int));
        assert_eq!(ops, vec!["pushint 40"]);
    }

    #[test]
    fn test_avm_constant() {
        let (_, ops) = process_and_emit("NoOp");
        assert_eq!(ops, vec!["pushint 0 // NoOp"]);
    }

    #[test]
    fn test_unknown_name() {
        let (scopes, registry) = ctx_fixture();
        let ctx = ExprCtx {
            scope: scopes.root(),
            scopes: &scopes,
            registry: &registry,
            line_no: 3,
        };
        let mut e = parse_expression("missing").unwrap();
        let err = e.process(&ctx).unwrap_err();
        assert_eq!(err.message, "Unknown name \"missing\"");
    }

    #[test]
    fn test_unparse_round_trip() {
        for src in [
            "x == 1",
            "item.asset_id",
            "Txn.ApplicationArgs[1]",
            "Gtxn[0].Amount",
            "get_price(1)",
            "Cast(btoi(data), uint8)",
            "Rpad(\"ab\", 4)",
            "!x",
            "(x + 1) * 2",
            "sha256(\"abc\")",
        ] {
            let e = parse_expression(src).unwrap();
            assert_eq!(e.unparse(), src);
            let e2 = parse_expression(&e.unparse()).unwrap();
            assert_eq!(e, e2);
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(x").is_err());
        assert!(parse_expression("\"unterminated").is_err());
        assert!(parse_expression("0x123").is_err());
    }
}
