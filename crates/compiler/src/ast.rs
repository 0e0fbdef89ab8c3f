//! Abstract syntax tree for Tealish
//!
//! One variant per surface construct. Nodes are created by the build pass,
//! mutated only by the process pass (which fills the `Option` fields with
//! resolved slots, labels and types), and read by code generation.
//!
//! Every node can re-render itself as surface source via `unparse`, which
//! is the basis of the pretty-printer and the round-trip tests.

use crate::expr::Expr;
use crate::scope::{ScopeId, Var};
use crate::types::Type;

/// How a box declaration binds to its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxMethod {
    /// `Box(key)` - assume the box exists
    Plain,
    /// `OpenBox(key)` - assert the box exists with the struct's size
    Open,
    /// `CreateBox(key)` - create and assert it did not exist
    Create,
    /// `OpenOrCreateBox(key)` - create if missing, never assert
    OpenOrCreate,
}

impl BoxMethod {
    pub fn prefix(&self) -> &'static str {
        match self {
            BoxMethod::Plain => "",
            BoxMethod::Open => "Open",
            BoxMethod::Create => "Create",
            BoxMethod::OpenOrCreate => "OpenOrCreate",
        }
    }
}

/// One destination of a (possibly multi-value) assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// `_` - value is popped
    Discard,
    Slot { name: String, slot: usize },
}

/// Resolved struct/box field assignment destination.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssign {
    pub slot: usize,
    pub offset: usize,
    pub size: usize,
    pub ty: Type,
    pub is_box: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Elif {
    pub line: String,
    pub line_no: usize,
    pub not: bool,
    pub condition: Expr,
    pub label: String,
    /// Start label of the following branch; filled during process
    pub next_label: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseClause {
    pub line_no: usize,
    pub label: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub line: String,
    pub line_no: usize,
    pub not: bool,
    pub condition: Expr,
    pub conditional_index: usize,
    pub end_label: String,
    /// Start label of the first elif/else branch, or the end label
    pub next_label: String,
    pub then_body: Vec<Statement>,
    pub elifs: Vec<Elif>,
    pub else_: Option<ElseClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub line: String,
    pub line_no: usize,
    pub not: bool,
    pub condition: Expr,
    pub conditional_index: usize,
    pub start_label: String,
    pub end_label: String,
    pub scope: ScopeId,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub line: String,
    pub line_no: usize,
    pub var_name: String,
    pub start: Expr,
    pub end: Expr,
    pub conditional_index: usize,
    pub start_label: String,
    pub end_label: String,
    pub scope: ScopeId,
    pub body: Vec<Statement>,
    pub var: Option<Var>,
}

/// `for _ in a:b:` - counts on the stack instead of a scratch slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ForUnnamedStatement {
    pub line: String,
    pub line_no: usize,
    pub start: Expr,
    pub end: Expr,
    pub conditional_index: usize,
    pub start_label: String,
    pub end_label: String,
    pub scope: ScopeId,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchOption {
    pub line: String,
    pub line_no: usize,
    pub expression: Expr,
    pub block_name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchElse {
    pub line: String,
    pub line_no: usize,
    pub block_name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    pub line: String,
    pub line_no: usize,
    pub expression: Expr,
    pub options: Vec<SwitchOption>,
    pub else_: Option<SwitchElse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub line: String,
    pub line_no: usize,
    pub name: String,
    pub label: String,
    pub scope: ScopeId,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub line: String,
    pub line_no: usize,
    pub name: String,
    pub params: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncNode {
    pub line: String,
    pub line_no: usize,
    pub name: String,
    pub label: String,
    pub scope: ScopeId,
    /// (arg name, surface type name) in declaration order
    pub args: Vec<(String, String)>,
    pub arg_types: Vec<Type>,
    pub returns: Vec<Type>,
    pub decorators: Vec<Decorator>,
    pub public: bool,
    pub on_completion: String,
    /// Parameter vars in slot-store order (reverse of declaration);
    /// filled during process
    pub param_vars: Vec<Var>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteNode {
    pub line: String,
    pub line_no: usize,
    pub name: String,
    pub label: String,
    /// Argument demarshalling expressions, built during process
    pub arg_exprs: Vec<Expr>,
    pub func_label: Option<String>,
    pub func_returns: Vec<Type>,
    pub on_completion: String,
    /// Integer OnCompletion value; `None` for CreateApplication
    pub oc_value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterNode {
    pub line: String,
    pub line_no: usize,
    pub routes: Vec<RouteNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerTxnField {
    pub line: String,
    pub line_no: usize,
    pub field_name: String,
    pub index: Option<u64>,
    pub expression: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerTxnNode {
    pub line: String,
    pub line_no: usize,
    pub fields: Vec<InnerTxnField>,
    pub in_group: bool,
    pub group_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerGroupNode {
    pub line: String,
    pub line_no: usize,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructFieldDef {
    pub line: String,
    pub line_no: usize,
    pub field_name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDefNode {
    pub line: String,
    pub line_no: usize,
    pub name: String,
    pub fields: Vec<StructFieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    TealVersion {
        line: String,
        line_no: usize,
        version: u64,
    },
    Comment {
        line: String,
        line_no: usize,
    },
    Blank {
        line_no: usize,
    },
    Const {
        line: String,
        line_no: usize,
        type_name: String,
        name: String,
        literal: Expr,
    },
    Jump {
        line: String,
        line_no: usize,
        block_name: String,
        label: Option<String>,
    },
    Exit {
        line: String,
        line_no: usize,
        expression: Expr,
    },
    Assert {
        line: String,
        line_no: usize,
        arg: Expr,
        message: Option<String>,
    },
    VarDeclaration {
        line: String,
        line_no: usize,
        type_name: String,
        name: String,
        expression: Option<Expr>,
        var: Option<Var>,
    },
    BoxDeclaration {
        line: String,
        line_no: usize,
        struct_name: String,
        name: String,
        method: BoxMethod,
        key: Expr,
        var: Option<Var>,
        box_size: Option<usize>,
    },
    Assignment {
        line: String,
        line_no: usize,
        names: Vec<String>,
        expression: Expr,
        targets: Vec<AssignTarget>,
    },
    StructOrBoxAssignment {
        line: String,
        line_no: usize,
        name: String,
        field_name: String,
        expression: Expr,
        resolved: Option<FieldAssign>,
    },
    FunctionCallStatement {
        line: String,
        line_no: usize,
        expression: Expr,
    },
    Break {
        line: String,
        line_no: usize,
        end_label: String,
    },
    Return {
        line: String,
        line_no: usize,
        expressions: Vec<Expr>,
        expected: Vec<Type>,
    },
    Teal {
        line: String,
        line_no: usize,
        lines: Vec<String>,
    },
    If(IfStatement),
    While(WhileStatement),
    For(ForStatement),
    ForUnnamed(ForUnnamedStatement),
    Switch(SwitchStatement),
    Block(BlockNode),
    Func(FuncNode),
    InnerTxn(InnerTxnNode),
    InnerGroup(InnerGroupNode),
    Router(RouterNode),
    StructDef(StructDefNode),
}

impl Statement {
    pub fn line_no(&self) -> usize {
        match self {
            Statement::TealVersion { line_no, .. }
            | Statement::Comment { line_no, .. }
            | Statement::Blank { line_no }
            | Statement::Const { line_no, .. }
            | Statement::Jump { line_no, .. }
            | Statement::Exit { line_no, .. }
            | Statement::Assert { line_no, .. }
            | Statement::VarDeclaration { line_no, .. }
            | Statement::BoxDeclaration { line_no, .. }
            | Statement::Assignment { line_no, .. }
            | Statement::StructOrBoxAssignment { line_no, .. }
            | Statement::FunctionCallStatement { line_no, .. }
            | Statement::Break { line_no, .. }
            | Statement::Return { line_no, .. }
            | Statement::Teal { line_no, .. } => *line_no,
            Statement::If(n) => n.line_no,
            Statement::While(n) => n.line_no,
            Statement::For(n) => n.line_no,
            Statement::ForUnnamed(n) => n.line_no,
            Statement::Switch(n) => n.line_no,
            Statement::Block(n) => n.line_no,
            Statement::Func(n) => n.line_no,
            Statement::InnerTxn(n) => n.line_no,
            Statement::InnerGroup(n) => n.line_no,
            Statement::Router(n) => n.line_no,
            Statement::StructDef(n) => n.line_no,
        }
    }

    /// Exit statements unconditionally leave the current block: `exit`,
    /// `switch`, `jump` and `router`.
    pub fn is_exit_statement(&self) -> bool {
        matches!(
            self,
            Statement::Exit { .. }
                | Statement::Switch(_)
                | Statement::Jump { .. }
                | Statement::Router(_)
        )
    }

    /// Keyword used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::TealVersion { .. } => "#pragma",
            Statement::Comment { .. } => "comment",
            Statement::Blank { .. } => "blank",
            Statement::Const { .. } => "const",
            Statement::Jump { .. } => "jump",
            Statement::Exit { .. } => "exit",
            Statement::Assert { .. } => "assert",
            Statement::VarDeclaration { .. } => "declaration",
            Statement::BoxDeclaration { .. } => "box declaration",
            Statement::Assignment { .. } => "assignment",
            Statement::StructOrBoxAssignment { .. } => "field assignment",
            Statement::FunctionCallStatement { .. } => "call",
            Statement::Break { .. } => "break",
            Statement::Return { .. } => "return",
            Statement::Teal { .. } => "teal",
            Statement::If(_) => "if",
            Statement::While(_) => "while",
            Statement::For(_) | Statement::ForUnnamed(_) => "for",
            Statement::Switch(_) => "switch",
            Statement::Block(_) => "Block",
            Statement::Func(_) => "Func",
            Statement::InnerTxn(_) => "inner_txn",
            Statement::InnerGroup(_) => "inner_group",
            Statement::Router(_) => "router",
            Statement::StructDef(_) => "Struct",
        }
    }

    fn body_contains_inner_group(body: &[Statement]) -> bool {
        body.iter().any(Statement::contains_inner_group)
    }

    pub fn contains_inner_group(&self) -> bool {
        match self {
            Statement::InnerGroup(_) => true,
            Statement::If(n) => {
                Self::body_contains_inner_group(&n.then_body)
                    || n.elifs
                        .iter()
                        .any(|e| Self::body_contains_inner_group(&e.body))
                    || n.else_
                        .as_ref()
                        .is_some_and(|e| Self::body_contains_inner_group(&e.body))
            }
            Statement::While(n) => Self::body_contains_inner_group(&n.body),
            Statement::For(n) => Self::body_contains_inner_group(&n.body),
            Statement::ForUnnamed(n) => Self::body_contains_inner_group(&n.body),
            Statement::Block(n) => Self::body_contains_inner_group(&n.body),
            Statement::Func(n) => Self::body_contains_inner_group(&n.body),
            _ => false,
        }
    }

    pub fn unparse(&self) -> String {
        match self {
            Statement::TealVersion { version, .. } => {
                format!("#pragma version {}\n", version)
            }
            Statement::Comment { line, .. } => format!("{}\n", line),
            Statement::Blank { .. } => "\n".to_string(),
            Statement::Const {
                type_name,
                name,
                literal,
                ..
            } => format!("const {} {} = {}\n", type_name, name, literal.unparse()),
            Statement::Jump { block_name, .. } => format!("jump {}\n", block_name),
            Statement::Exit { expression, .. } => format!("exit({})\n", expression.unparse()),
            Statement::Assert { arg, message, .. } => match message {
                Some(m) => format!("assert({}, \"{}\")\n", arg.unparse(), m),
                None => format!("assert({})\n", arg.unparse()),
            },
            Statement::VarDeclaration {
                type_name,
                name,
                expression,
                ..
            } => match expression {
                Some(e) => format!("{} {} = {}\n", type_name, name, e.unparse()),
                None => format!("{} {}\n", type_name, name),
            },
            Statement::BoxDeclaration {
                struct_name,
                name,
                method,
                key,
                ..
            } => format!(
                "box<{}> {} = {}Box({})\n",
                struct_name,
                name,
                method.prefix(),
                key.unparse()
            ),
            Statement::Assignment {
                names, expression, ..
            } => format!("{} = {}\n", names.join(", "), expression.unparse()),
            Statement::StructOrBoxAssignment {
                name,
                field_name,
                expression,
                ..
            } => format!("{}.{} = {}\n", name, field_name, expression.unparse()),
            Statement::FunctionCallStatement { expression, .. } => {
                format!("{}\n", expression.unparse())
            }
            Statement::Break { .. } => "break\n".to_string(),
            Statement::Return { expressions, .. } => {
                if expressions.is_empty() {
                    "return\n".to_string()
                } else {
                    let args: Vec<String> = expressions.iter().map(|e| e.unparse()).collect();
                    format!("return {}\n", args.join(", "))
                }
            }
            Statement::Teal { lines, .. } => {
                let mut out = "teal:\n".to_string();
                for l in lines {
                    out.push_str(&indent(&format!("{}\n", l)));
                }
                out.push_str("end\n");
                out
            }
            Statement::If(n) => n.unparse(),
            Statement::While(n) => n.unparse(),
            Statement::For(n) => n.unparse(),
            Statement::ForUnnamed(n) => n.unparse(),
            Statement::Switch(n) => n.unparse(),
            Statement::Block(n) => n.unparse(),
            Statement::Func(n) => n.unparse(),
            Statement::InnerTxn(n) => n.unparse(),
            Statement::InnerGroup(n) => n.unparse(),
            Statement::Router(n) => n.unparse(),
            Statement::StructDef(n) => n.unparse(),
        }
    }
}

fn unparse_body(body: &[Statement]) -> String {
    let mut out = String::new();
    for n in body {
        out.push_str(&indent(&n.unparse()));
    }
    out
}

fn modifier(not: bool) -> &'static str {
    if not {
        "not "
    } else {
        ""
    }
}

impl IfStatement {
    fn unparse(&self) -> String {
        let mut out = format!("if {}{}:\n", modifier(self.not), self.condition.unparse());
        out.push_str(&unparse_body(&self.then_body));
        for e in &self.elifs {
            out.push_str(&format!(
                "elif {}{}:\n",
                modifier(e.not),
                e.condition.unparse()
            ));
            out.push_str(&unparse_body(&e.body));
        }
        if let Some(e) = &self.else_ {
            out.push_str("else:\n");
            out.push_str(&unparse_body(&e.body));
        }
        out.push_str("end\n");
        out
    }
}

impl WhileStatement {
    fn unparse(&self) -> String {
        let mut out = format!(
            "while {}{}:\n",
            modifier(self.not),
            self.condition.unparse()
        );
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl ForStatement {
    fn unparse(&self) -> String {
        let mut out = format!(
            "for {} in {}:{}:\n",
            self.var_name,
            self.start.unparse(),
            self.end.unparse()
        );
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl ForUnnamedStatement {
    fn unparse(&self) -> String {
        let mut out = format!(
            "for _ in {}:{}:\n",
            self.start.unparse(),
            self.end.unparse()
        );
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl SwitchStatement {
    fn unparse(&self) -> String {
        let mut out = format!("switch {}:\n", self.expression.unparse());
        for option in &self.options {
            out.push_str(&indent(&format!(
                "{}: {}\n",
                option.expression.unparse(),
                option.block_name
            )));
        }
        if let Some(e) = &self.else_ {
            out.push_str(&indent(&format!("else: {}\n", e.block_name)));
        }
        out.push_str("end\n");
        out
    }
}

impl BlockNode {
    fn unparse(&self) -> String {
        let mut out = format!("block {}:\n", self.name);
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl FuncNode {
    fn unparse(&self) -> String {
        let mut out = String::new();
        for d in &self.decorators {
            out.push_str(&format!("@{}({})\n", d.name, d.params));
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(n, t)| format!("{}: {}", n, t))
            .collect();
        let returns = if self.returns.is_empty() {
            String::new()
        } else {
            let names: Vec<String> = self.returns.iter().map(|t| t.to_string()).collect();
            format!(" {}", names.join(", "))
        };
        out.push_str(&format!(
            "func {}({}){}:\n",
            self.name,
            args.join(", "),
            returns
        ));
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl InnerTxnNode {
    fn unparse(&self) -> String {
        let mut out = "inner_txn:\n".to_string();
        for f in &self.fields {
            let idx = match f.index {
                Some(i) => format!("[{}]", i),
                None => String::new(),
            };
            out.push_str(&indent(&format!(
                "{}{}: {}\n",
                f.field_name,
                idx,
                f.expression.unparse()
            )));
        }
        out.push_str("end\n");
        out
    }
}

impl InnerGroupNode {
    fn unparse(&self) -> String {
        let mut out = "inner_group:\n".to_string();
        out.push_str(&unparse_body(&self.body));
        out.push_str("end\n");
        out
    }
}

impl RouterNode {
    fn unparse(&self) -> String {
        let mut out = "router:\n".to_string();
        for r in &self.routes {
            out.push_str(&indent(&format!("{}\n", r.name)));
        }
        out.push_str("end\n");
        out
    }
}

impl StructDefNode {
    fn unparse(&self) -> String {
        let mut out = format!("struct {}:\n", self.name);
        for f in &self.fields {
            out.push_str(&indent(&format!("{}: {}\n", f.field_name, f.type_name)));
        }
        out.push_str("end\n");
        out
    }
}

/// The root of the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub scope: ScopeId,
    pub body: Vec<Statement>,
}

impl Program {
    pub fn has_inner_group(&self) -> bool {
        self.body.iter().any(Statement::contains_inner_group)
    }

    /// Re-render the whole program as surface source.
    pub fn unparse(&self) -> String {
        let mut out = String::new();
        for n in &self.body {
            out.push_str(&n.unparse());
        }
        out
    }
}

/// Indent every non-blank line by four spaces.
fn indent(s: &str) -> String {
    let mut out = String::new();
    for line in s.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(line);
        } else {
            out.push_str("    ");
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb\n"), "    a\n\n    b\n");
    }

    #[test]
    fn test_unparse_var_declaration() {
        let stmt = Statement::VarDeclaration {
            line: "int x = 5".to_string(),
            line_no: 2,
            type_name: "int".to_string(),
            name: "x".to_string(),
            expression: Some(parse_expression("5").unwrap()),
            var: None,
        };
        assert_eq!(stmt.unparse(), "int x = 5\n");
    }

    #[test]
    fn test_unparse_if() {
        let stmt = Statement::If(IfStatement {
            line: "if x == 1:".to_string(),
            line_no: 2,
            not: false,
            condition: parse_expression("x == 1").unwrap(),
            conditional_index: 0,
            end_label: "l0_end".to_string(),
            next_label: String::new(),
            then_body: vec![Statement::Exit {
                line: "exit(1)".to_string(),
                line_no: 3,
                expression: parse_expression("1").unwrap(),
            }],
            elifs: vec![],
            else_: None,
        });
        assert_eq!(stmt.unparse(), "if x == 1:\n    exit(1)\nend\n");
    }

    #[test]
    fn test_is_exit_statement() {
        let exit = Statement::Exit {
            line: "exit(1)".to_string(),
            line_no: 1,
            expression: parse_expression("1").unwrap(),
        };
        assert!(exit.is_exit_statement());
        let brk = Statement::Break {
            line: "break".to_string(),
            line_no: 1,
            end_label: "l0_end".to_string(),
        };
        assert!(!brk.is_exit_statement());
    }

    #[test]
    fn test_contains_inner_group_nested() {
        let group = Statement::InnerGroup(InnerGroupNode {
            line: "inner_group:".to_string(),
            line_no: 3,
            body: vec![],
        });
        let wrapped = Statement::If(IfStatement {
            line: "if x:".to_string(),
            line_no: 2,
            not: false,
            condition: parse_expression("x").unwrap(),
            conditional_index: 0,
            end_label: "l0_end".to_string(),
            next_label: String::new(),
            then_body: vec![group],
            elifs: vec![],
            else_: None,
        });
        assert!(wrapped.contains_inner_group());
    }
}
