//! Line-oriented parser for Tealish
//!
//! The build pass: a recursive-descent constructor over source lines.
//! Statement kinds are recognized by testing the first keyword of the
//! current line in a fixed priority order; everything else is a line
//! statement matched by regular expressions. Compound statements consume
//! their own opening line and their children until a terminator (`end`,
//! `elif`, `else:`) they recognize at their level.
//!
//! Structural rules are enforced here: the version pragma on line 1,
//! struct definitions at the top of the file, block/function placement
//! relative to exit statements, `break` inside `while`, `return` inside
//! `func`, and a `return` as the last statement of every function body.

use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{
    BlockNode, BoxMethod, Decorator, Elif, ElseClause, ForStatement, ForUnnamedStatement,
    FuncNode, IfStatement, InnerGroupNode, InnerTxnField, InnerTxnNode, Program, RouteNode,
    RouterNode, Statement, StructDefNode, StructFieldDef, SwitchElse, SwitchOption,
    SwitchStatement, WhileStatement,
};
use crate::errors::ParseError;
use crate::expr::{parse_expression, Expr};
use crate::scope::{FuncSig, ScopeId, Scopes};
use crate::types::{StructType, Type, TypeRegistry};

fn re(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("pattern compiles"))
}

static RE_VERSION: OnceLock<Regex> = OnceLock::new();
static RE_CONST: OnceLock<Regex> = OnceLock::new();
static RE_JUMP: OnceLock<Regex> = OnceLock::new();
static RE_RETURN: OnceLock<Regex> = OnceLock::new();
static RE_VAR_DECL_DETECT: OnceLock<Regex> = OnceLock::new();
static RE_VAR_DECL: OnceLock<Regex> = OnceLock::new();
static RE_BOX_DECL: OnceLock<Regex> = OnceLock::new();
static RE_FIELD_ASSIGN_DETECT: OnceLock<Regex> = OnceLock::new();
static RE_FIELD_ASSIGN: OnceLock<Regex> = OnceLock::new();
static RE_ASSIGN: OnceLock<Regex> = OnceLock::new();
static RE_EXIT: OnceLock<Regex> = OnceLock::new();
static RE_ASSERT: OnceLock<Regex> = OnceLock::new();
static RE_CALL_STMT: OnceLock<Regex> = OnceLock::new();
static RE_IF: OnceLock<Regex> = OnceLock::new();
static RE_ELIF: OnceLock<Regex> = OnceLock::new();
static RE_WHILE: OnceLock<Regex> = OnceLock::new();
static RE_FOR: OnceLock<Regex> = OnceLock::new();
static RE_FOR_UNNAMED: OnceLock<Regex> = OnceLock::new();
static RE_BLOCK: OnceLock<Regex> = OnceLock::new();
static RE_SWITCH: OnceLock<Regex> = OnceLock::new();
static RE_SWITCH_OPTION: OnceLock<Regex> = OnceLock::new();
static RE_SWITCH_ELSE: OnceLock<Regex> = OnceLock::new();
static RE_FUNC: OnceLock<Regex> = OnceLock::new();
static RE_FUNC_ARG: OnceLock<Regex> = OnceLock::new();
static RE_DECORATOR: OnceLock<Regex> = OnceLock::new();
static RE_DECORATOR_KV: OnceLock<Regex> = OnceLock::new();
static RE_ITXN_FIELD: OnceLock<Regex> = OnceLock::new();
static RE_STRUCT: OnceLock<Regex> = OnceLock::new();
static RE_STRUCT_FIELD: OnceLock<Regex> = OnceLock::new();

/// Build-pass outputs consumed by the later passes.
#[derive(Debug)]
pub struct ParseArtifacts {
    pub registry: TypeRegistry,
    pub scopes: Scopes,
    pub conditional_count: usize,
}

/// Statement context: which child statements are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    /// Program top level: everything including struct definitions
    Program,
    /// Block (or inner group) body: everything except struct definitions
    Block,
    /// if/while/for/func bodies: no nested blocks or struct definitions
    Inline,
}

struct FuncCtx {
    returns: Vec<Type>,
}

pub struct Parser {
    lines: Vec<String>,
    pos: usize,
    registry: TypeRegistry,
    scopes: Scopes,
    conditional_count: usize,
    func_stack: Vec<FuncCtx>,
    while_stack: Vec<String>,
    group_stack: Vec<usize>,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            lines: source.lines().map(|l| l.trim().to_string()).collect(),
            pos: 0,
            registry: TypeRegistry::new(),
            scopes: Scopes::new(),
            conditional_count: 0,
            func_stack: Vec::new(),
            while_stack: Vec::new(),
            group_stack: Vec::new(),
        }
    }

    /// Run the build pass over the whole source.
    pub fn parse(mut self) -> Result<(Program, ParseArtifacts), ParseError> {
        let scope = self.scopes.root();
        let mut body = Vec::new();
        let mut expect_struct = true;
        let mut exit_statement: Option<&'static str> = None;

        while self.peek().is_some() {
            let n = self.consume_statement(scope, Ctx::Program)?;
            if !expect_struct && matches!(n, Statement::StructDef(_)) {
                return Err(ParseError::new(
                    format!(
                        "Unexpected struct definition at line {}. Struct definitions \
                         should be at the top of the file and only be preceded by comments.",
                        n.line_no()
                    ),
                    Some(n.line_no()),
                ));
            }
            if !matches!(
                n,
                Statement::TealVersion { .. }
                    | Statement::Blank { .. }
                    | Statement::Comment { .. }
                    | Statement::StructDef(_)
            ) {
                expect_struct = false;
            }
            if let Some(exit_kind) = exit_statement {
                if !matches!(
                    n,
                    Statement::Func(_)
                        | Statement::Block(_)
                        | Statement::Comment { .. }
                        | Statement::Blank { .. }
                ) {
                    return Err(ParseError::new(
                        format!(
                            "Unexpected statement at line {}. Only block and function \
                             definitions may appear after a {}.",
                            n.line_no(),
                            exit_kind
                        ),
                        Some(n.line_no()),
                    ));
                }
            } else if matches!(n, Statement::Func(_) | Statement::Block(_)) {
                return Err(ParseError::new(
                    format!(
                        "Unexpected {} definition at line {}. Block and function \
                         definitions must occur after an exit statement \
                         (e.g. exit, switch, jump, router).",
                        n.kind_name(),
                        n.line_no()
                    ),
                    Some(n.line_no()),
                ));
            }
            if n.is_exit_statement() {
                exit_statement = Some(n.kind_name());
            }
            body.push(n);
        }

        let program = Program { scope, body };
        let artifacts = ParseArtifacts {
            registry: self.registry,
            scopes: self.scopes,
            conditional_count: self.conditional_count,
        };
        Ok((program, artifacts))
    }

    fn peek(&self) -> Option<&str> {
        self.lines.get(self.pos).map(|s| s.as_str())
    }

    fn consume_line(&mut self) -> Result<(String, usize), ParseError> {
        match self.lines.get(self.pos) {
            Some(line) => {
                self.pos += 1;
                Ok((line.clone(), self.pos))
            }
            None => Err(self.err("Unexpected end of file")),
        }
    }

    /// Line number of the most recently consumed line.
    fn line_no(&self) -> usize {
        self.pos
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, Some(self.pos))
    }

    fn parse_expr(&self, text: &str, line_no: usize) -> Result<Expr, ParseError> {
        parse_expression(text).map_err(|e| ParseError::new(e, Some(line_no)))
    }

    fn consume_statement(&mut self, scope: ScopeId, ctx: Ctx) -> Result<Statement, ParseError> {
        let line = match self.peek() {
            Some(l) => l,
            None => return Err(self.err("Unexpected end of file")),
        };
        if line.starts_with("block ") {
            if ctx == Ctx::Inline {
                return Err(self.err(format!(
                    "Unexpected block at line {}",
                    self.line_no() + 1
                )));
            }
            self.consume_block(scope)
        } else if line.starts_with("switch ") {
            self.consume_switch(scope)
        } else if line.starts_with("func ") {
            self.consume_func(scope, Vec::new())
        } else if line.starts_with('@') {
            self.consume_decorated_func(scope)
        } else if line.starts_with("if ") {
            self.consume_if(scope)
        } else if line.starts_with("while ") {
            self.consume_while(scope)
        } else if line.starts_with("for _") {
            self.consume_for_unnamed(scope)
        } else if line.starts_with("for ") {
            self.consume_for(scope)
        } else if line.starts_with("teal:") {
            self.consume_teal()
        } else if line.starts_with("inner_group:") {
            self.consume_inner_group(scope)
        } else if line.starts_with("inner_txn:") {
            self.consume_inner_txn()
        } else if line.starts_with("struct ") {
            if ctx != Ctx::Program {
                return Err(self.err(format!(
                    "Unexpected struct definition at line {}. Struct definitions \
                     should be at the top of the file and only be preceded by comments.",
                    self.line_no() + 1
                )));
            }
            self.consume_struct_def()
        } else if line.starts_with("router:") {
            self.consume_router()
        } else {
            self.consume_line_statement(scope)
        }
    }

    // =====================================================================
    // Line statements
    // =====================================================================

    fn consume_line_statement(&mut self, _scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;

        if line.starts_with("#pragma") {
            if line_no != 1 {
                return Err(self.err(format!(
                    "Teal version must be specified in the first line of the \
                     program: \"{}\" at {}.",
                    line, line_no
                )));
            }
            let caps = re(&RE_VERSION, r"^#pragma version (?P<version>\d+)$")
                .captures(&line)
                .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as #pragma", line)))?;
            let version = caps["version"]
                .parse()
                .map_err(|_| self.err(format!("Invalid version in \"{}\"", line)))?;
            return Ok(Statement::TealVersion {
                line,
                line_no,
                version,
            });
        }
        if line.starts_with('#') {
            return Ok(Statement::Comment { line, line_no });
        }
        if line.is_empty() {
            return Ok(Statement::Blank { line_no });
        }
        if line.starts_with("const ") {
            let caps = re(
                &RE_CONST,
                r"^const (?P<type_name>\bint\b|\bbytes\b|\bbigint|addr\b) (?P<name>[A-Z][a-zA-Z0-9_]*) = (?P<literal>.*)$",
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as const", line)))?;
            let literal_text = caps["literal"].to_string();
            let literal = self.parse_expr(&literal_text, line_no)?;
            if !matches!(
                literal,
                Expr::IntLit { .. } | Expr::BytesLit { .. } | Expr::HexLit { .. }
            ) {
                return Err(self.err(format!("Cannot parse \"{}\" as Literal", literal_text)));
            }
            return Ok(Statement::Const {
                type_name: caps["type_name"].to_string(),
                name: caps["name"].to_string(),
                literal,
                line,
                line_no,
            });
        }
        if line.starts_with("jump ") {
            let caps = re(&RE_JUMP, r"^jump (?P<block_name>.*)$")
                .captures(&line)
                .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as jump", line)))?;
            return Ok(Statement::Jump {
                block_name: caps["block_name"].to_string(),
                label: None,
                line,
                line_no,
            });
        }
        if line.starts_with("return") {
            return self.consume_return(line, line_no);
        }
        if line.starts_with("break") {
            let end_label = match self.while_stack.last() {
                Some(label) => label.clone(),
                None => {
                    return Err(self.err(format!(
                        "\"break\" should only be used in a while loop! Line {}",
                        line_no
                    )))
                }
            };
            return Ok(Statement::Break {
                line,
                line_no,
                end_label,
            });
        }
        if re(
            &RE_VAR_DECL_DETECT,
            r"^[A-Za-z][a-zA-Z_0-9]*(\[[0-9]+\])? [a-zA-Z_0-9]+( = .*)?$",
        )
        .is_match(&line)
        {
            let caps = re(
                &RE_VAR_DECL,
                r"^(?P<type_name>[A-Za-z][A-Za-z0-9_]*(\[[0-9]+\])?) (?P<name>[a-z][a-zA-Z0-9_]*)( = (?P<expression>.*))?$",
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as declaration", line)))?;
            let expression = match caps.name("expression") {
                Some(m) => Some(self.parse_expr(m.as_str(), line_no)?),
                None => None,
            };
            return Ok(Statement::VarDeclaration {
                type_name: caps["type_name"].to_string(),
                name: caps["name"].to_string(),
                expression,
                var: None,
                line,
                line_no,
            });
        }
        if line.starts_with("box<") {
            let caps = re(
                &RE_BOX_DECL,
                r"^box<(?P<struct_name>[A-Z][a-zA-Z0-9_]*)> (?P<name>[a-z][a-zA-Z0-9_]*) = (?P<method>OpenOrCreate|Open|Create)?Box\((?P<key>.*)\)$",
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as box declaration", line)))?;
            let method = match caps.name("method").map(|m| m.as_str()) {
                Some("Open") => BoxMethod::Open,
                Some("Create") => BoxMethod::Create,
                Some("OpenOrCreate") => BoxMethod::OpenOrCreate,
                _ => BoxMethod::Plain,
            };
            let key = self.parse_expr(&caps["key"], line_no)?;
            return Ok(Statement::BoxDeclaration {
                struct_name: caps["struct_name"].to_string(),
                name: caps["name"].to_string(),
                method,
                key,
                var: None,
                box_size: None,
                line,
                line_no,
            });
        }
        if re(
            &RE_FIELD_ASSIGN_DETECT,
            r"^[a-z][a-zA-Z_0-9]*\.[a-z][a-zA-Z_0-9]* = .*$",
        )
        .is_match(&line)
        {
            let caps = re(
                &RE_FIELD_ASSIGN,
                r"^(?P<name>[a-z][a-zA-Z0-9_]*)\.(?P<field_name>[a-z][a-zA-Z0-9_]*) = (?P<expression>.*)$",
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as field assignment", line)))?;
            let expression = self.parse_expr(&caps["expression"], line_no)?;
            return Ok(Statement::StructOrBoxAssignment {
                name: caps["name"].to_string(),
                field_name: caps["field_name"].to_string(),
                expression,
                resolved: None,
                line,
                line_no,
            });
        }
        if line.contains(" = ") {
            let caps = re(
                &RE_ASSIGN,
                r"^(?P<names>([a-z_][a-zA-Z0-9_]*,?\s*)+) = (?P<expression>.*)$",
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as assignment", line)))?;
            let names: Vec<String> = caps["names"]
                .split(',')
                .map(|s| s.trim().to_string())
                .collect();
            let expression = self.parse_expr(&caps["expression"], line_no)?;
            return Ok(Statement::Assignment {
                names,
                expression,
                targets: Vec::new(),
                line,
                line_no,
            });
        }
        if line.starts_with("exit(") {
            let caps = re(&RE_EXIT, r"^exit\((?P<expression>.*)\)$")
                .captures(&line)
                .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as exit", line)))?;
            let expression = self.parse_expr(&caps["expression"], line_no)?;
            return Ok(Statement::Exit {
                expression,
                line,
                line_no,
            });
        }
        if line.starts_with("assert(") {
            let caps = re(
                &RE_ASSERT,
                r#"^assert\((?P<arg>.*?)(, "(?P<message>.*?)")?\)$"#,
            )
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as assert", line)))?;
            let arg = self.parse_expr(&caps["arg"], line_no)?;
            let message = caps.name("message").map(|m| m.as_str().to_string());
            return Ok(Statement::Assert {
                arg,
                message,
                line,
                line_no,
            });
        }
        if re(&RE_CALL_STMT, r"^[a-zA-Z_0-9]+\(.*\)$").is_match(&line) {
            let expression = self.parse_expr(&line, line_no)?;
            return Ok(Statement::FunctionCallStatement {
                expression,
                line,
                line_no,
            });
        }
        Err(self.err(format!(
            "Unexpected line statement: \"{}\" at {}.",
            line, line_no
        )))
    }

    fn consume_return(&mut self, line: String, line_no: usize) -> Result<Statement, ParseError> {
        let caps = re(&RE_RETURN, r"^return ?(?P<args>.*?)?$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as return", line)))?;
        let expected = match self.func_stack.last() {
            Some(f) => f.returns.clone(),
            None => {
                return Err(self.err(format!(
                    "\"return\" should only be used in a function! Line {}",
                    line_no
                )))
            }
        };
        let args_text = caps.name("args").map(|m| m.as_str()).unwrap_or("");
        let mut expressions = Vec::new();
        if !args_text.is_empty() {
            for arg in split_return_args(args_text) {
                expressions.push(self.parse_expr(arg.trim(), line_no)?);
            }
        }
        if expressions.len() != expected.len() {
            return Err(self.err(format!("Incorrect number of returns. Line {}", line_no)));
        }
        Ok(Statement::Return {
            line,
            line_no,
            expressions,
            expected,
        })
    }

    // =====================================================================
    // Compound statements
    // =====================================================================

    fn consume_block(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(&RE_BLOCK, r"^block (?P<name>[a-zA-Z_0-9]+):$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as block", line)))?;
        let name = caps["name"].to_string();
        let block_scope = self.scopes.new_scope(scope, &name);
        let label = self.scopes.name(block_scope).to_string();
        self.scopes
            .declare_block(scope, &name, &label)
            .map_err(|e| ParseError::new(e, Some(line_no)))?;

        let mut body = Vec::new();
        let mut exit_statement: Option<&'static str> = None;
        loop {
            match self.peek() {
                None => {
                    return Err(self.err(format!("Unexpected end of file in block \"{}\"", name)))
                }
                Some("end") => {
                    self.consume_line()?;
                    if exit_statement.is_none() {
                        return Err(self.err(format!(
                            "Unexpected end of block at line {}. Blocks must end with \
                             an exit statement (e.g. exit, switch, jump)",
                            self.line_no()
                        )));
                    }
                    break;
                }
                _ => {}
            }
            let n = self.consume_statement(block_scope, Ctx::Block)?;
            if let Some(exit_kind) = exit_statement {
                if !matches!(
                    n,
                    Statement::Func(_)
                        | Statement::Block(_)
                        | Statement::Comment { .. }
                        | Statement::Blank { .. }
                ) {
                    return Err(ParseError::new(
                        format!(
                            "Unexpected statement at line {}. Only block and function \
                             definitions may appear after a {}.",
                            n.line_no(),
                            exit_kind
                        ),
                        Some(n.line_no()),
                    ));
                }
            } else if matches!(n, Statement::Func(_) | Statement::Block(_)) {
                return Err(ParseError::new(
                    format!(
                        "Unexpected {} definition at line {}. Block and function \
                         definitions must occur after an exit statement \
                         (e.g. exit, switch, jump).",
                        n.kind_name(),
                        n.line_no()
                    ),
                    Some(n.line_no()),
                ));
            }
            if n.is_exit_statement() {
                exit_statement = Some(n.kind_name());
            }
            body.push(n);
        }
        Ok(Statement::Block(BlockNode {
            line,
            line_no,
            name,
            label,
            scope: block_scope,
            body,
        }))
    }

    fn consume_if(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(&RE_IF, r"^if ((?P<modifier>not) )?(?P<condition>.*):$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as if", line)))?;
        let not = caps.name("modifier").is_some();
        let condition = self.parse_expr(&caps["condition"], line_no)?;
        let conditional_index = self.next_conditional_index();
        let end_label = format!("l{}_end", conditional_index);

        let then_body = self.consume_branch_body(scope)?;
        let mut elifs = Vec::new();
        let mut else_ = None;
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in if statement")),
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                Some(l) if l.starts_with("elif ") => {
                    if else_.is_some() {
                        return Err(self.err(format!(
                            "Unexpected elif after else at line {}",
                            self.line_no() + 1
                        )));
                    }
                    let (elif_line, elif_line_no) = self.consume_line()?;
                    let caps = re(&RE_ELIF, r"^elif ((?P<modifier>not) )?(?P<condition>.*):$")
                        .captures(&elif_line)
                        .ok_or_else(|| {
                            self.err(format!("Cannot parse \"{}\" as elif", elif_line))
                        })?;
                    let elif_not = caps.name("modifier").is_some();
                    let elif_condition = self.parse_expr(&caps["condition"], elif_line_no)?;
                    let label = format!("l{}_elif_{}", conditional_index, elifs.len());
                    let body = self.consume_branch_body(scope)?;
                    elifs.push(Elif {
                        line: elif_line,
                        line_no: elif_line_no,
                        not: elif_not,
                        condition: elif_condition,
                        label,
                        next_label: String::new(),
                        body,
                    });
                }
                Some("else:") => {
                    let (_, else_line_no) = self.consume_line()?;
                    let mut body = Vec::new();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(self.err("Unexpected end of file in else clause"))
                            }
                            Some("end") => break,
                            _ => body.push(self.consume_statement(scope, Ctx::Inline)?),
                        }
                    }
                    else_ = Some(ElseClause {
                        line_no: else_line_no,
                        label: format!("l{}_else", conditional_index),
                        body,
                    });
                }
                Some(other) => {
                    return Err(self.err(format!(
                        "Unexpected \"{}\" in if statement at line {}",
                        other,
                        self.line_no() + 1
                    )))
                }
            }
        }
        Ok(Statement::If(IfStatement {
            line,
            line_no,
            not,
            condition,
            conditional_index,
            end_label,
            next_label: String::new(),
            then_body,
            elifs,
            else_,
        }))
    }

    /// Consume statements until `end`, `elif` or `else:` at this level.
    fn consume_branch_body(&mut self, scope: ScopeId) -> Result<Vec<Statement>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in if statement")),
                Some("end") | Some("else:") => break,
                Some(l) if l.starts_with("elif ") => break,
                _ => body.push(self.consume_statement(scope, Ctx::Inline)?),
            }
        }
        Ok(body)
    }

    fn consume_while(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(&RE_WHILE, r"^while ((?P<modifier>not) )?(?P<condition>.*):$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as while", line)))?;
        let not = caps.name("modifier").is_some();
        let condition = self.parse_expr(&caps["condition"], line_no)?;
        let conditional_index = self.next_conditional_index();
        let start_label = format!("l{}_while", conditional_index);
        let end_label = format!("l{}_end", conditional_index);
        let while_scope = self
            .scopes
            .new_scope(scope, format!("while__{}", conditional_index));

        self.while_stack.push(end_label.clone());
        let body = self.consume_simple_body(while_scope, "while loop");
        self.while_stack.pop();

        Ok(Statement::While(WhileStatement {
            line,
            line_no,
            not,
            condition,
            conditional_index,
            start_label,
            end_label,
            scope: while_scope,
            body: body?,
        }))
    }

    fn consume_for(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(
            &RE_FOR,
            r"^for (?P<var_name>[a-z_][a-zA-Z0-9_]*) in (?P<start>[a-zA-Z0-9_]+):(?P<end>[a-zA-Z0-9_]+):$",
        )
        .captures(&line)
        .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as for", line)))?;
        let var_name = caps["var_name"].to_string();
        let start = self.parse_expr(&caps["start"], line_no)?;
        let end = self.parse_expr(&caps["end"], line_no)?;
        let conditional_index = self.next_conditional_index();
        let for_scope = self
            .scopes
            .new_scope(scope, format!("for__{}", conditional_index));
        let body = self.consume_simple_body(for_scope, "for loop")?;
        Ok(Statement::For(ForStatement {
            line,
            line_no,
            var_name,
            start,
            end,
            conditional_index,
            start_label: format!("l{}_for", conditional_index),
            end_label: format!("l{}_end", conditional_index),
            scope: for_scope,
            body,
            var: None,
        }))
    }

    fn consume_for_unnamed(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(
            &RE_FOR_UNNAMED,
            r"^for _ in (?P<start>[a-zA-Z0-9_]+):(?P<end>[a-zA-Z0-9_]+):$",
        )
        .captures(&line)
        .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as for", line)))?;
        let start = self.parse_expr(&caps["start"], line_no)?;
        let end = self.parse_expr(&caps["end"], line_no)?;
        let conditional_index = self.next_conditional_index();
        let for_scope = self
            .scopes
            .new_scope(scope, format!("for__{}", conditional_index));
        let body = self.consume_simple_body(for_scope, "for loop")?;
        Ok(Statement::ForUnnamed(ForUnnamedStatement {
            line,
            line_no,
            start,
            end,
            conditional_index,
            start_label: format!("l{}_for", conditional_index),
            end_label: format!("l{}_end", conditional_index),
            scope: for_scope,
            body,
        }))
    }

    /// Consume inline statements until a matching `end`.
    fn consume_simple_body(
        &mut self,
        scope: ScopeId,
        context: &str,
    ) -> Result<Vec<Statement>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(
                        self.err(format!("Unexpected end of file in {}", context))
                    )
                }
                Some("end") => {
                    self.consume_line()?;
                    return Ok(body);
                }
                _ => body.push(self.consume_statement(scope, Ctx::Inline)?),
            }
        }
    }

    fn consume_switch(&mut self, _scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(&RE_SWITCH, r"^switch (?P<expression>.*):$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as switch", line)))?;
        let expression = self.parse_expr(&caps["expression"], line_no)?;
        let mut options = Vec::new();
        let mut else_ = None;
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in switch")),
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                Some(l) if l.starts_with("else:") => {
                    let (else_line, else_line_no) = self.consume_line()?;
                    let caps = re(&RE_SWITCH_ELSE, r"^else: (?P<block_name>.*)$")
                        .captures(&else_line)
                        .ok_or_else(|| {
                            self.err(format!("Cannot parse \"{}\" as switch else", else_line))
                        })?;
                    else_ = Some(SwitchElse {
                        block_name: caps["block_name"].to_string(),
                        label: None,
                        line: else_line,
                        line_no: else_line_no,
                    });
                }
                _ => {
                    let (option_line, option_line_no) = self.consume_line()?;
                    let caps = re(&RE_SWITCH_OPTION, r"^(?P<expression>.*): (?P<block_name>.*)$")
                        .captures(&option_line)
                        .ok_or_else(|| {
                            self.err(format!("Cannot parse \"{}\" as switch option", option_line))
                        })?;
                    let expression = self.parse_expr(&caps["expression"], option_line_no)?;
                    options.push(SwitchOption {
                        expression,
                        block_name: caps["block_name"].to_string(),
                        label: None,
                        line: option_line,
                        line_no: option_line_no,
                    });
                }
            }
        }
        Ok(Statement::Switch(SwitchStatement {
            line,
            line_no,
            expression,
            options,
            else_,
        }))
    }

    fn consume_decorated_func(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let mut decorators = Vec::new();
        loop {
            match self.peek() {
                Some(l) if l.starts_with("func ") => {
                    return self.consume_func(scope, decorators);
                }
                Some(l) if l.starts_with('@') => {
                    let (line, line_no) = self.consume_line()?;
                    let caps = re(
                        &RE_DECORATOR,
                        r"^@(?P<name>[a-z][a-zA-Z_0-9]*)\((?P<params>.*)\)$",
                    )
                    .captures(&line)
                    .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as decorator", line)))?;
                    decorators.push(Decorator {
                        name: caps["name"].to_string(),
                        params: caps["params"].to_string(),
                        line,
                        line_no,
                    });
                }
                _ => {
                    return Err(self.err(format!(
                        "Expected func definition after decorators at line {}",
                        self.line_no() + 1
                    )))
                }
            }
        }
    }

    fn consume_func(
        &mut self,
        scope: ScopeId,
        decorators: Vec<Decorator>,
    ) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(
            &RE_FUNC,
            r"^func (?P<name>[a-zA-Z_0-9]+)\((?P<args>.*)\)(?P<return_type>.*):$",
        )
        .captures(&line)
        .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as func", line)))?;
        let name = caps["name"].to_string();
        let args_text = caps["args"].to_string();
        let return_type_text = caps["return_type"].replace(' ', "");

        let mut args = Vec::new();
        let mut arg_types = Vec::new();
        for arg_caps in re(
            &RE_FUNC_ARG,
            r"(?P<arg_name>[a-z][a-z_0-9]*): (?P<arg_type>[a-zA-Z][A-Za-z_0-9<>]*(?:\[\d+\])?)",
        )
        .captures_iter(&args_text)
        {
            let arg_name = arg_caps["arg_name"].to_string();
            let type_name = arg_caps["arg_type"].to_string();
            let ty = self
                .registry
                .get_type_instance(&type_name)
                .map_err(|e| ParseError::new(e, Some(line_no)))?;
            args.push((arg_name, type_name));
            arg_types.push(ty);
        }

        let mut returns = Vec::new();
        for type_name in return_type_text.split(',').filter(|s| !s.is_empty()) {
            let ty = self
                .registry
                .get_type_instance(type_name)
                .map_err(|e| ParseError::new(e, Some(line_no)))?;
            returns.push(ty);
        }

        let mut public = false;
        let mut on_completion = "NoOp".to_string();
        for d in &decorators {
            if d.name == "public" {
                public = true;
                if let Some(kv) = re(&RE_DECORATOR_KV, r"^(?P<key>.*)=(?P<value>.*)$")
                    .captures(&d.params)
                {
                    if &kv["key"] == "OnCompletion" {
                        on_completion = kv["value"].to_string();
                    }
                }
            }
        }

        let enclosing = self.scopes.name(scope).to_string();
        let label = format!("{}__func__{}", enclosing, name);
        let sig = FuncSig {
            name: name.clone(),
            label: label.clone(),
            args: args
                .iter()
                .map(|(n, _)| n.clone())
                .zip(arg_types.iter().cloned())
                .collect(),
            returns: returns.clone(),
            public,
            on_completion: on_completion.clone(),
        };
        self.scopes
            .declare_func(scope, sig)
            .map_err(|e| ParseError::new(e, Some(line_no)))?;
        let func_scope = self.scopes.new_scope(scope, format!("func__{}", name));

        self.func_stack.push(FuncCtx {
            returns: returns.clone(),
        });
        let body = self.consume_simple_body(func_scope, &format!("func \"{}\"", name));
        self.func_stack.pop();
        let body = body?;

        let last = body.iter().rev().find(|n| {
            !matches!(
                n,
                Statement::Comment { .. } | Statement::Blank { .. } | Statement::Func(_)
            )
        });
        if !matches!(last, Some(Statement::Return { .. })) {
            return Err(self.err(format!(
                "func must end with a return statement at line {}!",
                self.line_no()
            )));
        }

        Ok(Statement::Func(FuncNode {
            line,
            line_no,
            name,
            label,
            scope: func_scope,
            args,
            arg_types,
            returns,
            decorators,
            public,
            on_completion,
            param_vars: Vec::new(),
            body,
        }))
    }

    fn consume_teal(&mut self) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let mut lines = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in teal block")),
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                _ => {
                    let (raw, _) = self.consume_line()?;
                    lines.push(raw);
                }
            }
        }
        Ok(Statement::Teal {
            line,
            line_no,
            lines,
        })
    }

    fn consume_inner_txn(&mut self) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in inner_txn")),
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                Some(l) if l.starts_with('#') => {
                    self.consume_line()?;
                }
                _ => {
                    let (field_line, field_line_no) = self.consume_line()?;
                    let caps = re(
                        &RE_ITXN_FIELD,
                        r"^(?P<field_name>.*?)(\[(?P<index>\d\d?)\])?: (?P<expression>.*)$",
                    )
                    .captures(&field_line)
                    .ok_or_else(|| {
                        self.err(format!(
                            "Cannot parse \"{}\" as inner_txn field",
                            field_line
                        ))
                    })?;
                    let index = match caps.name("index") {
                        Some(m) => Some(m.as_str().parse::<u64>().map_err(|_| {
                            self.err(format!("Invalid field index in \"{}\"", field_line))
                        })?),
                        None => None,
                    };
                    let expression = self.parse_expr(&caps["expression"], field_line_no)?;
                    fields.push(InnerTxnField {
                        field_name: caps["field_name"].to_string(),
                        index,
                        expression,
                        line: field_line,
                        line_no: field_line_no,
                    });
                }
            }
        }
        let (in_group, group_index) = match self.group_stack.last_mut() {
            Some(count) => {
                let index = *count;
                *count += 1;
                (true, index)
            }
            None => (false, 0),
        };
        Ok(Statement::InnerTxn(InnerTxnNode {
            line,
            line_no,
            fields,
            in_group,
            group_index,
        }))
    }

    fn consume_inner_group(&mut self, scope: ScopeId) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        self.group_stack.push(0);
        let body = (|| {
            let mut body = Vec::new();
            loop {
                match self.peek() {
                    None => return Err(self.err("Unexpected end of file in inner_group")),
                    Some("end") => {
                        self.consume_line()?;
                        return Ok(body);
                    }
                    _ => body.push(self.consume_statement(scope, Ctx::Block)?),
                }
            }
        })();
        self.group_stack.pop();
        Ok(Statement::InnerGroup(InnerGroupNode {
            line,
            line_no,
            body: body?,
        }))
    }

    fn consume_router(&mut self) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let mut routes = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.err("Unexpected end of file in router")),
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                _ => {
                    let (route_line, route_line_no) = self.consume_line()?;
                    let name = route_line.clone();
                    routes.push(RouteNode {
                        label: format!("route_{}", name),
                        name,
                        arg_exprs: Vec::new(),
                        func_label: None,
                        func_returns: Vec::new(),
                        on_completion: "NoOp".to_string(),
                        oc_value: None,
                        line: route_line,
                        line_no: route_line_no,
                    });
                }
            }
        }
        Ok(Statement::Router(RouterNode {
            line,
            line_no,
            routes,
        }))
    }

    fn consume_struct_def(&mut self) -> Result<Statement, ParseError> {
        let (line, line_no) = self.consume_line()?;
        let caps = re(&RE_STRUCT, r"^struct (?P<name>[A-Z][a-zA-Z_0-9]*):$")
            .captures(&line)
            .ok_or_else(|| self.err(format!("Cannot parse \"{}\" as struct", line)))?;
        let name = caps["name"].to_string();
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(
                        self.err(format!("Unexpected end of file in struct \"{}\"", name))
                    )
                }
                Some("end") => {
                    self.consume_line()?;
                    break;
                }
                Some(l) if l.starts_with('#') => {
                    self.consume_line()?;
                }
                _ => {
                    let (field_line, field_line_no) = self.consume_line()?;
                    let caps = re(
                        &RE_STRUCT_FIELD,
                        r"^(?P<field_name>[a-z][A-Za-z0-9_]*): (?P<data_type>[a-zA-Z][A-Za-z0-9_]+(\[\d+\])?)$",
                    )
                    .captures(&field_line)
                    .ok_or_else(|| {
                        self.err(format!("Cannot parse \"{}\" as struct field", field_line))
                    })?;
                    fields.push(StructFieldDef {
                        field_name: caps["field_name"].to_string(),
                        type_name: caps["data_type"].to_string(),
                        line: field_line,
                        line_no: field_line_no,
                    });
                }
            }
        }

        let mut struct_type = StructType::new(&name);
        for field in &fields {
            let ty = self
                .registry
                .get_type_instance(&field.type_name)
                .map_err(|e| ParseError::new(e, Some(field.line_no)))?;
            struct_type
                .add_field(&field.field_name, ty, &self.registry)
                .map_err(|e| ParseError::new(e, Some(field.line_no)))?;
        }
        self.registry
            .define_struct(struct_type)
            .map_err(|e| ParseError::new(e, Some(line_no)))?;

        Ok(Statement::StructDef(StructDefNode {
            line,
            line_no,
            name,
            fields,
        }))
    }

    fn next_conditional_index(&mut self) -> usize {
        let index = self.conditional_count;
        self.conditional_count += 1;
        index
    }
}

/// Split a return argument list on top-level commas, respecting
/// parentheses and string quotes.
fn split_return_args(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    let bytes: Vec<char> = s.chars().collect();
    for (i, c) in bytes.iter().enumerate() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                parts.push(bytes[start..i].iter().collect::<String>());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(bytes[start..].iter().collect::<String>());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let (program, _) = Parser::new(source).parse().unwrap();
        program
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::new(source).parse().unwrap_err()
    }

    #[test]
    fn test_minimal_program() {
        let program = parse_ok("#pragma version 8\nint x = 5\nexit(1)\n");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(
            program.body[0],
            Statement::TealVersion { version: 8, .. }
        ));
        assert!(matches!(program.body[1], Statement::VarDeclaration { .. }));
        assert!(matches!(program.body[2], Statement::Exit { .. }));
    }

    #[test]
    fn test_pragma_must_be_first_line() {
        let err = parse_err("int x = 5\n#pragma version 8\nexit(1)\n");
        assert!(err.message.contains("first line"));
    }

    #[test]
    fn test_unmatched_line_is_parse_error() {
        let err = parse_err("#pragma version 8\n???\nexit(1)\n");
        assert!(err.message.contains("Unexpected line statement"));
        assert_eq!(err.line_no, Some(2));
    }

    #[test]
    fn test_struct_must_be_at_top() {
        let err = parse_err(
            "#pragma version 8\nint x = 5\nstruct Item:\n    price: int\nend\nexit(1)\n",
        );
        assert!(err.message.contains("top of the file"));
    }

    #[test]
    fn test_struct_before_statements_ok() {
        let program = parse_ok(
            "#pragma version 8\nstruct Item:\n    price: int\n    seller: bytes[32]\nend\nexit(1)\n",
        );
        assert!(matches!(program.body[1], Statement::StructDef(_)));
    }

    #[test]
    fn test_func_before_exit_statement_rejected() {
        let err = parse_err(
            "#pragma version 8\nfunc f() int:\n    return 1\nend\nexit(1)\n",
        );
        assert!(err.message.contains("must occur after an exit statement"));
    }

    #[test]
    fn test_statement_after_exit_rejected() {
        let err = parse_err("#pragma version 8\nexit(1)\nint x = 5\n");
        assert!(err
            .message
            .contains("Only block and function definitions may appear after"));
    }

    #[test]
    fn test_func_after_exit_ok() {
        let program = parse_ok(
            "#pragma version 8\nexit(1)\nfunc f() int:\n    return 1\nend\n",
        );
        assert!(matches!(program.body[2], Statement::Func(_)));
    }

    #[test]
    fn test_func_must_end_with_return() {
        let err = parse_err(
            "#pragma version 8\nexit(1)\nfunc f():\n    int x = 5\nend\n",
        );
        assert!(err.message.contains("must end with a return statement"));
    }

    #[test]
    fn test_func_return_arity_checked_at_build() {
        let err = parse_err(
            "#pragma version 8\nexit(1)\nfunc f() int:\n    return\nend\n",
        );
        assert!(err.message.contains("Incorrect number of returns"));
    }

    #[test]
    fn test_return_outside_func_rejected() {
        let err = parse_err("#pragma version 8\nreturn 1\n");
        assert!(err.message.contains("should only be used in a function"));
    }

    #[test]
    fn test_break_outside_while_rejected() {
        let err = parse_err("#pragma version 8\nbreak\nexit(1)\n");
        assert!(err.message.contains("should only be used in a while loop"));
    }

    #[test]
    fn test_break_inside_while_ok() {
        let program = parse_ok(
            "#pragma version 8\nwhile 1:\n    break\nend\nexit(1)\n",
        );
        let Statement::While(w) = &program.body[1] else {
            panic!("expected while");
        };
        let Statement::Break { end_label, .. } = &w.body[0] else {
            panic!("expected break");
        };
        assert_eq!(end_label, "l0_end");
    }

    #[test]
    fn test_block_must_end_with_exit_statement() {
        let err = parse_err("#pragma version 8\nexit(1)\nblock main:\n    int x = 5\nend\n");
        assert!(err.message.contains("Blocks must end with an exit statement"));
    }

    #[test]
    fn test_block_labels_compose() {
        let program = parse_ok(
            "#pragma version 8\nexit(1)\nblock main:\n    jump inner\n    block inner:\n        exit(1)\n    end\nend\n",
        );
        let Statement::Block(outer) = &program.body[2] else {
            panic!("expected block");
        };
        assert_eq!(outer.label, "main");
        let Statement::Block(inner) = &outer.body[1] else {
            panic!("expected nested block");
        };
        assert_eq!(inner.label, "main__inner");
    }

    #[test]
    fn test_block_inside_if_rejected() {
        let err = parse_err(
            "#pragma version 8\nif 1:\n    block b:\n        exit(1)\n    end\nend\nexit(1)\n",
        );
        assert!(err.message.contains("Unexpected block"));
    }

    #[test]
    fn test_if_elif_else_structure() {
        let program = parse_ok(
            "#pragma version 8\nint x = 5\nif x == 1:\n    assert(1)\nelif x == 2:\n    assert(2)\nelse:\n    assert(3)\nend\nexit(1)\n",
        );
        let Statement::If(n) = &program.body[2] else {
            panic!("expected if");
        };
        assert_eq!(n.conditional_index, 0);
        assert_eq!(n.end_label, "l0_end");
        assert_eq!(n.elifs.len(), 1);
        assert_eq!(n.elifs[0].label, "l0_elif_0");
        assert_eq!(n.else_.as_ref().unwrap().label, "l0_else");
    }

    #[test]
    fn test_conditional_indexes_allocated_in_source_order() {
        let program = parse_ok(
            "#pragma version 8\nif 1:\n    while 1:\n        assert(1)\n    end\nend\nif 2:\n    assert(2)\nend\nexit(1)\n",
        );
        let Statement::If(first) = &program.body[1] else {
            panic!("expected if");
        };
        assert_eq!(first.conditional_index, 0);
        let Statement::While(w) = &first.then_body[0] else {
            panic!("expected while");
        };
        assert_eq!(w.conditional_index, 1);
        let Statement::If(second) = &program.body[2] else {
            panic!("expected if");
        };
        assert_eq!(second.conditional_index, 2);
    }

    #[test]
    fn test_decorated_func() {
        let program = parse_ok(
            "#pragma version 8\nexit(1)\n@public(OnCompletion=OptIn)\nfunc f() int:\n    return 1\nend\n",
        );
        let Statement::Func(f) = &program.body[2] else {
            panic!("expected func");
        };
        assert!(f.public);
        assert_eq!(f.on_completion, "OptIn");
        assert_eq!(f.label, "__func__f");
    }

    #[test]
    fn test_func_args_parsed() {
        let program = parse_ok(
            "#pragma version 8\nexit(1)\nfunc pay(receiver: bytes[32], amount: int) int:\n    return 1\nend\n",
        );
        let Statement::Func(f) = &program.body[2] else {
            panic!("expected func");
        };
        assert_eq!(f.args.len(), 2);
        assert_eq!(f.args[0], ("receiver".to_string(), "bytes[32]".to_string()));
        assert_eq!(f.arg_types[1], Type::Int);
        assert_eq!(f.returns, vec![Type::Int]);
    }

    #[test]
    fn test_switch_with_else() {
        let program = parse_ok(
            "#pragma version 8\nswitch Txn.ApplicationID:\n    0: create\n    else: main\nend\nblock create:\n    exit(1)\nend\nblock main:\n    exit(1)\nend\n",
        );
        let Statement::Switch(s) = &program.body[1] else {
            panic!("expected switch");
        };
        assert_eq!(s.options.len(), 1);
        assert_eq!(s.options[0].block_name, "create");
        assert_eq!(s.else_.as_ref().unwrap().block_name, "main");
    }

    #[test]
    fn test_inner_group_membership() {
        let program = parse_ok(
            "#pragma version 8\ninner_group:\n    inner_txn:\n        TypeEnum: Pay\n    end\n    inner_txn:\n        TypeEnum: Pay\n    end\nend\nexit(1)\n",
        );
        let Statement::InnerGroup(g) = &program.body[1] else {
            panic!("expected inner_group");
        };
        let indexes: Vec<(bool, usize)> = g
            .body
            .iter()
            .filter_map(|n| match n {
                Statement::InnerTxn(t) => Some((t.in_group, t.group_index)),
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![(true, 0), (true, 1)]);
    }

    #[test]
    fn test_bare_inner_txn_not_in_group() {
        let program = parse_ok(
            "#pragma version 8\ninner_txn:\n    TypeEnum: Pay\n    Amount: 1\nend\nexit(1)\n",
        );
        let Statement::InnerTxn(t) = &program.body[1] else {
            panic!("expected inner_txn");
        };
        assert!(!t.in_group);
        assert_eq!(t.fields.len(), 2);
    }

    #[test]
    fn test_itxn_array_field_index_parsed() {
        let program = parse_ok(
            "#pragma version 8\ninner_txn:\n    ApplicationArgs[0]: \"a\"\n    ApplicationArgs[1]: \"b\"\nend\nexit(1)\n",
        );
        let Statement::InnerTxn(t) = &program.body[1] else {
            panic!("expected inner_txn");
        };
        assert_eq!(t.fields[0].index, Some(0));
        assert_eq!(t.fields[1].index, Some(1));
    }

    #[test]
    fn test_box_declaration_methods() {
        for (text, method) in [
            ("Box", BoxMethod::Plain),
            ("OpenBox", BoxMethod::Open),
            ("CreateBox", BoxMethod::Create),
            ("OpenOrCreateBox", BoxMethod::OpenOrCreate),
        ] {
            let source = format!(
                "#pragma version 8\nstruct Item:\n    price: int\nend\nbox<Item> b = {}(\"key\")\nexit(1)\n",
                text
            );
            let program = parse_ok(&source);
            let Statement::BoxDeclaration { method: m, .. } = &program.body[2] else {
                panic!("expected box declaration");
            };
            assert_eq!(*m, method);
        }
    }

    #[test]
    fn test_multi_assignment_names() {
        let program = parse_ok(
            "#pragma version 8\nint a\nint b\na, _, b = 1\nexit(1)\n",
        );
        let Statement::Assignment { names, .. } = &program.body[3] else {
            panic!("expected assignment");
        };
        assert_eq!(names, &["a", "_", "b"]);
    }

    #[test]
    fn test_teal_passthrough_block() {
        let program = parse_ok("#pragma version 8\nteal:\n    pushint 1\n    pop\nend\nexit(1)\n");
        let Statement::Teal { lines, .. } = &program.body[1] else {
            panic!("expected teal block");
        };
        assert_eq!(lines, &["pushint 1", "pop"]);
    }

    #[test]
    fn test_assert_with_message() {
        let program = parse_ok("#pragma version 8\nassert(1, \"must hold\")\nexit(1)\n");
        let Statement::Assert { message, .. } = &program.body[1] else {
            panic!("expected assert");
        };
        assert_eq!(message.as_deref(), Some("must hold"));
    }

    #[test]
    fn test_split_return_args() {
        assert_eq!(split_return_args("1, 2"), vec!["1", " 2"]);
        assert_eq!(split_return_args("f(a, b), 2"), vec!["f(a, b)", " 2"]);
        assert_eq!(
            split_return_args("\"a,b\", 2"),
            vec!["\"a,b\"", " 2"]
        );
    }

    #[test]
    fn test_round_trip_unparse() {
        let source = "\
#pragma version 8
struct Item:
    price: int
    seller: bytes[32]
end

const int FEE = 1000
int x = 5
if x == 1:
    assert(1)
elif not x == 2:
    x = 3
else:
    x = 4
end
switch x:
    1: main
    else: main
end
block main:
    exit(1)
end
@public(OnCompletion=NoOp)
func f(a: int) int:
    return a + 1
end
";
        let program = parse_ok(source);
        let printed = program.unparse();
        assert_eq!(printed, source);
        let reparsed = parse_ok(&printed);
        assert_eq!(program, reparsed);
    }
}
