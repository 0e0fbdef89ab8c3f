//! TEAL code generation: the write pass
//!
//! A pre-order traversal of the processed AST. Every statement emits a
//! `// tl:<line>: <source>` annotation ahead of its opcodes so the output
//! maps back to the source. Emission is deterministic: the same processed
//! AST always produces byte-identical TEAL.

use tracing::debug;

use crate::ast::{
    AssignTarget, BlockNode, BoxMethod, FuncNode, IfStatement, InnerGroupNode, InnerTxnNode,
    Program, RouterNode, Statement, SwitchStatement,
};
use crate::errors::CompileError;
use crate::expr::Expr;
use crate::types::Type;
use crate::writer::TealWriter;

pub struct CodeGen {
    writer: TealWriter,
    use_inner_txns_macro: bool,
    inner_group_flag_slot: Option<usize>,
}

fn unresolved(what: &str, line_no: usize) -> CompileError {
    CompileError::new(format!("Unresolved {}", what), Some(line_no))
}

impl CodeGen {
    pub fn new(use_inner_txns_macro: bool, inner_group_flag_slot: Option<usize>) -> Self {
        CodeGen {
            writer: TealWriter::new(),
            use_inner_txns_macro,
            inner_group_flag_slot,
        }
    }

    /// Emit the whole program, including the inner-transaction macro
    /// subroutines when any inner group is compiled with the macro on.
    pub fn write_program(mut self, program: &Program) -> Result<TealWriter, CompileError> {
        debug!("running write pass");
        for stmt in &program.body {
            self.write_statement(stmt)?;
        }
        if self.use_inner_txns_macro {
            self.write_itxn_macro_subroutines()?;
        }
        Ok(self.writer)
    }

    fn tl(&mut self, line_no: usize, line: &str) {
        self.writer
            .write(Some(line_no), &format!("// tl:{}: {}", line_no, line));
    }

    fn expr_lines(expr: &Expr, line_no: usize) -> Result<Vec<String>, CompileError> {
        expr.ops().map_err(|e| CompileError::new(e, Some(line_no)))
    }

    fn write_expr(&mut self, line_no: usize, expr: &Expr) -> Result<(), CompileError> {
        for op in Self::expr_lines(expr, line_no)? {
            self.writer.write(Some(line_no), &op);
        }
        Ok(())
    }

    fn write_expr_one_line(&mut self, line_no: usize, expr: &Expr) -> Result<(), CompileError> {
        let ops = Self::expr_lines(expr, line_no)?;
        self.writer.write_joined(Some(line_no), &ops);
        Ok(())
    }

    fn write_body(&mut self, body: &[Statement]) -> Result<(), CompileError> {
        for stmt in body {
            self.write_statement(stmt)?;
        }
        Ok(())
    }

    fn write_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::TealVersion {
                version, line_no, ..
            } => {
                self.writer
                    .write(Some(*line_no), &format!("#pragma version {}", version));
                Ok(())
            }
            Statement::Comment { line, line_no } => {
                self.writer
                    .write(Some(*line_no), &format!("//{}", &line[1..]));
                Ok(())
            }
            Statement::Blank { line_no } => {
                self.writer.write(Some(*line_no), "");
                Ok(())
            }
            Statement::Const {
                name,
                literal,
                line_no,
                ..
            } => {
                self.writer.write(
                    Some(*line_no),
                    &format!("#define {} {}", name, literal.unparse()),
                );
                Ok(())
            }
            Statement::Jump {
                label,
                line,
                line_no,
                ..
            } => {
                self.tl(*line_no, line);
                let label = label
                    .as_deref()
                    .ok_or_else(|| unresolved("jump target", *line_no))?;
                self.writer.write(Some(*line_no), &format!("b {}", label));
                Ok(())
            }
            Statement::Exit {
                expression,
                line,
                line_no,
            } => {
                self.tl(*line_no, line);
                self.write_expr(*line_no, expression)?;
                self.writer.write(Some(*line_no), "return");
                Ok(())
            }
            Statement::FunctionCallStatement {
                expression,
                line,
                line_no,
            } => {
                self.tl(*line_no, line);
                self.write_expr(*line_no, expression)
            }
            Statement::Assert {
                arg,
                message,
                line,
                line_no,
            } => {
                self.tl(*line_no, line);
                self.write_expr(*line_no, arg)?;
                match message {
                    Some(m) => self
                        .writer
                        .write(Some(*line_no), &format!("assert // {}", m)),
                    None => self.writer.write(Some(*line_no), "assert"),
                }
                Ok(())
            }
            Statement::VarDeclaration {
                name,
                expression,
                var,
                line,
                line_no,
                ..
            } => {
                let var = var
                    .as_ref()
                    .ok_or_else(|| unresolved("declaration", *line_no))?;
                self.writer.write(
                    Some(*line_no),
                    &format!("// tl:{}: {} [slot {}]", line_no, line, var.slot),
                );
                if let Some(expr) = expression {
                    self.write_expr(*line_no, expr)?;
                    self.writer
                        .write(Some(*line_no), &format!("store {} // {}", var.slot, name));
                }
                Ok(())
            }
            Statement::Assignment {
                expression,
                targets,
                line,
                line_no,
                ..
            } => {
                self.tl(*line_no, line);
                self.write_expr(*line_no, expression)?;
                for target in targets {
                    match target {
                        AssignTarget::Discard => self
                            .writer
                            .write(Some(*line_no), "pop // discarding value for _"),
                        AssignTarget::Slot { name, slot } => self
                            .writer
                            .write(Some(*line_no), &format!("store {} // {}", slot, name)),
                    }
                }
                Ok(())
            }
            Statement::StructOrBoxAssignment {
                name,
                field_name,
                expression,
                resolved,
                line,
                line_no,
            } => {
                let r = resolved
                    .as_ref()
                    .ok_or_else(|| unresolved("field assignment", *line_no))?;
                let mut parts = Vec::new();
                if r.ty.is_int() {
                    parts.push("itob".to_string());
                    if let Type::UInt(w) = r.ty {
                        if w != 8 {
                            parts.push(format!("extract {} {}", 8 - w, w));
                        }
                    }
                }
                if r.is_box {
                    self.tl(*line_no, line);
                    self.write_expr(*line_no, expression)?;
                    parts.extend([
                        format!("load {}", r.slot),
                        format!("pushint {}", r.offset),
                        "uncover 2".to_string(),
                        "box_replace".to_string(),
                        format!("// boxset {}.{}", name, field_name),
                    ]);
                } else {
                    self.writer.write(
                        Some(*line_no),
                        &format!("// tl:{}: {} [slot {}]", line_no, line, r.slot),
                    );
                    self.write_expr(*line_no, expression)?;
                    parts.extend([
                        format!("load {}", r.slot),
                        "swap".to_string(),
                        format!("replace {}", r.offset),
                        format!("store {}", r.slot),
                        format!("// set {}.{}", name, field_name),
                    ]);
                }
                self.writer.write_joined(Some(*line_no), &parts);
                Ok(())
            }
            Statement::BoxDeclaration {
                struct_name,
                name,
                method,
                key,
                var,
                box_size,
                line,
                line_no,
            } => {
                let var = var
                    .as_ref()
                    .ok_or_else(|| unresolved("box declaration", *line_no))?;
                let size = box_size.ok_or_else(|| unresolved("box size", *line_no))?;
                self.writer.write(
                    Some(*line_no),
                    &format!("// tl:{}: {} [slot {}]", line_no, line, var.slot),
                );
                self.write_expr(*line_no, key)?;
                match method {
                    BoxMethod::Open => self.writer.write(
                        Some(*line_no),
                        &format!(
                            "dup; box_len; assert; pushint {}; ==; assert // len(box) == {}.size",
                            size, struct_name
                        ),
                    ),
                    BoxMethod::Create => self.writer.write(
                        Some(*line_no),
                        &format!(
                            "dup; pushint {}; box_create; assert // create & assert created",
                            size
                        ),
                    ),
                    BoxMethod::OpenOrCreate => self.writer.write(
                        Some(*line_no),
                        &format!(
                            "dup; pushint {}; box_create; pop // create if didn't already exist",
                            size
                        ),
                    ),
                    BoxMethod::Plain => {}
                }
                self.writer
                    .write(Some(*line_no), &format!("store {} // box:{}", var.slot, name));
                Ok(())
            }
            Statement::Break {
                end_label,
                line,
                line_no,
            } => {
                self.tl(*line_no, line);
                self.writer
                    .write(Some(*line_no), &format!("b {}", end_label));
                Ok(())
            }
            Statement::Return {
                expressions,
                line,
                line_no,
                ..
            } => {
                self.tl(*line_no, line);
                for expr in expressions.iter().rev() {
                    self.write_expr(*line_no, expr)?;
                }
                self.writer.write(Some(*line_no), "retsub");
                Ok(())
            }
            Statement::Teal { lines, line_no, .. } => {
                for (i, raw) in lines.iter().enumerate() {
                    self.writer.write(Some(line_no + 1 + i), raw);
                }
                Ok(())
            }
            Statement::If(n) => self.write_if(n),
            Statement::While(n) => {
                self.tl(n.line_no, &n.line);
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.start_label));
                self.writer.level += 1;
                self.write_expr(n.line_no, &n.condition)?;
                let branch = if n.not { "bnz" } else { "bz" };
                self.writer
                    .write(Some(n.line_no), &format!("{} {}", branch, n.end_label));
                self.write_body(&n.body)?;
                self.writer
                    .write(Some(n.line_no), &format!("b {}", n.start_label));
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.end_label));
                self.writer.level -= 1;
                Ok(())
            }
            Statement::For(n) => {
                let var = n
                    .var
                    .as_ref()
                    .ok_or_else(|| unresolved("for loop variable", n.line_no))?;
                let load = format!("load {} // {}", var.slot, var.name);
                let store = format!("store {} // {}", var.slot, var.name);
                self.tl(n.line_no, &n.line);
                self.writer.level += 1;
                self.write_expr(n.line_no, &n.start)?;
                self.writer.write(Some(n.line_no), &store);
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.start_label));
                self.writer.write(Some(n.line_no), &load);
                self.write_expr(n.line_no, &n.end)?;
                self.writer.write(Some(n.line_no), "==");
                self.writer
                    .write(Some(n.line_no), &format!("bnz {}", n.end_label));
                self.write_body(&n.body)?;
                self.writer.write(Some(n.line_no), &load);
                self.writer.write(Some(n.line_no), "pushint 1");
                self.writer.write(Some(n.line_no), "+");
                self.writer.write(Some(n.line_no), &store);
                self.writer
                    .write(Some(n.line_no), &format!("b {}", n.start_label));
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.end_label));
                self.writer.level -= 1;
                Ok(())
            }
            Statement::ForUnnamed(n) => {
                self.tl(n.line_no, &n.line);
                self.writer.level += 1;
                self.write_expr(n.line_no, &n.start)?;
                self.writer.write(Some(n.line_no), "dup");
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.start_label));
                self.write_expr(n.line_no, &n.end)?;
                self.writer.write(Some(n.line_no), "==");
                self.writer
                    .write(Some(n.line_no), &format!("bnz {}", n.end_label));
                self.write_body(&n.body)?;
                self.writer.write(Some(n.line_no), "pushint 1");
                self.writer.write(Some(n.line_no), "+");
                self.writer.write(Some(n.line_no), "dup");
                self.writer
                    .write(Some(n.line_no), &format!("b {}", n.start_label));
                self.writer
                    .write(Some(n.line_no), &format!("{}:", n.end_label));
                self.writer.write(Some(n.line_no), "pop");
                self.writer.level -= 1;
                Ok(())
            }
            Statement::Switch(n) => self.write_switch(n),
            Statement::Block(n) => self.write_block(n),
            Statement::Func(n) => self.write_func(n),
            Statement::InnerTxn(n) => self.write_inner_txn(n),
            Statement::InnerGroup(n) => self.write_inner_group(n),
            Statement::Router(n) => self.write_router(n),
            Statement::StructDef(_) => Ok(()),
        }
    }

    fn write_if(&mut self, n: &IfStatement) -> Result<(), CompileError> {
        let has_branches = !n.elifs.is_empty() || n.else_.is_some();
        self.tl(n.line_no, &n.line);
        self.write_expr(n.line_no, &n.condition)?;
        let branch = if n.not { "bnz" } else { "bz" };
        self.writer
            .write(Some(n.line_no), &format!("{} {}", branch, n.next_label));

        self.writer.write(Some(n.line_no), "// then:");
        self.writer.level += 1;
        self.write_body(&n.then_body)?;
        self.writer.level -= 1;
        if has_branches {
            self.writer.level += 1;
            self.writer
                .write(Some(n.line_no), &format!("b {}", n.end_label));
            self.writer.level -= 1;
        }

        for (i, elif) in n.elifs.iter().enumerate() {
            self.writer
                .write(Some(elif.line_no), &format!("{}:", elif.label));
            self.tl(elif.line_no, &elif.line);
            self.writer.level += 1;
            self.write_expr(elif.line_no, &elif.condition)?;
            let branch = if elif.not { "bnz" } else { "bz" };
            self.writer
                .write(Some(elif.line_no), &format!("{} {}", branch, elif.next_label));
            self.writer.level += 1;
            self.write_body(&elif.body)?;
            self.writer.level -= 1;
            if i != n.elifs.len() - 1 || n.else_.is_some() {
                self.writer.level += 1;
                self.writer
                    .write(Some(elif.line_no), &format!("b {}", n.end_label));
                self.writer.level -= 1;
            }
            self.writer.level -= 1;
        }

        if let Some(e) = &n.else_ {
            self.writer.write(Some(e.line_no), &format!("{}:", e.label));
            self.tl(e.line_no, "else:");
            self.writer.level += 1;
            self.write_body(&e.body)?;
            self.writer.level -= 1;
        }
        self.writer
            .write(Some(n.line_no), &format!("{}:", n.end_label));
        Ok(())
    }

    fn write_switch(&mut self, n: &SwitchStatement) -> Result<(), CompileError> {
        self.tl(n.line_no, &n.line);
        for option in &n.options {
            self.write_expr(n.line_no, &n.expression)?;
            self.write_expr(option.line_no, &option.expression)?;
            self.writer.write(Some(option.line_no), "==");
            let label = option
                .label
                .as_deref()
                .ok_or_else(|| unresolved("switch target", option.line_no))?;
            self.writer
                .write(Some(option.line_no), &format!("bnz {}", label));
        }
        match &n.else_ {
            Some(e) => {
                let label = e
                    .label
                    .as_deref()
                    .ok_or_else(|| unresolved("switch target", e.line_no))?;
                self.writer
                    .write(Some(e.line_no), &format!("b {} // else", label));
            }
            None => self.writer.write(Some(n.line_no), "err // unexpected value"),
        }
        Ok(())
    }

    fn write_block(&mut self, n: &BlockNode) -> Result<(), CompileError> {
        self.writer
            .write(Some(n.line_no), &format!("// block {}", n.name));
        self.writer.write(Some(n.line_no), &format!("{}:", n.label));
        self.writer.level += 1;
        self.write_body(&n.body)?;
        self.writer.level -= 1;
        Ok(())
    }

    fn write_func(&mut self, n: &FuncNode) -> Result<(), CompileError> {
        self.tl(n.line_no, &n.line);
        self.writer.write(Some(n.line_no), &format!("{}:", n.label));
        self.writer.level += 1;
        for var in &n.param_vars {
            self.writer.write(
                Some(n.line_no),
                &format!("store {} // {} [{}]", var.slot, var.name, var.ty),
            );
        }
        self.write_body(&n.body)?;
        self.writer.level -= 1;
        Ok(())
    }

    fn write_inner_txn(&mut self, n: &InnerTxnNode) -> Result<(), CompileError> {
        self.tl(n.line_no, &n.line);
        let (begin, submit) = if self.use_inner_txns_macro {
            ("callsub _itxn_begin", "callsub _itxn_submit")
        } else {
            ("itxn_begin", "itxn_submit")
        };
        self.writer.write(Some(n.line_no), begin);
        self.writer.level += 1;
        for field in &n.fields {
            self.tl(field.line_no, &field.line);
            self.write_expr(field.line_no, &field.expression)?;
            self.writer.write(
                Some(field.line_no),
                &format!("itxn_field {}", field.field_name),
            );
        }
        self.writer.level -= 1;
        self.writer.write(Some(n.line_no), submit);
        self.writer.write(Some(n.line_no), "// end inner_txn");
        Ok(())
    }

    fn write_inner_group(&mut self, n: &InnerGroupNode) -> Result<(), CompileError> {
        self.tl(n.line_no, &n.line);
        self.writer
            .write(Some(n.line_no), "callsub _itxn_group_begin");
        self.writer.level += 1;
        self.write_body(&n.body)?;
        self.writer
            .write(Some(n.line_no), "callsub _itxn_group_submit");
        self.writer.level -= 1;
        self.writer.write(Some(n.line_no), "// end inner_group");
        Ok(())
    }

    fn write_router(&mut self, n: &RouterNode) -> Result<(), CompileError> {
        self.tl(n.line_no, &n.line);
        for route in &n.routes {
            self.writer
                .write(Some(route.line_no), &format!("pushbytes \"{}\"", route.name));
        }
        self.writer.write(Some(n.line_no), "txna ApplicationArgs 0");
        let labels: Vec<&str> = n.routes.iter().map(|r| r.label.as_str()).collect();
        self.writer
            .write(Some(n.line_no), &format!("match {}", labels.join(" ")));
        self.writer.write(Some(n.line_no), "err // unexpected value");

        for route in &n.routes {
            self.writer
                .write(Some(route.line_no), &format!("{}:", route.label));
            self.writer.level += 1;
            if route.on_completion == "CreateApplication" {
                self.writer.write(
                    Some(route.line_no),
                    "txn ApplicationID; pushint 0; ==; assert // ApplicationID == 0",
                );
            } else {
                let value = route
                    .oc_value
                    .ok_or_else(|| unresolved("OnCompletion value", route.line_no))?;
                self.writer.write(
                    Some(route.line_no),
                    &format!(
                        "txn OnCompletion; pushint {}; ==; assert // assert OnCompletion == {}",
                        value, route.on_completion
                    ),
                );
            }
            for expr in &route.arg_exprs {
                self.write_expr_one_line(route.line_no, expr)?;
            }
            let func_label = route
                .func_label
                .as_deref()
                .ok_or_else(|| unresolved("route target", route.line_no))?;
            self.writer
                .write(Some(route.line_no), &format!("callsub {}", func_label));
            if !route.func_returns.is_empty() {
                let names: Vec<String> =
                    route.func_returns.iter().map(|t| t.to_string()).collect();
                self.writer
                    .write(Some(route.line_no), &format!("// return {}", names.join(", ")));
                // reverse the return values on the stack and byte-encode
                // ints before concatenating
                for (i, ty) in route.func_returns.iter().enumerate() {
                    if i > 0 {
                        self.writer
                            .write(Some(route.line_no), &format!("uncover {} // {}", i, ty));
                    } else {
                        self.writer
                            .write(Some(route.line_no), &format!("// uncover {} {}", i, ty));
                    }
                    if ty.is_int() {
                        self.writer.write(Some(route.line_no), "itob");
                    }
                }
                for _ in 1..route.func_returns.len() {
                    self.writer.write(Some(route.line_no), "concat");
                }
                self.writer.write(
                    Some(route.line_no),
                    "pushbytes 0x151f7c75; swap; concat; log // arc4 return log",
                );
            }
            self.writer.write(Some(route.line_no), "pushint 1; return");
            self.writer.level -= 1;
        }
        Ok(())
    }

    /// The four macro subroutines implementing the group state machine:
    /// flag 0 = no group, 1 = group armed with no txn yet, 2 = at least one
    /// txn submitted in the current group.
    fn write_itxn_macro_subroutines(&mut self) -> Result<(), CompileError> {
        let slot = self
            .inner_group_flag_slot
            .ok_or_else(|| CompileError::new("Unresolved inner group flag slot", None))?;
        let lines = [
            String::new(),
            "_itxn_group_begin:".to_string(),
            format!("  load {}; !; assert // ensure no group active", slot),
            format!("  int 1; store {}; retsub // set group flag", slot),
            String::new(),
            "_itxn_begin:".to_string(),
            format!("  load {}", slot),
            "  switch _itxn_begin__0 _itxn_begin__1 _itxn_begin__2".to_string(),
            "  err".to_string(),
            "  _itxn_begin__0: itxn_begin; retsub // no group".to_string(),
            format!(
                "  _itxn_begin__1: itxn_begin; int 2; store {}; retsub // start first txn of group",
                slot
            ),
            "  _itxn_begin__2: itxn_next; retsub // start next txn of group".to_string(),
            String::new(),
            "_itxn_submit:".to_string(),
            format!("  load {}", slot),
            "  bz _itxn_submit__0".to_string(),
            "  retsub // in a group, don't submit".to_string(),
            "  _itxn_submit__0: itxn_submit; retsub // no group, submit".to_string(),
            String::new(),
            "_itxn_group_submit:".to_string(),
            "  itxn_submit".to_string(),
            format!("  int 0; store {}; retsub // set group flag to 0", slot),
        ];
        for line in &lines {
            self.writer.write(None, line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::typechecker::TypeChecker;
    use std::collections::BTreeMap;

    fn compile(source: &str) -> String {
        compile_with_macro_flag(source, None).0
    }

    fn compile_with_macro_flag(
        source: &str,
        inner_txn_macro: Option<bool>,
    ) -> (String, usize) {
        let (mut program, artifacts) = Parser::new(source).parse().expect("parse");
        let mut scopes = artifacts.scopes;
        let registry = artifacts.registry;
        let mut max_slot = 0;
        let mut error_messages = BTreeMap::new();
        let mut use_macro = inner_txn_macro;
        let mut checker = TypeChecker {
            scopes: &mut scopes,
            registry: &registry,
            max_slot: &mut max_slot,
            error_messages: &mut error_messages,
            use_inner_txns_macro: &mut use_macro,
        };
        checker.check_program(&mut program).expect("process");
        let flag_slot = scopes
            .lookup_var(program.scope, "inner_group_flag")
            .map(|v| v.slot);
        let codegen = CodeGen::new(use_macro == Some(true), flag_slot);
        let writer = codegen.write_program(&program).expect("write");
        (writer.output(), max_slot)
    }

    fn opcode_lines(teal: &str) -> Vec<String> {
        teal.lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with("//"))
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_const_lowering() {
        let teal = compile("#pragma version 8\nconst int X = 10\nexit(1)\n");
        assert!(teal.contains("#define X 10"));
    }

    #[test]
    fn test_var_declaration_lowering() {
        let teal = compile("#pragma version 8\nint x = 5\nexit(1)\n");
        let ops = opcode_lines(&teal);
        assert_eq!(
            ops,
            vec![
                "#pragma version 8",
                "pushint 5",
                "store 0 // x",
                "pushint 1",
                "return"
            ]
        );
    }

    #[test]
    fn test_if_lowering() {
        let teal = compile("#pragma version 8\nint x = 5\nif x == 1:\n    exit(1)\nend\nexit(0)\n");
        let ops = opcode_lines(&teal);
        let expected = vec![
            "#pragma version 8",
            "pushint 5",
            "store 0 // x",
            "load 0 // x",
            "pushint 1",
            "==",
            "bz l0_end",
            "pushint 1",
            "return",
            "l0_end:",
            "pushint 0",
            "return",
        ];
        assert_eq!(ops, expected);
    }

    #[test]
    fn test_if_not_uses_bnz() {
        let teal = compile("#pragma version 8\nif not 1:\n    assert(1)\nend\nexit(1)\n");
        assert!(teal.contains("bnz l0_end"));
    }

    #[test]
    fn test_if_elif_else_lowering() {
        let teal = compile(
            "#pragma version 8\nint x = 5\nif x == 1:\n    assert(1)\nelif x == 2:\n    assert(2)\nelse:\n    assert(3)\nend\nexit(1)\n",
        );
        assert!(teal.contains("bz l0_elif_0"));
        assert!(teal.contains("l0_elif_0:"));
        assert!(teal.contains("l0_else:"));
        assert!(teal.contains("l0_end:"));
        // then and elif branches jump over the remaining branches
        assert_eq!(teal.matches("b l0_end").count(), 2);
    }

    #[test]
    fn test_while_lowering() {
        let teal = compile(
            "#pragma version 8\nint x = 3\nwhile x > 0:\n    x = x - 1\nend\nexit(1)\n",
        );
        let ops = opcode_lines(&teal);
        let start = ops.iter().position(|l| l == "l0_while:").unwrap();
        assert_eq!(
            &ops[start..start + 5],
            &[
                "l0_while:",
                "load 0 // x",
                "pushint 0",
                ">",
                "bz l0_end"
            ]
        );
        assert!(ops.contains(&"b l0_while".to_string()));
        assert!(ops.contains(&"l0_end:".to_string()));
    }

    #[test]
    fn test_break_lowering() {
        let teal = compile(
            "#pragma version 8\nwhile 1:\n    break\nend\nexit(1)\n",
        );
        assert!(teal.contains("b l0_end"));
    }

    #[test]
    fn test_for_lowering() {
        let teal = compile("#pragma version 8\nfor i in 0:3:\n    assert(1)\nend\nexit(1)\n");
        let ops = opcode_lines(&teal);
        let expected = vec![
            "#pragma version 8",
            "pushint 0",
            "store 0 // i",
            "l0_for:",
            "load 0 // i",
            "pushint 3",
            "==",
            "bnz l0_end",
            "pushint 1",
            "assert",
            "load 0 // i",
            "pushint 1",
            "+",
            "store 0 // i",
            "b l0_for",
            "l0_end:",
            "pushint 1",
            "return",
        ];
        assert_eq!(ops, expected);
    }

    #[test]
    fn test_for_unnamed_counts_on_stack() {
        let teal = compile(
            "#pragma version 8\nfor _ in 0:3:\n    assert(1)\nend\nexit(1)\n",
        );
        let ops = opcode_lines(&teal);
        assert!(ops.contains(&"dup".to_string()));
        // exit path pops the stacked counter
        let end = ops.iter().position(|l| l == "l0_end:").unwrap();
        assert_eq!(ops[end + 1], "pop");
        // no scratch slot is touched
        assert!(!teal.contains("store"));
    }

    #[test]
    fn test_switch_lowering() {
        let teal = compile(
            "#pragma version 8\nswitch 1:\n    1: main\n    2: other\nend\nblock main:\n    exit(1)\nend\nblock other:\n    exit(0)\nend\n",
        );
        assert!(teal.contains("bnz main"));
        assert!(teal.contains("bnz other"));
        assert!(teal.contains("err // unexpected value"));
    }

    #[test]
    fn test_switch_else_branches_to_block() {
        let teal = compile(
            "#pragma version 8\nswitch 1:\n    1: main\n    else: other\nend\nblock main:\n    exit(1)\nend\nblock other:\n    exit(0)\nend\n",
        );
        assert!(teal.contains("b other // else"));
    }

    #[test]
    fn test_jump_and_block_labels() {
        let teal = compile(
            "#pragma version 8\njump main\nblock main:\n    jump inner\n    block inner:\n        exit(1)\n    end\nend\n",
        );
        assert!(teal.contains("b main"));
        assert!(teal.contains("main:"));
        assert!(teal.contains("b main__inner"));
        assert!(teal.contains("main__inner:"));
    }

    #[test]
    fn test_func_lowering() {
        let teal = compile(
            "#pragma version 8\nexit(1)\nfunc add(a: int, b: int) int:\n    return a + b\nend\n",
        );
        assert!(teal.contains("__func__add:"));
        // params stored in reverse order: b first
        assert!(teal.contains("store 0 // b [int]"));
        assert!(teal.contains("store 1 // a [int]"));
        assert!(teal.contains("retsub"));
    }

    #[test]
    fn test_return_values_emitted_in_reverse() {
        let teal = compile(
            "#pragma version 8\nexit(1)\nfunc two() int, int:\n    return 1, 2\nend\n",
        );
        let ops = opcode_lines(&teal);
        let label = ops.iter().position(|l| l == "__func__two:").unwrap();
        assert_eq!(&ops[label + 1..label + 4], &["pushint 2", "pushint 1", "retsub"]);
    }

    #[test]
    fn test_router_lowering() {
        let teal = compile(
            "#pragma version 8\nrouter:\n    foo\nend\n@public(OnCompletion=NoOp)\nfunc foo() int:\n    return 1\nend\n",
        );
        assert!(teal.contains("pushbytes \"foo\""));
        assert!(teal.contains("txna ApplicationArgs 0"));
        assert!(teal.contains("match route_foo"));
        assert!(teal.contains("route_foo:"));
        assert!(teal
            .contains("txn OnCompletion; pushint 0; ==; assert // assert OnCompletion == NoOp"));
        assert!(teal.contains("callsub __func__foo"));
        assert!(teal.contains("itob"));
        assert!(teal.contains("pushbytes 0x151f7c75; swap; concat; log // arc4 return log"));
        assert!(teal.contains("pushint 1; return"));
    }

    #[test]
    fn test_router_create_application_route() {
        let teal = compile(
            "#pragma version 8\nrouter:\n    create\nend\n@public(OnCompletion=CreateApplication)\nfunc create():\n    return\nend\n",
        );
        assert!(teal.contains("txn ApplicationID; pushint 0; ==; assert // ApplicationID == 0"));
    }

    #[test]
    fn test_router_demarshals_args() {
        let teal = compile(
            "#pragma version 8\nrouter:\n    f\nend\n@public(OnCompletion=NoOp)\nfunc f(a: int, b: bytes):\n    return\nend\n",
        );
        assert!(teal.contains("txna ApplicationArgs 1; btoi"));
        assert!(teal.contains("txna ApplicationArgs 2"));
    }

    #[test]
    fn test_inner_group_uses_macro() {
        let source = "#pragma version 8\ninner_group:\n    inner_txn:\n        TypeEnum: Pay\n    end\n    inner_txn:\n        TypeEnum: Pay\n    end\nend\nexit(1)\n";
        let (teal, max_slot) = compile_with_macro_flag(source, None);
        assert_eq!(teal.matches("callsub _itxn_group_begin").count(), 1);
        assert_eq!(teal.matches("callsub _itxn_begin").count(), 2);
        assert_eq!(teal.matches("callsub _itxn_submit").count(), 2);
        assert_eq!(teal.matches("callsub _itxn_group_submit").count(), 1);
        // epilogue defines the four subroutines on the flag slot above
        // every other allocation
        assert!(teal.contains("_itxn_group_begin:"));
        assert!(teal.contains("_itxn_begin:"));
        assert!(teal.contains("_itxn_submit:"));
        assert!(teal.contains("_itxn_group_submit:"));
        assert_eq!(max_slot, 1);
        assert!(teal.contains("load 1; !; assert // ensure no group active"));
    }

    #[test]
    fn test_bare_inner_txn_without_macro() {
        let teal = compile(
            "#pragma version 8\ninner_txn:\n    TypeEnum: Pay\n    Amount: 1\nend\nexit(1)\n",
        );
        assert!(teal.contains("itxn_begin"));
        assert!(teal.contains("itxn_field TypeEnum"));
        assert!(teal.contains("itxn_field Amount"));
        assert!(teal.contains("itxn_submit"));
        assert!(!teal.contains("callsub _itxn_begin"));
        assert!(!teal.contains("_itxn_group_begin:"));
    }

    #[test]
    fn test_bare_inner_txn_with_macro_forced_on() {
        let source = "#pragma version 8\ninner_txn:\n    TypeEnum: Pay\nend\nexit(1)\n";
        let (teal, _) = compile_with_macro_flag(source, Some(true));
        assert!(teal.contains("callsub _itxn_begin"));
        assert!(teal.contains("callsub _itxn_submit"));
        assert!(teal.contains("_itxn_group_begin:"));
    }

    #[test]
    fn test_struct_field_assignment_lowering() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    asset_id: int\n    price: int\nend\nItem item = Cast(bzero(SizeOf(Item)), Item)\nitem.price = 5\nexit(1)\n",
        );
        assert!(teal.contains("itob; load 0; swap; replace 8; store 0; // set item.price"));
    }

    #[test]
    fn test_struct_field_read_lowering() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    asset_id: int\n    price: int\nend\nItem item = Cast(bzero(SizeOf(Item)), Item)\nint p = item.price\nexit(1)\n",
        );
        assert!(teal.contains("extract 8 8 // .price"));
        assert!(teal.contains("btoi"));
    }

    #[test]
    fn test_narrow_int_field_write_pads() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    count: uint8\nend\nItem item = Cast(bzero(SizeOf(Item)), Item)\nitem.count = 5\nexit(1)\n",
        );
        assert!(teal.contains("itob; extract 7 1; load 0; swap; replace 0; store 0"));
    }

    #[test]
    fn test_box_lowering() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    price: int\nend\nbox<Item> b = OpenBox(\"key\")\nb.price = 5\nint p = b.price\nexit(1)\n",
        );
        assert!(teal
            .contains("dup; box_len; assert; pushint 8; ==; assert // len(box) == Item.size"));
        assert!(teal.contains("store 0 // box:b"));
        assert!(teal.contains("itob; load 0; pushint 0; uncover 2; box_replace; // boxset b.price"));
        assert!(teal.contains("box_extract // .price"));
    }

    #[test]
    fn test_box_create_lowering() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    price: int\nend\nbox<Item> b = CreateBox(\"key\")\nexit(1)\n",
        );
        assert!(teal.contains("dup; pushint 8; box_create; assert // create & assert created"));
    }

    #[test]
    fn test_box_open_or_create_lowering() {
        let teal = compile(
            "#pragma version 8\nstruct Item:\n    price: int\nend\nbox<Item> b = OpenOrCreateBox(\"key\")\nexit(1)\n",
        );
        assert!(teal.contains("dup; pushint 8; box_create; pop // create if didn't already exist"));
    }

    #[test]
    fn test_assert_with_message_annotated() {
        let teal = compile("#pragma version 8\nassert(1, \"must hold\")\nexit(1)\n");
        assert!(teal.contains("assert // must hold"));
    }

    #[test]
    fn test_teal_passthrough() {
        let teal = compile("#pragma version 8\nteal:\n    pushint 42\n    pop\nend\nexit(1)\n");
        assert!(teal.contains("pushint 42"));
        assert!(teal.contains("pop"));
    }

    #[test]
    fn test_discard_assignment_pops() {
        let teal = compile(
            "#pragma version 8\nint a\na, _ = two()\nexit(1)\nfunc two() int, int:\n    return 1, 2\nend\n",
        );
        assert!(teal.contains("store 0 // a"));
        assert!(teal.contains("pop // discarding value for _"));
    }

    #[test]
    fn test_source_annotations_present() {
        let teal = compile("#pragma version 8\nint x = 5\nexit(1)\n");
        assert!(teal.contains("// tl:2: int x = 5 [slot 0]"));
        assert!(teal.contains("// tl:3: exit(1)"));
    }
}
