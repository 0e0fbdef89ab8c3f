//! Semantic analysis: the process pass
//!
//! Runs top-down over the built AST. Resolves types and names, allocates
//! scratch slots, wires conditional branch labels, validates router routes
//! and inner-transaction field indices, and records assert messages. Nodes
//! are mutated in place with the resolved information; code generation
//! afterwards is read-only.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ast::{
    AssignTarget, FieldAssign, FuncNode, IfStatement, InnerTxnNode, Program, RouterNode,
    Statement, SwitchStatement,
};
use crate::avm;
use crate::errors::CompileError;
use crate::expr::{parse_expression, Expr, ExprCtx, ExprTy};
use crate::scope::{ConstDef, ScopeId, Scopes, Var};
use crate::types::{AvmType, Type, TypeRegistry};

pub struct TypeChecker<'a> {
    pub scopes: &'a mut Scopes,
    pub registry: &'a TypeRegistry,
    pub max_slot: &'a mut usize,
    pub error_messages: &'a mut BTreeMap<usize, String>,
    pub use_inner_txns_macro: &'a mut Option<bool>,
}

fn err_at(message: impl Into<String>, line_no: usize) -> CompileError {
    CompileError::new(message, Some(line_no))
}

impl TypeChecker<'_> {
    pub fn check_program(&mut self, program: &mut Program) -> Result<(), CompileError> {
        debug!("running process pass");
        let scope = program.scope;
        for stmt in &mut program.body {
            self.check_statement(stmt, scope)?;
        }

        // enable the inner-txn macro if it is needed and not explicitly
        // disabled, then reserve its flag slot above every allocated slot
        if self.use_inner_txns_macro.is_none() && program.has_inner_group() {
            *self.use_inner_txns_macro = Some(true);
        }
        if *self.use_inner_txns_macro == Some(true) {
            let slot = *self.max_slot + 1;
            let var = self
                .scopes
                .declare_var_at(scope, "inner_group_flag", Type::Int, slot)
                .map_err(|e| CompileError::new(e, None))?;
            *self.max_slot = (*self.max_slot).max(var.slot);
        }
        Ok(())
    }

    fn declare_var(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: Type,
        line_no: usize,
    ) -> Result<Var, CompileError> {
        let var = self
            .scopes
            .declare_var(scope, name, ty)
            .map_err(|e| err_at(e, line_no))?;
        *self.max_slot = (*self.max_slot).max(var.slot);
        Ok(var)
    }

    fn process_expr(
        &self,
        expr: &mut Expr,
        scope: ScopeId,
        line_no: usize,
    ) -> Result<ExprTy, CompileError> {
        let ctx = ExprCtx {
            scopes: &*self.scopes,
            registry: self.registry,
            scope,
            line_no,
        };
        expr.process(&ctx)
    }

    fn process_expr_single(
        &self,
        expr: &mut Expr,
        scope: ScopeId,
        line_no: usize,
        what: &str,
    ) -> Result<Type, CompileError> {
        match self.process_expr(expr, scope, line_no)? {
            ExprTy::Single(t) => Ok(t),
            ExprTy::None => Err(err_at(
                format!("Expression used in {} has no value", what),
                line_no,
            )),
            ExprTy::Multi(ts) => Err(err_at(
                format!("Expression used in {} has {} values", what, ts.len()),
                line_no,
            )),
        }
    }

    fn expect_int(&self, t: &Type, what: &str, line_no: usize) -> Result<(), CompileError> {
        if t.is_int() || *t == Type::Any {
            Ok(())
        } else {
            Err(err_at(
                format!("Incorrect type for {}. Expected int, got {}", what, t),
                line_no,
            ))
        }
    }

    fn check_body(&mut self, body: &mut [Statement], scope: ScopeId) -> Result<(), CompileError> {
        for stmt in body {
            self.check_statement(stmt, scope)?;
        }
        Ok(())
    }

    fn check_statement(
        &mut self,
        stmt: &mut Statement,
        scope: ScopeId,
    ) -> Result<(), CompileError> {
        match stmt {
            Statement::TealVersion { .. }
            | Statement::Comment { .. }
            | Statement::Blank { .. }
            | Statement::Teal { .. }
            | Statement::Break { .. }
            | Statement::StructDef(_) => Ok(()),

            Statement::Const {
                type_name,
                name,
                literal,
                line_no,
                ..
            } => {
                let ty = self
                    .registry
                    .get_type_instance(type_name)
                    .map_err(|_| err_at(format!("Unknown type \"{}\"", type_name), *line_no))?;
                let literal_ty =
                    self.process_expr_single(literal, scope, *line_no, "const")?;
                if !ty.can_hold(&literal_ty) {
                    return Err(err_at(
                        format!("Incorrect type {} for const {}", literal_ty, ty),
                        *line_no,
                    ));
                }
                self.scopes
                    .declare_const(
                        scope,
                        name,
                        ConstDef {
                            ty,
                            literal: literal.unparse(),
                        },
                    )
                    .map_err(|e| err_at(e, *line_no))
            }

            Statement::VarDeclaration {
                type_name,
                name,
                expression,
                var,
                line,
                line_no,
            } => {
                let ty = self
                    .registry
                    .get_type_instance(type_name)
                    .map_err(|_| err_at(format!("Unknown type \"{}\"", type_name), *line_no))?;
                let declared = self.declare_var(scope, name, ty, *line_no)?;
                if let Some(expr) = expression {
                    let got =
                        self.process_expr_single(expr, scope, *line_no, "declaration")?;
                    if !declared.ty.can_hold(&got) {
                        let lhs = format!("{} {}", type_name, name);
                        return Err(err_at(
                            self.mismatch_message(
                                "assignment",
                                line,
                                *line_no,
                                type_name,
                                &got,
                                &declared.ty,
                                &lhs,
                                &expr.unparse(),
                            ),
                            *line_no,
                        ));
                    }
                }
                *var = Some(declared);
                Ok(())
            }

            Statement::Assignment {
                names,
                expression,
                targets,
                line_no,
                ..
            } => {
                let incoming = self.process_expr(expression, scope, *line_no)?.types();
                if incoming.len() != names.len() {
                    return Err(err_at(
                        format!(
                            "Incorrect number of names ({}) for values ({}) in assignment",
                            names.len(),
                            incoming.len()
                        ),
                        *line_no,
                    ));
                }
                targets.clear();
                for (name, got) in names.iter().zip(&incoming) {
                    if name == "_" {
                        targets.push(AssignTarget::Discard);
                        continue;
                    }
                    let var = self.scopes.lookup_var(scope, name).ok_or_else(|| {
                        err_at(
                            format!("Var \"{}\" not declared in current scope", name),
                            *line_no,
                        )
                    })?;
                    if !var.ty.can_hold(got) {
                        return Err(err_at(
                            format!(
                                "Incorrect type for assignment. Expected {}, got {}",
                                var.ty, got
                            ),
                            *line_no,
                        ));
                    }
                    targets.push(AssignTarget::Slot {
                        name: name.clone(),
                        slot: var.slot,
                    });
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
                let var = self
                    .scopes
                    .lookup_var(scope, name)
                    .cloned()
                    .ok_or_else(|| {
                        err_at(format!("Could not find struct with name: {}", name), *line_no)
                    })?;
                let (struct_name, is_box) = match &var.ty {
                    Type::Struct(s) => (s.clone(), false),
                    Type::Box(s) => (s.clone(), true),
                    _ => {
                        return Err(err_at(
                            format!("{} is not a struct or Box reference", name),
                            *line_no,
                        ))
                    }
                };
                let struct_type = self.registry.get_struct(&struct_name).ok_or_else(|| {
                    err_at(format!("Unknown struct \"{}\"", struct_name), *line_no)
                })?;
                let field = struct_type.field(field_name).ok_or_else(|| {
                    err_at(
                        format!("Unknown field \"{}\" of struct {}", field_name, struct_name),
                        *line_no,
                    )
                })?;
                let field_assign = FieldAssign {
                    slot: var.slot,
                    offset: field.offset,
                    size: field.size,
                    ty: field.ty.clone(),
                    is_box,
                };
                let got =
                    self.process_expr_single(expression, scope, *line_no, "field assignment")?;
                if !field_assign.ty.can_hold(&got) {
                    let field_type_name = field_assign.ty.to_string();
                    let lhs = format!("{}.{}", name, field_name);
                    return Err(err_at(
                        self.mismatch_message(
                            "struct field assignment",
                            line,
                            *line_no,
                            &field_type_name,
                            &got,
                            &field_assign.ty,
                            &lhs,
                            &expression.unparse(),
                        ),
                        *line_no,
                    ));
                }
                *resolved = Some(field_assign);
                Ok(())
            }

            Statement::BoxDeclaration {
                struct_name,
                name,
                key,
                var,
                box_size,
                line_no,
                ..
            } => {
                let size = self
                    .registry
                    .get_struct(struct_name)
                    .map(|s| s.size)
                    .ok_or_else(|| {
                        err_at(format!("Unknown struct \"{}\"", struct_name), *line_no)
                    })?;
                *box_size = Some(size);
                let declared = self.declare_var(
                    scope,
                    name,
                    Type::Box(struct_name.clone()),
                    *line_no,
                )?;
                *var = Some(declared);
                let key_ty = self.process_expr_single(key, scope, *line_no, "box key")?;
                if !Type::Bytes(None).can_hold(&key_ty) {
                    return Err(err_at(
                        format!("Incorrect type for box key. Expected bytes, got {}", key_ty),
                        *line_no,
                    ));
                }
                Ok(())
            }

            Statement::Assert {
                arg,
                message,
                line_no,
                ..
            } => {
                let t = self.process_expr_single(arg, scope, *line_no, "assert")?;
                if !t.is_int() && t != Type::Any {
                    return Err(err_at(
                        format!(
                            "Incorrect type for assert. Expected int, got {} at line {}.",
                            t, line_no
                        ),
                        *line_no,
                    ));
                }
                if let Some(m) = message {
                    self.error_messages.insert(*line_no, m.clone());
                }
                Ok(())
            }

            Statement::FunctionCallStatement {
                expression,
                line_no,
                ..
            } => {
                let ty = self.process_expr(expression, scope, *line_no)?;
                if !ty.types().is_empty() {
                    let func_name = match expression {
                        Expr::Call { name, .. } => name.clone(),
                        _ => "expression".to_string(),
                    };
                    return Err(err_at(
                        format!("Unconsumed return values ({}) from {}", ty, func_name),
                        *line_no,
                    ));
                }
                Ok(())
            }

            Statement::Exit {
                expression,
                line_no,
                ..
            } => {
                self.process_expr(expression, scope, *line_no)?;
                Ok(())
            }

            Statement::Jump {
                block_name,
                label,
                line_no,
                ..
            } => {
                let found = self
                    .scopes
                    .lookup_block(scope, block_name)
                    .ok_or_else(|| {
                        err_at(format!("Unknown block \"{}\"", block_name), *line_no)
                    })?;
                *label = Some(found.to_string());
                Ok(())
            }

            Statement::Return {
                expressions,
                expected,
                line_no,
                ..
            } => {
                for (expr, want) in expressions.iter_mut().zip(expected.iter()) {
                    let got = self.process_expr_single(expr, scope, *line_no, "return")?;
                    if !want.can_hold(&got) {
                        return Err(err_at(
                            format!(
                                "Incorrect type for return value. Expected {}, got {}",
                                want, got
                            ),
                            *line_no,
                        ));
                    }
                }
                Ok(())
            }

            Statement::If(n) => self.check_if(n, scope),
            Statement::While(n) => {
                self.scopes.inherit_slot_floor(n.scope);
                let t = self.process_expr_single(
                    &mut n.condition,
                    n.scope,
                    n.line_no,
                    "while condition",
                )?;
                self.expect_int(&t, "while condition", n.line_no)?;
                let inner = n.scope;
                self.check_body(&mut n.body, inner)
            }
            Statement::For(n) => {
                self.scopes.inherit_slot_floor(n.scope);
                let var = self.declare_var(n.scope, &n.var_name, Type::Int, n.line_no)?;
                let t =
                    self.process_expr_single(&mut n.start, n.scope, n.line_no, "for range")?;
                self.expect_int(&t, "for range", n.line_no)?;
                let t = self.process_expr_single(&mut n.end, n.scope, n.line_no, "for range")?;
                self.expect_int(&t, "for range", n.line_no)?;
                let inner = n.scope;
                self.check_body(&mut n.body, inner)?;
                self.scopes.del_var(n.scope, &n.var_name);
                n.var = Some(var);
                Ok(())
            }
            Statement::ForUnnamed(n) => {
                self.scopes.inherit_slot_floor(n.scope);
                let t =
                    self.process_expr_single(&mut n.start, n.scope, n.line_no, "for range")?;
                self.expect_int(&t, "for range", n.line_no)?;
                let t = self.process_expr_single(&mut n.end, n.scope, n.line_no, "for range")?;
                self.expect_int(&t, "for range", n.line_no)?;
                let inner = n.scope;
                self.check_body(&mut n.body, inner)
            }
            Statement::Switch(n) => self.check_switch(n, scope),
            Statement::Block(n) => {
                self.scopes.inherit_slot_floor(n.scope);
                let inner = n.scope;
                self.check_body(&mut n.body, inner)
            }
            Statement::Func(n) => self.check_func(n),
            Statement::InnerTxn(n) => self.check_inner_txn(n, scope),
            Statement::InnerGroup(n) => self.check_body(&mut n.body, scope),
            Statement::Router(n) => self.check_router(n, scope),
        }
    }

    fn check_if(&mut self, n: &mut IfStatement, scope: ScopeId) -> Result<(), CompileError> {
        // each branch falls through to the start of the following branch
        let mut labels: Vec<String> = n.elifs.iter().map(|e| e.label.clone()).collect();
        if let Some(e) = &n.else_ {
            labels.push(e.label.clone());
        }
        labels.push(n.end_label.clone());
        n.next_label = labels[0].clone();
        for (i, elif) in n.elifs.iter_mut().enumerate() {
            elif.next_label = labels[i + 1].clone();
        }

        let t =
            self.process_expr_single(&mut n.condition, scope, n.line_no, "if condition")?;
        self.expect_int(&t, "if condition", n.line_no)?;
        self.check_body(&mut n.then_body, scope)?;
        for elif in &mut n.elifs {
            let t = self.process_expr_single(
                &mut elif.condition,
                scope,
                elif.line_no,
                "elif condition",
            )?;
            self.expect_int(&t, "elif condition", elif.line_no)?;
            self.check_body(&mut elif.body, scope)?;
        }
        if let Some(e) = &mut n.else_ {
            self.check_body(&mut e.body, scope)?;
        }
        Ok(())
    }

    fn check_switch(
        &mut self,
        n: &mut SwitchStatement,
        scope: ScopeId,
    ) -> Result<(), CompileError> {
        let switch_ty =
            self.process_expr_single(&mut n.expression, scope, n.line_no, "switch")?;
        for option in &mut n.options {
            let case_ty = self.process_expr_single(
                &mut option.expression,
                scope,
                option.line_no,
                "switch option",
            )?;
            let (a, b) = (switch_ty.avm_type(), case_ty.avm_type());
            if !(a == AvmType::Any || b == AvmType::Any || a == b) {
                return Err(err_at(
                    format!(
                        "Cannot compare {} with {} in switch option",
                        switch_ty, case_ty
                    ),
                    option.line_no,
                ));
            }
            let label = self
                .scopes
                .lookup_block(scope, &option.block_name)
                .ok_or_else(|| {
                    err_at(
                        format!("Unknown block \"{}\"", option.block_name),
                        option.line_no,
                    )
                })?;
            option.label = Some(label.to_string());
        }
        if let Some(e) = &mut n.else_ {
            let label = self
                .scopes
                .lookup_block(scope, &e.block_name)
                .ok_or_else(|| {
                    err_at(format!("Unknown block \"{}\"", e.block_name), e.line_no)
                })?;
            e.label = Some(label.to_string());
        }
        Ok(())
    }

    fn check_func(&mut self, n: &mut FuncNode) -> Result<(), CompileError> {
        self.scopes.inherit_slot_floor(n.scope);
        // declare parameters in reverse so the caller's stack pops
        // top-first at function entry
        let mut param_vars = Vec::with_capacity(n.args.len());
        for ((name, _), ty) in n.args.iter().zip(n.arg_types.iter()).rev() {
            let var = self.declare_var(n.scope, name, ty.clone(), n.line_no)?;
            param_vars.push(var);
        }
        n.param_vars = param_vars;
        let inner = n.scope;
        self.check_body(&mut n.body, inner)
    }

    fn check_inner_txn(
        &mut self,
        n: &mut InnerTxnNode,
        scope: ScopeId,
    ) -> Result<(), CompileError> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for field in &mut n.fields {
            if let Some(index) = field.index {
                let pos = match counts
                    .iter()
                    .position(|(name, _)| *name == field.field_name)
                {
                    Some(p) => p,
                    None => {
                        counts.push((field.field_name.clone(), 0));
                        counts.len() - 1
                    }
                };
                let expected = counts[pos].1;
                if index != expected {
                    return Err(err_at(
                        format!(
                            "Incorrect field array index {} (expected {}) at line {}!",
                            index, expected, field.line_no
                        ),
                        field.line_no,
                    ));
                }
                counts[pos].1 += 1;
            }
            self.process_expr(&mut field.expression, scope, field.line_no)?;
        }
        Ok(())
    }

    fn check_router(&mut self, n: &mut RouterNode, scope: ScopeId) -> Result<(), CompileError> {
        for route in &mut n.routes {
            let sig = self
                .scopes
                .lookup_func(scope, &route.name)
                .cloned()
                .ok_or_else(|| {
                    err_at(format!("Unknown function \"{}\"", route.name), route.line_no)
                })?;
            if !sig.public {
                return Err(err_at(
                    format!("{} is not a public function", route.name),
                    route.line_no,
                ));
            }
            route.func_label = Some(sig.label.clone());
            route.func_returns = sig.returns.clone();
            route.on_completion = sig.on_completion.clone();
            if route.on_completion != "CreateApplication" {
                let value = avm::lookup_constant(&route.on_completion).ok_or_else(|| {
                    err_at(
                        format!("Unknown OnCompletion value \"{}\"", route.on_completion),
                        route.line_no,
                    )
                })?;
                route.oc_value = Some(value);
            }

            // demarshal each application argument per the declared type
            let mut arg_exprs = Vec::with_capacity(sig.args.len());
            for (i, (_, ty)) in sig.args.iter().enumerate() {
                let a = i + 1;
                let text = match ty {
                    Type::Bytes(None) => format!("Txn.ApplicationArgs[{}]", a),
                    Type::Int => format!("FromBytes(Txn.ApplicationArgs[{}], int)", a),
                    Type::UInt(w) if *w != 8 => format!(
                        "Cast(btoi(Txn.ApplicationArgs[{}]), uint{})",
                        a,
                        w * 8
                    ),
                    Type::UInt(_) => {
                        format!("FromBytes(Txn.ApplicationArgs[{}], uint64)", a)
                    }
                    t if t.is_bytes() => {
                        format!("Cast(Txn.ApplicationArgs[{}], {})", a, t)
                    }
                    other => {
                        return Err(err_at(
                            format!(
                                "Unsupported router argument type {} for {}",
                                other, route.name
                            ),
                            route.line_no,
                        ))
                    }
                };
                let mut expr = parse_expression(&text)
                    .map_err(|e| err_at(e, route.line_no))?;
                self.process_expr(&mut expr, scope, route.line_no)?;
                arg_exprs.push(expr);
            }
            route.arg_exprs = arg_exprs;
        }
        Ok(())
    }

    /// Type-mismatch message with a cast suggestion whenever a cast would
    /// succeed, plus a padding suggestion for byte-typed destinations.
    #[allow(clippy::too_many_arguments)]
    fn mismatch_message(
        &self,
        context: &str,
        line: &str,
        line_no: usize,
        expected_name: &str,
        got: &Type,
        dst: &Type,
        lhs: &str,
        expr_text: &str,
    ) -> String {
        let mut message = format!(
            "Incorrect type for {}. Expected {}, got {} at line {}.",
            context, expected_name, got, line_no
        );
        if dst.can_hold_with_cast(got) {
            message.push_str("\nPerhaps Cast or padding is required? ");
            message.push_str(&format!("\n- {}", line));
            message.push_str(&format!(
                "\n+ {} = Cast({}, {})",
                lhs, expr_text, expected_name
            ));
            if !matches!(dst, Type::Struct(_) | Type::Int | Type::UInt(_)) {
                if let Ok(size) = dst.fixed_size(self.registry) {
                    message.push_str(&format!("\n+ {} = Rpad({}, {})", lhs, expr_text, size));
                }
            }
        }
        message
    }
}
