//! Compilation driver
//!
//! Owns the per-compilation mutable state (symbol tables, type registry,
//! conditional counter, max slot, assert-message map, inner-txn-macro
//! flag) and orchestrates the three passes: build, process, write.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::ast::Program;
use crate::codegen::CodeGen;
use crate::errors::{CompileError, Error, ParseError};
use crate::parser::Parser;
use crate::scope::Scopes;
use crate::typechecker::TypeChecker;
use crate::types::TypeRegistry;

/// Compilation options.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Force the inner-transaction macro on or off. `None` enables it
    /// automatically when the program contains an `inner_group`.
    pub inner_txn_macro: Option<bool>,
}

/// One emitted TEAL line mapped back to its tealish source line.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMapEntry {
    pub teal_line: usize,
    pub source_line: Option<usize>,
}

/// The result of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub teal: String,
    pub source_map: Vec<SourceMapEntry>,
    pub max_slot: usize,
}

pub struct Compiler {
    pub registry: TypeRegistry,
    pub scopes: Scopes,
    pub conditional_count: usize,
    pub max_slot: usize,
    /// Assert messages by source line, for diagnostics tooling
    pub error_messages: BTreeMap<usize, String>,
    pub use_inner_txns_macro: Option<bool>,
    program: Program,
}

impl Compiler {
    /// Run the build pass.
    pub fn parse(source: &str, config: &CompilerConfig) -> Result<Self, ParseError> {
        debug!("running build pass");
        let (program, artifacts) = Parser::new(source).parse()?;
        Ok(Compiler {
            registry: artifacts.registry,
            scopes: artifacts.scopes,
            conditional_count: artifacts.conditional_count,
            max_slot: 0,
            error_messages: BTreeMap::new(),
            use_inner_txns_macro: config.inner_txn_macro,
            program,
        })
    }

    /// Run the process pass: semantic checks and symbol resolution.
    pub fn process(&mut self) -> Result<(), CompileError> {
        let mut checker = TypeChecker {
            scopes: &mut self.scopes,
            registry: &self.registry,
            max_slot: &mut self.max_slot,
            error_messages: &mut self.error_messages,
            use_inner_txns_macro: &mut self.use_inner_txns_macro,
        };
        checker.check_program(&mut self.program)
    }

    /// Run the write pass over the processed AST.
    pub fn write_teal(&self) -> Result<CompileOutput, CompileError> {
        let use_macro = self.use_inner_txns_macro == Some(true);
        let flag_slot = self
            .scopes
            .lookup_var(self.program.scope, "inner_group_flag")
            .map(|v| v.slot);
        let codegen = CodeGen::new(use_macro, flag_slot);
        let writer = codegen.write_program(&self.program)?;
        let source_map = writer
            .source_map()
            .into_iter()
            .map(|m| SourceMapEntry {
                teal_line: m.teal_line,
                source_line: m.source_line,
            })
            .collect();
        Ok(CompileOutput {
            teal: writer.output(),
            source_map,
            max_slot: self.max_slot,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Compile tealish source to TEAL in one call.
pub fn compile(source: &str, config: &CompilerConfig) -> Result<CompileOutput, Error> {
    let mut compiler = Compiler::parse(source, config)?;
    compiler.process()?;
    let output = compiler.write_teal()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_pass_pipeline() {
        let mut compiler =
            Compiler::parse("#pragma version 8\nint x = 5\nexit(1)\n", &CompilerConfig::default())
                .unwrap();
        compiler.process().unwrap();
        let output = compiler.write_teal().unwrap();
        assert!(output.teal.contains("pushint 5"));
        assert_eq!(output.max_slot, 0);
    }

    #[test]
    fn test_source_map_points_at_source_lines() {
        let output = compile(
            "#pragma version 8\nint x = 5\nexit(1)\n",
            &CompilerConfig::default(),
        )
        .unwrap();
        let store_line = output
            .teal
            .lines()
            .position(|l| l.contains("store 0 // x"))
            .unwrap();
        assert_eq!(output.source_map[store_line].source_line, Some(2));
    }

    #[test]
    fn test_error_messages_exposed() {
        let mut compiler = Compiler::parse(
            "#pragma version 8\nassert(1, \"too small\")\nexit(1)\n",
            &CompilerConfig::default(),
        )
        .unwrap();
        compiler.process().unwrap();
        assert_eq!(
            compiler.error_messages.get(&2).map(String::as_str),
            Some("too small")
        );
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = compile("#pragma version 8\n???\n", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_compile_error_surfaces() {
        let err = compile(
            "#pragma version 8\nmissing = 1\nexit(1)\n",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }
}
