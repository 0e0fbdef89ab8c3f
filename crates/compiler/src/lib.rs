//! Tealish compiler library
//!
//! Compiles tealish - a high-level, statically typed smart contract
//! language - to TEAL assembly for the Algorand Virtual Machine.
//!
//! The pipeline has three passes over a single AST:
//!
//! 1. **build** ([`parser::Parser`]): line-oriented recursive descent with
//!    structural rules (pragma placement, struct ordering, exit-statement
//!    placement).
//! 2. **process** ([`typechecker::TypeChecker`]): scope and slot
//!    allocation, name resolution, type checking, label wiring.
//! 3. **write** ([`codegen::CodeGen`]): deterministic TEAL emission with
//!    source-line annotations.
//!
//! ```rust
//! use tealishc::{compile_source, CompilerConfig};
//!
//! let output = compile_source(
//!     "#pragma version 8\nint x = 5\nexit(1)\n",
//!     &CompilerConfig::default(),
//! )
//! .unwrap();
//! assert!(output.teal.contains("store 0 // x"));
//! ```

pub mod ast;
pub mod avm;
pub mod codegen;
pub mod compiler;
pub mod errors;
pub mod expr;
pub mod parser;
pub mod scope;
pub mod typechecker;
pub mod types;
pub mod writer;

pub use ast::{Program, Statement};
pub use compiler::{CompileOutput, Compiler, CompilerConfig, SourceMapEntry};
pub use errors::{CompileError, Error, ParseError};
pub use parser::Parser;
pub use scope::{Scopes, Var};
pub use typechecker::TypeChecker;
pub use types::{AvmType, StructType, Type, TypeRegistry};
pub use writer::TealWriter;

use std::fs;
use std::path::Path;

/// Compile tealish source text to TEAL.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<CompileOutput, Error> {
    compiler::compile(source, config)
}

/// Compile a tealish source file to TEAL.
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<CompileOutput, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read source file: {}", e))?;
    compile_source(&source, config).map_err(|e| e.to_string())
}

/// Parse a program and re-render it as canonical surface source.
pub fn reformat(source: &str) -> Result<String, ParseError> {
    let (program, _) = Parser::new(source).parse()?;
    Ok(program.unparse())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> CompileOutput {
        compile_source(source, &CompilerConfig::default()).unwrap()
    }

    const MARKETPLACE: &str = "\
#pragma version 8
struct Listing:
    asset_id: int
    price: int
    seller: bytes[32]
end

const int FEE = 1000
int counter = 0

if Txn.ApplicationID == 0:
    exit(1)
end

router:
    list_item
    get_price
end

@public(OnCompletion=NoOp)
func list_item(asset_id: int, price: int) int:
    Listing listing = Cast(bzero(SizeOf(Listing)), Listing)
    listing.asset_id = asset_id
    listing.price = price
    counter = counter + 1
    return counter
end

@public(OnCompletion=NoOp)
func get_price(asset_id: int) int:
    return FEE
end
";

    #[test]
    fn test_marketplace_compiles() {
        let output = compile(MARKETPLACE);
        assert!(output.teal.contains("match route_list_item route_get_price"));
        assert!(output.teal.contains("__func__list_item:"));
        assert!(output.teal.contains("#define FEE 1000"));
    }

    #[test]
    fn test_deterministic_output() {
        let a = compile(MARKETPLACE);
        let b = compile(MARKETPLACE);
        assert_eq!(a.teal, b.teal);
    }

    #[test]
    fn test_label_uniqueness() {
        let output = compile(MARKETPLACE);
        let mut labels = Vec::new();
        for line in output.teal.lines() {
            let trimmed = line.trim();
            if trimmed.ends_with(':')
                && !trimmed.starts_with("//")
                && !trimmed.contains(' ')
            {
                labels.push(trimmed.to_string());
            }
        }
        let mut deduped = labels.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(labels.len(), deduped.len(), "duplicate labels in {:?}", labels);
    }

    #[test]
    fn test_round_trip_pretty_print() {
        let printed = reformat(MARKETPLACE).unwrap();
        let (first, _) = Parser::new(MARKETPLACE).parse().unwrap();
        let (second, _) = Parser::new(&printed).parse().unwrap();
        assert_eq!(first, second);
        // pretty-printing is a fixed point
        assert_eq!(reformat(&printed).unwrap(), printed);
    }

    #[test]
    fn test_slot_monotonicity() {
        let output = compile(
            "#pragma version 8\nint a = 1\nint b = 2\nwhile a:\n    int c = 3\nend\nexit(1)\n",
        );
        assert!(output.teal.contains("store 0 // a"));
        assert!(output.teal.contains("store 1 // b"));
        assert!(output.teal.contains("store 2 // c"));
        assert_eq!(output.max_slot, 2);
    }

    // the literal lowering scenarios

    #[test]
    fn test_scenario_const() {
        let output = compile("#pragma version 8\nconst int X = 10\nexit(1)\n");
        assert!(output.teal.contains("#define X 10"));
    }

    #[test]
    fn test_scenario_var_declaration() {
        let output = compile("#pragma version 8\nint x = 5\nexit(1)\n");
        assert!(output.teal.contains("pushint 5\nstore 0 // x"));
    }

    #[test]
    fn test_scenario_if() {
        let output =
            compile("#pragma version 8\nint x = 1\nif x == 1:\n    exit(1)\nend\nexit(0)\n");
        let teal = output.teal;
        let bz = teal.find("bz l0_end").unwrap();
        let end = teal.find("l0_end:").unwrap();
        assert!(bz < end);
        assert!(teal[bz..end].contains("pushint 1"));
        assert!(teal[bz..end].contains("return"));
    }

    #[test]
    fn test_scenario_for() {
        let output = compile("#pragma version 8\nfor i in 0:3:\n    assert(1)\nend\nexit(1)\n");
        let teal = output.teal;
        assert!(teal.contains("store 0 // i"));
        assert!(teal.contains("l0_for:"));
        assert!(teal.contains("bnz l0_end"));
        assert!(teal.contains("b l0_for"));
    }

    #[test]
    fn test_scenario_router() {
        let output = compile(
            "#pragma version 8\nrouter:\n    foo\nend\n@public(OnCompletion=NoOp)\nfunc foo() int:\n    return 1\nend\n",
        );
        let teal = output.teal;
        assert!(teal.contains("pushbytes \"foo\""));
        assert!(teal.contains("txna ApplicationArgs 0"));
        assert!(teal.contains("match route_foo"));
        assert!(teal.contains("callsub __func__foo"));
        assert!(teal.contains("itob"));
        assert!(teal.contains("pushbytes 0x151f7c75"));
        assert!(teal.contains("pushint 1; return"));
    }

    #[test]
    fn test_scenario_inner_group() {
        let output = compile(
            "#pragma version 8\nint x = 1\ninner_group:\n    inner_txn:\n        TypeEnum: Pay\n    end\n    inner_txn:\n        TypeEnum: Pay\n    end\nend\nexit(1)\n",
        );
        let teal = output.teal;
        assert_eq!(teal.matches("callsub _itxn_group_begin").count(), 1);
        assert_eq!(teal.matches("callsub _itxn_begin").count(), 2);
        assert_eq!(teal.matches("callsub _itxn_submit").count(), 2);
        assert_eq!(teal.matches("callsub _itxn_group_submit").count(), 1);
        // flag slot sits one above max_slot (x is slot 0)
        assert!(teal.contains("load 1; !; assert // ensure no group active"));
    }

    #[test]
    fn test_compile_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.tl");
        std::fs::write(&path, "#pragma version 8\nint x = 5\nexit(1)\n").unwrap();
        let output = compile_file(&path, &CompilerConfig::default()).unwrap();
        assert!(output.teal.contains("store 0 // x"));
    }

    #[test]
    fn test_compile_file_missing() {
        let err = compile_file(
            Path::new("/nonexistent/app.tl"),
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(err.contains("Failed to read source file"));
    }
}
