//! Static AVM opcode and constant catalogue
//!
//! The expression checker consults this table to validate opcode calls and
//! infer their result types. It is a curated subset of the AVM opcode set:
//! the ops reachable from surface expressions. Control-flow and stack
//! manipulation opcodes are emitted directly by the code generator and do
//! not appear here.

use crate::types::AvmType;

/// Signature of an AVM opcode callable from an expression.
pub struct Op {
    pub name: &'static str,
    pub args: &'static [AvmType],
    pub returns: &'static [AvmType],
}

use AvmType::{Any, Bytes, Int};

/// Opcodes callable by name from expressions, e.g. `sha256(b)` or
/// `app_global_get(key)`.
pub static OPS: &[Op] = &[
    // conversions
    Op { name: "itob", args: &[Int], returns: &[Bytes] },
    Op { name: "btoi", args: &[Bytes], returns: &[Int] },
    // hashing
    Op { name: "sha256", args: &[Bytes], returns: &[Bytes] },
    Op { name: "sha512_256", args: &[Bytes], returns: &[Bytes] },
    Op { name: "keccak256", args: &[Bytes], returns: &[Bytes] },
    // byte string ops
    Op { name: "len", args: &[Bytes], returns: &[Int] },
    Op { name: "concat", args: &[Bytes, Bytes], returns: &[Bytes] },
    Op { name: "substring3", args: &[Bytes, Int, Int], returns: &[Bytes] },
    Op { name: "extract3", args: &[Bytes, Int, Int], returns: &[Bytes] },
    Op { name: "getbyte", args: &[Bytes, Int], returns: &[Int] },
    Op { name: "setbyte", args: &[Bytes, Int, Int], returns: &[Bytes] },
    Op { name: "bzero", args: &[Int], returns: &[Bytes] },
    // arithmetic helpers
    Op { name: "sqrt", args: &[Int], returns: &[Int] },
    Op { name: "exp", args: &[Int, Int], returns: &[Int] },
    Op { name: "shl", args: &[Int, Int], returns: &[Int] },
    Op { name: "shr", args: &[Int, Int], returns: &[Int] },
    Op { name: "bitlen", args: &[Any], returns: &[Int] },
    Op { name: "divw", args: &[Int, Int, Int], returns: &[Int] },
    // big-endian byte math (bigint)
    Op { name: "badd", args: &[Bytes, Bytes], returns: &[Bytes] },
    Op { name: "bsub", args: &[Bytes, Bytes], returns: &[Bytes] },
    Op { name: "bmul", args: &[Bytes, Bytes], returns: &[Bytes] },
    Op { name: "bdiv", args: &[Bytes, Bytes], returns: &[Bytes] },
    Op { name: "bmod", args: &[Bytes, Bytes], returns: &[Bytes] },
    // account / app state
    Op { name: "balance", args: &[Any], returns: &[Int] },
    Op { name: "min_balance", args: &[Any], returns: &[Int] },
    Op { name: "app_global_get", args: &[Bytes], returns: &[Any] },
    Op { name: "app_global_put", args: &[Bytes, Any], returns: &[] },
    Op { name: "app_global_del", args: &[Bytes], returns: &[] },
    Op { name: "app_local_get", args: &[Any, Bytes], returns: &[Any] },
    Op { name: "app_local_put", args: &[Any, Bytes, Any], returns: &[] },
    Op { name: "app_local_del", args: &[Any, Bytes], returns: &[] },
    Op { name: "app_opted_in", args: &[Any, Int], returns: &[Int] },
    // boxes
    Op { name: "box_create", args: &[Bytes, Int], returns: &[Int] },
    Op { name: "box_extract", args: &[Bytes, Int, Int], returns: &[Bytes] },
    Op { name: "box_replace", args: &[Bytes, Int, Bytes], returns: &[] },
    Op { name: "box_del", args: &[Bytes], returns: &[Int] },
    // logging
    Op { name: "log", args: &[Bytes], returns: &[] },
];

pub fn lookup_op(name: &str) -> Option<&'static Op> {
    OPS.iter().find(|op| op.name == name)
}

/// Named integer constants usable anywhere an int expression is expected.
/// OnCompletion values and transaction type enums.
pub static CONSTANTS: &[(&str, u64)] = &[
    ("NoOp", 0),
    ("OptIn", 1),
    ("CloseOut", 2),
    ("ClearState", 3),
    ("UpdateApplication", 4),
    ("DeleteApplication", 5),
    ("Pay", 1),
    ("Acfg", 3),
    ("Axfer", 4),
    ("Afrz", 5),
    ("Appl", 6),
];

pub fn lookup_constant(name: &str) -> Option<u64> {
    CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}
