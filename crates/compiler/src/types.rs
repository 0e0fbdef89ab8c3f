//! Type system for Tealish
//!
//! Tealish types describe values held in scratch slots and on the AVM
//! stack. The AVM itself only distinguishes `int` and `bytes`; the richer
//! surface types (sized ints, sized byte arrays, structs, boxes) exist for
//! compile-time checking and are erased down to their AVM type during code
//! generation.

use std::fmt;

/// The type an AVM opcode accepts or returns.
///
/// This is the coarse runtime view: every value on the stack is either a
/// 64-bit unsigned integer or a byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvmType {
    Any,
    Bytes,
    Int,
    /// No value (an opcode that pushes nothing)
    None,
}

impl fmt::Display for AvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvmType::Any => write!(f, "any"),
            AvmType::Bytes => write!(f, "bytes"),
            AvmType::Int => write!(f, "int"),
            AvmType::None => write!(f, ""),
        }
    }
}

/// A surface-language type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Assignable to and from anything
    Any,
    /// Generic unsigned integer, 8 bytes wide
    Int,
    /// Fixed-width unsigned integer of 1..=8 bytes (`uint8` .. `uint64`)
    UInt(usize),
    /// Byte string; `None` means unknown/any length
    Bytes(Option<usize>),
    /// Opaque big-endian integer encoded as bytes
    BigInt,
    /// 32-byte account address
    Addr,
    /// User-defined record type, resolved through the registry
    Struct(String),
    /// Reference to an external box with a struct's layout
    Box(String),
}

impl Type {
    /// The runtime representation of this type.
    pub fn avm_type(&self) -> AvmType {
        match self {
            Type::Any => AvmType::Any,
            Type::Int | Type::UInt(_) => AvmType::Int,
            Type::Bytes(_) | Type::BigInt | Type::Addr | Type::Struct(_) => AvmType::Bytes,
            // A box reference is held as its key name in a scratch slot
            Type::Box(_) => AvmType::Bytes,
        }
    }

    /// Integer width in bytes, for int-like types.
    pub fn int_width(&self) -> Option<usize> {
        match self {
            Type::Int => Some(8),
            Type::UInt(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int | Type::UInt(_))
    }

    pub fn is_bytes(&self) -> bool {
        matches!(
            self,
            Type::Bytes(_) | Type::BigInt | Type::Addr | Type::Struct(_)
        )
    }

    /// Fixed byte size used for struct field layout. Types without a fixed
    /// size (unsized bytes, `any`, box references) cannot be struct fields.
    pub fn fixed_size(&self, registry: &TypeRegistry) -> Result<usize, String> {
        match self {
            Type::Int => Ok(8),
            Type::UInt(n) => Ok(*n),
            Type::Bytes(Some(n)) => Ok(*n),
            Type::Addr => Ok(32),
            Type::Struct(name) => registry
                .get_struct(name)
                .map(|s| s.size)
                .ok_or_else(|| format!("Unknown struct \"{}\"", name)),
            other => Err(format!("Type {} has no fixed size", other)),
        }
    }

    /// The semantic compatibility predicate: can a destination of type
    /// `self` accept a value of type `other` without an explicit cast?
    ///
    /// Reflexive; `any` is top on both sides; int destinations widen
    /// (an 8-byte `int` holds any narrower unsigned int); sized byte
    /// destinations accept shorter-or-equal sized sources. There is no
    /// implicit numeric-to-byte conversion.
    pub fn can_hold(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Int, Type::UInt(_)) => true,
            (Type::UInt(8), Type::Int) => true,
            (Type::UInt(n), Type::UInt(m)) => m <= n,
            (Type::Bytes(None), src) => src.is_bytes(),
            (Type::Bytes(Some(k)), Type::Bytes(Some(j))) => j <= k,
            (Type::Bytes(Some(32)), Type::Addr) => true,
            _ => false,
        }
    }

    /// Whether an explicit `Cast(..)` (or `Rpad(..)` for byte types) would
    /// make the assignment legal. Admits width and length changes within
    /// the same AVM representation; never numeric-to-byte.
    pub fn can_hold_with_cast(&self, other: &Type) -> bool {
        if self.can_hold(other) {
            return true;
        }
        (self.is_int() && other.is_int()) || (self.is_bytes() && other.is_bytes())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Int => write!(f, "int"),
            Type::UInt(n) => write!(f, "uint{}", n * 8),
            Type::Bytes(None) => write!(f, "bytes"),
            Type::Bytes(Some(n)) => write!(f, "bytes[{}]", n),
            Type::BigInt => write!(f, "bigint"),
            Type::Addr => write!(f, "addr"),
            Type::Struct(name) => write!(f, "{}", name),
            Type::Box(name) => write!(f, "box<{}>", name),
        }
    }
}

/// A single field of a struct: a fixed byte range within the flat layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub offset: usize,
    pub size: usize,
    pub ty: Type,
}

/// A user-defined record type with a flat byte layout. Field offsets are
/// the prefix sum of prior field sizes; `size` equals the final prefix sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub name: String,
    /// Insertion-ordered so enumeration is deterministic
    fields: Vec<(String, StructField)>,
    pub size: usize,
}

impl StructType {
    pub fn new(name: impl Into<String>) -> Self {
        StructType {
            name: name.into(),
            fields: Vec::new(),
            size: 0,
        }
    }

    pub fn add_field(
        &mut self,
        name: &str,
        ty: Type,
        registry: &TypeRegistry,
    ) -> Result<(), String> {
        if self.field(name).is_some() {
            return Err(format!(
                "Duplicate field \"{}\" in struct {}",
                name, self.name
            ));
        }
        let size = ty.fixed_size(registry)?;
        let field = StructField {
            offset: self.size,
            size,
            ty,
        };
        self.size += size;
        self.fields.push((name.to_string(), field));
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &StructField)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }
}

/// Per-compilation catalogue of named types.
///
/// Primitive names always resolve; struct names resolve once defined by a
/// `struct` statement. Owned by the compilation context so the compiler
/// stays re-entrant.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    structs: Vec<(String, StructType)>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn define_struct(&mut self, struct_type: StructType) -> Result<(), String> {
        if self.get_struct(&struct_type.name).is_some() {
            return Err(format!("Struct \"{}\" is already defined", struct_type.name));
        }
        self.structs.push((struct_type.name.clone(), struct_type));
        Ok(())
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructType> {
        self.structs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    /// Resolve a surface type name to a `Type`.
    pub fn get_type_instance(&self, name: &str) -> Result<Type, String> {
        match name {
            "any" => return Ok(Type::Any),
            "int" => return Ok(Type::Int),
            "bytes" => return Ok(Type::Bytes(None)),
            "bigint" => return Ok(Type::BigInt),
            "addr" => return Ok(Type::Addr),
            _ => {}
        }
        if let Some(bits) = name.strip_prefix("uint") {
            let bits: usize = bits
                .parse()
                .map_err(|_| format!("Unknown type \"{}\"", name))?;
            if bits % 8 == 0 && (8..=64).contains(&bits) {
                return Ok(Type::UInt(bits / 8));
            }
            return Err(format!("Unknown type \"{}\"", name));
        }
        if let Some(rest) = name.strip_prefix("bytes[") {
            let n = rest
                .strip_suffix(']')
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| format!("Unknown type \"{}\"", name))?;
            return Ok(Type::Bytes(Some(n)));
        }
        if let Some(rest) = name.strip_prefix("box<") {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| format!("Unknown type \"{}\"", name))?;
            if self.get_struct(inner).is_none() {
                return Err(format!("Unknown struct \"{}\"", inner));
            }
            return Ok(Type::Box(inner.to_string()));
        }
        if self.get_struct(name).is_some() {
            return Ok(Type::Struct(name.to_string()));
        }
        Err(format!("Unknown type \"{}\"", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_item() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        let mut item = StructType::new("Item");
        item.add_field("asset_id", Type::Int, &registry).unwrap();
        item.add_field("price", Type::Int, &registry).unwrap();
        item.add_field("seller", Type::Bytes(Some(32)), &registry)
            .unwrap();
        registry.define_struct(item).unwrap();
        registry
    }

    #[test]
    fn test_struct_offsets_are_prefix_sums() {
        let registry = registry_with_item();
        let item = registry.get_struct("Item").unwrap();
        assert_eq!(item.field("asset_id").unwrap().offset, 0);
        assert_eq!(item.field("price").unwrap().offset, 8);
        assert_eq!(item.field("seller").unwrap().offset, 16);
        assert_eq!(item.size, 48);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let registry = TypeRegistry::new();
        let mut s = StructType::new("S");
        s.add_field("a", Type::Int, &registry).unwrap();
        let err = s.add_field("a", Type::Int, &registry).unwrap_err();
        assert!(err.contains("Duplicate field"));
    }

    #[test]
    fn test_can_hold_reflexive_and_any() {
        assert!(Type::Int.can_hold(&Type::Int));
        assert!(Type::Any.can_hold(&Type::Bytes(None)));
        assert!(Type::Bytes(Some(4)).can_hold(&Type::Any));
    }

    #[test]
    fn test_int_widening() {
        assert!(Type::Int.can_hold(&Type::UInt(1)));
        assert!(Type::Int.can_hold(&Type::UInt(8)));
        assert!(!Type::UInt(2).can_hold(&Type::Int));
        assert!(Type::UInt(4).can_hold(&Type::UInt(2)));
        assert!(!Type::UInt(2).can_hold(&Type::UInt(4)));
        // but a cast can narrow
        assert!(Type::UInt(2).can_hold_with_cast(&Type::Int));
    }

    #[test]
    fn test_bytes_length_accommodation() {
        assert!(Type::Bytes(Some(8)).can_hold(&Type::Bytes(Some(4))));
        assert!(Type::Bytes(Some(8)).can_hold(&Type::Bytes(Some(8))));
        assert!(!Type::Bytes(Some(4)).can_hold(&Type::Bytes(Some(8))));
        assert!(Type::Bytes(None).can_hold(&Type::Bytes(Some(100))));
        assert!(Type::Bytes(None).can_hold(&Type::Addr));
        // unknown length into sized destination needs a pad or cast
        assert!(!Type::Bytes(Some(4)).can_hold(&Type::Bytes(None)));
        assert!(Type::Bytes(Some(4)).can_hold_with_cast(&Type::Bytes(None)));
    }

    #[test]
    fn test_no_implicit_numeric_to_bytes() {
        assert!(!Type::Bytes(None).can_hold(&Type::Int));
        assert!(!Type::Bytes(None).can_hold_with_cast(&Type::Int));
        assert!(!Type::Int.can_hold_with_cast(&Type::Bytes(Some(8))));
    }

    #[test]
    fn test_type_instance_names() {
        let registry = registry_with_item();
        assert_eq!(registry.get_type_instance("int").unwrap(), Type::Int);
        assert_eq!(registry.get_type_instance("uint8").unwrap(), Type::UInt(1));
        assert_eq!(
            registry.get_type_instance("uint64").unwrap(),
            Type::UInt(8)
        );
        assert_eq!(
            registry.get_type_instance("bytes[32]").unwrap(),
            Type::Bytes(Some(32))
        );
        assert_eq!(
            registry.get_type_instance("Item").unwrap(),
            Type::Struct("Item".to_string())
        );
        assert_eq!(
            registry.get_type_instance("box<Item>").unwrap(),
            Type::Box("Item".to_string())
        );
        assert!(registry.get_type_instance("uint7").is_err());
        assert!(registry.get_type_instance("Missing").is_err());
        assert!(registry.get_type_instance("box<Missing>").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Type::UInt(2)), "uint16");
        assert_eq!(format!("{}", Type::Bytes(Some(32))), "bytes[32]");
        assert_eq!(format!("{}", Type::Box("Item".to_string())), "box<Item>");
    }
}
