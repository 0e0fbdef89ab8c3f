//! Lexically nested symbol tables
//!
//! Scopes hold variables (bound to scratch slots), constants, block labels
//! and function signatures. They form a tree stored in an arena; nodes
//! reference their parent by index and lookups walk toward the root.
//!
//! Slot allocation is lexical: each scope allocates monotonically from a
//! floor inherited from its parent's next free slot at the point the scope
//! is entered, up to the shared ceiling of the scratch array.

use crate::types::Type;

/// Highest usable scratch slot index in the target VM.
pub const MAX_SCRATCH_SLOT: usize = 255;

/// Index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

/// A variable bound to a scratch slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub name: String,
    pub ty: Type,
    pub slot: usize,
}

/// A named constant: resolved type plus the raw literal text it was
/// declared with (emitted verbatim in the `#define`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstDef {
    pub ty: Type,
    pub literal: String,
}

/// A function signature as registered during the build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSig {
    pub name: String,
    pub label: String,
    pub args: Vec<(String, Type)>,
    pub returns: Vec<Type>,
    pub public: bool,
    pub on_completion: String,
}

#[derive(Debug)]
struct ScopeData {
    name: String,
    parent: Option<ScopeId>,
    vars: Vec<(String, Var)>,
    consts: Vec<(String, ConstDef)>,
    blocks: Vec<(String, String)>,
    funcs: Vec<(String, FuncSig)>,
    next_slot: usize,
    slot_ceiling: usize,
}

/// Arena of scopes for one compilation.
#[derive(Debug)]
pub struct Scopes {
    arena: Vec<ScopeData>,
}

impl Scopes {
    /// Create the arena with the root (program) scope at slot floor 0.
    pub fn new() -> Self {
        Scopes {
            arena: vec![ScopeData {
                name: String::new(),
                parent: None,
                vars: Vec::new(),
                consts: Vec::new(),
                blocks: Vec::new(),
                funcs: Vec::new(),
                next_slot: 0,
                slot_ceiling: MAX_SCRATCH_SLOT,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create a child scope. Its full name composes the parent's name with
    /// `name` (`parent__name`), which keeps derived labels unique across
    /// nesting levels.
    pub fn new_scope(&mut self, parent: ScopeId, name: impl Into<String>) -> ScopeId {
        let ceiling = self.arena[parent.0].slot_ceiling;
        let parent_name = &self.arena[parent.0].name;
        let name = name.into();
        let full_name = if parent_name.is_empty() {
            name
        } else {
            format!("{}__{}", parent_name, name)
        };
        let id = ScopeId(self.arena.len());
        self.arena.push(ScopeData {
            name: full_name,
            parent: Some(parent),
            vars: Vec::new(),
            consts: Vec::new(),
            blocks: Vec::new(),
            funcs: Vec::new(),
            next_slot: 0,
            slot_ceiling: ceiling,
        });
        id
    }

    pub fn name(&self, id: ScopeId) -> &str {
        &self.arena[id.0].name
    }

    /// Set the scope's slot floor to its parent's next free slot. Called
    /// when the process pass enters the scope, so allocations made in the
    /// parent up to this point are never shadowed.
    pub fn inherit_slot_floor(&mut self, id: ScopeId) {
        if let Some(parent) = self.arena[id.0].parent {
            self.arena[id.0].next_slot = self.arena[parent.0].next_slot;
        }
    }

    fn alloc_slot(&mut self, id: ScopeId) -> Result<usize, String> {
        let data = &mut self.arena[id.0];
        let slot = data.next_slot;
        if slot > data.slot_ceiling {
            return Err(format!(
                "No scratch slots left (exceeded slot {})",
                data.slot_ceiling
            ));
        }
        data.next_slot += 1;
        Ok(slot)
    }

    /// Declare a variable, allocating the next free slot of `id`.
    pub fn declare_var(&mut self, id: ScopeId, name: &str, ty: Type) -> Result<Var, String> {
        if self.lookup_var(id, name).is_some() {
            return Err(format!("Var \"{}\" already declared", name));
        }
        let slot = self.alloc_slot(id)?;
        let var = Var {
            name: name.to_string(),
            ty,
            slot,
        };
        self.arena[id.0].vars.push((name.to_string(), var.clone()));
        Ok(var)
    }

    /// Declare a variable at an explicit slot, bypassing the allocator.
    /// Used for the inner-group flag slot placed above `max_slot`.
    pub fn declare_var_at(
        &mut self,
        id: ScopeId,
        name: &str,
        ty: Type,
        slot: usize,
    ) -> Result<Var, String> {
        if self.lookup_var(id, name).is_some() {
            return Err(format!("Var \"{}\" already declared", name));
        }
        let var = Var {
            name: name.to_string(),
            ty,
            slot,
        };
        self.arena[id.0].vars.push((name.to_string(), var.clone()));
        Ok(var)
    }

    /// Remove a name binding from `id` (the slot itself stays allocated).
    pub fn del_var(&mut self, id: ScopeId, name: &str) {
        self.arena[id.0].vars.retain(|(n, _)| n != name);
    }

    pub fn lookup_var(&self, id: ScopeId, name: &str) -> Option<&Var> {
        self.walk(id, |data| {
            data.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
        })
    }

    pub fn declare_const(
        &mut self,
        id: ScopeId,
        name: &str,
        def: ConstDef,
    ) -> Result<(), String> {
        if self.lookup_const(id, name).is_some() {
            return Err(format!("Const \"{}\" already declared", name));
        }
        self.arena[id.0].consts.push((name.to_string(), def));
        Ok(())
    }

    pub fn lookup_const(&self, id: ScopeId, name: &str) -> Option<&ConstDef> {
        self.walk(id, |data| {
            data.consts.iter().find(|(n, _)| n == name).map(|(_, c)| c)
        })
    }

    pub fn declare_block(&mut self, id: ScopeId, name: &str, label: &str) -> Result<(), String> {
        if self.lookup_block(id, name).is_some() {
            return Err(format!("Block \"{}\" already declared", name));
        }
        self.arena[id.0]
            .blocks
            .push((name.to_string(), label.to_string()));
        Ok(())
    }

    pub fn lookup_block(&self, id: ScopeId, name: &str) -> Option<&str> {
        self.walk(id, |data| {
            data.blocks
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, l)| l.as_str())
        })
    }

    pub fn declare_func(&mut self, id: ScopeId, sig: FuncSig) -> Result<(), String> {
        if self.lookup_func(id, &sig.name).is_some() {
            return Err(format!("Func \"{}\" already declared", sig.name));
        }
        self.arena[id.0].funcs.push((sig.name.clone(), sig));
        Ok(())
    }

    pub fn lookup_func(&self, id: ScopeId, name: &str) -> Option<&FuncSig> {
        self.walk(id, |data| {
            data.funcs.iter().find(|(n, _)| n == name).map(|(_, f)| f)
        })
    }

    fn walk<'a, T: 'a>(
        &'a self,
        id: ScopeId,
        f: impl Fn(&'a ScopeData) -> Option<T>,
    ) -> Option<T> {
        let mut current = Some(id);
        while let Some(scope) = current {
            let data = &self.arena[scope.0];
            if let Some(found) = f(data) {
                return Some(found);
            }
            current = data.parent;
        }
        None
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}
