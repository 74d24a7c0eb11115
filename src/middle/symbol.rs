use crate::{
    index::{simple_index, IndexVec},
    middle::ty::Type,
};

simple_index! {
    /// Identifies a variable across the whole program
    pub struct VarId;
}

simple_index! {
    /// Identifies a user-defined function
    pub struct FunId;
}

#[derive(Debug)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug)]
pub struct FunInfo {
    pub name: String,
    pub param_types: Vec<Type>,
    pub return_type: Type,
}

/// Program-wide table of variable and function declarations.
///
/// Name-to-id scoping only exists while parsing (the parser owns the scope
/// stack); afterwards everything is addressed by id. Passes read the table
/// to re-typecheck the subtrees they build and never add new entries.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: IndexVec<VarId, VarInfo>,
    functions: IndexVec<FunId, FunInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: &str, ty: Type) -> VarId {
        self.vars.push(VarInfo {
            name: name.to_string(),
            ty,
        })
    }

    pub fn add_function(&mut self, name: &str, param_types: Vec<Type>, return_type: Type) -> FunId {
        self.functions.push(FunInfo {
            name: name.to_string(),
            param_types,
            return_type,
        })
    }

    pub fn type_of(&self, var: VarId) -> Type {
        self.vars[var].ty
    }

    pub fn var_name(&self, var: VarId) -> &str {
        &self.vars[var].name
    }

    pub fn function(&self, fun: FunId) -> &FunInfo {
        &self.functions[fun]
    }

    pub fn function_name(&self, fun: FunId) -> &str {
        &self.functions[fun].name
    }
}
