//! Nested namespaces: one stack for ordinary identifiers (variables,
//! typedefs, enum constants) and a parallel one for struct/enum tags.
//! Visibility is controlled purely by stack length snapshots.

use crate::ast::VarId;
use crate::ty::TypeId;

/// What an ordinary identifier resolves to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum VarScopeKind {
    Var(VarId),
    Typedef(TypeId),
    EnumConst { ty: TypeId, val: i64 },
}

#[derive(Debug)]
struct VarScopeEntry {
    name: String,
    kind: VarScopeKind,
}

#[derive(Debug)]
struct TagScopeEntry {
    name: String,
    depth: u32,
    ty: TypeId,
}

/// Stack lengths at scope entry; `leave` truncates back to them.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Snapshot {
    vars: usize,
    tags: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    vars: Vec<VarScopeEntry>,
    tags: Vec<TagScopeEntry>,
    depth: u32,
}

impl ScopeStack {
    pub fn enter(&mut self) -> Snapshot {
        self.depth += 1;
        Snapshot {
            vars: self.vars.len(),
            tags: self.tags.len(),
        }
    }

    pub fn leave(&mut self, snapshot: Snapshot) {
        self.vars.truncate(snapshot.vars);
        self.tags.truncate(snapshot.tags);
        self.depth -= 1;
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn push_var(&mut self, name: String, var: VarId) {
        self.vars.push(VarScopeEntry {
            name,
            kind: VarScopeKind::Var(var),
        });
    }

    pub fn push_typedef(&mut self, name: String, ty: TypeId) {
        self.vars.push(VarScopeEntry {
            name,
            kind: VarScopeKind::Typedef(ty),
        });
    }

    pub fn push_enum_const(&mut self, name: String, ty: TypeId, val: i64) {
        self.vars.push(VarScopeEntry {
            name,
            kind: VarScopeKind::EnumConst { ty, val },
        });
    }

    /// Newest binding wins.
    pub fn find_var(&self, name: &str) -> Option<VarScopeKind> {
        self.vars
            .iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| entry.kind)
    }

    pub fn push_tag(&mut self, name: String, ty: TypeId) {
        self.tags.push(TagScopeEntry {
            name,
            depth: self.depth,
            ty,
        });
    }

    /// Returns the tag's type and the depth it was declared at; the parser
    /// needs the depth to decide between completing and shadowing.
    pub fn find_tag(&self, name: &str) -> Option<(TypeId, u32)> {
        self.tags
            .iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| (entry.ty, entry.depth))
    }
}
