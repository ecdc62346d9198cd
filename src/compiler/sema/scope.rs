use super::DeclId;

#[derive(Debug, Clone)]
struct ScopeEntry {
    name: String,
    decl: DeclId,
    /// Declared under a `[cond(..)]`; may be redeclared by another variant.
    conditional: bool,
}

/// Identifier scopes as a flat entry stack plus the entry count at each
/// scope boundary.
#[derive(Debug, Default)]
pub struct ScopeStack {
    entries: Vec<ScopeEntry>,
    markers: Vec<usize>,
}
impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.markers.push(self.entries.len());
    }
    pub fn pop(&mut self) {
        let marker = self.markers.pop().unwrap_or(0);
        self.entries.truncate(marker);
    }
    pub fn depth(&self) -> usize {
        self.markers.len()
    }

    fn current_scope(&self) -> &[ScopeEntry] {
        let marker = self.markers.last().copied().unwrap_or(0);
        &self.entries[marker..]
    }

    /// Registers `name` in the innermost scope. Returns the conflicting
    /// declaration when the name already exists there.
    pub fn define(&mut self, name: &str, decl: DeclId, conditional: bool) -> Result<(), DeclId> {
        let prev = self
            .current_scope()
            .iter()
            .rev()
            .find(|x| x.name == name)
            .map(|x| (x.decl, x.conditional));
        if let Some((prev, prev_conditional)) = prev {
            if !(conditional || prev_conditional) {
                return Err(prev);
            }
        }
        self.entries.push(ScopeEntry {
            name: name.to_string(),
            decl,
            conditional,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.entries.iter().rev().find(|x| x.name == name).map(|x| x.decl)
    }

    /// Whether `name` is declared in the innermost scope.
    pub fn is_local(&self, name: &str) -> bool {
        self.current_scope().iter().any(|x| x.name == name)
    }
}
