use std::slice;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::graph::VertexId;

/// What a name currently points to in one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The name is known to be bound here but its value has not been
    /// determined (parameters, values the sub-traversal could not follow).
    Unresolved,
    /// The name denotes a single vertex.
    Single(VertexId),
    /// The name may denote any of several vertices (starred unpacking,
    /// ambiguous assignments). Order is binding order and is significant
    /// for attribute lookup.
    Set(SmallVec<[VertexId; 2]>),
}

impl Binding {
    /// Normalizes a list of candidate vertices into a binding: empty input
    /// stays unresolved, a single vertex collapses to [`Binding::Single`].
    #[must_use]
    pub fn from_vertices(vertices: impl IntoIterator<Item = VertexId>) -> Self {
        let mut seen: SmallVec<[VertexId; 2]> = SmallVec::new();
        for vertex in vertices {
            if !seen.contains(&vertex) {
                seen.push(vertex);
            }
        }
        match seen.len() {
            0 => Self::Unresolved,
            1 => Self::Single(seen[0]),
            _ => Self::Set(seen),
        }
    }

    /// The vertices this binding denotes; empty when unresolved.
    #[must_use]
    pub fn vertices(&self) -> &[VertexId] {
        match self {
            Self::Unresolved => &[],
            Self::Single(id) => slice::from_ref(id),
            Self::Set(ids) => ids,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// The syntactic category of a lexical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

impl ScopeKind {
    /// Class bodies are invisible to lookups that originate in scopes
    /// nested inside them.
    #[must_use]
    pub fn hides_from_nested(self) -> bool {
        self == Self::Class
    }
}

/// One lexical region: its key, the names bound in it, and what they point
/// to.
///
/// Scopes are created eagerly by the symbol-table pre-scan and persist for
/// the whole analysis; only `defs` mutates afterwards.
#[derive(Debug)]
pub struct Scope {
    /// Dotted fully-qualified name of the region, e.g. `pkg.mod.Class.m`.
    pub key: String,
    pub kind: ScopeKind,
    /// Current value of each locally bound name.
    pub defs: AHashMap<String, Binding>,
    /// Names assigned in this scope that are neither imported nor declared
    /// global/nonlocal. Used to suppress wildcard creation for loop
    /// counters and temporaries.
    pub locals: AHashSet<String>,
    pub globals: AHashSet<String>,
    pub nonlocals: AHashSet<String>,
}

impl Scope {
    #[must_use]
    pub fn new(key: impl Into<String>, kind: ScopeKind) -> Self {
        Self {
            key: key.into(),
            kind,
            defs: AHashMap::new(),
            locals: AHashSet::new(),
            globals: AHashSet::new(),
            nonlocals: AHashSet::new(),
        }
    }

    /// True when `name` is a local of this scope that has not yet received
    /// a resolvable value. Bare references to such names do not create
    /// wildcards.
    #[must_use]
    pub fn is_local_without_value(&self, name: &str) -> bool {
        self.locals.contains(name) && !self.defs.get(name).is_some_and(Binding::is_resolved)
    }
}

/// All scopes of an analysis run, keyed by their dotted scope key.
///
/// The visitor's scope stack holds keys into this table; key-based
/// references keep the scope tree free of ownership cycles.
#[derive(Debug, Default)]
pub struct Scopes {
    map: AHashMap<String, Scope>,
}

impl Scopes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: Scope) {
        self.map.entry(scope.key.clone()).or_insert(scope);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Scope> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Scope> {
        self.map.get_mut(key)
    }

    /// Looks a bare name up through a scope stack, inner to outer.
    ///
    /// `global` declarations redirect to the module scope (the bottom of
    /// the stack), `nonlocal` declarations to the nearest enclosing
    /// function scope binding the name. Class scopes other than the
    /// innermost are skipped, so method bodies do not see class attributes
    /// as bare names.
    #[must_use]
    pub fn lookup(&self, stack: &[String], name: &str) -> Option<&Binding> {
        let innermost = self.get(stack.last()?)?;
        if innermost.globals.contains(name) {
            return self.get(stack.first()?)?.defs.get(name);
        }
        if innermost.nonlocals.contains(name) {
            return self.nonlocal_scope_key(stack, name).and_then(|key| {
                self.get(key).and_then(|scope| scope.defs.get(name))
            });
        }
        for (depth, key) in stack.iter().enumerate().rev() {
            let scope = self.get(key)?;
            if depth + 1 != stack.len() && scope.kind.hides_from_nested() {
                continue;
            }
            if let Some(binding) = scope.defs.get(name) {
                return Some(binding);
            }
        }
        None
    }

    /// The scope key an assignment to `name` from the top of `stack` writes
    /// into.
    #[must_use]
    pub fn binding_scope_key<'a>(&self, stack: &'a [String], name: &str) -> Option<&'a String> {
        let innermost = self.get(stack.last()?)?;
        if innermost.globals.contains(name) {
            return stack.first();
        }
        if innermost.nonlocals.contains(name) {
            return self.nonlocal_scope_key(stack, name).or_else(|| stack.last());
        }
        stack.last()
    }

    /// The nearest enclosing function-like scope that binds `name`, for
    /// `nonlocal` redirection. Falls back to the nearest enclosing
    /// function scope when none binds it.
    fn nonlocal_scope_key<'a>(&self, stack: &'a [String], name: &str) -> Option<&'a String> {
        let enclosing = &stack[..stack.len().saturating_sub(1)];
        let mut fallback = None;
        for key in enclosing.iter().rev() {
            let scope = self.get(key)?;
            if !matches!(scope.kind, ScopeKind::Function | ScopeKind::Lambda) {
                continue;
            }
            if scope.locals.contains(name) {
                return Some(key);
            }
            fallback.get_or_insert(key);
        }
        fallback
    }
}
