use std::fmt;

use ahash::RandomState;
use indexmap::{IndexMap, IndexSet};

use crate::parse::CodeLoc;

/// Namespace reserved for wildcard vertices.
///
/// A wildcard stands for a reference whose target could not be resolved
/// during analysis; its key is `*.<name>` so distinct unresolved references
/// to the same terminal collapse, mirroring the class-level (not
/// instance-level) precision of the rest of the graph.
pub const WILDCARD_NAMESPACE: &str = "*";

/// What kind of program object a graph vertex stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Module,
    Class,
    Function,
    Method,
    StaticMethod,
    ClassMethod,
    /// A plain name binding that owns a vertex (type aliases).
    Name,
    /// An attribute slot bound on a class without a resolvable value.
    Attribute,
    /// A placeholder for an unresolved reference; eliminated in
    /// postprocessing.
    Unknown,
}

impl Flavor {
    /// Whether a vertex of this flavor counts as a concrete definition when
    /// contracting wildcards.
    #[must_use]
    pub fn is_concrete(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// The identity of a vertex: enclosing scope key plus terminal name.
///
/// Two occurrences with the same qualified name intern to the same vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexKey {
    pub namespace: String,
    pub name: String,
}

impl VertexKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The dotted fully-qualified name, e.g. `pkg.mod.Class.method`.
    #[must_use]
    pub fn qualified(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Index of a vertex in the registry.
///
/// Ids are indices into the insertion-ordered intern table and stay valid
/// for the lifetime of one [`Graph`]; cross-vertex relationships (edges,
/// MROs) are stored as ids rather than owned links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u32);

impl VertexId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A graph vertex: one module, class, function, method, or placeholder.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub namespace: String,
    pub name: String,
    pub flavor: Flavor,
    /// The file the definition was found in; `None` until a definition site
    /// is recorded (wildcards never get one).
    pub filename: Option<String>,
    /// Position of the definition within `filename`.
    pub loc: Option<CodeLoc>,
    /// Display-only hue index of the defining file, assigned when the
    /// `color_by_file` option is set.
    pub file_index: Option<u32>,
    /// Method resolution order for class vertices, starting with the class
    /// itself. Truncated at the first base that did not resolve to an
    /// analyzed class.
    pub mro: Vec<VertexId>,
}

impl Vertex {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.flavor == Flavor::Unknown
    }
}

/// A directed edge between two vertices.
pub type Edge = (VertexId, VertexId);

/// The vertex registry and edge store.
///
/// Vertices are interned by `(namespace, name)`; edges are deduplicated
/// sets. Iteration order is insertion order throughout, which keeps a given
/// input set producing the same graph on every run.
#[derive(Debug, Default)]
pub struct Graph {
    vertices: IndexMap<VertexKey, Vertex, RandomState>,
    defines: IndexSet<Edge, RandomState>,
    uses: IndexSet<Edge, RandomState>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical vertex for `(namespace, name)`, creating it if
    /// absent.
    ///
    /// When a vertex created speculatively as a wildcard is later seen at a
    /// definition, its flavor is upgraded in place; every edge already
    /// incident on it remains valid.
    pub fn get_or_create(&mut self, namespace: &str, name: &str, flavor: Flavor) -> VertexId {
        let key = VertexKey::new(namespace, name);
        if let Some((index, _, vertex)) = self.vertices.get_full_mut(&key) {
            if vertex.flavor == Flavor::Unknown && flavor.is_concrete() {
                vertex.flavor = flavor;
            }
            return VertexId(as_id(index));
        }
        let index = self.vertices.len();
        self.vertices.insert(
            key,
            Vertex {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                flavor,
                filename: None,
                loc: None,
                file_index: None,
                mro: Vec::new(),
            },
        );
        VertexId(as_id(index))
    }

    /// Creates (or upgrades) a vertex at its definition site, recording the
    /// defining file and position.
    pub fn define(&mut self, namespace: &str, name: &str, flavor: Flavor, filename: &str, loc: CodeLoc) -> VertexId {
        let id = self.get_or_create(namespace, name, flavor);
        let vertex = self.vertex_mut(id);
        // A re-definition in iteration two keeps the first-seen site.
        if vertex.filename.is_none() {
            vertex.filename = Some(filename.to_owned());
            vertex.loc = Some(loc);
        }
        id
    }

    /// Returns the wildcard vertex decorated with `name`.
    pub fn wildcard(&mut self, name: &str) -> VertexId {
        self.get_or_create(WILDCARD_NAMESPACE, name, Flavor::Unknown)
    }

    /// Looks up an existing vertex without creating one.
    #[must_use]
    pub fn lookup(&self, namespace: &str, name: &str) -> Option<VertexId> {
        self.vertices
            .get_index_of(&VertexKey::new(namespace, name))
            .map(|index| VertexId(as_id(index)))
    }

    #[must_use]
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        let (_, vertex) = self.vertices.get_index(id.index()).expect("vertex id out of range");
        vertex
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        let (_, vertex) = self
            .vertices
            .get_index_mut(id.index())
            .expect("vertex id out of range");
        vertex
    }

    pub fn add_defines(&mut self, source: VertexId, target: VertexId) {
        self.defines.insert((source, target));
    }

    pub fn add_uses(&mut self, source: VertexId, target: VertexId) {
        self.uses.insert((source, target));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// All vertex ids in insertion order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.vertices.len()).map(|index| VertexId(as_id(index)))
    }

    pub fn defines_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.defines.iter().copied()
    }

    pub fn uses_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.uses.iter().copied()
    }
}

fn as_id(index: usize) -> u32 {
    u32::try_from(index).expect("vertex count exceeds u32")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_collapses_same_qualified_name() {
        let mut graph = Graph::new();
        let a = graph.get_or_create("pkg.mod", "f", Flavor::Function);
        let b = graph.get_or_create("pkg.mod", "f", Flavor::Function);
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn wildcard_upgrades_to_concrete_flavor_in_place() {
        let mut graph = Graph::new();
        let module = graph.get_or_create("", "m", Flavor::Module);
        let unknown = graph.get_or_create("pkg", "helper", Flavor::Unknown);
        graph.add_uses(module, unknown);

        let defined = graph.get_or_create("pkg", "helper", Flavor::Function);
        assert_eq!(unknown, defined);
        assert_eq!(graph.vertex(defined).flavor, Flavor::Function);
        assert!(graph.uses_edges().any(|(s, t)| s == module && t == defined));
    }

    #[test]
    fn edges_are_deduplicated() {
        let mut graph = Graph::new();
        let a = graph.get_or_create("", "a", Flavor::Function);
        let b = graph.get_or_create("", "b", Flavor::Function);
        graph.add_uses(a, b);
        graph.add_uses(a, b);
        assert_eq!(graph.uses_edges().count(), 1);
    }

    #[test]
    fn definition_site_is_kept_from_first_iteration() {
        let mut graph = Graph::new();
        let id = graph.define("m", "f", Flavor::Function, "m.py", CodeLoc::new(3, 0));
        graph.define("m", "f", Flavor::Function, "m.py", CodeLoc::new(9, 0));
        assert_eq!(graph.vertex(id).loc, Some(CodeLoc::new(3, 0)));
    }
}
