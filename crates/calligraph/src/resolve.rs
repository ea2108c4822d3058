//! Attribute resolution.
//!
//! Resolves `base.name` against the graph: class attributes are searched in
//! the class's own scope and then through its statically computed method
//! resolution order, module attributes in the module's top-level scope.
//! Anything else (and any miss) produces a wildcard vertex decorated with
//! the attribute name, to be contracted or dropped in postprocessing.

use crate::{
    graph::{Flavor, Graph, VertexId},
    scope::{Binding, Scopes},
};

/// Resolves `base.name` to the set of vertices it may denote.
///
/// When the base binding holds several vertices (an MRO slice from
/// `super()`, an ambiguous assignment), bases are tried in binding order
/// and the first successful resolution wins; this is what makes `super()`
/// attribute lookup walk the MRO.
pub(crate) fn resolve_attribute(graph: &mut Graph, scopes: &Scopes, base: &Binding, name: &str) -> Binding {
    for &vertex in base.vertices() {
        if let Some(binding) = resolve_attribute_of(graph, scopes, vertex, name) {
            return binding;
        }
    }
    Binding::Single(graph.wildcard(name))
}

/// Resolves `name` against one base vertex, or `None` when the base has no
/// such attribute.
fn resolve_attribute_of(graph: &Graph, scopes: &Scopes, base: VertexId, name: &str) -> Option<Binding> {
    let vertex = graph.vertex(base);
    match vertex.flavor {
        Flavor::Class => {
            // Own scope first, then each class of the MRO in order. A
            // truncated MRO simply runs out, and the lookup falls through
            // to the wildcard.
            let own = scopes
                .get(&vertex.qualified_name())
                .and_then(|scope| scope.defs.get(name));
            if let Some(binding) = own
                && binding.is_resolved()
            {
                return Some(binding.clone());
            }
            for &ancestor in vertex.mro.iter().skip(1) {
                let ancestor_key = graph.vertex(ancestor).qualified_name();
                if let Some(binding) = scopes.get(&ancestor_key).and_then(|scope| scope.defs.get(name))
                    && binding.is_resolved()
                {
                    return Some(binding.clone());
                }
            }
            None
        }
        Flavor::Module => {
            let module_key = vertex.qualified_name();
            if let Some(binding) = scopes.get(&module_key).and_then(|scope| scope.defs.get(name))
                && binding.is_resolved()
            {
                return Some(binding.clone());
            }
            // A definition interned in the registry is good enough even if
            // the module's defs have not been replayed yet.
            graph.lookup(&module_key, name).map(Binding::Single)
        }
        // Functions and methods expose no attribute surface here.
        _ => None,
    }
}

/// Computes a class's method resolution order from its evaluated bases.
///
/// This is not C3: bases are traversed left to right, each contributing its
/// own MRO, with duplicates dropped on first occurrence. The order is
/// truncated at the first base that did not resolve to an analyzed class;
/// lookups through the missing tail come back as wildcards.
pub(crate) fn linearize_mro(graph: &mut Graph, class: VertexId, bases: &[Binding]) {
    let mut mro = vec![class];
    'bases: for base in bases {
        let Some(&base_id) = base
            .vertices()
            .iter()
            .find(|&&id| graph.vertex(id).flavor == Flavor::Class)
        else {
            break 'bases;
        };
        let base_mro = graph.vertex(base_id).mro.clone();
        if base_mro.is_empty() {
            // Base seen but not yet linearized (forward reference on the
            // first iteration); keep at least the base itself.
            if !mro.contains(&base_id) {
                mro.push(base_id);
            }
        } else {
            for ancestor in base_mro {
                if !mro.contains(&ancestor) {
                    mro.push(ancestor);
                }
            }
        }
    }
    graph.vertex_mut(class).mro = mro;
}

/// The binding `super()` denotes inside a method of `lexical_class`: the
/// class's MRO starting one level past the class itself.
pub(crate) fn super_binding(graph: &Graph, lexical_class: VertexId) -> Binding {
    Binding::from_vertices(graph.vertex(lexical_class).mro.iter().copied().skip(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Scope, ScopeKind};

    fn class_with_scope(graph: &mut Graph, scopes: &mut Scopes, namespace: &str, name: &str) -> VertexId {
        let id = graph.get_or_create(namespace, name, Flavor::Class);
        scopes.insert(Scope::new(graph.vertex(id).qualified_name(), ScopeKind::Class));
        id
    }

    #[test]
    fn inherited_attribute_resolves_through_the_mro() {
        let mut graph = Graph::new();
        let mut scopes = Scopes::new();
        let a = class_with_scope(&mut graph, &mut scopes, "m", "A");
        let b = class_with_scope(&mut graph, &mut scopes, "m", "B");
        let greet = graph.get_or_create("m.A", "greet", Flavor::Method);
        scopes
            .get_mut("m.A")
            .unwrap()
            .defs
            .insert("greet".to_owned(), Binding::Single(greet));
        linearize_mro(&mut graph, a, &[]);
        linearize_mro(&mut graph, b, &[Binding::Single(a)]);

        let resolved = resolve_attribute(&mut graph, &scopes, &Binding::Single(b), "greet");
        assert_eq!(resolved, Binding::Single(greet));
    }

    #[test]
    fn left_to_right_base_order_breaks_ties() {
        let mut graph = Graph::new();
        let mut scopes = Scopes::new();
        let left = class_with_scope(&mut graph, &mut scopes, "m", "Left");
        let right = class_with_scope(&mut graph, &mut scopes, "m", "Right");
        let child = class_with_scope(&mut graph, &mut scopes, "m", "Child");
        let left_run = graph.get_or_create("m.Left", "run", Flavor::Method);
        let right_run = graph.get_or_create("m.Right", "run", Flavor::Method);
        scopes
            .get_mut("m.Left")
            .unwrap()
            .defs
            .insert("run".to_owned(), Binding::Single(left_run));
        scopes
            .get_mut("m.Right")
            .unwrap()
            .defs
            .insert("run".to_owned(), Binding::Single(right_run));
        linearize_mro(&mut graph, left, &[]);
        linearize_mro(&mut graph, right, &[]);
        linearize_mro(&mut graph, child, &[Binding::Single(left), Binding::Single(right)]);

        assert_eq!(graph.vertex(child).mro, vec![child, left, right]);
        let resolved = resolve_attribute(&mut graph, &scopes, &Binding::Single(child), "run");
        assert_eq!(resolved, Binding::Single(left_run));
    }

    #[test]
    fn mro_truncates_at_an_unresolved_base() {
        let mut graph = Graph::new();
        let mut scopes = Scopes::new();
        let a = class_with_scope(&mut graph, &mut scopes, "m", "A");
        let c = class_with_scope(&mut graph, &mut scopes, "m", "C");
        linearize_mro(&mut graph, a, &[]);
        // `class C(External, A)` with External unknown: A never enters the
        // MRO.
        linearize_mro(&mut graph, c, &[Binding::Unresolved, Binding::Single(a)]);
        assert_eq!(graph.vertex(c).mro, vec![c]);
    }

    #[test]
    fn missing_attribute_becomes_a_decorated_wildcard() {
        let mut graph = Graph::new();
        let mut scopes = Scopes::new();
        let a = class_with_scope(&mut graph, &mut scopes, "m", "A");
        linearize_mro(&mut graph, a, &[]);

        let resolved = resolve_attribute(&mut graph, &scopes, &Binding::Single(a), "missing");
        let [id] = resolved.vertices() else {
            panic!("expected a single wildcard vertex");
        };
        assert!(graph.vertex(*id).is_wildcard());
        assert_eq!(graph.vertex(*id).name, "missing");
    }

    #[test]
    fn super_skips_the_class_itself() {
        let mut graph = Graph::new();
        let mut scopes = Scopes::new();
        let a = class_with_scope(&mut graph, &mut scopes, "m", "A");
        let b = class_with_scope(&mut graph, &mut scopes, "m", "B");
        linearize_mro(&mut graph, a, &[]);
        linearize_mro(&mut graph, b, &[Binding::Single(a)]);

        assert_eq!(super_binding(&graph, b), Binding::Single(a));
        assert_eq!(super_binding(&graph, a), Binding::Unresolved);
    }
}
