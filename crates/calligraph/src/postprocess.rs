//! Graph postprocessing.
//!
//! Runs once after both traversal iterations. Wildcard vertices that match
//! exactly one concrete definition are contracted onto it (every incident
//! edge is rewritten); the rest are dropped along with their edges; and
//! vertices left with no incident edge at all are pruned. The result
//! contains no placeholders and no dangling edges.

use ahash::AHashMap;
use indexmap::IndexSet;

use crate::graph::{Edge, Graph, VertexId};

/// Produces the final graph from the raw analysis graph.
pub(crate) fn postprocess(raw: &Graph) -> Graph {
    // Wildcard contraction, conservative rule: a wildcard `*.name` is
    // rewritten onto a concrete vertex only when exactly one concrete
    // vertex in the whole graph carries that terminal name.
    let mut concrete_by_name: AHashMap<&str, Vec<VertexId>> = AHashMap::new();
    for id in raw.vertex_ids() {
        let vertex = raw.vertex(id);
        if !vertex.is_wildcard() {
            concrete_by_name.entry(vertex.name.as_str()).or_default().push(id);
        }
    }

    let mut redirect: AHashMap<VertexId, VertexId> = AHashMap::new();
    for id in raw.vertex_ids() {
        let vertex = raw.vertex(id);
        if !vertex.is_wildcard() {
            continue;
        }
        match concrete_by_name.get(vertex.name.as_str()).map(Vec::as_slice) {
            Some([unique]) => {
                log::debug!(
                    "contracting wildcard {} onto {}",
                    vertex.qualified_name(),
                    raw.vertex(*unique).qualified_name()
                );
                redirect.insert(id, *unique);
            }
            Some(candidates) => {
                log::debug!(
                    "dropping wildcard {}: {} candidates",
                    vertex.qualified_name(),
                    candidates.len()
                );
            }
            None => {
                log::debug!("dropping wildcard {}: no candidate", vertex.qualified_name());
            }
        }
    }

    let resolve = |id: VertexId| -> Option<VertexId> {
        if raw.vertex(id).is_wildcard() {
            redirect.get(&id).copied()
        } else {
            Some(id)
        }
    };

    // Rewrite both edge relations into the contracted id space, dropping
    // any edge still touching an uncontracted wildcard. Duplicates
    // introduced by contraction collapse in the set.
    let mut defines: IndexSet<Edge> = IndexSet::new();
    for (source, target) in raw.defines_edges() {
        if let (Some(source), Some(target)) = (resolve(source), resolve(target)) {
            defines.insert((source, target));
        }
    }
    let mut uses: IndexSet<Edge> = IndexSet::new();
    for (source, target) in raw.uses_edges() {
        if let (Some(source), Some(target)) = (resolve(source), resolve(target)) {
            uses.insert((source, target));
        }
    }

    // Orphan pruning: anything the edge relations no longer reach cannot
    // be connected into the final graph.
    let mut connected: IndexSet<VertexId> = IndexSet::new();
    for &(source, target) in defines.iter().chain(&uses) {
        connected.insert(source);
        connected.insert(target);
    }

    let mut graph = Graph::new();
    let mut remap: AHashMap<VertexId, VertexId> = AHashMap::new();
    for id in raw.vertex_ids() {
        let vertex = raw.vertex(id);
        if vertex.is_wildcard() || !connected.contains(&id) {
            continue;
        }
        let new_id = graph.get_or_create(&vertex.namespace, &vertex.name, vertex.flavor);
        {
            let new_vertex = graph.vertex_mut(new_id);
            new_vertex.filename = vertex.filename.clone();
            new_vertex.loc = vertex.loc;
            new_vertex.file_index = vertex.file_index;
        }
        remap.insert(id, new_id);
    }
    // MROs only reference class vertices, but a pruned orphan base can
    // still drop out of the relation.
    for id in raw.vertex_ids() {
        if let Some(&new_id) = remap.get(&id) {
            let mro = raw
                .vertex(id)
                .mro
                .iter()
                .filter_map(|ancestor| remap.get(ancestor).copied())
                .collect();
            graph.vertex_mut(new_id).mro = mro;
        }
    }
    for (source, target) in defines {
        if let (Some(&source), Some(&target)) = (remap.get(&source), remap.get(&target)) {
            graph.add_defines(source, target);
        }
    }
    for (source, target) in uses {
        if let (Some(&source), Some(&target)) = (remap.get(&source), remap.get(&target)) {
            graph.add_uses(source, target);
        }
    }
    graph
}
