//! Output-shape properties: one vertex per definition, flavors, edge
//! dedup, wildcard elimination, and the caller-facing options.

use calligraph::{Analyzer, AnalyzerOptions, CallGraph, Flavor};
use pretty_assertions::assert_eq;

fn analyze(code: &str) -> CallGraph {
    analyze_with(code, AnalyzerOptions::default())
}

fn analyze_with(code: &str, options: AnalyzerOptions) -> CallGraph {
    Analyzer::new(options)
        .add_source(code, "m.py")
        .analyze()
        .expect("analysis should succeed")
        .graph
}

const SHAPES: &str = "\
class Shape:
    def area(self):
        pass

    @staticmethod
    def of(kind):
        pass

    @classmethod
    def default(cls):
        pass

def describe(shape):
    return shape
";

#[test]
fn every_definition_gets_exactly_one_node_with_its_flavor() {
    let graph = analyze(SHAPES);
    let flavors: Vec<(&str, Flavor)> = graph
        .nodes
        .iter()
        .map(|(key, node)| (key.as_str(), node.flavor))
        .collect();
    assert_eq!(
        flavors,
        vec![
            ("m", Flavor::Module),
            ("m.Shape", Flavor::Class),
            ("m.Shape.area", Flavor::Method),
            ("m.Shape.of", Flavor::StaticMethod),
            ("m.Shape.default", Flavor::ClassMethod),
            ("m.describe", Flavor::Function),
        ]
    );
}

#[test]
fn defines_edges_form_the_containment_forest() {
    let graph = analyze(SHAPES);
    assert_eq!(
        graph.defines_edges,
        vec![
            ("m".to_owned(), "m.Shape".to_owned()),
            ("m".to_owned(), "m.describe".to_owned()),
            ("m.Shape".to_owned(), "m.Shape.area".to_owned()),
            ("m.Shape".to_owned(), "m.Shape.default".to_owned()),
            ("m.Shape".to_owned(), "m.Shape.of".to_owned()),
        ]
    );
}

#[test]
fn repeated_calls_collapse_to_one_uses_edge() {
    let graph = analyze("def f():\n    pass\n\ndef g():\n    f()\n    f()\n    f()\n");
    let edges: Vec<_> = graph
        .uses_edges
        .iter()
        .filter(|(source, target)| source == "m.g" && target == "m.f")
        .collect();
    assert_eq!(edges.len(), 1);
}

#[test]
fn the_output_contains_no_unknown_nodes() {
    // plenty of unresolvable references
    let code = "\
import os

def f(data):
    os.path.join(data)
    mystery()
    return undefined_name
";
    let graph = analyze(code);
    assert!(graph.nodes.values().all(|node| node.flavor != Flavor::Unknown));
    for (source, target) in graph.defines_edges.iter().chain(&graph.uses_edges) {
        assert!(graph.nodes.contains_key(source), "dangling edge source {source}");
        assert!(graph.nodes.contains_key(target), "dangling edge target {target}");
    }
}

#[test]
fn assigned_only_locals_produce_no_wildcard_and_no_false_edge() {
    // `count` in tally is a plain local; it must not be confused with the
    // module-level function of the same name.
    let code = "\
def count():
    pass

def tally(items):
    count = 0
    for item in items:
        count = count + 1
    return count
";
    let graph = analyze(code);
    assert!(!graph.uses_edges.contains(&("m.tally".to_owned(), "m.count".to_owned())));
}

#[test]
fn lambdas_are_defined_in_their_enclosing_scope() {
    let graph = analyze("def f():\n    key = lambda item: item\n    return key\n");
    assert!(graph.nodes.contains_key("m.f.<lambda>"));
    assert!(
        graph
            .defines_edges
            .contains(&("m.f".to_owned(), "m.f.<lambda>".to_owned()))
    );
}

#[test]
fn type_alias_definitions_get_a_node_and_uses() {
    let code = "\
class Item:
    pass

type Basket = list[Item]
";
    let graph = analyze(code);
    assert_eq!(graph.nodes["m.Basket"].flavor, Flavor::Name);
    assert!(graph.defines_edges.contains(&("m".to_owned(), "m.Basket".to_owned())));
    assert!(graph.uses_edges.contains(&("m".to_owned(), "m.Item".to_owned())));
}

#[test]
fn draw_options_filter_the_edge_lists() {
    let code = "def f():\n    pass\n\ndef g():\n    f()\n";
    let no_defines = analyze_with(
        code,
        AnalyzerOptions {
            draw_defines: false,
            ..AnalyzerOptions::default()
        },
    );
    assert!(no_defines.defines_edges.is_empty());
    assert!(!no_defines.uses_edges.is_empty());

    let no_uses = analyze_with(
        code,
        AnalyzerOptions {
            draw_uses: false,
            ..AnalyzerOptions::default()
        },
    );
    assert!(no_uses.uses_edges.is_empty());
    assert!(!no_uses.defines_edges.is_empty());
}

#[test]
fn annotate_attaches_file_and_line_labels() {
    let graph = analyze_with(
        "def f():\n    pass\n",
        AnalyzerOptions {
            annotate: true,
            ..AnalyzerOptions::default()
        },
    );
    assert_eq!(graph.nodes["m.f"].label.as_deref(), Some("m.py:1"));
    assert_eq!(graph.nodes["m.f"].lineno, Some(1));
}

#[test]
fn color_by_file_assigns_one_hue_index_per_file() {
    let analysis = Analyzer::new(AnalyzerOptions {
        color_by_file: true,
        root: Some("".into()),
        ..AnalyzerOptions::default()
    })
    .add_source("def a():\n    pass\n", "one.py")
    .add_source("def b():\n    from one import a\n    a()\n", "two.py")
    .analyze()
    .expect("analysis should succeed");
    let graph = analysis.graph;
    let one = graph.nodes["one.a"].file_index.expect("index for one.py");
    let two = graph.nodes["two.b"].file_index.expect("index for two.py");
    assert_ne!(one, two);
    assert!(graph.file_index_count() >= 2);
}

#[test]
fn a_file_that_fails_to_parse_is_skipped_and_reported() {
    let analysis = Analyzer::new(AnalyzerOptions {
        root: Some("".into()),
        ..AnalyzerOptions::default()
    })
    .add_source("def ok():\n    pass\n", "good.py")
    .add_source("def broken(:\n", "bad.py")
    .analyze()
    .expect("analysis continues past parse failures");

    assert_eq!(analysis.skipped.len(), 1);
    assert_eq!(analysis.skipped[0].filename, "bad.py");
    assert!(analysis.graph.nodes.contains_key("good.ok"));
    assert!(analysis.graph.nodes.keys().all(|key| !key.starts_with("bad")));
}

#[test]
fn references_into_a_skipped_file_are_eliminated() {
    let analysis = Analyzer::new(AnalyzerOptions {
        root: Some("".into()),
        ..AnalyzerOptions::default()
    })
    .add_source("from broken import helper\n\ndef run():\n    helper()\n", "good.py")
    .add_source("def helper(:\n", "broken.py")
    .analyze()
    .expect("analysis continues past parse failures");

    let graph = analysis.graph;
    assert!(graph.nodes.values().all(|node| node.flavor != Flavor::Unknown));
    assert!(!graph.nodes.contains_key("broken.helper"));
}

#[test]
fn unreadable_input_fails_before_analysis() {
    let result = Analyzer::new(AnalyzerOptions::default()).add_file("definitely/not/here.py");
    let err = result.expect_err("missing file should fail");
    assert!(err.to_string().contains("definitely/not/here.py"));
}

#[test]
fn nested_definitions_use_the_enclosing_scope_key() {
    let code = "\
def outer():
    def inner():
        pass
    return inner
";
    let graph = analyze(code);
    assert!(graph.nodes.contains_key("m.outer.inner"));
    assert!(
        graph
            .defines_edges
            .contains(&("m.outer".to_owned(), "m.outer.inner".to_owned()))
    );
    assert!(graph.uses_edges.contains(&("m.outer".to_owned(), "m.outer.inner".to_owned())));
}
