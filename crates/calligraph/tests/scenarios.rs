//! End-to-end scenarios driving the public API with small Python
//! programs.

use calligraph::{Analyzer, AnalyzerOptions, CallGraph};

fn analyze(code: &str) -> CallGraph {
    Analyzer::new(AnalyzerOptions::default())
        .add_source(code, "m.py")
        .analyze()
        .expect("analysis should succeed")
        .graph
}

fn uses(graph: &CallGraph, source: &str, target: &str) -> bool {
    graph.uses_edges.contains(&(source.to_owned(), target.to_owned()))
}

fn defines(graph: &CallGraph, source: &str, target: &str) -> bool {
    graph.defines_edges.contains(&(source.to_owned(), target.to_owned()))
}

#[test]
fn mutual_recursion_produces_both_uses_edges() {
    let graph = analyze("def ping():\n    pong()\n\ndef pong():\n    ping()\n");
    assert!(uses(&graph, "m.ping", "m.pong"));
    assert!(uses(&graph, "m.pong", "m.ping"));
}

#[test]
fn direct_recursion_produces_a_self_loop() {
    let graph = analyze("def loop():\n    loop()\n");
    assert!(uses(&graph, "m.loop", "m.loop"));
}

#[test]
fn forward_reference_resolves_on_the_second_iteration() {
    let graph = analyze("def g():\n    return f()\n\ndef f():\n    pass\n");
    assert!(uses(&graph, "m.g", "m.f"));
}

#[test]
fn method_capture_through_self_attribute() {
    let code = "\
def f():
    pass

class C:
    def __init__(self):
        self.g = f

    def h(self):
        self.g()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.C.h", "m.f"));
}

#[test]
fn inherited_method_resolves_to_the_base_class() {
    let code = "\
class A:
    def greet(self):
        pass

class B(A):
    def speak(self):
        self.greet()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.B.speak", "m.A.greet"));
    // No wildcard survives for greet; the only vertex with that terminal
    // is the definition on A.
    let greet_nodes: Vec<_> = graph.nodes.keys().filter(|key| key.ends_with("greet")).collect();
    assert_eq!(greet_nodes, vec!["m.A.greet"]);
}

#[test]
fn for_loop_emits_the_iteration_protocol_and_no_counter_wildcard() {
    let code = "\
class Seq:
    def __iter__(self):
        return self

    def __next__(self):
        return 1

def consume():
    xs = Seq()
    for x in xs:
        pass
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.consume", "m.Seq.__iter__"));
    assert!(uses(&graph, "m.consume", "m.Seq.__next__"));
    assert!(!graph.nodes.keys().any(|key| key.ends_with(".x") || key == "x"));
}

#[test]
fn starred_unpacking_binds_positionally() {
    let code = "\
class First:
    def tag_first(self):
        pass

class Mid1:
    def common(self):
        pass

class Mid2:
    def common(self):
        pass

class Last:
    def tag_last(self):
        pass

def pick():
    a, *b, c = First, Mid1, Mid2, Last
    a().tag_first()
    c().tag_last()
    a().common()
    return b
";
    let graph = analyze(code);
    // Positional matching: `a` carries only First, `c` only Last.
    assert!(uses(&graph, "m.pick", "m.First.tag_first"));
    assert!(uses(&graph, "m.pick", "m.Last.tag_last"));
    // `a().common()` must not resolve: a cartesian fallback would have
    // bound `a` to the middle classes too, and `common` is deliberately
    // ambiguous so no wildcard contraction can paper over the miss.
    assert!(!uses(&graph, "m.pick", "m.Mid1.common"));
    assert!(!uses(&graph, "m.pick", "m.Mid2.common"));
    // The starred target collects the middle values; loading `b`
    // references both.
    assert!(uses(&graph, "m.pick", "m.Mid1"));
    assert!(uses(&graph, "m.pick", "m.Mid2"));
}

#[test]
fn cartesian_fallback_binds_every_target_to_every_value() {
    let code = "\
class X:
    pass

class Y:
    pass

def scramble():
    a, b = make()
    return (a, b)

def make():
    return (X, Y)
";
    let graph = analyze(code);
    // The right-hand side is an opaque call: neither target resolves, and
    // no wildcard survives for the plain locals.
    assert!(!uses(&graph, "m.scramble", "m.X"));
    assert!(!uses(&graph, "m.scramble", "m.Y"));
}

#[test]
fn super_call_resolves_to_the_base_method_not_itself() {
    let code = "\
class A:
    def m(self):
        pass

class B(A):
    def m(self):
        super().m()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.B.m", "m.A.m"));
    assert!(!uses(&graph, "m.B.m", "m.B.m"));
}

#[test]
fn left_base_wins_attribute_lookup_ties() {
    let code = "\
class Left:
    def ping(self):
        pass

class Right:
    def ping(self):
        pass

class Child(Left, Right):
    def go(self):
        self.ping()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.Child.go", "m.Left.ping"));
    assert!(!uses(&graph, "m.Child.go", "m.Right.ping"));
}

#[test]
fn inheritance_shows_up_as_uses_of_the_base() {
    let graph = analyze("class A:\n    pass\n\nclass B(A):\n    pass\n");
    assert!(uses(&graph, "m.B", "m.A"));
    assert!(defines(&graph, "m", "m.A"));
    assert!(defines(&graph, "m", "m.B"));
}

#[test]
fn with_statement_uses_the_context_manager_protocol() {
    let code = "\
class Guard:
    def __enter__(self):
        return self

    def __exit__(self, exc_type, exc, tb):
        return False

def run():
    with Guard() as guard:
        pass
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.run", "m.Guard.__enter__"));
    assert!(uses(&graph, "m.run", "m.Guard.__exit__"));
}

#[test]
fn match_class_pattern_uses_the_matched_class() {
    let code = "\
class Point:
    pass

def locate(value):
    match value:
        case Point():
            return 1
        case _:
            return 0
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.locate", "m.Point"));
}

#[test]
fn walrus_binding_flows_into_later_calls() {
    let code = "\
def source():
    pass

def sink():
    if fn := source:
        fn()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.sink", "m.source"));
}

#[test]
fn chained_assignment_binds_every_target() {
    let code = "\
class C:
    pass

def first():
    a = b = C
    a()

def second():
    a = b = C
    b()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.first", "m.C"));
    assert!(uses(&graph, "m.second", "m.C"));
}

#[test]
fn instances_are_tracked_as_their_class() {
    let code = "\
class Worker:
    def run(self):
        pass

def main():
    w = Worker()
    w.run()
";
    let graph = analyze(code);
    assert!(uses(&graph, "m.main", "m.Worker"));
    assert!(uses(&graph, "m.main", "m.Worker.run"));
}

#[test]
fn decorator_application_is_a_use() {
    let code = "\
def wrap(fn):
    return fn

@wrap
def target():
    pass
";
    let graph = analyze(code);
    assert!(uses(&graph, "m", "m.wrap"));
}
