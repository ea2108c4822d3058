//! The traversal that builds the graph.
//!
//! One visitor walks each parsed module, emitting *defines* edges at
//! definition sites and *uses* edges at load-context references, entering
//! and leaving scopes as it goes and delegating assignment-like constructs
//! to the binding engine (`bind.rs`). Dispatch is a single `match` over the
//! syntactic kind per pass, with the ruff walker supplying recursion for
//! constructs the analyzer has nothing to say about.
//!
//! The whole traversal runs twice over the full source set: the first
//! iteration populates definitions and initial bindings, the second
//! resolves forward references against the fully populated namespace.

use ruff_python_ast::{
    self as ast, Expr, ExprContext, ModModule, Pattern, Stmt,
    visitor::{Visitor, walk_expr, walk_stmt},
};
use ruff_text_size::Ranged;

use crate::{
    graph::{Flavor, Graph, VertexId},
    parse::SourceMap,
    resolve::{linearize_mro, resolve_attribute},
    scope::{Binding, ScopeKind, Scopes},
};

/// Per-file inputs of one traversal.
pub(crate) struct ModuleSource<'a> {
    /// Dotted module name, e.g. `pkg.mod`; also the module scope key.
    pub module_key: &'a str,
    pub filename: &'a str,
    pub source_map: &'a SourceMap,
}

/// Runs one traversal iteration over one parsed module.
pub(crate) fn visit_module(graph: &mut Graph, scopes: &mut Scopes, source: &ModuleSource<'_>, module: &ModModule) {
    let (namespace, name) = split_qualified(source.module_key);
    let module_vertex = graph.define(
        namespace,
        name,
        Flavor::Module,
        source.filename,
        crate::parse::CodeLoc::new(0, 0),
    );
    let mut visitor = GraphVisitor {
        graph,
        scopes,
        filename: source.filename,
        source_map: source.source_map,
        scope_stack: vec![source.module_key.to_owned()],
        vertex_stack: vec![module_vertex],
        class_stack: Vec::new(),
    };
    for stmt in &module.body {
        visitor.visit_stmt(stmt);
    }
}

/// Splits a dotted qualified name into `(namespace, terminal)`.
pub(crate) fn split_qualified(qualified: &str) -> (&str, &str) {
    match qualified.rsplit_once('.') {
        Some((namespace, name)) => (namespace, name),
        None => ("", qualified),
    }
}

/// Traversal state for one module.
///
/// The scope stack holds keys into the scope table (bottom: the module
/// scope); the vertex stack tracks the innermost enclosing graph vertex
/// that uses edges are emitted from; the class stack tracks lexically
/// enclosing classes for `super()` and receiver binding.
pub(crate) struct GraphVisitor<'a> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) scopes: &'a mut Scopes,
    pub(crate) filename: &'a str,
    pub(crate) source_map: &'a SourceMap,
    pub(crate) scope_stack: Vec<String>,
    vertex_stack: Vec<VertexId>,
    class_stack: Vec<VertexId>,
}

impl GraphVisitor<'_> {
    pub(crate) fn current_scope_key(&self) -> &str {
        self.scope_stack.last().expect("scope stack is never empty")
    }

    /// The vertex that emits uses: the innermost enclosing class or
    /// function, or the module vertex at top level.
    pub(crate) fn current_vertex(&self) -> VertexId {
        *self.vertex_stack.last().expect("vertex stack is never empty")
    }

    pub(crate) fn enclosing_class(&self) -> Option<VertexId> {
        self.class_stack.last().copied()
    }

    pub(crate) fn emit_uses(&mut self, binding: &Binding) {
        let source = self.current_vertex();
        for &target in binding.vertices() {
            self.graph.add_uses(source, target);
        }
    }

    fn emit_uses_to(&mut self, target: VertexId) {
        let source = self.current_vertex();
        self.graph.add_uses(source, target);
    }

    /// Emits uses to the named protocol methods of a resolved object, e.g.
    /// `__iter__`/`__next__` for a `for` statement.
    pub(crate) fn protocol_uses(&mut self, object: &Binding, names: &[&str]) {
        for name in names {
            let resolved = resolve_attribute(self.graph, self.scopes, object, name);
            self.emit_uses(&resolved);
        }
    }

    /// Runs `body` inside a nested scope, with `vertex` as the emitting
    /// vertex when the scope owns one (functions, classes, lambdas).
    fn in_scope(&mut self, key: String, vertex: Option<VertexId>, body: impl FnOnce(&mut Self)) {
        self.scope_stack.push(key);
        if let Some(vertex) = vertex {
            self.vertex_stack.push(vertex);
        }
        body(self);
        if vertex.is_some() {
            self.vertex_stack.pop();
        }
        self.scope_stack.pop();
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn function_def(&mut self, function: &ast::StmtFunctionDef) {
        let name = function.name.as_str();
        let flavor = self.callable_flavor(&function.decorator_list);
        let loc = self.source_map.loc(function.name.range().start());
        let namespace = self.current_scope_key().to_owned();
        let vertex = self.graph.define(&namespace, name, flavor, self.filename, loc);
        let parent = self.current_vertex();
        self.graph.add_defines(parent, vertex);
        self.bind_name(name, Binding::Single(vertex));

        // Decorators, defaults, and annotations are load-context
        // references evaluated in the enclosing scope.
        for decorator in &function.decorator_list {
            self.visit_expr(&decorator.expression);
        }
        self.visit_parameter_exprs(&function.parameters);
        if let Some(returns) = &function.returns {
            self.visit_expr(returns);
        }

        let scope_key = format!("{namespace}.{name}");
        let receiver = self.receiver_binding(flavor, &function.parameters);
        self.in_scope(scope_key, Some(vertex), |visitor| {
            if let Some((receiver_name, class)) = receiver {
                visitor.bind_name(&receiver_name, Binding::Single(class));
            }
            visitor.visit_body(&function.body);
        });
    }

    /// The target language passes the receiver explicitly: inside a method
    /// the first parameter is the instance, which this analyzer tracks as
    /// the class itself.
    fn receiver_binding(&self, flavor: Flavor, parameters: &ast::Parameters) -> Option<(String, VertexId)> {
        if !matches!(flavor, Flavor::Method | Flavor::ClassMethod) {
            return None;
        }
        let class = self.enclosing_class()?;
        let first = parameters.posonlyargs.first().or_else(|| parameters.args.first())?;
        Some((first.parameter.name.as_str().to_owned(), class))
    }

    fn callable_flavor(&self, decorators: &[ast::Decorator]) -> Flavor {
        let in_class = self
            .scopes
            .get(self.current_scope_key())
            .is_some_and(|scope| scope.kind == ScopeKind::Class);
        if !in_class {
            return Flavor::Function;
        }
        for decorator in decorators {
            if let Expr::Name(ast::ExprName { id, .. }) = &decorator.expression {
                match id.as_str() {
                    "staticmethod" => return Flavor::StaticMethod,
                    "classmethod" => return Flavor::ClassMethod,
                    _ => {}
                }
            }
        }
        Flavor::Method
    }

    fn visit_parameter_exprs(&mut self, parameters: &ast::Parameters) {
        for param in parameters.posonlyargs.iter().chain(&parameters.args).chain(&parameters.kwonlyargs) {
            if let Some(default) = &param.default {
                self.visit_expr(default);
            }
            if let Some(annotation) = &param.parameter.annotation {
                self.visit_expr(annotation);
            }
        }
        if let Some(vararg) = &parameters.vararg
            && let Some(annotation) = &vararg.annotation
        {
            self.visit_expr(annotation);
        }
        if let Some(kwarg) = &parameters.kwarg
            && let Some(annotation) = &kwarg.annotation
        {
            self.visit_expr(annotation);
        }
    }

    fn class_def(&mut self, class: &ast::StmtClassDef) {
        let name = class.name.as_str();
        let loc = self.source_map.loc(class.name.range().start());
        let namespace = self.current_scope_key().to_owned();
        let vertex = self.graph.define(&namespace, name, Flavor::Class, self.filename, loc);
        let parent = self.current_vertex();
        self.graph.add_defines(parent, vertex);
        self.bind_name(name, Binding::Single(vertex));

        for decorator in &class.decorator_list {
            self.visit_expr(&decorator.expression);
        }

        // Record bases and compute the MRO before walking the body, so
        // attribute lookups from methods already see the linearization.
        let mut bases = Vec::new();
        if let Some(arguments) = &class.arguments {
            for base in &*arguments.args {
                let binding = self.evaluate_expr(base);
                // Inheritance shows up as the class using its base.
                for &base_vertex in binding.vertices() {
                    self.graph.add_uses(vertex, base_vertex);
                }
                bases.push(binding);
            }
            for keyword in &*arguments.keywords {
                self.visit_expr(&keyword.value);
            }
        }
        linearize_mro(self.graph, vertex, &bases);

        let scope_key = format!("{namespace}.{name}");
        self.class_stack.push(vertex);
        self.in_scope(scope_key, Some(vertex), |visitor| {
            visitor.visit_body(&class.body);
        });
        self.class_stack.pop();
    }

    fn lambda_def(&mut self, lambda: &ast::ExprLambda) {
        let loc = self.source_map.loc(lambda.range().start());
        let namespace = self.current_scope_key().to_owned();
        let vertex = self
            .graph
            .define(&namespace, "<lambda>", Flavor::Function, self.filename, loc);
        let parent = self.current_vertex();
        self.graph.add_defines(parent, vertex);
        if let Some(parameters) = &lambda.parameters {
            for param in parameters.posonlyargs.iter().chain(&parameters.args).chain(&parameters.kwonlyargs) {
                if let Some(default) = &param.default {
                    self.visit_expr(default);
                }
            }
        }
        let scope_key = format!("{namespace}.<lambda>");
        self.in_scope(scope_key, Some(vertex), |visitor| {
            visitor.visit_expr(&lambda.body);
        });
    }

    fn comprehension(&mut self, kind_name: &str, generators: &[ast::Comprehension], visit_elt: impl FnOnce(&mut Self)) {
        let scope_key = format!("{}.{kind_name}", self.current_scope_key());
        self.in_scope(scope_key, None, |visitor| {
            for generator in generators {
                visitor.visit_expr(&generator.iter);
                let iter_value = visitor.evaluate_expr(&generator.iter);
                if generator.is_async {
                    visitor.protocol_uses(&iter_value, &["__aiter__", "__anext__"]);
                } else {
                    visitor.protocol_uses(&iter_value, &["__iter__", "__next__"]);
                }
                let element = visitor.iterable_element_value(&generator.iter);
                visitor.bind_target(&generator.target, &element);
                for condition in &generator.ifs {
                    visitor.visit_expr(condition);
                }
            }
            visit_elt(visitor);
        });
    }

    fn match_pattern(&mut self, pattern: &Pattern, subject: &Binding) {
        match pattern {
            Pattern::MatchClass(p) => {
                // The class being matched is a load-context reference.
                self.visit_expr(&p.cls);
                for inner in &p.arguments.patterns {
                    self.match_pattern(inner, &Binding::Unresolved);
                }
                for keyword in &p.arguments.keywords {
                    self.match_pattern(&keyword.pattern, &Binding::Unresolved);
                }
            }
            Pattern::MatchAs(p) => {
                if let Some(inner) = &p.pattern {
                    self.match_pattern(inner, subject);
                }
                if let Some(name) = &p.name {
                    self.bind_name(name.as_str(), subject.clone());
                }
            }
            Pattern::MatchValue(p) => self.visit_expr(&p.value),
            Pattern::MatchSequence(p) => {
                for inner in &p.patterns {
                    self.match_pattern(inner, &Binding::Unresolved);
                }
            }
            Pattern::MatchMapping(p) => {
                for key in &p.keys {
                    self.visit_expr(key);
                }
                for inner in &p.patterns {
                    self.match_pattern(inner, &Binding::Unresolved);
                }
                if let Some(rest) = &p.rest {
                    self.bind_name(rest.as_str(), Binding::Unresolved);
                }
            }
            Pattern::MatchOr(p) => {
                for inner in &p.patterns {
                    self.match_pattern(inner, subject);
                }
            }
            Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    self.bind_name(name.as_str(), Binding::Unresolved);
                }
            }
            Pattern::MatchSingleton(_) => {}
        }
    }

    /// A bare identifier in load context: resolve through the scope stack
    /// and emit a uses edge, or fall back to a wildcard unless the name is
    /// a known local still awaiting a value.
    fn name_load(&mut self, name: &str) {
        match self.scopes.lookup(&self.scope_stack, name) {
            Some(binding) if binding.is_resolved() => {
                let binding = binding.clone();
                self.emit_uses(&binding);
            }
            // Bound somewhere on the stack, value not yet known: a loop
            // counter, parameter, or plain temporary. No wildcard.
            Some(_) => {}
            None => {
                let innermost = self.scopes.get(self.current_scope_key());
                if innermost.is_some_and(|scope| scope.is_local_without_value(name)) {
                    return;
                }
                let wildcard = self.graph.wildcard(name);
                self.emit_uses_to(wildcard);
            }
        }
    }

    /// `super` with no arguments, called inside a class body's method.
    pub(crate) fn is_builtin_super(&self, func: &Expr) -> bool {
        matches!(func, Expr::Name(ast::ExprName { id, .. })
            if id.as_str() == "super"
                && self.class_stack.last().is_some()
                && self.scopes.lookup(&self.scope_stack, "super").is_none())
    }
}

impl<'a> Visitor<'a> for GraphVisitor<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(function) => self.function_def(function),
            Stmt::ClassDef(class) => self.class_def(class),
            Stmt::Assign(assign) => self.assign(assign),
            Stmt::AugAssign(assign) => self.aug_assign(assign),
            Stmt::AnnAssign(assign) => self.ann_assign(assign),
            Stmt::TypeAlias(alias) => self.type_alias(alias),
            Stmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.visit_expr(iter);
                let iter_value = self.evaluate_expr(iter);
                if *is_async {
                    self.protocol_uses(&iter_value, &["__aiter__", "__anext__"]);
                } else {
                    self.protocol_uses(&iter_value, &["__iter__", "__next__"]);
                }
                let element = self.iterable_element_value(iter);
                self.bind_target(target, &element);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            Stmt::With(ast::StmtWith { is_async, items, body, .. }) => {
                for item in items {
                    self.visit_expr(&item.context_expr);
                    let manager = self.evaluate_expr(&item.context_expr);
                    if *is_async {
                        self.protocol_uses(&manager, &["__aenter__", "__aexit__"]);
                    } else {
                        self.protocol_uses(&manager, &["__enter__", "__exit__"]);
                    }
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars, &manager);
                    }
                }
                self.visit_body(body);
            }
            Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.visit_expr(subject);
                let subject_value = self.evaluate_expr(subject);
                for case in cases {
                    self.match_pattern(&case.pattern, &subject_value);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_body(&case.body);
                }
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for target in targets {
                    self.delete_target(target);
                }
            }
            Stmt::Import(import) => self.import_names(import),
            Stmt::ImportFrom(import) => self.import_from(import),
            // Declarations were recorded by the symbol-table pre-scan.
            Stmt::Global(_) | Stmt::Nonlocal(_) => {}
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(ast::ExprName { id, ctx, .. }) => {
                if matches!(ctx, ExprContext::Load) {
                    self.name_load(id.as_str());
                }
            }
            Expr::Attribute(ast::ExprAttribute { value, attr, ctx, .. }) => {
                if matches!(ctx, ExprContext::Load) {
                    self.visit_expr(value);
                    let base = self.evaluate_expr(value);
                    let resolved = resolve_attribute(self.graph, self.scopes, &base, attr.as_str());
                    self.emit_uses(&resolved);
                }
            }
            Expr::Call(ast::ExprCall { func, arguments, .. }) => {
                if !self.is_builtin_super(func) {
                    self.visit_expr(func);
                }
                for arg in &*arguments.args {
                    self.visit_expr(arg);
                }
                for keyword in &*arguments.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            Expr::Named(ast::ExprNamed { target, value, .. }) => {
                self.visit_expr(value);
                let binding = self.evaluate_expr(value);
                self.bind_target(target, &binding);
            }
            Expr::Lambda(lambda) => self.lambda_def(lambda),
            Expr::ListComp(ast::ExprListComp { elt, generators, .. }) => {
                self.comprehension("<listcomp>", generators, |visitor| visitor.visit_expr(elt));
            }
            Expr::SetComp(ast::ExprSetComp { elt, generators, .. }) => {
                self.comprehension("<setcomp>", generators, |visitor| visitor.visit_expr(elt));
            }
            Expr::Generator(ast::ExprGenerator { elt, generators, .. }) => {
                self.comprehension("<genexpr>", generators, |visitor| visitor.visit_expr(elt));
            }
            Expr::DictComp(ast::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.comprehension("<dictcomp>", generators, |visitor| {
                    if let Some(key) = key {
                        visitor.visit_expr(key);
                    }
                    visitor.visit_expr(value);
                });
            }
            _ => walk_expr(self, expr),
        }
    }
}
