//! Symbol-table pre-scan.
//!
//! Before any edges are emitted, every compound construct in every file
//! gets a [`Scope`] record listing the names bound in it (assigned targets,
//! imports, definitions, parameters, iteration variables, pattern captures)
//! and its `global`/`nonlocal` declarations. The later passes consult these
//! tables to decide whether a bare identifier is a local awaiting a value
//! or a genuinely unknown reference, keeping "where does this name
//! resolve?" separate from "what does it point to?".

use ruff_python_ast::{
    self as ast, Expr, ModModule, Parameters, Pattern, Stmt,
    visitor::{Visitor, walk_expr, walk_stmt},
};

use crate::scope::{Binding, Scope, ScopeKind, Scopes};

/// Builds the scope table for one parsed module.
///
/// `module_key` is the module's dotted name; it becomes the key of the
/// module scope and the prefix of every nested scope key.
pub(crate) fn build_scopes(module: &ModModule, module_key: &str, scopes: &mut Scopes) {
    let mut builder = ScopeBuilder {
        scopes,
        stack: vec![module_key.to_owned()],
    };
    builder.ensure_scope(module_key, ScopeKind::Module);
    for stmt in &module.body {
        builder.visit_stmt(stmt);
    }
}

struct ScopeBuilder<'s> {
    scopes: &'s mut Scopes,
    stack: Vec<String>,
}

impl ScopeBuilder<'_> {
    fn current_key(&self) -> &str {
        self.stack.last().expect("scope stack is never empty")
    }

    fn child_key(&self, name: &str) -> String {
        format!("{}.{name}", self.current_key())
    }

    fn ensure_scope(&mut self, key: &str, kind: ScopeKind) {
        if self.scopes.get(key).is_none() {
            self.scopes.insert(Scope::new(key, kind));
        }
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        let key = self.stack.last().expect("scope stack is never empty").clone();
        self.scopes.get_mut(&key).expect("current scope exists")
    }

    /// Records an ordinary assigned name.
    fn bind(&mut self, name: &str) {
        let scope = self.current_scope_mut();
        if !scope.globals.contains(name) && !scope.nonlocals.contains(name) {
            scope.locals.insert(name.to_owned());
        }
    }

    /// Records a parameter: a local that starts out without a value.
    fn bind_param(&mut self, name: &str) {
        let scope = self.current_scope_mut();
        scope.locals.insert(name.to_owned());
        scope.defs.entry(name.to_owned()).or_insert(Binding::Unresolved);
    }

    /// Records an imported name. Imports are bound but deliberately kept
    /// out of `locals`: an unresolvable reference to one should still
    /// surface as a wildcard rather than be suppressed as a temporary.
    fn bind_import(&mut self, name: &str) {
        let scope = self.current_scope_mut();
        scope.locals.remove(name);
        scope.defs.entry(name.to_owned()).or_insert(Binding::Unresolved);
    }

    /// Binds every plain name in an assignment target.
    fn bind_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => self.bind(id.as_str()),
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                for elt in elts {
                    self.bind_target(elt);
                }
            }
            Expr::Starred(ast::ExprStarred { value, .. }) => self.bind_target(value),
            // Attribute and subscript targets bind no local name.
            _ => {}
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchAs(p) => {
                if let Some(name) = &p.name {
                    self.bind(name.as_str());
                }
                if let Some(inner) = &p.pattern {
                    self.bind_pattern(inner);
                }
            }
            Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    self.bind(name.as_str());
                }
            }
            Pattern::MatchSequence(p) => {
                for inner in &p.patterns {
                    self.bind_pattern(inner);
                }
            }
            Pattern::MatchMapping(p) => {
                for inner in &p.patterns {
                    self.bind_pattern(inner);
                }
                if let Some(rest) = &p.rest {
                    self.bind(rest.as_str());
                }
            }
            Pattern::MatchOr(p) => {
                for inner in &p.patterns {
                    self.bind_pattern(inner);
                }
            }
            Pattern::MatchClass(p) => {
                for inner in &p.arguments.patterns {
                    self.bind_pattern(inner);
                }
                for keyword in &p.arguments.keywords {
                    self.bind_pattern(&keyword.pattern);
                }
            }
            Pattern::MatchValue(_) | Pattern::MatchSingleton(_) => {}
        }
    }

    fn bind_parameters(&mut self, parameters: &Parameters) {
        for param in &parameters.posonlyargs {
            self.bind_param(param.parameter.name.as_str());
        }
        for param in &parameters.args {
            self.bind_param(param.parameter.name.as_str());
        }
        if let Some(vararg) = &parameters.vararg {
            self.bind_param(vararg.name.as_str());
        }
        for param in &parameters.kwonlyargs {
            self.bind_param(param.parameter.name.as_str());
        }
        if let Some(kwarg) = &parameters.kwarg {
            self.bind_param(kwarg.name.as_str());
        }
    }

    /// Runs `body` with `key` pushed as the innermost scope.
    fn in_scope(&mut self, key: String, kind: ScopeKind, body: impl FnOnce(&mut Self)) {
        self.ensure_scope(&key, kind);
        self.stack.push(key);
        body(self);
        self.stack.pop();
    }
}

impl<'a> Visitor<'a> for ScopeBuilder<'_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(function) => {
                self.bind(function.name.as_str());
                // Decorators, defaults, and annotations evaluate in the
                // enclosing scope.
                for decorator in &function.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
                self.visit_parameter_defaults(&function.parameters);
                if let Some(returns) = &function.returns {
                    self.visit_expr(returns);
                }
                let key = self.child_key(function.name.as_str());
                self.in_scope(key, ScopeKind::Function, |builder| {
                    builder.bind_parameters(&function.parameters);
                    for stmt in &function.body {
                        builder.visit_stmt(stmt);
                    }
                });
            }
            Stmt::ClassDef(class) => {
                self.bind(class.name.as_str());
                for decorator in &class.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
                if let Some(arguments) = &class.arguments {
                    for base in &*arguments.args {
                        self.visit_expr(base);
                    }
                    for keyword in &*arguments.keywords {
                        self.visit_expr(&keyword.value);
                    }
                }
                let key = self.child_key(class.name.as_str());
                self.in_scope(key, ScopeKind::Class, |builder| {
                    for stmt in &class.body {
                        builder.visit_stmt(stmt);
                    }
                });
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                for target in targets {
                    self.bind_target(target);
                }
                self.visit_expr(value);
            }
            Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.bind_target(target);
                self.visit_expr(value);
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                // Annotation-only `x: T` still makes `x` local.
                self.bind_target(target);
                self.visit_expr(annotation);
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.bind_target(target);
                self.visit_expr(iter);
                for stmt in body {
                    self.visit_stmt(stmt);
                }
                for stmt in orelse {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::With(ast::StmtWith { items, body, .. }) => {
                for item in items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target(vars);
                    }
                }
                for stmt in body {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.visit_expr(subject);
                for case in cases {
                    self.bind_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    for stmt in &case.body {
                        self.visit_stmt(stmt);
                    }
                }
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                for stmt in body {
                    self.visit_stmt(stmt);
                }
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(exc_type) = &handler.type_ {
                        self.visit_expr(exc_type);
                    }
                    if let Some(name) = &handler.name {
                        self.bind(name.as_str());
                    }
                    for stmt in &handler.body {
                        self.visit_stmt(stmt);
                    }
                }
                for stmt in orelse {
                    self.visit_stmt(stmt);
                }
                for stmt in finalbody {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::Import(ast::StmtImport { names, .. }) => {
                for alias in names {
                    let binding = alias.asname.as_ref().map_or_else(
                        || top_level_package(alias.name.as_str()),
                        ruff_python_ast::Identifier::as_str,
                    );
                    self.bind_import(binding);
                }
            }
            Stmt::ImportFrom(ast::StmtImportFrom { names, .. }) => {
                for alias in names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let binding = alias
                        .asname
                        .as_ref()
                        .map_or_else(|| alias.name.as_str(), ruff_python_ast::Identifier::as_str);
                    self.bind_import(binding);
                }
            }
            Stmt::Global(ast::StmtGlobal { names, .. }) => {
                let scope = self.current_scope_mut();
                for name in names {
                    scope.globals.insert(name.as_str().to_owned());
                    scope.locals.remove(name.as_str());
                }
            }
            Stmt::Nonlocal(ast::StmtNonlocal { names, .. }) => {
                let scope = self.current_scope_mut();
                for name in names {
                    scope.nonlocals.insert(name.as_str().to_owned());
                    scope.locals.remove(name.as_str());
                }
            }
            Stmt::TypeAlias(ast::StmtTypeAlias { name, value, .. }) => {
                self.bind_target(name);
                self.visit_expr(value);
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Named(ast::ExprNamed { target, value, .. }) => {
                self.bind_target(target);
                self.visit_expr(value);
            }
            Expr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                if let Some(parameters) = parameters {
                    self.visit_parameter_defaults(parameters);
                }
                let key = self.child_key("<lambda>");
                self.in_scope(key, ScopeKind::Lambda, |builder| {
                    if let Some(parameters) = parameters {
                        builder.bind_parameters(parameters);
                    }
                    builder.visit_expr(body);
                });
            }
            Expr::ListComp(ast::ExprListComp { elt, generators, .. }) => {
                self.comprehension_scope("<listcomp>", generators, |builder| builder.visit_expr(elt));
            }
            Expr::SetComp(ast::ExprSetComp { elt, generators, .. }) => {
                self.comprehension_scope("<setcomp>", generators, |builder| builder.visit_expr(elt));
            }
            Expr::Generator(ast::ExprGenerator { elt, generators, .. }) => {
                self.comprehension_scope("<genexpr>", generators, |builder| builder.visit_expr(elt));
            }
            Expr::DictComp(ast::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => {
                self.comprehension_scope("<dictcomp>", generators, |builder| {
                    if let Some(key) = key {
                        builder.visit_expr(key);
                    }
                    builder.visit_expr(value);
                });
            }
            _ => walk_expr(self, expr),
        }
    }
}

impl ScopeBuilder<'_> {
    /// Default expressions evaluate in the enclosing scope, not the
    /// function scope they parameterize.
    fn visit_parameter_defaults<'a>(&mut self, parameters: &'a Parameters) {
        for param in parameters.posonlyargs.iter().chain(&parameters.args).chain(&parameters.kwonlyargs) {
            if let Some(default) = &param.default {
                self.visit_expr(default);
            }
        }
    }

    /// Isolates comprehension iteration variables in a synthetic scope so
    /// they never appear as locals of the enclosing function, regardless of
    /// whether the target language version inlines comprehensions.
    fn comprehension_scope<'a>(
        &mut self,
        kind_name: &str,
        generators: &'a [ast::Comprehension],
        visit_elt: impl FnOnce(&mut Self),
    ) {
        let key = self.child_key(kind_name);
        self.in_scope(key, ScopeKind::Comprehension, |builder| {
            for generator in generators {
                builder.bind_target(&generator.target);
                builder.visit_expr(&generator.iter);
                for condition in &generator.ifs {
                    builder.visit_expr(condition);
                }
            }
            visit_elt(builder);
        });
    }
}

/// `import a.b.c` binds the top-level package name `a`.
pub(crate) fn top_level_package(dotted: &str) -> &str {
    dotted.split('.').next().unwrap_or(dotted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_file;

    fn scopes_for(code: &str) -> Scopes {
        let parsed = parse_file(code, "test.py").unwrap();
        let mut scopes = Scopes::new();
        build_scopes(&parsed.module, "test", &mut scopes);
        scopes
    }

    #[test]
    fn assigned_names_become_locals() {
        let scopes = scopes_for("def f():\n    x = 1\n    y, z = 1, 2\n");
        let scope = scopes.get("test.f").unwrap();
        for name in ["x", "y", "z"] {
            assert!(scope.locals.contains(name), "{name} should be local");
        }
    }

    #[test]
    fn parameters_are_locals_without_values() {
        let scopes = scopes_for("def f(a, b=1, *args, **kwargs):\n    pass\n");
        let scope = scopes.get("test.f").unwrap();
        for name in ["a", "b", "args", "kwargs"] {
            assert!(scope.is_local_without_value(name), "{name} should await a value");
        }
    }

    #[test]
    fn comprehension_targets_stay_out_of_the_enclosing_scope() {
        let scopes = scopes_for("def f(xs):\n    return [x for x in xs]\n");
        assert!(!scopes.get("test.f").unwrap().locals.contains("x"));
        assert!(scopes.get("test.f.<listcomp>").unwrap().locals.contains("x"));
    }

    #[test]
    fn global_declaration_removes_the_local() {
        let scopes = scopes_for("def f():\n    global counter\n    counter = 1\n");
        let scope = scopes.get("test.f").unwrap();
        assert!(scope.globals.contains("counter"));
        assert!(!scope.locals.contains("counter"));
    }

    #[test]
    fn imports_are_bound_but_not_suppressing_locals() {
        let scopes = scopes_for("import os.path\nfrom sys import argv as args\n");
        let scope = scopes.get("test").unwrap();
        assert!(!scope.locals.contains("os"));
        assert!(!scope.locals.contains("args"));
        assert!(scope.defs.contains_key("os"));
        assert!(scope.defs.contains_key("args"));
    }

    #[test]
    fn walrus_target_binds_in_the_enclosing_scope() {
        let scopes = scopes_for("def f(xs):\n    if (n := len(xs)) > 1:\n        return n\n");
        assert!(scopes.get("test.f").unwrap().locals.contains("n"));
    }

    #[test]
    fn match_captures_bind() {
        let scopes = scopes_for("def f(v):\n    match v:\n        case [a, *rest]:\n            return a\n");
        let scope = scopes.get("test.f").unwrap();
        assert!(scope.locals.contains("a"));
        assert!(scope.locals.contains("rest"));
    }
}
