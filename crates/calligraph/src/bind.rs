//! The binding engine.
//!
//! Interprets assignment-like constructs and updates the current scope's
//! `defs`: what class or function each name currently points to. The value
//! of a right-hand side is determined by a controlled sub-traversal
//! ([`GraphVisitor::evaluate_expr`]) that follows names, attribute chains,
//! `super()`, and class instantiation, and gives up (`Unresolved`) on
//! anything else. Instances are tracked as their class throughout.

use ruff_python_ast::{self as ast, Expr, visitor::Visitor};

use crate::{
    graph::{Flavor, VertexId},
    resolve::{resolve_attribute, super_binding},
    scope::{Binding, Scope, ScopeKind},
    symtable::top_level_package,
    visit::{GraphVisitor, split_qualified},
};

impl GraphVisitor<'_> {
    /// Binds `name` in the scope an assignment from here writes into,
    /// honoring `global`/`nonlocal` declarations.
    pub(crate) fn bind_name(&mut self, name: &str, value: Binding) {
        let Some(key) = self.scopes.binding_scope_key(&self.scope_stack, name) else {
            return;
        };
        let key = key.clone();
        if let Some(scope) = self.scopes.get_mut(&key) {
            scope.defs.insert(name.to_owned(), value);
        }
    }

    /// The set of vertices an expression could denote.
    pub(crate) fn evaluate_expr(&mut self, expr: &Expr) -> Binding {
        match expr {
            Expr::Name(ast::ExprName { id, .. }) => self
                .scopes
                .lookup(&self.scope_stack, id.as_str())
                .cloned()
                .unwrap_or(Binding::Unresolved),
            Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let base = self.evaluate_expr(value);
                if !base.is_resolved() {
                    return Binding::Unresolved;
                }
                resolve_attribute(self.graph, self.scopes, &base, attr.as_str())
            }
            Expr::Call(ast::ExprCall { func, .. }) => {
                if self.is_builtin_super(func) {
                    return self
                        .enclosing_class()
                        .map_or(Binding::Unresolved, |class| super_binding(self.graph, class));
                }
                // Calling a class constructs an instance, which this
                // analyzer tracks as the class itself. Results of other
                // calls are not resolved.
                let callee = self.evaluate_expr(func);
                let classes: Vec<VertexId> = callee
                    .vertices()
                    .iter()
                    .copied()
                    .filter(|&id| self.graph.vertex(id).flavor == Flavor::Class)
                    .collect();
                Binding::from_vertices(classes)
            }
            Expr::Named(ast::ExprNamed { value, .. }) => self.evaluate_expr(value),
            Expr::Starred(ast::ExprStarred { value, .. }) => self.evaluate_expr(value),
            Expr::Lambda(_) => self
                .graph
                .lookup(self.current_scope_key(), "<lambda>")
                .map_or(Binding::Unresolved, Binding::Single),
            _ => Binding::Unresolved,
        }
    }

    /// The value each element of an iterable denotes, for binding loop
    /// targets: a union over literal sequence elements, unresolved for
    /// anything opaque.
    pub(crate) fn iterable_element_value(&mut self, iter: &Expr) -> Binding {
        let elts = match iter {
            Expr::Tuple(ast::ExprTuple { elts, .. })
            | Expr::List(ast::ExprList { elts, .. })
            | Expr::Set(ast::ExprSet { elts, .. }) => elts,
            _ => return Binding::Unresolved,
        };
        let mut vertices = Vec::new();
        for elt in elts {
            vertices.extend(self.evaluate_expr(elt).vertices().iter().copied());
        }
        Binding::from_vertices(vertices)
    }

    /// Ordinary assignment, including chained targets: `a = b = expr`
    /// binds every target to the value of `expr`.
    pub(crate) fn assign(&mut self, assign: &ast::StmtAssign) {
        self.visit_expr(&assign.value);
        for target in &assign.targets {
            self.bind_assignment_target(target, &assign.value);
        }
    }

    /// Augmented assignment re-binds the target to the union of its
    /// current value and the right-hand side, so `x += step` neither loses
    /// what `x` pointed to nor misses a re-binding.
    pub(crate) fn aug_assign(&mut self, assign: &ast::StmtAugAssign) {
        self.visit_expr(&assign.value);
        let new = self.evaluate_expr(&assign.value);
        match &*assign.target {
            Expr::Name(ast::ExprName { id, .. }) => {
                let existing = self
                    .scopes
                    .lookup(&self.scope_stack, id.as_str())
                    .cloned()
                    .unwrap_or(Binding::Unresolved);
                let merged = Binding::from_vertices(
                    existing.vertices().iter().chain(new.vertices()).copied(),
                );
                self.bind_name(id.as_str(), merged);
            }
            target => self.bind_target(target, &new),
        }
    }

    /// Annotated assignment: names in the annotation are load-context
    /// references; the value, when present, binds like an ordinary
    /// assignment.
    pub(crate) fn ann_assign(&mut self, assign: &ast::StmtAnnAssign) {
        self.visit_expr(&assign.annotation);
        if let Some(value) = &assign.value {
            self.visit_expr(value);
            self.bind_assignment_target(&assign.target, value);
        }
    }

    /// `type Alias = value` introduces a vertex of its own.
    pub(crate) fn type_alias(&mut self, alias: &ast::StmtTypeAlias) {
        if let Expr::Name(ast::ExprName { id, range, .. }) = &*alias.name {
            let loc = self.source_map.loc(range.start());
            let namespace = self.current_scope_key().to_owned();
            let filename = self.filename;
            let vertex = self.graph.define(&namespace, id.as_str(), Flavor::Name, filename, loc);
            let parent = self.current_vertex();
            self.graph.add_defines(parent, vertex);
            self.bind_name(id.as_str(), Binding::Single(vertex));
        }
        self.visit_expr(&alias.value);
    }

    /// Dispatches an assignment target, routing tuple/list targets through
    /// unpacking.
    fn bind_assignment_target(&mut self, target: &Expr, rhs: &Expr) {
        match target {
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                self.unpack(elts, rhs);
            }
            _ => {
                let value = self.evaluate_expr(rhs);
                self.bind_target(target, &value);
            }
        }
    }

    /// Binds one target to an already-evaluated value.
    pub(crate) fn bind_target(&mut self, target: &Expr, value: &Binding) {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => self.bind_name(id.as_str(), value.clone()),
            Expr::Attribute(attribute) => self.attribute_target(attribute, value),
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                // No per-element information at this point: every nested
                // target gets the whole value.
                for elt in elts {
                    self.bind_target(elt, value);
                }
            }
            Expr::Starred(ast::ExprStarred { value: inner, .. }) => self.bind_target(inner, value),
            // Subscript targets carry no name binding.
            _ => {}
        }
    }

    /// Tuple unpacking. With exactly one starred target and a literal
    /// tuple right-hand side of sufficient arity, targets match
    /// positionally and the starred target collects the middle; in every
    /// other shape each target is bound to the union of all right-hand
    /// side values.
    fn unpack(&mut self, targets: &[Expr], rhs: &Expr) {
        let values: Vec<Binding> = match rhs {
            Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                elts.iter().map(|elt| self.evaluate_expr(elt)).collect()
            }
            _ => {
                let value = self.evaluate_expr(rhs);
                for target in targets {
                    self.bind_target(target, &value);
                }
                return;
            }
        };

        let starred = targets
            .iter()
            .position(|target| matches!(target, Expr::Starred(_)));
        let star_count = targets
            .iter()
            .filter(|target| matches!(target, Expr::Starred(_)))
            .count();
        let non_starred = targets.len() - star_count;

        if star_count == 1 && values.len() >= non_starred {
            let star = starred.expect("starred position exists when star_count is 1");
            let suffix_len = targets.len() - star - 1;
            let middle_end = values.len() - suffix_len;

            for (target, value) in targets[..star].iter().zip(&values[..star]) {
                self.bind_target(target, value);
            }
            let middle = Binding::from_vertices(
                values[star..middle_end]
                    .iter()
                    .flat_map(|binding| binding.vertices().iter().copied()),
            );
            self.bind_target(&targets[star], &middle);
            for (target, value) in targets[star + 1..].iter().zip(&values[middle_end..]) {
                self.bind_target(target, value);
            }
        } else {
            let union = Binding::from_vertices(
                values
                    .iter()
                    .flat_map(|binding| binding.vertices().iter().copied()),
            );
            for target in targets {
                self.bind_target(target, &union);
            }
        }
    }

    /// `a.b.c = value`: the prefix is resolved like any attribute chain
    /// and the final attribute is recorded in the owner's scope. An
    /// unresolvable prefix skips the binding silently.
    fn attribute_target(&mut self, attribute: &ast::ExprAttribute, value: &Binding) {
        let base = self.evaluate_expr(&attribute.value);
        if !base.is_resolved() {
            return;
        }
        let name = attribute.attr.as_str();
        for &owner in base.vertices() {
            let owner_flavor = self.graph.vertex(owner).flavor;
            let kind = match owner_flavor {
                Flavor::Class => ScopeKind::Class,
                Flavor::Module => ScopeKind::Module,
                _ => continue,
            };
            let owner_key = self.graph.vertex(owner).qualified_name();
            let bound = if value.is_resolved() {
                value.clone()
            } else {
                // Keep a vertex for the attribute slot so later uses have
                // something concrete to point at.
                Binding::Single(self.graph.get_or_create(&owner_key, name, Flavor::Attribute))
            };
            if self.scopes.get(&owner_key).is_none() {
                self.scopes.insert(Scope::new(owner_key.clone(), kind));
            }
            if let Some(scope) = self.scopes.get_mut(&owner_key) {
                scope.defs.insert(name.to_owned(), bound);
            }
        }
    }

    /// `del` targets: plain names drop their binding; attribute and
    /// subscript deletion go through the corresponding protocol methods.
    pub(crate) fn delete_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(ast::ExprName { id, .. }) => {
                let Some(key) = self.scopes.binding_scope_key(&self.scope_stack, id.as_str()) else {
                    return;
                };
                let key = key.clone();
                if let Some(scope) = self.scopes.get_mut(&key) {
                    scope.defs.remove(id.as_str());
                }
            }
            Expr::Attribute(ast::ExprAttribute { value, .. }) => {
                self.visit_expr(value);
                let base = self.evaluate_expr(value);
                self.protocol_uses(&base, &["__delattr__"]);
            }
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.visit_expr(value);
                self.visit_expr(slice);
                let base = self.evaluate_expr(value);
                self.protocol_uses(&base, &["__delitem__"]);
            }
            other => self.visit_expr(other),
        }
    }

    /// `import a.b.c` / `import a.b.c as alias`: the alias binds the full
    /// module, a bare dotted import binds the top-level package.
    pub(crate) fn import_names(&mut self, import: &ast::StmtImport) {
        for alias in &import.names {
            let dotted = alias.name.as_str();
            let (namespace, terminal) = split_qualified(dotted);
            let module_vertex = self.graph.get_or_create(namespace, terminal, Flavor::Module);
            if let Some(asname) = &alias.asname {
                self.bind_name(asname.as_str(), Binding::Single(module_vertex));
            } else {
                let top = top_level_package(dotted);
                let top_vertex = self.graph.get_or_create("", top, Flavor::Module);
                self.bind_name(top, Binding::Single(top_vertex));
            }
        }
    }

    /// `from mod import name` binds `name` to the definition inside `mod`
    /// when the module is part of the analyzed set, and to a speculative
    /// vertex in that module's namespace otherwise.
    pub(crate) fn import_from(&mut self, import: &ast::StmtImportFrom) {
        let Some(module_key) = self.import_from_module_key(import) else {
            return;
        };
        for alias in &import.names {
            if alias.name.as_str() == "*" {
                // Nothing to bind without enumerating the other module.
                continue;
            }
            let target_name = alias.name.as_str();
            let binding_name = alias
                .asname
                .as_ref()
                .map_or(target_name, ruff_python_ast::Identifier::as_str);
            let known = self
                .scopes
                .get(&module_key)
                .and_then(|scope| scope.defs.get(target_name))
                .filter(|binding| binding.is_resolved())
                .cloned()
                .or_else(|| self.graph.lookup(&module_key, target_name).map(Binding::Single));
            let target = known.unwrap_or_else(|| {
                Binding::Single(self.graph.get_or_create(&module_key, target_name, Flavor::Unknown))
            });
            self.bind_name(binding_name, target);
        }
    }

    /// The dotted name of the module a from-import pulls from, with
    /// relative levels folded against the current module's package.
    fn import_from_module_key(&self, import: &ast::StmtImportFrom) -> Option<String> {
        let module = import.module.as_ref().map(ruff_python_ast::Identifier::as_str);
        if import.level == 0 {
            return module.map(str::to_owned);
        }
        let current = self.scope_stack.first()?;
        let mut parts: Vec<&str> = current.split('.').collect();
        for _ in 0..import.level {
            parts.pop()?;
        }
        let base = parts.join(".");
        match module {
            Some(name) if base.is_empty() => Some(name.to_owned()),
            Some(name) => Some(format!("{base}.{name}")),
            None => (!base.is_empty()).then_some(base),
        }
    }
}
