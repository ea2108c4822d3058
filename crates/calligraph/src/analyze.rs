//! The analysis pipeline.
//!
//! Ties the passes together: read sources, parse, build scope tables, run
//! the definition/binding/use traversal twice over the whole source set,
//! postprocess, and shape the output graph. Files are processed in the
//! order the caller supplied them, so a given input set always produces
//! the same graph.

use std::{
    fmt, fs, io,
    path::{Component, Path, PathBuf},
};

use indexmap::IndexMap;

use crate::{
    graph::{Flavor, Graph},
    parse::{CodeLoc, parse_file},
    postprocess::postprocess,
    scope::Scopes,
    symtable::build_scopes,
    visit::{ModuleSource, visit_module},
};

/// Caller-facing configuration of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Retain *defines* edges in the output.
    pub draw_defines: bool,
    /// Retain *uses* edges in the output.
    pub draw_uses: bool,
    /// Explicit project root; inferred from the inputs when `None`.
    pub root: Option<PathBuf>,
    /// Annotate each node with a per-file hue index (display only).
    pub color_by_file: bool,
    /// Attach a `filename:lineno` label to each node.
    pub annotate: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            draw_defines: true,
            draw_uses: true,
            root: None,
            color_by_file: false,
            annotate: false,
        }
    }
}

/// One input file: its display name, its path for module-name derivation,
/// and its contents.
#[derive(Debug)]
struct SourceInput {
    path: PathBuf,
    code: String,
}

/// The analyzer: collects sources, then runs the pipeline.
#[derive(Debug, Default)]
pub struct Analyzer {
    options: AnalyzerOptions,
    sources: Vec<SourceInput>,
}

impl Analyzer {
    #[must_use]
    pub fn new(options: AnalyzerOptions) -> Self {
        Self {
            options,
            sources: Vec::new(),
        }
    }

    /// Adds a file, reading it eagerly so unreadable input surfaces before
    /// any analysis is attempted.
    pub fn add_file(mut self, path: impl AsRef<Path>) -> Result<Self, AnalyzeError> {
        let path = path.as_ref();
        let code = fs::read_to_string(path).map_err(|error| AnalyzeError::Input {
            path: path.to_path_buf(),
            error,
        })?;
        self.sources.push(SourceInput {
            path: path.to_path_buf(),
            code,
        });
        Ok(self)
    }

    /// Adds an in-memory source. The filename is treated as a relative
    /// path for module-name derivation.
    #[must_use]
    pub fn add_source(mut self, code: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        self.sources.push(SourceInput {
            path: filename.into(),
            code: code.into(),
        });
        self
    }

    /// Runs the full pipeline over the collected sources.
    pub fn analyze(self) -> Result<Analysis, AnalyzeError> {
        let root = self
            .options
            .root
            .clone()
            .unwrap_or_else(|| infer_root(&self.sources.iter().map(|s| s.path.clone()).collect::<Vec<_>>()));

        // Parse every file up front; a file that fails to parse is
        // reported and contributes nothing.
        let mut skipped = Vec::new();
        let mut modules = Vec::new();
        for source in &self.sources {
            let filename = source.path.display().to_string();
            match parse_file(&source.code, &filename) {
                Ok(parsed) => {
                    let module_key = module_key_for(&source.path, &root);
                    modules.push((module_key, filename, parsed));
                }
                Err(error) => {
                    log::warn!("skipping {error}");
                    skipped.push(SkippedFile {
                        filename: error.filename().to_owned(),
                        loc: error.loc(),
                        message: error.to_string(),
                    });
                }
            }
        }

        // Scope tables are built once and reused by both iterations.
        let mut scopes = Scopes::new();
        for (module_key, _, parsed) in &modules {
            build_scopes(&parsed.module, module_key, &mut scopes);
        }

        // Two traversal iterations: the second resolves forward references
        // against the namespace the first one populated.
        let mut graph = Graph::new();
        for _ in 0..2 {
            for (module_key, filename, parsed) in &modules {
                let source = ModuleSource {
                    module_key,
                    filename,
                    source_map: &parsed.source_map,
                };
                visit_module(&mut graph, &mut scopes, &source, &parsed.module);
            }
        }

        let mut graph = postprocess(&graph);
        if self.options.color_by_file {
            assign_file_indices(&mut graph);
        }

        Ok(Analysis {
            graph: CallGraph::from_graph(&graph, &self.options),
            skipped,
        })
    }
}

/// Gives every vertex the hue index of its defining file, in first-seen
/// file order. Vertices without a known file keep no index and render in
/// the writers' default color.
fn assign_file_indices(graph: &mut Graph) {
    let mut order: IndexMap<String, u32> = IndexMap::new();
    let ids: Vec<_> = graph.vertex_ids().collect();
    for id in ids {
        let Some(filename) = graph.vertex(id).filename.clone() else {
            continue;
        };
        let next = u32::try_from(order.len()).unwrap_or(u32::MAX);
        let index = *order.entry(filename).or_insert(next);
        graph.vertex_mut(id).file_index = Some(index);
    }
}

/// The result of one run: the output graph plus the files that had to be
/// skipped.
#[derive(Debug)]
pub struct Analysis {
    pub graph: CallGraph,
    pub skipped: Vec<SkippedFile>,
}

/// A file dropped from the analysis because it failed to parse.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub loc: CodeLoc,
    pub message: String,
}

/// One node of the output graph.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphNode {
    pub namespace: String,
    pub name: String,
    pub flavor: Flavor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// 1-indexed line of the definition site.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    /// `filename:lineno`, present when the `annotate` option is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Hue index of the defining file, present when `color_by_file` is
    /// set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_index: Option<u32>,
}

/// The in-memory output graph handed to writers.
///
/// Nodes iterate in registry insertion order; edge lists are sorted by
/// `(source, target)` qualified names.
#[derive(Debug, serde::Serialize)]
pub struct CallGraph {
    pub nodes: IndexMap<String, GraphNode>,
    pub defines_edges: Vec<(String, String)>,
    pub uses_edges: Vec<(String, String)>,
}

impl CallGraph {
    fn from_graph(graph: &Graph, options: &AnalyzerOptions) -> Self {
        let mut nodes = IndexMap::new();
        for id in graph.vertex_ids() {
            let vertex = graph.vertex(id);
            let lineno = vertex.loc.map(CodeLoc::display_line);
            let label = match (options.annotate, &vertex.filename, lineno) {
                (true, Some(filename), Some(lineno)) => Some(format!("{filename}:{lineno}")),
                _ => None,
            };
            nodes.insert(
                vertex.qualified_name(),
                GraphNode {
                    namespace: vertex.namespace.clone(),
                    name: vertex.name.clone(),
                    flavor: vertex.flavor,
                    filename: vertex.filename.clone(),
                    lineno,
                    label,
                    file_index: vertex.file_index,
                },
            );
        }

        let qualify = |id| graph.vertex(id).qualified_name();
        let mut defines_edges = Vec::new();
        if options.draw_defines {
            defines_edges.extend(graph.defines_edges().map(|(s, t)| (qualify(s), qualify(t))));
            defines_edges.sort();
        }
        let mut uses_edges = Vec::new();
        if options.draw_uses {
            uses_edges.extend(graph.uses_edges().map(|(s, t)| (qualify(s), qualify(t))));
            uses_edges.sort();
        }

        Self {
            nodes,
            defines_edges,
            uses_edges,
        }
    }

    /// The number of distinct hue indices in use, for writers that turn
    /// indices into actual colors.
    #[must_use]
    pub fn file_index_count(&self) -> u32 {
        self.nodes
            .values()
            .filter_map(|node| node.file_index)
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// Infers the project root: start from the common ancestor of the inputs
/// and walk upward past any directory that declares itself a package,
/// stopping at the first non-package directory.
fn infer_root(paths: &[PathBuf]) -> PathBuf {
    let parents: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
    let Some(first) = parents.first() else {
        return PathBuf::new();
    };
    let mut ancestor: Vec<Component> = first.components().collect();
    for parent in &parents[1..] {
        let components: Vec<Component> = parent.components().collect();
        let shared = ancestor
            .iter()
            .zip(&components)
            .take_while(|(a, b)| a == b)
            .count();
        ancestor.truncate(shared);
    }
    let mut root: PathBuf = ancestor.iter().collect();
    while is_package_dir(&root) {
        let Some(parent) = root.parent() else { break };
        root = parent.to_path_buf();
    }
    root
}

fn is_package_dir(dir: &Path) -> bool {
    !dir.as_os_str().is_empty() && dir.join("__init__.py").is_file()
}

/// Derives the dotted module name of a file from the project root:
/// `<root>/pkg/mod.py` becomes `pkg.mod`, and a package `__init__.py`
/// names the package itself.
fn module_key_for(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    if let Some(last) = parts.last_mut() {
        if let Some(stem) = last.strip_suffix(".py") {
            *last = stem.to_owned();
        }
        if last == "__init__" {
            parts.pop();
        }
    }
    if parts.is_empty() {
        "module".to_owned()
    } else {
        parts.join(".")
    }
}

/// Errors that stop an analysis before it starts.
#[derive(Debug)]
pub enum AnalyzeError {
    /// An input path could not be read.
    Input { path: PathBuf, error: io::Error },
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input { path, error } => write!(f, "cannot read {}: {error}", path.display()),
        }
    }
}

impl std::error::Error for AnalyzeError {}
