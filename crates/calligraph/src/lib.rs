#![doc = include_str!("../../../README.md")]

mod analyze;
mod bind;
mod graph;
mod parse;
mod postprocess;
mod render;
mod resolve;
mod scope;
mod symtable;
mod visit;

pub use crate::{
    analyze::{Analysis, AnalyzeError, Analyzer, AnalyzerOptions, CallGraph, GraphNode, SkippedFile},
    graph::Flavor,
    parse::{CodeLoc, ParseError},
    render::{to_dot, to_json},
};
