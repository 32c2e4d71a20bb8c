//! Python bindings for the `orgmode` crate, built as the `_orgmode`
//! extension module.

use orgmode::{Language, Parser, Tree};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use ropey::Rope;

fn load() -> PyResult<Language> {
    orgmode::language()
        .map_err(|e| PyValueError::new_err(format!("Error loading org mode grammar: {e}")))
}

fn parse_tree(text: &str) -> PyResult<Tree> {
    let language = load()?;
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    parser
        .parse(text)
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Name of the bundled grammar.
#[pyfunction]
fn language_name() -> PyResult<String> {
    Ok(load()?.name().to_owned())
}

/// ABI version of the bundled language.
#[pyfunction]
fn language_version() -> PyResult<usize> {
    Ok(load()?.version())
}

/// Returns `True` if the bundled grammar loads.
#[pyfunction]
fn can_load_grammar() -> bool {
    orgmode::language().is_ok()
}

/// Parses `text` and returns the tree as an s-expression.
#[pyfunction]
fn parse(py: Python<'_>, text: &str) -> PyResult<String> {
    let tree = py.allow_threads(|| parse_tree(text))?;
    Ok(tree.to_sexp())
}

/// Parses `text` and returns the tree as JSON.
#[pyfunction]
fn parse_json(py: Python<'_>, text: &str) -> PyResult<String> {
    let tree = py.allow_threads(|| parse_tree(text))?;
    Ok(tree.to_json())
}

/// Character ranges of every node of `kind` in `text`, in document order.
///
/// Python indexes strings by code point, so byte offsets from the tree are
/// converted before they are returned.
#[pyfunction]
fn node_spans(py: Python<'_>, text: &str, kind: &str) -> PyResult<Vec<(usize, usize)>> {
    let tree = py.allow_threads(|| parse_tree(text))?;
    let rope = Rope::from_str(text);
    Ok(tree
        .root_node()
        .walk()
        .filter(|node| node.kind() == kind)
        .map(|node| {
            (
                rope.byte_to_char(node.start_byte()),
                rope.byte_to_char(node.end_byte()),
            )
        })
        .collect())
}

#[pymodule]
fn _orgmode(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("LANGUAGE_VERSION", orgmode::LANGUAGE_VERSION)?;
    m.add_function(wrap_pyfunction!(language_name, m)?)?;
    m.add_function(wrap_pyfunction!(language_version, m)?)?;
    m.add_function(wrap_pyfunction!(can_load_grammar, m)?)?;
    m.add_function(wrap_pyfunction!(parse, m)?)?;
    m.add_function(wrap_pyfunction!(parse_json, m)?)?;
    m.add_function(wrap_pyfunction!(node_spans, m)?)?;
    Ok(())
}
