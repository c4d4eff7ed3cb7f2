//! Graphs saved to and loaded from JSON.
//!
//! Each repository can be built on its own and exported; the exported graphs
//! are then loaded and merged into one before reporting. Resolved
//! parent/child links are not exported. They are rebuilt once every graph
//! has been merged.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{CodeSymbol, Config, FlowTag, Graph, Issue, MergeError, Requirement};

/// Errors that can occur when saving or loading graphs.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A graph file could not be read or written.
    #[error("failed to access graph file {}", path.display())]
    Io {
        /// The graph file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A graph file is not a graph this version understands.
    #[error("invalid graph file {}", path.display())]
    Json {
        /// The graph file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// The loaded graphs disagree.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// The serialized versions of a graph.
#[derive(Debug, Serialize)]
#[serde(tag = "_version")]
enum Exported<'a> {
    #[serde(rename = "1", rename_all = "camelCase")]
    V1 {
        requirements: Vec<&'a Requirement>,
        code_symbols: &'a [CodeSymbol],
        flow_tags: Vec<&'a FlowTag>,
        issues: &'a [Issue],
        config: &'a Config,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_version")]
enum Imported {
    #[serde(rename = "1", rename_all = "camelCase")]
    V1 {
        #[serde(default)]
        requirements: Vec<Requirement>,
        #[serde(default)]
        code_symbols: Vec<CodeSymbol>,
        #[serde(default)]
        flow_tags: Vec<FlowTag>,
        #[serde(default)]
        issues: Vec<Issue>,
        config: Config,
    },
}

impl From<Imported> for Graph {
    fn from(imported: Imported) -> Self {
        match imported {
            Imported::V1 {
                requirements,
                code_symbols,
                flow_tags,
                issues,
                config,
            } => {
                let mut graph = Self::new(config);
                graph.requirements = requirements
                    .into_iter()
                    .map(|req| (req.id.clone(), req))
                    .collect();
                for symbol in code_symbols {
                    graph.add_code_symbol(symbol);
                }
                graph.flow_tags = flow_tags
                    .into_iter()
                    .map(|tag| (tag.id.clone(), tag))
                    .collect();
                graph.issues = issues;
                graph
            }
        }
    }
}

/// Writes a graph to a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
#[instrument(skip(graph))]
pub fn save_graph(graph: &Graph, path: &Path) -> Result<(), ExportError> {
    let io_error = |source: io::Error| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let exported = Exported::V1 {
        requirements: graph.requirements().values().collect(),
        code_symbols: graph.code_symbols(),
        flow_tags: graph.flow_tags().values().collect(),
        issues: graph.issues(),
        config: graph.config(),
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, &exported).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)?;

    tracing::debug!(
        "Saved {} requirements and {} code symbols",
        graph.requirements().len(),
        graph.code_symbols().len()
    );
    Ok(())
}

/// Reads a graph from a JSON file.
///
/// Parent/child links are left empty.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a graph.
#[instrument]
pub fn load_graph(path: &Path) -> Result<Graph, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let imported: Imported =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(imported.into())
}

/// Reads several graphs and merges them, in order, into one.
///
/// Parent/child links are filled in once every graph is merged.
///
/// # Errors
///
/// Returns an error if a graph cannot be read, or if two graphs define the
/// same requirement or flow tag differently.
pub fn load_graphs<P: AsRef<Path>>(paths: &[P]) -> Result<Graph, ExportError> {
    let mut merged = Graph::default();
    for path in paths {
        merged.merge(load_graph(path.as_ref())?)?;
    }
    merged.link_back_references();
    Ok(merged)
}
