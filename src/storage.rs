/// Scanning of source code comments for requirement references.
pub mod annotations;
/// Serialization of built graphs.
pub mod export;
mod files;
/// Markdown parsing for certification documents.
pub mod markdown;

pub use annotations::annotate;
pub use export::{ExportError, load_graph, load_graphs, save_graph};
pub use files::FileQuery;
pub use markdown::{ParseError, ParsedDocument, load_document, parse_document};
