use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsStr,
    path::{Component, Path, PathBuf},
};

use super::{CodeTagger, TagRequest, TaggedSymbol, TaggerError, pipe};
use crate::domain::CodeFile;

/// Environment variable overriding the location of the `ctags` binary.
pub const CTAGS_ENV: &str = "REQTRACE_CTAGS";

/// File extensions of the languages ctags is asked to scan.
const SOURCE_EXTENSIONS: [&str; 5] = ["c", "h", "cc", "hh", "go"];

const CTAGS_ARGS: [&str; 10] = [
    // Avoid scanning JSON, markdown and friends.
    "--languages=C,C++,Go",
    // Functions only.
    "--kinds-C=f",
    "--kinds-C++=f",
    "--kinds-Go=f",
    // Line numbers.
    "--fields=n",
    "--recurse",
    "-f",
    "-",
    "-L",
    "-",
];

/// Finds functions using [Universal Ctags](https://ctags.io).
///
/// Only C, C++ and Go sources are tagged.
#[derive(Debug, Clone)]
pub struct CtagsTagger {
    program: PathBuf,
}

impl Default for CtagsTagger {
    /// Uses the binary named by `REQTRACE_CTAGS`, or `ctags` from the path.
    fn default() -> Self {
        let program =
            std::env::var_os(CTAGS_ENV).map_or_else(|| PathBuf::from("ctags"), PathBuf::from);
        Self::new(program)
    }
}

impl CtagsTagger {
    /// Uses a specific ctags binary.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The ctags binary.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Checks that the binary exists and is Universal Ctags.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be run or is another ctags.
    pub fn check_available(&self) -> Result<(), TaggerError> {
        let version = pipe::run(&self.program, &["--version"])?;
        if version.contains("Universal Ctags") {
            Ok(())
        } else {
            Err(TaggerError::NotUniversalCtags {
                program: self.program.display().to_string(),
            })
        }
    }
}

impl CodeTagger for CtagsTagger {
    fn tag(
        &self,
        request: &TagRequest<'_>,
    ) -> Result<BTreeMap<CodeFile, Vec<TaggedSymbol>>, TaggerError> {
        // Nothing to do, and no reason to require ctags.
        if request.files.is_empty() {
            return Ok(BTreeMap::new());
        }

        self.check_available()?;

        let paths: Vec<String> = request
            .files
            .iter()
            .map(|file| request.root.join(&file.path).display().to_string())
            .collect();
        let output = pipe::run_with_input(&self.program, &CTAGS_ARGS, &paths)?;

        let tags = parse_tags(&output, request)?;
        tracing::debug!(
            "ctags found {} symbols in {} files of {}",
            tags.values().map(Vec::len).sum::<usize>(),
            tags.len(),
            request.repo
        );
        Ok(tags)
    }
}

/// Parses ctags output lines of the form `name\tpath\tpattern\tline:N`.
///
/// Metadata lines, anonymous functions and files of other languages are
/// skipped, as are files that were not part of the request.
fn parse_tags(
    output: &str,
    request: &TagRequest<'_>,
) -> Result<BTreeMap<CodeFile, Vec<TaggedSymbol>>, TaggerError> {
    let files: HashMap<&str, &CodeFile> = request
        .files
        .iter()
        .map(|file| (file.path.as_str(), file))
        .collect();

    let mut tags: BTreeMap<CodeFile, Vec<TaggedSymbol>> = BTreeMap::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            continue;
        }

        let name = parts[0];
        if name.starts_with("__anon") {
            continue;
        }

        let path = Path::new(parts[1]);
        if !is_source_file(path) {
            continue;
        }

        let format_error = || TaggerError::Format {
            line: line.to_string(),
        };
        let number = parts[3]
            .strip_prefix("line:")
            .and_then(|number| number.parse().ok())
            .ok_or_else(format_error)?;

        let Some(file) =
            relative_path(request.root, path).and_then(|relative| files.get(relative.as_str()))
        else {
            tracing::trace!("Ignoring tag {name} in unrequested file {}", path.display());
            continue;
        };

        tags.entry((*file).clone())
            .or_default()
            .push(TaggedSymbol::new(name, number));
    }
    Ok(tags)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|extension| {
            SOURCE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
