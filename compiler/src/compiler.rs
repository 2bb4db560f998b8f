use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{
    config::CompileOptions,
    error::ParseError,
    file::parse_file_content,
    processor::{assemble_packages, Parse},
    resolver::resolve,
};

/// Compiles a set of schema files into a resolved [`Parse`].
///
/// `sources` maps each file's key (its path relative to the input root) to its
/// text, which is parsed as is. Returns the first error encountered.
pub fn compile(sources: &BTreeMap<String, String>, options: &CompileOptions) -> Result<Parse, ParseError> {
    let mut files = BTreeMap::new();

    for (path, text) in sources {
        if !path.ends_with(&format!(".{}", options.extension)) {
            debug!(file = %path, extension = %options.extension, "unexpected extension");
        }
        debug!(file = %path, bytes = text.len(), "parsing");
        files.insert(path.clone(), parse_file_content(path, text)?);
    }

    let mut parse = assemble_packages(files)?;
    resolve(&mut parse)?;

    info!(files = parse.files.len(), packages = parse.packages.len(), "compiled");
    Ok(parse)
}

/// Compiles a single file with default options.
pub fn compile_source(path: &str, text: &str) -> Result<Parse, ParseError> {
    let sources = BTreeMap::from([(path.to_string(), text.to_string())]);
    compile(&sources, &CompileOptions::default())
}
