//! Project export - packages the three fragments as a standalone project.
//!
//! Export works from the raw fragments, not the compiled document: the
//! archive holds a page that links `styles.css` and `script.js` by relative
//! path, so it opens in any browser without the playground.

use crate::source::{Fragment, SourceSet};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Default file name offered for the archive
pub const ARCHIVE_NAME: &str = "code-project.zip";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("destination {0} has no parent directory")]
    NoParent(PathBuf),
}

/// The `index.html` of an exported project. The body holds `markup` verbatim.
pub fn standalone_html(markup: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>My Code Project</title>
  <link rel="stylesheet" href="{styles}">
</head>
<body>
{markup}
  <script src="{script}"></script>
</body>
</html>"#,
        styles = Fragment::Style.file_name(),
        script = Fragment::Script.file_name(),
        markup = markup,
    )
}

/// Build the zip archive in memory.
pub fn export_archive(sources: &SourceSet) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for fragment in Fragment::ALL {
        let contents = match fragment {
            Fragment::Markup => standalone_html(&sources.markup),
            other => sources.get(other).to_string(),
        };
        zip.start_file(fragment.file_name(), options)?;
        zip.write_all(contents.as_bytes())
            .map_err(|e| ExportError::Archive(e.into()))?;
    }

    let bytes = zip.finish()?.into_inner();
    tracing::debug!(bytes = bytes.len(), "export archive built");
    Ok(bytes)
}

/// Build the archive and write it to `path`.
///
/// The bytes go to a temporary file next to `path` which is renamed into
/// place, so a failed export never leaves a partial archive behind.
pub fn write_archive(sources: &SourceSet, path: &Path) -> Result<(), ExportError> {
    let bytes = export_archive(sources)?;

    let dir = path
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .ok_or_else(|| ExportError::NoParent(path.to_path_buf()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ARCHIVE_NAME.to_string());
    let temp = dir.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4().simple()));

    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExportError::Io { path, source }
    };

    if let Err(e) = fs::write(&temp, &bytes).map_err(io_error(&temp)) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp, path).map_err(io_error(path)) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    tracing::info!(path = %path.display(), bytes = bytes.len(), "project exported");
    Ok(())
}
