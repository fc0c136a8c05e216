//! Directory scanning utilities for discovering site documents.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::project::SiteLayout;
use crate::selection::DocumentInclusion;

/// Collect every selected document below the site root, sorted by path.
///
/// Hidden entries are always skipped and excluded directories are not descended into.
/// An unreadable root is an error; unreadable subdirectories are skipped.
pub fn collect_documents<S: DocumentInclusion>(
    layout: &SiteLayout,
    selection: &S,
) -> io::Result<Vec<PathBuf>> {
    fs::read_dir(&layout.root)?;

    let mut documents = Vec::new();
    collect_documents_recursively(
        &layout.root,
        Path::new(""),
        &layout.document_extension,
        selection,
        &mut documents,
    );
    documents.sort();
    Ok(documents)
}

fn collect_documents_recursively<S: DocumentInclusion>(
    dir: &Path,
    relative_root: &Path,
    extension: &str,
    selection: &S,
    documents: &mut Vec<PathBuf>,
) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let name_str = file_name.to_string_lossy();
            if name_str.starts_with('.') {
                continue;
            }

            let path = entry.path();
            if let Ok(file_type) = entry.file_type() {
                let next_relative = if relative_root.as_os_str().is_empty() {
                    PathBuf::from(&file_name)
                } else {
                    relative_root.join(&file_name)
                };
                let rel_path_str = next_relative.to_string_lossy().replace('\\', "/");

                if file_type.is_dir() {
                    if selection.prunes(&rel_path_str) {
                        continue;
                    }
                    collect_documents_recursively(
                        &path,
                        &next_relative,
                        extension,
                        selection,
                        documents,
                    );
                } else if file_type.is_file()
                    && has_extension(&path, extension)
                    && selection.is_included(&rel_path_str)
                {
                    documents.push(path);
                }
            }
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
