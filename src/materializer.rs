//! On-demand file preparation.
//!
//! The host hands files over in arbitrary order, but resolving a composition
//! needs the target file ready. Asking the materializer for a file always
//! yields a prepared one, so the flat file list behaves like a graph that is
//! walked on demand.

use std::collections::HashMap;

use crate::source_file::SourceFile;

/// Read access to the files of a build by import path.
pub trait FileLookup {
    fn lookup(&mut self, import_path: &str) -> Option<&SourceFile>;
}

/// By-import-path file map that prepares files on first access.
pub struct Materializer {
    files: HashMap<String, SourceFile>,
    header: Option<String>,
    /// Paths handed out through `FileLookup` since `start_recording`.
    recorded: Option<Vec<String>>,
}

impl Materializer {
    pub fn new(files: impl IntoIterator<Item = SourceFile>, header: Option<String>) -> Self {
        let files = files
            .into_iter()
            .map(|file| (file.import_path.clone(), file))
            .collect();
        Self {
            files,
            header,
            recorded: None,
        }
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.files.contains_key(import_path)
    }

    /// Prepare a file once: decode its content, prepend the global header and
    /// clear its reference list. Returns `false` when the file is unknown.
    pub fn prepare(&mut self, import_path: &str) -> bool {
        let Some(file) = self.files.get_mut(import_path) else {
            return false;
        };
        if file.is_prepared {
            return true;
        }

        let contents = String::from_utf8_lossy(file.raw_bytes()).into_owned();
        file.contents = match &self.header {
            Some(header) => format!("{}\n\n{}", header, contents),
            None => contents,
        };
        file.raw_contents = file.contents.clone();
        file.referenced_import_paths.clear();
        file.is_prepared = true;
        true
    }

    pub fn get(&mut self, import_path: &str) -> Option<&mut SourceFile> {
        if !self.prepare(import_path) {
            return None;
        }
        self.files.get_mut(import_path)
    }

    /// Start tracking the files read through `FileLookup`.
    pub fn start_recording(&mut self) {
        self.recorded = Some(Vec::new());
    }

    /// Stop tracking and return the looked up paths, first lookup first,
    /// without duplicates.
    pub fn take_recorded(&mut self) -> Vec<String> {
        self.recorded.take().unwrap_or_default()
    }

    /// The file as it currently is, without preparing it.
    pub fn peek(&self, import_path: &str) -> Option<&SourceFile> {
        self.files.get(import_path)
    }
}

impl FileLookup for Materializer {
    fn lookup(&mut self, import_path: &str) -> Option<&SourceFile> {
        if !self.prepare(import_path) {
            return None;
        }
        if let Some(recorded) = &mut self.recorded {
            if !recorded.iter().any(|path| path == import_path) {
                recorded.push(import_path.to_string());
            }
        }
        self.files.get(import_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_file::InputFile;

    fn file(path: &str, contents: &str) -> SourceFile {
        SourceFile::from_input("/app", InputFile::new(path, contents, "web.browser"))
    }

    #[test]
    fn test_get_prepares_on_first_access() {
        let mut files = Materializer::new(vec![file("a.css", ".a { color: red; }")], None);
        assert!(!files.peek("/app/a.css").unwrap().is_prepared);

        let prepared = files.get("/app/a.css").unwrap();
        assert!(prepared.is_prepared);
        assert_eq!(prepared.contents, ".a { color: red; }");
        assert_eq!(prepared.raw_contents, prepared.contents);
    }

    #[test]
    fn test_header_is_prepended_once() {
        let mut files = Materializer::new(
            vec![file("a.css", ".a {}")],
            Some("$primary: red;".to_string()),
        );
        files.get("/app/a.css").unwrap().contents.push_str(" /* scoped */");

        // A second access must not redo preparation.
        let again = files.get("/app/a.css").unwrap();
        assert_eq!(again.raw_contents, "$primary: red;\n\n.a {}");
        assert_eq!(again.contents, "$primary: red;\n\n.a {} /* scoped */");
    }

    #[test]
    fn test_unknown_path() {
        let mut files = Materializer::new(Vec::new(), None);
        assert!(!files.prepare("/app/missing.css"));
        assert!(files.lookup("/app/missing.css").is_none());
    }

    #[test]
    fn test_lookups_are_recorded() {
        let mut files = Materializer::new(
            vec![file("a.css", ""), file("b.css", "")],
            None,
        );
        assert!(files.lookup("/app/a.css").is_some());

        files.start_recording();
        files.lookup("/app/b.css");
        files.lookup("/app/missing.css");
        files.lookup("/app/b.css");
        files.get("/app/a.css");
        assert_eq!(files.take_recorded(), vec!["/app/b.css".to_string()]);
        assert!(files.take_recorded().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let input = InputFile::new("a.css", vec![b'.', b'a', 0xff], "web.browser");
        let mut files = Materializer::new(vec![SourceFile::from_input("/app", input)], None);
        assert_eq!(files.get("/app/a.css").unwrap().contents, ".a\u{fffd}");
    }
}
