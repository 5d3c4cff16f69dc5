//! Import path normalization.
//!
//! A file's identity is its absolute import path: the project root joined
//! with its package path, forward slashes only, `.` and `..` collapsed.

/// Convert backslashes and collapse `.`/`..` segments.
///
/// A leading `/` and a leading drive prefix (`D:`) are kept. `..` never climbs
/// above the first segment of an absolute path.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." && !is_drive(last) => {
                    segments.pop();
                }
                Some(last) if is_drive(last) => {}
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Identity of a file given its project-relative path.
pub fn absolute_import_path(project_root: &str, path_in_package: &str) -> String {
    let relative = path_in_package.replace('\\', "/");
    normalize(&format!("{}/{}", project_root.trim_end_matches(['/', '\\']), relative))
}

/// Directory portion of an import path (`"."` when there is none).
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => ".",
    }
}

/// Resolve a `composes ... from "<specifier>"` target.
///
/// - `./x` and `../x` are relative to the importing file,
/// - `/x` is relative to the project root,
/// - anything else is a package under `node_modules`.
pub fn resolve_specifier(project_root: &str, importer: &str, specifier: &str) -> String {
    let specifier = specifier.replace('\\', "/");
    if specifier.starts_with("./") || specifier.starts_with("../") {
        normalize(&format!("{}/{}", dirname(importer), specifier))
    } else if let Some(rooted) = specifier.strip_prefix('/') {
        absolute_import_path(project_root, rooted)
    } else {
        absolute_import_path(project_root, &format!("node_modules/{}", specifier))
    }
}
