//! Object-key conventions linking images to their results.
//!
//! The forward direction appends a whole suffix (`a.jpg` -> `a.jpg.json`)
//! and is the only one correlation relies on. The two reverse helpers differ:
//! one strips the whole suffix, the other whatever the last extension is.

pub const ANNOTATION_SUFFIX: &str = ".json";
pub const ANSWER_SUFFIX: &str = ".txt";

/// Key of the annotation JSON for an image key.
pub fn json_filename_for_image(image_name: &str) -> String {
    format!("{}{}", image_name, ANNOTATION_SUFFIX)
}

/// Remove a trailing `.json` as a whole suffix, if present.
#[cfg(test)]
pub fn strip_json_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(ANNOTATION_SUFFIX)
}

/// Case-insensitive check used to filter annotation listings.
pub fn is_annotation_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(ANNOTATION_SUFFIX)
}

/// Image key for an annotation key: drop the last extension.
#[cfg(test)]
pub fn image_filename_for_json(json_name: &str) -> &str {
    let (stem, _) = split_extension(json_name);
    stem
}

/// Key of the VQA answer file: basename without extension plus `.txt`.
pub fn answer_filename_for_image(image_name: &str) -> String {
    let basename = image_name.rsplit('/').next().unwrap_or(image_name);
    let (stem, _) = split_extension(basename);
    format!("{}{}", stem, ANSWER_SUFFIX)
}

/// Split `name` into `(root, ext)` where `ext` is empty or starts with `.`.
///
/// Only the final path component is inspected and leading dots do not start
/// an extension, so `.bashrc` and `dir.d/file` have none.
fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();
    match base.rfind('.') {
        Some(dot) if dot >= leading_dots => name.split_at(base_start + dot),
        _ => (name, ""),
    }
}
