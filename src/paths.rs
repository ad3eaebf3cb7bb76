//! Deterministic artifact path derivation and path matching.
//!
//! Object paths are posix-style, slash-separated strings in the storage
//! bucket namespace, not filesystem paths. Derivation is pure and total:
//! the same (source, size) inputs always yield the same artifact path, which
//! is what lets concurrent invocations converge and lets the deletion sweep
//! find everything a generation produced.

use crate::models::ImageSize;

/// Subfolder holding derived renditions, inserted as the last path segment
/// before the filename
pub const THUMBNAIL_SUBFOLDER: &str = "thumbnails";

/// Split a source path into (parent directory, stem, extension).
///
/// The extension keeps its leading dot and may be empty; a filename whose
/// only dot is the leading one (`.env`) has no extension. Trailing slashes
/// (folder placeholder objects) are stripped first, so the stem is never
/// empty for a slash-terminated name.
fn split_source(path: &str) -> (&str, &str, &str) {
    let path = path.trim_end_matches('/');
    let (parent, file) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => (&file[..i], &file[i..]),
        _ => (file, ""),
    };
    (parent, stem, ext)
}

fn under_subfolder(parent: &str, leaf: &str) -> String {
    if parent.is_empty() {
        format!("{}/{}", THUMBNAIL_SUBFOLDER, leaf)
    } else {
        format!("{}/{}/{}", parent, THUMBNAIL_SUBFOLDER, leaf)
    }
}

/// Build the artifact path for one rendition of a source object.
///
/// Example: `abc/photo.jpg` -> `abc/thumbnails/photo_512x512.jpg`
pub fn thumbnail_path(source: &str, size: ImageSize) -> String {
    let (parent, stem, ext) = split_source(source);
    under_subfolder(parent, &format!("{}_{}{}", stem, size, ext))
}

/// Prefix covering every rendition of a source object, at any size and with
/// any extension. Used by the deletion sweep.
///
/// Example: `abc/photo.jpg` -> `abc/thumbnails/photo`
pub fn sweep_prefix(source: &str) -> String {
    let (parent, stem, _) = split_source(source);
    under_subfolder(parent, stem)
}

/// True when the path already sits inside the thumbnail subfolder. Such a
/// path is never itself a generation source.
pub fn is_thumbnail(path: &str) -> bool {
    let (parent, _, _) = split_source(path);
    parent.rsplit('/').next() == Some(THUMBNAIL_SUBFOLDER)
}

/// True when the path falls inside the monitored set: the set contains `/`
/// (match everything), or the path starts with any configured prefix. The
/// match is a plain string prefix, not path-segment-aware. An empty set
/// monitors nothing.
pub fn is_monitored(path: &str, monitored: &[String]) -> bool {
    monitored
        .iter()
        .any(|prefix| prefix == "/" || path.starts_with(prefix.as_str()))
}
