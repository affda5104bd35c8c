use serde::{Deserialize, Serialize};

use crate::types::RemoteAsset;

const VIDEO_EXTS: &[&str] = &[
    "mp4", "webm", "ogv", "mov", "avi", "wmv", "flv", "mkv", "mpeg", "mpg",
];

/// How a grid tile renders an asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    /// Rendered from its thumbnail, or a play placeholder when none exists.
    Video,
    /// Generic file tile.
    File,
}

/// Lower-cased extension from a name, falling back to the URL path.
pub fn extension_of(name: &str, url: Option<&str>) -> String {
    let from_name = extension_from(name);
    if !from_name.is_empty() {
        return from_name;
    }
    url.map(extension_from).unwrap_or_default()
}

fn extension_from(value: &str) -> String {
    let path = value.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTS.iter().any(|video| video.eq_ignore_ascii_case(ext))
}

/// Classify an asset against the configured image extension allow-list.
pub fn classify(asset: &RemoteAsset, allowed_exts: &[String]) -> AssetKind {
    let ext = extension_of(&asset.display_name, Some(&asset.url));
    if is_video_extension(&ext) {
        AssetKind::Video
    } else if allowed_exts.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)) {
        AssetKind::Image
    } else {
        AssetKind::File
    }
}

/// Badge text: upper-cased extension, or `FILE`.
pub fn format_label(asset: &RemoteAsset) -> String {
    let ext = extension_of(&asset.display_name, Some(&asset.url));
    if ext.is_empty() {
        "FILE".to_owned()
    } else {
        ext.to_ascii_uppercase()
    }
}

/// Size rounded to whole KiB, as shown under the thumbnail.
pub fn size_label(size_bytes: u64) -> String {
    format!("{}KB", (size_bytes as f64 / 1024.0).round() as u64)
}
