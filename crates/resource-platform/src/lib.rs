//! Environment capabilities injected into the Resource Center.
//!
//! The widget never touches a clipboard, a browser or the filesystem
//! directly; hosts hand it implementations of the traits below. In-memory
//! versions back tests and headless runs.

use std::{
    collections::HashMap,
    fs,
    io::Cursor,
    path::Path,
    sync::{Arc, RwLock},
    time::UNIX_EPOCH,
};

use bytes::Bytes;
use resource_core::LocalFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("object url not found")]
    NotFound,
    #[error("platform capability unavailable: {0}")]
    Unavailable(String),
    #[error("platform backend failure: {0}")]
    Backend(String),
    #[error("unable to read image preview: {0}")]
    Preview(String),
    #[error("file io failure: {0}")]
    Io(String),
}

pub trait ClipboardWriter: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), PlatformError>;
}

/// Creates short-lived object URLs for local file previews.
pub trait BlobUrlFactory: Send + Sync {
    fn create(&self, file: &LocalFile) -> Result<String, PlatformError>;

    fn revoke(&self, url: &str) -> Result<(), PlatformError>;
}

pub trait UrlOpener: Send + Sync {
    /// Open `url` in a new browsing context.
    fn open(&self, url: &str) -> Result<(), PlatformError>;
}

/// Source of files dropped onto the gallery.
pub trait FileDropSource: Send + Sync {
    /// Take every file dropped since the last call.
    fn drain(&self) -> Vec<LocalFile>;
}

#[derive(Clone, Default)]
pub struct InMemoryClipboard {
    text: Arc<RwLock<Option<String>>>,
}

impl InMemoryClipboard {
    pub fn contents(&self) -> Option<String> {
        self.text.read().ok().and_then(|text| text.clone())
    }
}

impl ClipboardWriter for InMemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), PlatformError> {
        let mut slot = self
            .text
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?;
        *slot = Some(text.to_owned());
        Ok(())
    }
}

/// Clipboard for environments without one; every write fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableClipboard;

impl ClipboardWriter for UnavailableClipboard {
    fn write_text(&self, _text: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable("clipboard".to_owned()))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBlobUrls {
    live: Arc<RwLock<HashMap<String, Bytes>>>,
    next_id: Arc<RwLock<u64>>,
}

impl InMemoryBlobUrls {
    /// Number of object URLs created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.live.read().map(|live| live.len()).unwrap_or_default()
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live
            .read()
            .map(|live| live.contains_key(url))
            .unwrap_or(false)
    }
}

impl BlobUrlFactory for InMemoryBlobUrls {
    fn create(&self, file: &LocalFile) -> Result<String, PlatformError> {
        let id = {
            let mut next = self
                .next_id
                .write()
                .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?;
            *next += 1;
            *next
        };
        let url = format!("blob:resource-center/{id}");
        self.live
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?
            .insert(url.clone(), file.bytes.clone());
        debug!(url = %url, name = %file.name, "object url created");
        Ok(url)
    }

    fn revoke(&self, url: &str) -> Result<(), PlatformError> {
        let mut live = self
            .live
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?;
        if live.remove(url).is_none() {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }
}

/// Records opened URLs instead of launching anything.
#[derive(Clone, Default)]
pub struct RecordingUrlOpener {
    opened: Arc<RwLock<Vec<String>>>,
}

impl RecordingUrlOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .read()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

impl UrlOpener for RecordingUrlOpener {
    fn open(&self, url: &str) -> Result<(), PlatformError> {
        self.opened
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?
            .push(url.to_owned());
        Ok(())
    }
}

/// Drop source fed by tests and headless hosts.
#[derive(Clone, Default)]
pub struct QueuedFileDrops {
    pending: Arc<RwLock<Vec<LocalFile>>>,
}

impl QueuedFileDrops {
    pub fn push(&self, file: LocalFile) -> Result<(), PlatformError> {
        self.pending
            .write()
            .map_err(|_| PlatformError::Backend("poisoned lock".to_owned()))?
            .push(file);
        Ok(())
    }
}

impl FileDropSource for QueuedFileDrops {
    fn drain(&self) -> Vec<LocalFile> {
        self.pending
            .write()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

/// Capabilities handed to a widget instance.
#[derive(Clone)]
pub struct PlatformServices {
    pub clipboard: Arc<dyn ClipboardWriter>,
    pub blob_urls: Arc<dyn BlobUrlFactory>,
    pub url_opener: Arc<dyn UrlOpener>,
}

impl PlatformServices {
    pub fn in_memory() -> Self {
        Self {
            clipboard: Arc::new(InMemoryClipboard::default()),
            blob_urls: Arc::new(InMemoryBlobUrls::default()),
            url_opener: Arc::new(RecordingUrlOpener::default()),
        }
    }
}

/// Decode just enough of an image to learn its pixel dimensions.
pub fn probe_image_dimensions(bytes: &[u8]) -> Result<(u32, u32), PlatformError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| PlatformError::Preview(err.to_string()))?
        .into_dimensions()
        .map_err(|err| PlatformError::Preview(err.to_string()))
}

/// Read a file from disk into a `LocalFile`, sniffing its MIME type.
pub fn load_local_file(path: &Path) -> Result<LocalFile, PlatformError> {
    let bytes = fs::read(path).map_err(|err| PlatformError::Io(err.to_string()))?;
    let modified_ms = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0);
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned());
    let mime = mime_from_bytes(&bytes)
        .or_else(|| mime_from_extension(&name))
        .unwrap_or("application/octet-stream");

    Ok(LocalFile::new(name, mime, modified_ms, Bytes::from(bytes)))
}

pub fn mime_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 8 && bytes[0..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        return Some("image/png");
    }
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return Some("image/jpeg");
    }
    if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Keep only dropped files whose MIME type is an image.
pub fn filter_dropped_images(files: Vec<LocalFile>) -> Vec<LocalFile> {
    files
        .into_iter()
        .filter(|file| file.mime_type.starts_with("image/"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tiny_png() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbaImage::new(3, 2)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn clipboard_keeps_last_write() {
        let clipboard = InMemoryClipboard::default();
        clipboard.write_text("one").expect("write one");
        clipboard.write_text("two").expect("write two");
        assert_eq!(clipboard.contents().as_deref(), Some("two"));
        assert!(UnavailableClipboard.write_text("x").is_err());
    }

    #[test]
    fn blob_urls_are_unique_and_revocable() {
        let factory = InMemoryBlobUrls::default();
        let file = LocalFile::new("a.png", "image/png", 1, vec![1, 2, 3]);

        let first = factory.create(&file).expect("create first");
        let second = factory.create(&file).expect("create second");
        assert_ne!(first, second);
        assert_eq!(factory.live_count(), 2);

        factory.revoke(&first).expect("revoke");
        assert!(!factory.is_live(&first));
        assert_eq!(factory.revoke(&first), Err(PlatformError::NotFound));
    }

    #[test]
    fn opener_records_urls() {
        let opener = RecordingUrlOpener::default();
        opener.open("https://ik.example/a.png").expect("open");
        assert_eq!(opener.opened(), vec!["https://ik.example/a.png"]);
    }

    #[test]
    fn probes_png_header_dimensions() {
        assert_eq!(probe_image_dimensions(&tiny_png()), Ok((3, 2)));
        assert!(matches!(
            probe_image_dimensions(b"not an image"),
            Err(PlatformError::Preview(_))
        ));
    }

    #[test]
    fn loads_file_and_sniffs_mime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("picture.bin");
        let png = tiny_png();
        let mut handle = fs::File::create(&path).expect("create");
        handle.write_all(&png).expect("write");
        drop(handle);

        let file = load_local_file(&path).expect("load");
        assert_eq!(file.name, "picture.bin");
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.size_bytes, png.len() as u64);
    }

    #[test]
    fn falls_back_to_extension_then_octet_stream() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("doc.PDF");
        fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let raw = dir.path().join("blob");
        fs::write(&raw, b"zzz").expect("write raw");

        assert_eq!(load_local_file(&pdf).expect("pdf").mime_type, "application/pdf");
        assert_eq!(
            load_local_file(&raw).expect("raw").mime_type,
            "application/octet-stream"
        );
        assert!(matches!(
            load_local_file(&dir.path().join("missing")),
            Err(PlatformError::Io(_))
        ));
    }

    #[test]
    fn queued_drops_drain_once() {
        let drops = QueuedFileDrops::default();
        drops
            .push(LocalFile::new("a.png", "image/png", 1, vec![1]))
            .expect("push");
        assert_eq!(drops.drain().len(), 1);
        assert!(drops.drain().is_empty());
    }

    #[test]
    fn drop_filter_keeps_images_only() {
        let files = vec![
            LocalFile::new("a.png", "image/png", 1, vec![1]),
            LocalFile::new("b.pdf", "application/pdf", 1, vec![1]),
        ];
        let kept = filter_dropped_images(files);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "a.png");
    }
}
