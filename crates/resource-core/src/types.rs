use std::fmt;

use bytes::Bytes;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Default byte ceiling for local upload validation (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Default list page size.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Default delay before a successful upload is pruned from the queue.
pub const DEFAULT_SUCCESS_LINGER_MS: u64 = 800;

const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
];
const DEFAULT_ALLOWED_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];

/// Remote media asset as reported by the media API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAsset {
    /// Stable asset identifier (`fileId` on the wire).
    #[serde(rename = "fileId", alias = "id")]
    pub id: String,
    /// File name shown under the thumbnail.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Full-size asset URL.
    #[serde(default)]
    pub url: String,
    /// Thumbnail URL; may be empty for non-image assets.
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Size in bytes (`size` on the wire).
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    /// ISO-8601 creation timestamp, kept verbatim.
    #[serde(default)]
    pub created_at: String,
}

impl RemoteAsset {
    /// Creation time in milliseconds since Unix epoch, `0` when unparseable.
    pub fn created_at_ms(&self) -> i64 {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|parsed| parsed.timestamp_millis())
            .unwrap_or(0)
    }
}

/// Local file handed to the widget by a picker or drop source.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    /// MIME type reported by the source, for example `image/png`.
    pub mime_type: String,
    pub size_bytes: u64,
    /// Last-modified time in milliseconds since Unix epoch.
    pub last_modified_ms: u64,
    pub bytes: Bytes,
}

impl LocalFile {
    /// Build a local file whose size is taken from the payload.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified_ms: u64,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: bytes.len() as u64,
            last_modified_ms,
            bytes,
        }
    }

    /// Queue key derived from name, size and modification time.
    ///
    /// Stable for the same local file, not globally unique.
    pub fn upload_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.name, self.size_bytes, self.last_modified_ms
        )
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes)
            .field("last_modified_ms", &self.last_modified_ms)
            .finish_non_exhaustive()
    }
}

/// Upload lifecycle of one pending item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Validated and waiting for a transfer trigger.
    Ready,
    /// Transfer in progress.
    Uploading,
    /// Server accepted the file.
    Success,
    /// Validation or transfer failed; see `error_message`.
    Error,
}

/// Local file pending transfer to the media API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub key: String,
    pub source: LocalFile,
    pub display_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    /// Transfer progress in `0..=100`.
    pub progress_percent: u8,
    pub error_message: Option<String>,
}

impl PendingUpload {
    pub fn from_file(source: LocalFile) -> Self {
        Self {
            key: source.upload_key(),
            display_name: source.name.clone(),
            size_bytes: source.size_bytes,
            mime_type: source.mime_type.clone(),
            source,
            status: UploadStatus::Ready,
            progress_percent: 0,
            error_message: None,
        }
    }
}

/// Pagination cursor for the open session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListCursor {
    /// Number of assets merged so far; never decreases within a session.
    ///
    /// Local removals do not lower it, so after a delete it runs ahead of the
    /// held sequence. Appends request from the held length, not from here.
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
}

impl ListCursor {
    pub fn reset(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            has_more: true,
        }
    }
}

/// One list-page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub skip: usize,
    pub limit: usize,
    /// Optional server-side folder filter.
    pub path: Option<String>,
}

/// Destination metadata attached to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub folder: Option<String>,
    pub tags: Vec<String>,
}

impl UploadOptions {
    /// Tags joined the way the upload form expects them.
    pub fn joined_tags(&self) -> Option<String> {
        if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.join(","))
        }
    }
}

/// Cosmetic theme hint forwarded to renderers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Construction-time configuration for one widget instance.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceCenterConfig {
    /// Base URL for list and delete, for example `https://api.imagekit.io/v1/files`.
    pub list_endpoint: String,
    /// Upload URL, for example `https://upload.imagekit.io/api/v1/files/upload`.
    pub upload_endpoint: String,
    /// Secret encoded as HTTP Basic credential.
    pub private_key: String,
    /// Upload destination and list filter, when set.
    #[serde(alias = "folderPath")]
    pub upload_folder: Option<String>,
    pub upload_tags: Vec<String>,
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
    pub allowed_exts: Vec<String>,
    pub enable_delete: bool,
    pub enable_upload: bool,
    pub multi_select: bool,
    pub theme: Theme,
    pub page_size: usize,
    /// Per-request timeout; `None` waits indefinitely.
    pub request_timeout_ms: Option<u64>,
    pub success_linger_ms: u64,
    /// Substitute sample assets when the initial list fetch fails.
    pub offline_fallback: bool,
}

impl ResourceCenterConfig {
    pub fn new(
        list_endpoint: impl Into<String>,
        upload_endpoint: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            list_endpoint: list_endpoint.into(),
            upload_endpoint: upload_endpoint.into(),
            private_key: private_key.into(),
            ..Self::default()
        }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            folder: self
                .upload_folder
                .clone()
                .filter(|folder| !folder.trim().is_empty()),
            tags: self.upload_tags.clone(),
        }
    }
}

impl Default for ResourceCenterConfig {
    fn default() -> Self {
        Self {
            list_endpoint: String::new(),
            upload_endpoint: String::new(),
            private_key: String::new(),
            upload_folder: None,
            upload_tags: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_types: DEFAULT_ALLOWED_TYPES
                .iter()
                .map(|value| (*value).to_owned())
                .collect(),
            allowed_exts: DEFAULT_ALLOWED_EXTS
                .iter()
                .map(|value| (*value).to_owned())
                .collect(),
            enable_delete: true,
            enable_upload: true,
            multi_select: true,
            theme: Theme::Light,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_ms: None,
            success_linger_ms: DEFAULT_SUCCESS_LINGER_MS,
            offline_fallback: false,
        }
    }
}

impl fmt::Debug for ResourceCenterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCenterConfig")
            .field("list_endpoint", &self.list_endpoint)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("private_key", &"<redacted>")
            .field("upload_folder", &self.upload_folder)
            .field("upload_tags", &self.upload_tags)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_types", &self.allowed_types)
            .field("allowed_exts", &self.allowed_exts)
            .field("enable_delete", &self.enable_delete)
            .field("enable_upload", &self.enable_upload)
            .field("multi_select", &self.multi_select)
            .field("theme", &self.theme)
            .field("page_size", &self.page_size)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("success_linger_ms", &self.success_linger_ms)
            .field("offline_fallback", &self.offline_fallback)
            .finish()
    }
}

/// Command channel input accepted by the widget runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCommand {
    /// Open the widget and load the first page.
    Open,
    /// Close the widget and discard session state.
    Close,
    /// Reload the list from offset zero.
    Refresh,
    /// Append the next page when more are available.
    LoadMore,
    ToggleSelect { asset_id: String },
    /// Emit the selection in display order and close.
    Confirm,
    Delete { asset_id: String },
    /// Validate and queue local files.
    EnqueueFiles { files: Vec<LocalFile> },
    UploadPending { key: String },
    /// Upload every ready item sequentially.
    UploadAllPending,
    RemovePending { key: String },
    OpenPreview { asset_id: String },
    ClosePreview,
    ToggleMenu { asset_id: String },
    CopyLink { asset_id: String },
    OpenLink { asset_id: String },
    DismissError,
}

/// Session lifecycle reported to the embedder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

/// Acknowledgement emitted when one pending upload settles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadAck {
    pub key: String,
    pub status: UploadStatus,
    /// Asset id on success, when the server returned one.
    pub asset_id: Option<String>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
    /// User-facing failure text.
    pub error_message: Option<String>,
}

/// Event channel output consumed by the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceEvent {
    /// Widget opened or closed (`onOpenChange`).
    OpenChanged { open: bool },
    /// Selection confirmed in display order (`onConfirm`).
    Confirmed { assets: Vec<RemoteAsset> },
    /// User-facing error text (`onError`).
    Error { code: String, message: String },
    /// Visible asset list changed.
    GalleryChanged {
        asset_count: usize,
        has_more: bool,
        degraded: bool,
    },
    /// Transfer progress for the active upload.
    UploadProgress { key: String, percent: u8 },
    /// One pending upload reached `success` or `error`.
    UploadFinished(UploadAck),
}
