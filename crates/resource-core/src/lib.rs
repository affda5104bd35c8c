//! Core contract for the Resource Center media picker.
//!
//! This crate holds the widget's state machines (list store, upload queue,
//! selection, preview, session lifecycle), the command/event protocol, the
//! error taxonomy and the `MediaApi` seam implemented by remote clients.

/// Remote media operations consumed by the controller.
pub mod api;
/// Async command/event channel primitives.
pub mod channel;
/// Stable error type and HTTP classification helpers.
pub mod error;
/// Paginated asset list with stale-response suppression.
pub mod gallery;
/// Extension-based asset classification and tile labels.
pub mod media_kind;
/// Event normalization helpers (upload acknowledgements, error text).
pub mod normalization;
/// Full-size and pre-upload preview state.
pub mod preview;
/// Selected asset ids.
pub mod selection;
/// Session lifecycle and command gating.
pub mod state_machine;
/// Protocol and configuration types.
pub mod types;
/// Local upload queue with validation.
pub mod upload_queue;
/// Render-ready gallery snapshot.
pub mod view;

pub use api::{MediaApi, ProgressFn};
pub use channel::{EventStream, LagPolicy, ResourceChannelError, ResourceChannels};
pub use error::{
    ResourceError, ResourceErrorCategory, classify_http_status, message_from_error_body,
};
pub use gallery::{FetchKind, FetchPhase, FetchTicket, GalleryStore, MergeOutcome};
pub use media_kind::AssetKind;
pub use normalization::{FailedOperation, UploadOutcome, normalize_error, normalize_upload_outcome};
pub use preview::{LocalPreview, PreviewState};
pub use selection::SelectionSet;
pub use state_machine::{FeatureFlags, SessionMachine};
pub use types::{
    ListCursor, ListQuery, LocalFile, PendingUpload, RemoteAsset, ResourceCenterConfig,
    ResourceCommand, ResourceEvent, SessionState, Theme, UploadAck, UploadOptions, UploadStatus,
};
pub use upload_queue::{EnqueueOutcome, UploadLimits, UploadQueue};
pub use view::{AssetTile, GallerySnapshot, SnapshotSource};
