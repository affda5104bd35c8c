use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::Utc;
use resource_core::{
    EnqueueOutcome, EventStream, FailedOperation, FeatureFlags, FetchKind, FetchTicket,
    GallerySnapshot, GalleryStore, LocalFile, LocalPreview, MediaApi, MergeOutcome, PreviewState,
    ProgressFn, RemoteAsset, ResourceCenterConfig, ResourceChannels, ResourceCommand,
    ResourceError, ResourceErrorCategory, ResourceEvent, SelectionSet, SessionMachine,
    SessionState, SnapshotSource, UploadLimits, UploadOutcome, UploadQueue, UploadStatus,
    gallery::SERVER_PAGE_SIZE_CAP, normalization::user_message, normalize_error,
    normalize_upload_outcome,
};
use resource_platform::{
    FileDropSource, PlatformServices, filter_dropped_images, probe_image_dimensions,
};
use tokio::time::sleep;
use tracing::{debug, info, warn};

const COPIED_FLAG_MS: u64 = 2_000;
const SVG_MIME: &str = "image/svg+xml";

/// Result of one `upload_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

struct WidgetState {
    session: SessionMachine,
    gallery: GalleryStore,
    uploads: UploadQueue,
    selection: SelectionSet,
    preview: PreviewState,
    local_preview: Option<LocalPreview>,
    error_text: Option<String>,
    active_menu: Option<String>,
    copied: Option<String>,
    copied_token: u64,
}

impl WidgetState {
    fn new(config: &ResourceCenterConfig) -> Self {
        let folder_filter = config
            .upload_folder
            .clone()
            .filter(|folder| !folder.trim().is_empty());
        Self {
            session: SessionMachine::new(FeatureFlags {
                enable_upload: config.enable_upload,
                enable_delete: config.enable_delete,
            }),
            gallery: GalleryStore::new(
                GalleryStore::bounded_page_size(config.page_size, SERVER_PAGE_SIZE_CAP),
                folder_filter,
            ),
            uploads: UploadQueue::new(UploadLimits::from_config(config)),
            selection: SelectionSet::new(config.multi_select),
            preview: PreviewState::default(),
            local_preview: None,
            error_text: None,
            active_menu: None,
            copied: None,
            copied_token: 0,
        }
    }

    /// Drop per-session state. Returns the object URL that still needs revoking.
    fn clear_session(&mut self, config: &ResourceCenterConfig) -> Option<String> {
        self.gallery.reset();
        self.uploads = UploadQueue::new(UploadLimits::from_config(config));
        self.selection.clear();
        self.preview.close();
        self.error_text = None;
        self.active_menu = None;
        self.copied = None;
        self.local_preview.take().map(|preview| preview.object_url)
    }
}

struct Shared<A> {
    api: A,
    platform: PlatformServices,
    config: ResourceCenterConfig,
    channels: ResourceChannels,
    state: Mutex<WidgetState>,
}

/// One Resource Center widget instance.
///
/// Cloning yields another handle to the same widget. Network calls run
/// without holding the state lock; their results are applied only if the
/// session that issued them is still open. Methods that schedule timers
/// (`upload_one`, `upload_all`, `copy_link`) must run inside a Tokio runtime.
pub struct ResourceCenter<A: MediaApi> {
    shared: Arc<Shared<A>>,
}

impl<A: MediaApi> Clone for ResourceCenter<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A: MediaApi> ResourceCenter<A> {
    pub fn new(api: A, platform: PlatformServices, config: ResourceCenterConfig) -> Self {
        let (channels, _commands) = ResourceChannels::new(1, 512);
        Self::with_channels(api, platform, config, channels)
    }

    pub fn with_channels(
        api: A,
        platform: PlatformServices,
        config: ResourceCenterConfig,
        channels: ResourceChannels,
    ) -> Self {
        let state = WidgetState::new(&config);
        Self {
            shared: Arc::new(Shared {
                api,
                platform,
                config,
                channels,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &ResourceCenterConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> EventStream {
        self.shared.channels.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.lock().session.state()
    }

    /// Open the widget with a fresh session and load the first page.
    pub async fn open(&self) -> Result<(), ResourceError> {
        self.start_session();
        self.refresh().await
    }

    /// Open a fresh session without fetching.
    pub(crate) fn start_session(&self) {
        let stale_url = {
            let mut state = self.lock();
            let stale_url = state.clear_session(&self.shared.config);
            let events = state.session.open();
            self.shared.channels.emit_all(events);
            stale_url
        };
        self.revoke_object_url(stale_url);
        info!("resource center opened");
    }

    /// Close the widget. In-flight requests finish but their results are dropped.
    pub fn close(&self) {
        let (closed, stale_url) = {
            let mut state = self.lock();
            let events = state.session.close();
            let closed = !events.is_empty();
            self.shared.channels.emit_all(events);
            (closed, state.clear_session(&self.shared.config))
        };
        self.revoke_object_url(stale_url);
        if closed {
            info!("resource center closed");
        }
    }

    /// Reload from offset zero; older list responses become stale.
    ///
    /// Issuing a fetch clears the error banner.
    pub async fn refresh(&self) -> Result<(), ResourceError> {
        let (ticket, epoch) = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::Refresh)?;
            state.error_text = None;
            (state.gallery.begin_initial(), state.session.epoch())
        };
        let result = self
            .with_timeout(self.shared.api.list_page(ticket.query.clone()))
            .await;
        self.apply_page(&ticket, epoch, result)
    }

    /// Fetch the next page. Returns `false` when nothing was requested.
    pub async fn load_more(&self) -> Result<bool, ResourceError> {
        let (ticket, epoch) = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::LoadMore)?;
            let Some(ticket) = state.gallery.begin_append() else {
                return Ok(false);
            };
            state.error_text = None;
            (ticket, state.session.epoch())
        };
        let result = self
            .with_timeout(self.shared.api.list_page(ticket.query.clone()))
            .await;
        self.apply_page(&ticket, epoch, result).map(|()| true)
    }

    pub async fn delete(&self, asset_id: &str) -> Result<(), ResourceError> {
        let epoch = {
            let state = self.lock();
            state.session.check(&ResourceCommand::Delete {
                asset_id: asset_id.to_owned(),
            })?;
            state.session.epoch()
        };
        let result = self.with_timeout(self.shared.api.delete(asset_id)).await;

        let mut state = self.lock();
        if !state.session.is_current(epoch) {
            debug!(asset_id, "dropping delete result for a closed session");
            return result;
        }
        match result {
            Ok(()) => {
                state.gallery.remove(asset_id);
                state.selection.remove(asset_id);
                if state.active_menu.as_deref() == Some(asset_id) {
                    state.active_menu = None;
                }
                if state
                    .preview
                    .current()
                    .is_some_and(|asset| asset.id == asset_id)
                {
                    state.preview.close();
                }
                info!(asset_id, "asset deleted");
                self.shared.channels.emit(gallery_changed(&state.gallery));
                Ok(())
            }
            Err(err) => {
                warn!(asset_id, code = %err.code, "delete failed");
                state.error_text = Some(user_message(FailedOperation::Delete, &err));
                self.shared
                    .channels
                    .emit(normalize_error(FailedOperation::Delete, &err));
                Err(err)
            }
        }
    }

    /// Validate and queue local files. Rejected files stay listed with their message.
    pub fn enqueue(&self, files: Vec<LocalFile>) -> Result<Vec<EnqueueOutcome>, ResourceError> {
        let mut state = self.lock();
        state.session.check(&ResourceCommand::EnqueueFiles { files: Vec::new() })?;
        let outcomes = state.uploads.enqueue(files);
        for outcome in &outcomes {
            if let EnqueueOutcome::Rejected { error, .. } = outcome {
                self.shared
                    .channels
                    .emit(normalize_error(FailedOperation::Other, error));
            }
        }
        Ok(outcomes)
    }

    /// Queue dropped files, ignoring anything that is not an image.
    pub fn accept_drop(&self, files: Vec<LocalFile>) -> Result<Vec<EnqueueOutcome>, ResourceError> {
        let total = files.len();
        let images = filter_dropped_images(files);
        if images.len() != total {
            debug!(ignored = total - images.len(), "ignored non-image drops");
        }
        self.enqueue(images)
    }

    pub fn accept_drop_from(
        &self,
        source: &dyn FileDropSource,
    ) -> Result<Vec<EnqueueOutcome>, ResourceError> {
        self.accept_drop(source.drain())
    }

    /// Upload one ready item. Refused while a batch is running.
    pub async fn upload_one(&self, key: &str) -> Result<UploadStatus, ResourceError> {
        let (file, epoch) = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::UploadPending {
                key: key.to_owned(),
            })?;
            let file = state.uploads.start_single(key)?;
            (file, state.session.epoch())
        };
        self.transfer(key, file, epoch).await
    }

    /// Upload every ready item in queue order, one at a time.
    ///
    /// A failed item does not stop the batch.
    pub async fn upload_all(&self) -> Result<BatchSummary, ResourceError> {
        let (keys, epoch) = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::UploadAllPending)?;
            let keys = state.uploads.begin_batch()?;
            (keys, state.session.epoch())
        };

        let mut summary = BatchSummary::default();
        for key in keys {
            let file = {
                let mut state = self.lock();
                if !state.session.is_current(epoch) {
                    break;
                }
                match state.uploads.start(&key) {
                    Ok(file) => file,
                    Err(err) => {
                        debug!(%key, code = %err.code, "skipping item that is no longer ready");
                        continue;
                    }
                }
            };
            match self.transfer(&key, file, epoch).await {
                Ok(_) => summary.succeeded.push(key),
                Err(_) => summary.failed.push(key),
            }
        }

        let mut state = self.lock();
        if state.session.is_current(epoch) {
            state.uploads.end_batch();
        }
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "upload batch settled"
        );
        Ok(summary)
    }

    /// Remove a pending item that is not currently transferring.
    pub fn remove_pending(&self, key: &str) -> Result<(), ResourceError> {
        let stale_url = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::RemovePending {
                key: key.to_owned(),
            })?;
            match state.uploads.get(key).map(|item| item.status) {
                None => return Err(upload_not_found(key)),
                Some(UploadStatus::Uploading) => {
                    return Err(ResourceError::new(
                        ResourceErrorCategory::Validation,
                        "upload_in_progress",
                        format!("upload '{key}' is transferring and cannot be removed"),
                    ));
                }
                Some(_) => {}
            }
            state.uploads.remove(key);
            if state
                .local_preview
                .as_ref()
                .is_some_and(|preview| preview.key == key)
            {
                state.local_preview.take().map(|preview| preview.object_url)
            } else {
                None
            }
        };
        self.revoke_object_url(stale_url);
        Ok(())
    }

    pub fn toggle_select(&self, asset_id: &str) -> Result<(), ResourceError> {
        let mut state = self.lock();
        state.session.check(&ResourceCommand::ToggleSelect {
            asset_id: asset_id.to_owned(),
        })?;
        state.selection.toggle(asset_id);
        Ok(())
    }

    /// Emit the selected assets in display order, then close the widget.
    pub fn confirm(&self) -> Result<Vec<RemoteAsset>, ResourceError> {
        let assets = {
            let state = self.lock();
            state.session.check(&ResourceCommand::Confirm)?;
            let assets = state.selection.confirm(state.gallery.assets());
            self.shared.channels.emit(ResourceEvent::Confirmed {
                assets: assets.clone(),
            });
            assets
        };
        info!(count = assets.len(), "selection confirmed");
        self.close();
        Ok(assets)
    }

    pub fn open_preview(&self, asset_id: &str) -> Result<(), ResourceError> {
        let mut state = self.lock();
        state.session.check(&ResourceCommand::OpenPreview {
            asset_id: asset_id.to_owned(),
        })?;
        let asset = state
            .gallery
            .find(asset_id)
            .cloned()
            .ok_or_else(|| asset_not_found(asset_id))?;
        state.preview.open(asset);
        Ok(())
    }

    pub fn close_preview(&self) -> Result<(), ResourceError> {
        let mut state = self.lock();
        state.session.check(&ResourceCommand::ClosePreview)?;
        state.preview.close();
        Ok(())
    }

    /// Preview a pending local file before uploading it.
    ///
    /// Size/type violations and undecodable images are recorded as a blocking
    /// message; the preview still opens so the user sees why.
    pub fn open_local_preview(&self, key: &str) -> Result<LocalPreview, ResourceError> {
        let (file, validation, previous_url) = {
            let mut state = self.lock();
            state.session.check(&ResourceCommand::UploadPending {
                key: key.to_owned(),
            })?;
            let file = state
                .uploads
                .get(key)
                .map(|item| item.source.clone())
                .ok_or_else(|| upload_not_found(key))?;
            let validation = state.uploads.limits().validate(&file).err();
            let previous_url = state.local_preview.take().map(|preview| preview.object_url);
            (file, validation, previous_url)
        };
        self.revoke_object_url(previous_url);

        let object_url = self
            .shared
            .platform
            .blob_urls
            .create(&file)
            .map_err(|err| ResourceError::preview(err.to_string()))?;

        let (dimensions, decode_error) = if file.mime_type == SVG_MIME {
            (None, None)
        } else {
            match probe_image_dimensions(&file.bytes) {
                Ok(dimensions) => (Some(dimensions), None),
                Err(err) => {
                    debug!(%key, error = %err, "local preview decode failed");
                    (
                        None,
                        Some(ResourceError::preview("Unable to read image preview")),
                    )
                }
            }
        };
        let blocking_message = validation
            .map(|err| err.message)
            .or_else(|| decode_error.as_ref().map(|err| err.message.clone()));

        let preview = LocalPreview {
            key: key.to_owned(),
            object_url,
            dimensions,
            blocking_message,
        };
        let replaced = {
            let mut state = self.lock();
            if let Some(err) = &decode_error {
                self.shared
                    .channels
                    .emit(normalize_error(FailedOperation::Preview, err));
            }
            state
                .local_preview
                .replace(preview.clone())
                .map(|old| old.object_url)
        };
        self.revoke_object_url(replaced);
        Ok(preview)
    }

    pub fn close_local_preview(&self) {
        let url = self
            .lock()
            .local_preview
            .take()
            .map(|preview| preview.object_url);
        self.revoke_object_url(url);
    }

    /// Close the local preview and upload its file, unless a blocking message exists.
    pub async fn upload_from_local_preview(&self) -> Result<UploadStatus, ResourceError> {
        let (key, url) = {
            let mut state = self.lock();
            let preview = state.local_preview.clone().ok_or_else(|| {
                ResourceError::validation("no_local_preview", "no local preview is open")
            })?;
            state.session.check(&ResourceCommand::UploadPending {
                key: preview.key.clone(),
            })?;
            if !preview.can_upload() {
                let message = preview.blocking_message.unwrap_or_default();
                let err = ResourceError::validation("preview_blocked", message.clone());
                state.error_text = Some(message);
                self.shared
                    .channels
                    .emit(normalize_error(FailedOperation::Preview, &err));
                return Err(err);
            }
            state.local_preview = None;
            (preview.key, Some(preview.object_url))
        };
        self.revoke_object_url(url);
        self.upload_one(&key).await
    }

    /// Open the context menu for an asset, closing any other; toggling again closes it.
    pub fn toggle_menu(&self, asset_id: &str) -> Result<(), ResourceError> {
        let mut state = self.lock();
        state.session.check(&ResourceCommand::ToggleMenu {
            asset_id: asset_id.to_owned(),
        })?;
        state.active_menu = if state.active_menu.as_deref() == Some(asset_id) {
            None
        } else {
            Some(asset_id.to_owned())
        };
        Ok(())
    }

    /// Copy an asset link. Clipboard failures are silent and return `Ok(false)`.
    pub fn copy_link(&self, asset_id: &str) -> Result<bool, ResourceError> {
        let url = self.asset_url(
            asset_id,
            &ResourceCommand::CopyLink {
                asset_id: asset_id.to_owned(),
            },
        )?;
        if let Err(err) = self.shared.platform.clipboard.write_text(&url) {
            debug!(asset_id, error = %err, "clipboard write failed");
            return Ok(false);
        }

        let token = {
            let mut state = self.lock();
            state.copied = Some(asset_id.to_owned());
            state.copied_token = state.copied_token.wrapping_add(1);
            state.copied_token
        };
        let center = self.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(COPIED_FLAG_MS)).await;
            let mut state = center.lock();
            if state.copied_token == token {
                state.copied = None;
            }
        });
        Ok(true)
    }

    /// Open an asset link externally. Opener failures are logged only.
    pub fn open_link(&self, asset_id: &str) -> Result<(), ResourceError> {
        let url = self.asset_url(
            asset_id,
            &ResourceCommand::OpenLink {
                asset_id: asset_id.to_owned(),
            },
        )?;
        if let Err(err) = self.shared.platform.url_opener.open(&url) {
            warn!(asset_id, error = %err, "failed to open asset link");
        }
        Ok(())
    }

    pub fn dismiss_error(&self) {
        self.lock().error_text = None;
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        let state = self.lock();
        let config = &self.shared.config;
        GallerySnapshot::build(SnapshotSource {
            open: state.session.state() == SessionState::Open,
            theme: config.theme,
            allowed_exts: &config.allowed_exts,
            gallery: &state.gallery,
            uploads: &state.uploads,
            selection: &state.selection,
            preview: &state.preview,
            local_preview: state.local_preview.as_ref(),
            error_text: state.error_text.as_deref(),
            active_menu: state.active_menu.as_deref(),
            copied: state.copied.as_deref(),
            can_upload: config.enable_upload,
            can_delete: config.enable_delete,
        })
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_page(
        &self,
        ticket: &FetchTicket,
        epoch: u64,
        result: Result<Vec<RemoteAsset>, ResourceError>,
    ) -> Result<(), ResourceError> {
        let mut state = self.lock();
        if !state.session.is_current(epoch) {
            debug!("dropping list response for a closed session");
            return Ok(());
        }
        match state.gallery.apply(ticket, result) {
            Ok(MergeOutcome::Stale) => Ok(()),
            Ok(MergeOutcome::Applied { added }) => {
                debug!(added, total = state.gallery.assets().len(), "list page merged");
                self.shared.channels.emit(gallery_changed(&state.gallery));
                Ok(())
            }
            Err(err) => {
                if ticket.kind == FetchKind::Initial && self.shared.config.offline_fallback {
                    state.gallery.enter_degraded(Utc::now().timestamp_millis());
                }
                state.error_text = Some(user_message(FailedOperation::List, &err));
                self.shared
                    .channels
                    .emit(normalize_error(FailedOperation::List, &err));
                self.shared.channels.emit(gallery_changed(&state.gallery));
                Err(err)
            }
        }
    }

    async fn transfer(
        &self,
        key: &str,
        file: LocalFile,
        epoch: u64,
    ) -> Result<UploadStatus, ResourceError> {
        let progress = self.progress_sink(key, epoch);
        let options = self.shared.config.upload_options();
        let result = self
            .with_timeout(self.shared.api.upload(file, options, progress))
            .await;

        let mut state = self.lock();
        if !state.session.is_current(epoch) {
            debug!(%key, "dropping upload result for a closed session");
            return result.map(|_| UploadStatus::Success);
        }
        state.uploads.finish(key, &result)?;
        self.shared.channels.emit(normalize_upload_outcome(
            key,
            UploadOutcome::from(result.clone()),
        ));
        drop(state);

        match result {
            Ok(_) => {
                info!(%key, "upload finished");
                self.schedule_prune(key.to_owned(), epoch);
                Ok(UploadStatus::Success)
            }
            Err(err) => {
                warn!(%key, code = %err.code, "upload failed");
                Err(err)
            }
        }
    }

    fn progress_sink(&self, key: &str, epoch: u64) -> ProgressFn {
        let center = self.clone();
        let key = key.to_owned();
        Arc::new(move |percent| center.record_progress(&key, epoch, percent))
    }

    fn record_progress(&self, key: &str, epoch: u64, percent: u8) {
        let mut state = self.lock();
        if !state.session.is_current(epoch) {
            return;
        }
        let before = state.uploads.get(key).map(|item| item.progress_percent);
        if let Some(stored) = state.uploads.set_progress(key, percent)
            && before != Some(stored)
        {
            self.shared.channels.emit(ResourceEvent::UploadProgress {
                key: key.to_owned(),
                percent: stored,
            });
        }
    }

    /// After the linger delay, drop the finished item and reload the list.
    fn schedule_prune(&self, key: String, epoch: u64) {
        let center = self.clone();
        let linger = Duration::from_millis(self.shared.config.success_linger_ms);
        tokio::spawn(async move {
            sleep(linger).await;
            let current = {
                let mut state = center.lock();
                let current = state.session.is_current(epoch);
                if current && state.uploads.prune_succeeded(&key) {
                    debug!(%key, "pruned finished upload");
                }
                current
            };
            if current && let Err(err) = center.refresh().await {
                debug!(code = %err.code, "refresh after upload failed");
            }
        });
    }

    async fn with_timeout<T>(
        &self,
        request: impl Future<Output = Result<T, ResourceError>>,
    ) -> Result<T, ResourceError> {
        let Some(timeout_ms) = self.shared.config.request_timeout_ms else {
            return request.await;
        };
        let limit = Duration::from_millis(timeout_ms);
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms, "media request timed out");
                Err(ResourceError::timeout(limit))
            }
        }
    }

    fn asset_url(&self, asset_id: &str, command: &ResourceCommand) -> Result<String, ResourceError> {
        let state = self.lock();
        state.session.check(command)?;
        state
            .gallery
            .find(asset_id)
            .map(|asset| asset.url.clone())
            .ok_or_else(|| asset_not_found(asset_id))
    }

    fn revoke_object_url(&self, url: Option<String>) {
        if let Some(url) = url
            && let Err(err) = self.shared.platform.blob_urls.revoke(&url)
        {
            debug!(%url, error = %err, "object url revoke failed");
        }
    }
}

fn gallery_changed(gallery: &GalleryStore) -> ResourceEvent {
    ResourceEvent::GalleryChanged {
        asset_count: gallery.assets().len(),
        has_more: gallery.has_more(),
        degraded: gallery.is_degraded(),
    }
}

fn asset_not_found(asset_id: &str) -> ResourceError {
    ResourceError::validation("asset_not_found", format!("no asset with id '{asset_id}'"))
}

fn upload_not_found(key: &str) -> ResourceError {
    ResourceError::validation("upload_not_found", format!("no pending upload with key '{key}'"))
}
