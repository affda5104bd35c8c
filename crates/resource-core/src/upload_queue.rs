use tracing::{debug, trace, warn};

use crate::{
    error::{ResourceError, ResourceErrorCategory},
    types::{LocalFile, PendingUpload, RemoteAsset, ResourceCenterConfig, UploadStatus},
};

/// Local validation rules applied before any transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
}

impl UploadLimits {
    pub fn from_config(config: &ResourceCenterConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_types: config.allowed_types.clone(),
        }
    }

    /// Check size first, then MIME type.
    pub fn validate(&self, file: &LocalFile) -> Result<(), ResourceError> {
        if file.size_bytes > self.max_file_size {
            return Err(ResourceError::validation(
                "file_too_large",
                format!(
                    "File too large, maximum supported size is {}",
                    human_size(self.max_file_size)
                ),
            ));
        }
        let mime = file.mime_type.trim();
        if !self
            .allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
        {
            return Err(ResourceError::validation(
                "unsupported_type",
                format!("Unsupported file type '{mime}'"),
            ));
        }
        Ok(())
    }
}

/// Result of enqueueing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted with status `ready`.
    Ready { key: String },
    /// Kept in the queue with status `error`; never transferred.
    Rejected { key: String, error: ResourceError },
    /// An item with the same key is already pending.
    Duplicate { key: String },
}

/// Pending local uploads with independent status and progress.
#[derive(Debug, Clone)]
pub struct UploadQueue {
    items: Vec<PendingUpload>,
    limits: UploadLimits,
    batch_active: bool,
}

impl UploadQueue {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            items: Vec::new(),
            limits,
            batch_active: false,
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Pending items in insertion order.
    pub fn items(&self) -> &[PendingUpload] {
        &self.items
    }

    pub fn get(&self, key: &str) -> Option<&PendingUpload> {
        self.items.iter().find(|item| item.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validate and append files. Invalid files are kept with status `error`.
    ///
    /// Resubmitting a file whose earlier attempt failed replaces the failed
    /// entry in place; any other existing entry makes the file a duplicate.
    pub fn enqueue(&mut self, files: Vec<LocalFile>) -> Vec<EnqueueOutcome> {
        files
            .into_iter()
            .map(|file| {
                let mut item = PendingUpload::from_file(file);
                let key = item.key.clone();
                let existing = self.items.iter().position(|pending| pending.key == key);
                if let Some(idx) = existing
                    && self.items[idx].status != UploadStatus::Error
                {
                    debug!(%key, "ignoring file that is already pending");
                    return EnqueueOutcome::Duplicate { key };
                }

                let outcome = match self.limits.validate(&item.source) {
                    Ok(()) => EnqueueOutcome::Ready { key: key.clone() },
                    Err(error) => {
                        warn!(%key, code = %error.code, "pending upload failed validation");
                        item.status = UploadStatus::Error;
                        item.error_message = Some(error.message.clone());
                        EnqueueOutcome::Rejected {
                            key: key.clone(),
                            error,
                        }
                    }
                };
                match existing {
                    Some(idx) => {
                        debug!(%key, "resubmitted file replaces failed entry");
                        self.items[idx] = item;
                    }
                    None => self.items.push(item),
                }
                outcome
            })
            .collect()
    }

    /// Remove an item on user dismissal or after success.
    pub fn remove(&mut self, key: &str) -> Option<PendingUpload> {
        let idx = self.items.iter().position(|item| item.key == key)?;
        Some(self.items.remove(idx))
    }

    /// Remove an item only if it is still in `success`.
    pub fn prune_succeeded(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| !(item.key == key && item.status == UploadStatus::Success));
        before != self.items.len()
    }

    /// Keys of items waiting for transfer, in queue order.
    pub fn ready_keys(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.status == UploadStatus::Ready)
            .map(|item| item.key.clone())
            .collect()
    }

    pub fn is_batch_active(&self) -> bool {
        self.batch_active
    }

    /// Claim the batch driver. Fails while another batch is running.
    pub fn begin_batch(&mut self) -> Result<Vec<String>, ResourceError> {
        if self.batch_active {
            return Err(batch_in_progress());
        }
        self.batch_active = true;
        let keys = self.ready_keys();
        debug!(count = keys.len(), "upload batch started");
        Ok(keys)
    }

    pub fn end_batch(&mut self) {
        self.batch_active = false;
        debug!("upload batch finished");
    }

    /// Move a `ready` item to `uploading` and hand out its file.
    pub fn start(&mut self, key: &str) -> Result<LocalFile, ResourceError> {
        let item = self.item_mut(key)?;
        if item.status != UploadStatus::Ready {
            return Err(ResourceError::new(
                ResourceErrorCategory::Internal,
                "upload_not_ready",
                format!("upload '{key}' is {:?}, expected Ready", item.status),
            ));
        }
        item.status = UploadStatus::Uploading;
        item.progress_percent = 0;
        item.error_message = None;
        Ok(item.source.clone())
    }

    /// Start a single upload outside the batch driver.
    pub fn start_single(&mut self, key: &str) -> Result<LocalFile, ResourceError> {
        if self.batch_active {
            return Err(batch_in_progress());
        }
        self.start(key)
    }

    /// Record transfer progress for an uploading item. Returns the stored percentage.
    pub fn set_progress(&mut self, key: &str, percent: u8) -> Option<u8> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.key == key && item.status == UploadStatus::Uploading)?;
        let percent = percent.min(100);
        if percent != item.progress_percent {
            trace!(%key, percent, "upload progress");
        }
        item.progress_percent = percent;
        Some(percent)
    }

    /// Settle an uploading item as `success` or `error`.
    pub fn finish(
        &mut self,
        key: &str,
        result: &Result<Option<RemoteAsset>, ResourceError>,
    ) -> Result<UploadStatus, ResourceError> {
        let item = self.item_mut(key)?;
        if item.status != UploadStatus::Uploading {
            return Err(ResourceError::new(
                ResourceErrorCategory::Internal,
                "upload_not_running",
                format!("upload '{key}' is {:?}, expected Uploading", item.status),
            ));
        }
        match result {
            Ok(_) => {
                item.status = UploadStatus::Success;
                item.progress_percent = 100;
                item.error_message = None;
            }
            Err(err) => {
                item.status = UploadStatus::Error;
                item.error_message = Some(upload_failure_message(err));
            }
        }
        Ok(item.status)
    }

    /// Mean progress across items that are not in `error`, `0` when there are none.
    pub fn aggregate_progress(&self) -> u8 {
        let live: Vec<_> = self
            .items
            .iter()
            .filter(|item| item.status != UploadStatus::Error)
            .collect();
        if live.is_empty() {
            return 0;
        }
        let total: u32 = live.iter().map(|item| u32::from(item.progress_percent)).sum();
        (total / live.len() as u32) as u8
    }

    fn item_mut(&mut self, key: &str) -> Result<&mut PendingUpload, ResourceError> {
        self.items
            .iter_mut()
            .find(|item| item.key == key)
            .ok_or_else(|| {
                ResourceError::new(
                    ResourceErrorCategory::Internal,
                    "upload_not_found",
                    format!("no pending upload with key '{key}'"),
                )
            })
    }
}

/// User-facing text stored on a failed item.
pub fn upload_failure_message(err: &ResourceError) -> String {
    match err.code.as_str() {
        "network_error" => "Network error, upload failed".to_owned(),
        _ => format!("Upload failed: {}", err.message),
    }
}

fn batch_in_progress() -> ResourceError {
    ResourceError::new(
        ResourceErrorCategory::Config,
        "batch_in_progress",
        "an upload batch is already running",
    )
}

fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{}MB", (bytes as f64 / MIB as f64).round() as u64)
    } else {
        format!("{}KB", (bytes as f64 / 1024.0).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> UploadLimits {
        UploadLimits::from_config(&ResourceCenterConfig::default())
    }

    fn png(name: &str, size: usize) -> LocalFile {
        LocalFile::new(name, "image/png", 1_700_000_000_000, vec![0_u8; size])
    }

    #[test]
    fn rejects_file_one_byte_over_limit() {
        let mut queue = UploadQueue::new(UploadLimits {
            max_file_size: 100,
            allowed_types: vec!["image/png".into()],
        });

        let outcomes = queue.enqueue(vec![png("ok.png", 100), png("big.png", 101)]);
        assert!(matches!(outcomes[0], EnqueueOutcome::Ready { .. }));
        match &outcomes[1] {
            EnqueueOutcome::Rejected { error, .. } => {
                assert_eq!(error.category, ResourceErrorCategory::Validation);
                assert_eq!(error.code, "file_too_large");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(queue.items()[1].status, UploadStatus::Error);
        assert_eq!(queue.ready_keys().len(), 1);
    }

    #[test]
    fn rejects_mime_outside_allow_list() {
        let mut queue = UploadQueue::new(limits());
        let outcomes = queue.enqueue(vec![LocalFile::new("a.pdf", "application/pdf", 1, vec![1])]);
        match &outcomes[0] {
            EnqueueOutcome::Rejected { error, .. } => assert_eq!(error.code, "unsupported_type"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(queue.items()[0].error_message.is_some());
    }

    #[test]
    fn ignores_duplicate_keys() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3)]);
        let outcomes = queue.enqueue(vec![png("a.png", 3)]);
        assert!(matches!(outcomes[0], EnqueueOutcome::Duplicate { .. }));
        assert_eq!(queue.items().len(), 1);
    }

    #[test]
    fn resubmitting_a_failed_file_makes_it_ready_again() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3), png("b.png", 4)]);
        let key = queue.ready_keys().remove(0);
        queue.start(&key).expect("start");
        queue
            .finish(&key, &Err(ResourceError::network("offline")))
            .expect("finish");

        let outcomes = queue.enqueue(vec![png("a.png", 3)]);
        assert!(matches!(&outcomes[0], EnqueueOutcome::Ready { key: k } if *k == key));
        assert_eq!(queue.items().len(), 2);
        assert_eq!(queue.items()[0].key, key, "replaced in place");
        assert_eq!(queue.items()[0].status, UploadStatus::Ready);
        assert!(queue.items()[0].error_message.is_none());
        assert_eq!(queue.ready_keys().len(), 2);

        queue.start(&key).expect("restart");
        let outcomes = queue.enqueue(vec![png("a.png", 3)]);
        assert!(
            matches!(outcomes[0], EnqueueOutcome::Duplicate { .. }),
            "an uploading entry is not replaced"
        );
    }

    #[test]
    fn runs_ready_uploading_success_transition() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3)]);
        let key = queue.ready_keys().remove(0);

        let file = queue.start(&key).expect("start");
        assert_eq!(file.name, "a.png");
        assert_eq!(queue.get(&key).map(|i| i.status), Some(UploadStatus::Uploading));

        assert_eq!(queue.set_progress(&key, 40), Some(40));
        let status = queue.finish(&key, &Ok(None)).expect("finish");
        assert_eq!(status, UploadStatus::Success);
        assert_eq!(queue.get(&key).map(|i| i.progress_percent), Some(100));

        assert!(queue.prune_succeeded(&key));
        assert!(queue.is_empty());
    }

    #[test]
    fn failure_is_scoped_to_the_item() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3), png("b.png", 4)]);
        let keys = queue.ready_keys();

        queue.start(&keys[0]).expect("start a");
        queue
            .finish(&keys[0], &Err(ResourceError::http_status(400, "bad file")))
            .expect("finish a");

        let failed = queue.get(&keys[0]).expect("a present");
        assert_eq!(failed.status, UploadStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("Upload failed: bad file"));
        assert_eq!(queue.get(&keys[1]).map(|i| i.status), Some(UploadStatus::Ready));
        assert!(!queue.prune_succeeded(&keys[0]), "errors are never auto-pruned");
    }

    #[test]
    fn refuses_to_start_non_ready_items() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3)]);
        let key = queue.ready_keys().remove(0);
        queue.start(&key).expect("first start");
        let err = queue.start(&key).expect_err("second start must fail");
        assert_eq!(err.code, "upload_not_ready");
    }

    #[test]
    fn single_upload_is_blocked_during_batch() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3), png("b.png", 4)]);
        let keys = queue.begin_batch().expect("batch");
        assert_eq!(keys.len(), 2);

        let err = queue.start_single(&keys[1]).expect_err("manual trigger blocked");
        assert_eq!(err.code, "batch_in_progress");
        assert!(queue.begin_batch().is_err());

        queue.end_batch();
        assert!(queue.start_single(&keys[1]).is_ok());
    }

    #[test]
    fn progress_only_updates_uploading_items() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![png("a.png", 3)]);
        let key = queue.ready_keys().remove(0);
        assert_eq!(queue.set_progress(&key, 50), None);
        queue.start(&key).expect("start");
        assert_eq!(queue.set_progress(&key, 250), Some(100));
    }

    #[test]
    fn aggregate_progress_ignores_failed_items() {
        let mut queue = UploadQueue::new(limits());
        queue.enqueue(vec![
            png("a.png", 3),
            png("b.png", 4),
            LocalFile::new("c.txt", "text/plain", 1, vec![1]),
        ]);
        let keys = queue.ready_keys();
        queue.start(&keys[0]).expect("start");
        queue.set_progress(&keys[0], 60);
        assert_eq!(queue.aggregate_progress(), 30);
    }

    #[test]
    fn network_failures_use_fixed_text() {
        assert_eq!(
            upload_failure_message(&ResourceError::network("connection reset")),
            "Network error, upload failed"
        );
    }
}
