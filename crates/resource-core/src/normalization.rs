use crate::{
    error::ResourceError,
    types::{RemoteAsset, ResourceEvent, UploadAck, UploadStatus},
    upload_queue::upload_failure_message,
};

/// Upload result before normalization into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Accepted; the server may or may not echo the stored asset.
    Success { asset: Option<RemoteAsset> },
    Failure { error: ResourceError },
}

impl From<Result<Option<RemoteAsset>, ResourceError>> for UploadOutcome {
    fn from(result: Result<Option<RemoteAsset>, ResourceError>) -> Self {
        match result {
            Ok(asset) => Self::Success { asset },
            Err(error) => Self::Failure { error },
        }
    }
}

/// Convert an upload outcome to a stable `ResourceEvent::UploadFinished`.
pub fn normalize_upload_outcome(key: impl Into<String>, outcome: UploadOutcome) -> ResourceEvent {
    let key = key.into();
    match outcome {
        UploadOutcome::Success { asset } => ResourceEvent::UploadFinished(UploadAck {
            key,
            status: UploadStatus::Success,
            asset_id: asset.map(|asset| asset.id),
            error_code: None,
            error_message: None,
        }),
        UploadOutcome::Failure { error } => ResourceEvent::UploadFinished(UploadAck {
            key,
            status: UploadStatus::Error,
            asset_id: None,
            error_message: Some(upload_failure_message(&error)),
            error_code: Some(error.code),
        }),
    }
}

/// Operation that produced an error, used to prefix user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedOperation {
    List,
    Delete,
    Preview,
    Other,
}

/// User-facing text for the error banner and `onError`.
pub fn user_message(operation: FailedOperation, error: &ResourceError) -> String {
    match operation {
        FailedOperation::Delete => format!("Delete failed: {}", error.message),
        FailedOperation::List | FailedOperation::Preview | FailedOperation::Other => {
            error.message.clone()
        }
    }
}

/// Convert an error into the `onError` event.
pub fn normalize_error(operation: FailedOperation, error: &ResourceError) -> ResourceEvent {
    ResourceEvent::Error {
        code: error.code.clone(),
        message: user_message(operation, error),
    }
}
