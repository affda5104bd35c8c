use std::{future::Future, sync::Arc};

use crate::{
    error::ResourceError,
    types::{ListQuery, LocalFile, RemoteAsset, UploadOptions},
};

/// Callback receiving upload progress in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Remote media operations the widget depends on.
///
/// Implementations must be cheap to share; the controller calls them from
/// spawned tasks without holding any widget lock.
pub trait MediaApi: Send + Sync + 'static {
    /// Fetch one page of assets, newest first.
    fn list_page(
        &self,
        query: ListQuery,
    ) -> impl Future<Output = Result<Vec<RemoteAsset>, ResourceError>> + Send;

    /// Upload one file. `Ok(None)` means the server accepted the file without
    /// returning a parseable asset.
    fn upload(
        &self,
        file: LocalFile,
        options: UploadOptions,
        progress: ProgressFn,
    ) -> impl Future<Output = Result<Option<RemoteAsset>, ResourceError>> + Send;

    /// Delete an asset by id.
    fn delete(&self, asset_id: &str) -> impl Future<Output = Result<(), ResourceError>> + Send;
}
