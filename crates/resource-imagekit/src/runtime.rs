use std::future::Future;

use resource_core::{
    EventStream, GallerySnapshot, MediaApi, ResourceCenterConfig, ResourceChannelError,
    ResourceChannels, ResourceCommand, ResourceError, ResourceErrorCategory, ResourceEvent,
};
use resource_platform::PlatformServices;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::center::ResourceCenter;

/// Embedder-side handle for a widget driven through the command channel.
pub struct ResourceCenterHandle<A: MediaApi> {
    channels: ResourceChannels,
    center: ResourceCenter<A>,
}

impl<A: MediaApi> Clone for ResourceCenterHandle<A> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            center: self.center.clone(),
        }
    }
}

impl<A: MediaApi> ResourceCenterHandle<A> {
    pub async fn send(&self, command: ResourceCommand) -> Result<(), ResourceChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Direct access for operations outside the command protocol (drops, local preview).
    pub fn center(&self) -> &ResourceCenter<A> {
        &self.center
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        self.center.snapshot()
    }
}

pub fn spawn_runtime<A: MediaApi>(
    api: A,
    platform: PlatformServices,
    config: ResourceCenterConfig,
) -> ResourceCenterHandle<A> {
    let (channels, command_rx) = ResourceChannels::new(128, 512);
    let center = ResourceCenter::with_channels(api, platform, config, channels.clone());
    let runtime = ResourceRuntime {
        center: center.clone(),
        channels: channels.clone(),
        command_rx,
    };
    tokio::spawn(async move {
        runtime.run().await;
    });

    ResourceCenterHandle { channels, center }
}

struct ResourceRuntime<A: MediaApi> {
    center: ResourceCenter<A>,
    channels: ResourceChannels,
    command_rx: mpsc::Receiver<ResourceCommand>,
}

impl<A: MediaApi> ResourceRuntime<A> {
    async fn run(mut self) {
        while let Some(command) = self.command_rx.recv().await {
            self.dispatch(command);
        }
        debug!("resource center runtime stopped");
    }

    /// Session and selection changes apply in command order; network work is spawned.
    fn dispatch(&self, command: ResourceCommand) {
        let center = self.center.clone();
        match command {
            ResourceCommand::Open => {
                center.start_session();
                self.spawn_command(async move { center.refresh().await });
            }
            ResourceCommand::Close => center.close(),
            ResourceCommand::Refresh => self.spawn_command(async move { center.refresh().await }),
            ResourceCommand::LoadMore => {
                self.spawn_command(async move { center.load_more().await.map(|_| ()) })
            }
            ResourceCommand::Delete { asset_id } => {
                self.spawn_command(async move { center.delete(&asset_id).await })
            }
            ResourceCommand::EnqueueFiles { files } => {
                self.report(center.enqueue(files).map(|_| ()))
            }
            ResourceCommand::UploadPending { key } => {
                self.spawn_command(async move { center.upload_one(&key).await.map(|_| ()) })
            }
            ResourceCommand::UploadAllPending => {
                self.spawn_command(async move { center.upload_all().await.map(|_| ()) })
            }
            ResourceCommand::RemovePending { key } => self.report(center.remove_pending(&key)),
            ResourceCommand::ToggleSelect { asset_id } => {
                self.report(center.toggle_select(&asset_id))
            }
            ResourceCommand::Confirm => self.report(center.confirm().map(|_| ())),
            ResourceCommand::OpenPreview { asset_id } => {
                self.report(center.open_preview(&asset_id))
            }
            ResourceCommand::ClosePreview => self.report(center.close_preview()),
            ResourceCommand::ToggleMenu { asset_id } => self.report(center.toggle_menu(&asset_id)),
            ResourceCommand::CopyLink { asset_id } => {
                self.report(center.copy_link(&asset_id).map(|_| ()))
            }
            ResourceCommand::OpenLink { asset_id } => self.report(center.open_link(&asset_id)),
            ResourceCommand::DismissError => center.dismiss_error(),
        }
    }

    fn spawn_command<F>(&self, task: F)
    where
        F: Future<Output = Result<(), ResourceError>> + Send + 'static,
    {
        let channels = self.channels.clone();
        tokio::spawn(async move {
            report_rejection(&channels, task.await);
        });
    }

    fn report(&self, result: Result<(), ResourceError>) {
        report_rejection(&self.channels, result);
    }
}

/// Emit errors the controller has not already surfaced as events.
fn report_rejection(channels: &ResourceChannels, result: Result<(), ResourceError>) {
    let Err(err) = result else {
        return;
    };
    if surfaced_by_controller(&err) {
        return;
    }
    warn!(code = %err.code, "command rejected");
    channels.emit(ResourceEvent::Error {
        code: err.code,
        message: err.message,
    });
}

fn surfaced_by_controller(err: &ResourceError) -> bool {
    err.is_transport()
        || matches!(
            err.category,
            ResourceErrorCategory::Preview | ResourceErrorCategory::Serialization
        )
        || err.code == "preview_blocked"
}
