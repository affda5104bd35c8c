use crate::types::RemoteAsset;

/// Full-size preview overlay; holds at most one asset.
#[derive(Debug, Clone, Default)]
pub struct PreviewState {
    current: Option<RemoteAsset>,
}

impl PreviewState {
    /// Open the overlay, replacing any asset already shown.
    pub fn open(&mut self, asset: RemoteAsset) {
        self.current = Some(asset);
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&RemoteAsset> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

/// Pre-upload preview of one pending local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPreview {
    /// Queue key of the previewed file.
    pub key: String,
    /// Object URL created for the file bytes; revoked on close.
    pub object_url: String,
    /// Decoded pixel dimensions, when the image could be read.
    pub dimensions: Option<(u32, u32)>,
    /// Validation or decode message that blocks "upload from preview".
    pub blocking_message: Option<String>,
}

impl LocalPreview {
    pub fn can_upload(&self) -> bool {
        self.blocking_message.is_none()
    }
}
