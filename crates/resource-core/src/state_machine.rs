use crate::{
    error::ResourceError,
    types::{ResourceCommand, ResourceEvent, SessionState},
};

/// Feature toggles consulted when gating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enable_upload: bool,
    pub enable_delete: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_upload: true,
            enable_delete: true,
        }
    }
}

/// Open/closed lifecycle of one widget instance.
///
/// Every open starts a new epoch; results carrying an older epoch belong to a
/// torn-down session and must be dropped.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    epoch: u64,
    features: FeatureFlags,
}

impl SessionMachine {
    pub fn new(features: FeatureFlags) -> Self {
        Self {
            state: SessionState::Closed,
            epoch: 0,
            features,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a result issued under `epoch` may still touch state.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.state == SessionState::Open && self.epoch == epoch
    }

    /// Check that a command may run now, without changing state.
    pub fn check(&self, command: &ResourceCommand) -> Result<(), ResourceError> {
        use ResourceCommand::*;

        match command {
            Open | Close => Ok(()),
            EnqueueFiles { .. }
            | UploadPending { .. }
            | UploadAllPending
            | RemovePending { .. } => {
                self.require_open("upload command")?;
                if self.features.enable_upload {
                    Ok(())
                } else {
                    Err(ResourceError::disabled("upload"))
                }
            }
            Delete { .. } => {
                self.require_open("delete")?;
                if self.features.enable_delete {
                    Ok(())
                } else {
                    Err(ResourceError::disabled("delete"))
                }
            }
            Refresh
            | LoadMore
            | ToggleSelect { .. }
            | Confirm
            | OpenPreview { .. }
            | ClosePreview
            | ToggleMenu { .. }
            | CopyLink { .. }
            | OpenLink { .. }
            | DismissError => self.require_open("gallery command"),
        }
    }

    /// Open a new session. Reopening an open widget restarts the session.
    pub fn open(&mut self) -> Vec<ResourceEvent> {
        self.epoch = self.epoch.wrapping_add(1);
        let was_open = self.state == SessionState::Open;
        self.state = SessionState::Open;
        if was_open {
            Vec::new()
        } else {
            vec![ResourceEvent::OpenChanged { open: true }]
        }
    }

    /// Close the session. Closing twice emits nothing the second time.
    pub fn close(&mut self) -> Vec<ResourceEvent> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }
        self.state = SessionState::Closed;
        self.epoch = self.epoch.wrapping_add(1);
        vec![ResourceEvent::OpenChanged { open: false }]
    }

    fn require_open(&self, action: &str) -> Result<(), ResourceError> {
        if self.state == SessionState::Open {
            Ok(())
        } else {
            Err(ResourceError::invalid_state(self.state, action))
        }
    }
}
