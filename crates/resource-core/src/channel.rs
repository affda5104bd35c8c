use thiserror::Error;
use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    mpsc,
};
use tracing::{trace, warn};

use crate::types::{ResourceCommand, ResourceEvent};

/// Errors returned by widget channel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceChannelError {
    /// The runtime stopped and no longer accepts commands.
    #[error("command channel is closed")]
    CommandChannelClosed,
    /// Every event sender is gone; no further events will arrive.
    #[error("event stream is closed")]
    EventStreamClosed,
    /// The subscriber fell behind the event buffer under [`LagPolicy::Fail`].
    #[error("event subscriber lagged and missed {missed} events")]
    Lagged { missed: u64 },
}

/// What a subscriber does after falling behind the event buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LagPolicy {
    /// Log the gap and continue with the oldest event still buffered.
    #[default]
    SkipMissed,
    /// Surface the gap as [`ResourceChannelError::Lagged`]; the next receive resumes.
    Fail,
}

/// Event subscription handed to embedders.
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<ResourceEvent>,
    policy: LagPolicy,
    missed: u64,
}

impl EventStream {
    fn new(rx: broadcast::Receiver<ResourceEvent>, policy: LagPolicy) -> Self {
        Self {
            rx,
            policy,
            missed: 0,
        }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Result<ResourceEvent, ResourceChannelError> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(missed)) => self.on_lag(missed)?,
                Err(RecvError::Closed) => return Err(ResourceChannelError::EventStreamClosed),
            }
        }
    }

    /// Next buffered event without waiting; `Ok(None)` when the buffer is empty.
    pub fn try_recv(&mut self) -> Result<Option<ResourceEvent>, ResourceChannelError> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(missed)) => self.on_lag(missed)?,
                Err(TryRecvError::Closed) => {
                    return Err(ResourceChannelError::EventStreamClosed);
                }
            }
        }
    }

    /// Total events this subscriber has missed to lag.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn on_lag(&mut self, missed: u64) -> Result<(), ResourceChannelError> {
        self.missed = self.missed.saturating_add(missed);
        warn!(missed, policy = ?self.policy, "event subscriber lagged");
        match self.policy {
            LagPolicy::SkipMissed => Ok(()),
            LagPolicy::Fail => Err(ResourceChannelError::Lagged { missed }),
        }
    }
}

/// Command/event channel pair connecting an embedder to the widget runtime.
#[derive(Clone, Debug)]
pub struct ResourceChannels {
    command_tx: mpsc::Sender<ResourceCommand>,
    event_tx: broadcast::Sender<ResourceEvent>,
}

impl ResourceChannels {
    /// Create a channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<ResourceCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to widget events (`onOpenChange`, `onConfirm`, `onError`, ...).
    ///
    /// Lagging subscribers skip what they missed.
    pub fn subscribe(&self) -> EventStream {
        self.subscribe_with(LagPolicy::default())
    }

    pub fn subscribe_with(&self, policy: LagPolicy) -> EventStream {
        EventStream::new(self.event_tx.subscribe(), policy)
    }

    pub async fn send_command(&self, command: ResourceCommand) -> Result<(), ResourceChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ResourceChannelError::CommandChannelClosed)
    }

    /// Emit an event to every subscriber. Without subscribers the event is dropped.
    pub fn emit(&self, event: ResourceEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = ResourceEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}
