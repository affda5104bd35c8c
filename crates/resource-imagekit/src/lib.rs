//! ImageKit-backed Resource Center: REST client, widget controller and
//! command runtime.

mod center;
mod client;
mod runtime;

pub use center::{BatchSummary, ResourceCenter};
pub use client::{ImageKitClient, basic_authorization};
pub use runtime::{ResourceCenterHandle, spawn_runtime};
