//! # fascia
//!
//! Live front-panel visualization pipeline for an external
//! instruction-processing backend.
//!
//! This crate is the shared core of a two-process pair: `fasciad` (the
//! producer context) samples backend state on a fixed cadence and serves it
//! to UI clients, and `fascia_desktop` (the consumer context) binds a
//! [`render::Renderer`] to its schematic scene and dispatches each
//! [`snapshot::Snapshot`] it receives. The two contexts share no memory;
//! only serialized snapshots cross the boundary.
//!
//! ## Quick start
//!
//! ```
//! use fascia::prelude::*;
//!
//! let scene = MemoryScene::with_default_layout();
//! let mut renderer = Renderer::new();
//! renderer.initialize(&scene)?;
//!
//! renderer.dispatch(&Snapshot::default())?;
//! assert_eq!(scene.clock_text(), ("00".to_string(), "00".to_string()));
//! # Ok::<(), fascia::render::RenderError>(())
//! ```
//!
//! ## Modules
//!
//! - [`snapshot`]: the per-tick value object and the panel layout constants
//! - [`scene`]: the visual layout contract and the registry bound from it
//! - [`render`]: projection of snapshots onto a bound scene
//! - [`bridge`]: the keep-latest channel between producer and consumer
//! - [`producer`]: the cancellable periodic sampling loop and demo backend
//! - [`proto`]: the daemon's JSON-lines wire protocol

pub mod bridge;
pub mod producer;
pub mod proto;
pub mod render;
pub mod scene;
pub mod snapshot;

pub mod prelude {
    pub use crate::bridge::{channel, SnapshotReceiver, SnapshotSender};
    pub use crate::producer::{
        Backend, BackendError, ClockSource, DemoBackend, Producer, ProducerHandle,
    };
    pub use crate::render::{RenderError, Renderer};
    pub use crate::scene::{LayoutError, MemoryScene, SceneDocument, SceneRegistry};
    pub use crate::snapshot::{
        Clock, Snapshot, HISTORY_SLOTS, REGISTER_BITS, REGISTER_COUNT, STACK_CELLS,
    };
}
