//! Projection of snapshots onto a bound scene.

use thiserror::Error;

use crate::scene::{CellSlot, LayoutError, Rgb, SceneDocument, SceneRegistry, TextSlot};
use crate::snapshot::Snapshot;

/// Fill of a lit register bit cell.
pub const REGISTER_LIT: Rgb = Rgb::new(0xff, 0xff, 0xff);
/// Fill of an occupied stack cell.
pub const STACK_FILLED: Rgb = Rgb::new(0xf5, 0xdb, 0xdf);

#[derive(Debug, Error)]
pub enum RenderError {
    /// A write operation ran before [`Renderer::initialize`] completed.
    #[error("renderer used before initialize()")]
    Uninitialized,
    /// `initialize` ran on a renderer that is already `Ready`; the
    /// `Uninitialized -> Ready` transition is one-way.
    #[error("renderer is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// Bit-vector width differs from the bound cell group. A caller contract
    /// violation, not a recoverable runtime condition.
    #[error("register {register} has {expected} cells, got {got} bit values")]
    MalformedSnapshot {
        register: usize,
        expected: usize,
        got: usize,
    },
}

/// Stateful projection of snapshots onto a scene.
///
/// Starts `Uninitialized`; [`initialize`](Self::initialize) binds the scene
/// registry and transitions to `Ready`. Until then every write operation
/// fails with [`RenderError::Uninitialized`] and mutates nothing. All writes
/// are idempotent: repeating a call with the same arguments leaves the same
/// visual state, with no accumulated side effects.
pub struct Renderer<D: SceneDocument> {
    registry: Option<SceneRegistry<D>>,
}

impl<D: SceneDocument> Default for Renderer<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SceneDocument> Renderer<D> {
    pub fn new() -> Self {
        Self { registry: None }
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_some()
    }

    /// Queries the layout for all required elements and becomes `Ready`.
    ///
    /// Fails with [`LayoutError::Unavailable`] while the document is not
    /// loaded (retry after it is), [`LayoutError::MissingElement`] when the
    /// layout lacks a required element, and
    /// [`RenderError::AlreadyInitialized`] on re-initialization.
    pub fn initialize(&mut self, doc: &D) -> Result<(), RenderError> {
        if self.registry.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }
        self.registry = Some(SceneRegistry::bind(doc)?);
        Ok(())
    }

    fn registry_mut(&mut self) -> Result<&mut SceneRegistry<D>, RenderError> {
        self.registry.as_mut().ok_or(RenderError::Uninitialized)
    }

    /// Sets the two clock fields verbatim; formatting is the caller's.
    pub fn write_clock(&mut self, hours: &str, minutes: &str) -> Result<(), RenderError> {
        let registry = self.registry_mut()?;
        registry.clock_left.set_text(hours);
        registry.clock_right.set_text(minutes);
        Ok(())
    }

    /// Lights the bit cells of `register` according to `bits`.
    ///
    /// # Panics
    ///
    /// An out-of-range `register` index is a programming error and panics.
    pub fn write_register(&mut self, register: usize, bits: &[bool]) -> Result<(), RenderError> {
        let registry = self.registry_mut()?;
        let group = &mut registry.registers[register];
        if bits.len() != group.len() {
            return Err(RenderError::MalformedSnapshot {
                register,
                expected: group.len(),
                got: bits.len(),
            });
        }
        for (cell, &lit) in group.iter_mut().zip(bits) {
            cell.set_fill(lit.then_some(REGISTER_LIT));
        }
        Ok(())
    }

    /// Fills the first `fullness` stack cells and clears the rest.
    ///
    /// Which physical end fills first was fixed when the registry was bound.
    pub fn write_stack(&mut self, fullness: usize) -> Result<(), RenderError> {
        let registry = self.registry_mut()?;
        for (index, cell) in registry.stack_cells.iter_mut().enumerate() {
            cell.set_fill((index < fullness).then_some(STACK_FILLED));
        }
        Ok(())
    }

    /// Writes `commands` into the history slots by position.
    ///
    /// Sparse overwrite: slots without a corresponding entry keep their
    /// previous content, and entries beyond the slot count are dropped.
    pub fn report_command_history(&mut self, commands: &[String]) -> Result<(), RenderError> {
        let registry = self.registry_mut()?;
        for (slot, command) in registry.history.iter_mut().zip(commands) {
            slot.set_text(command);
        }
        Ok(())
    }

    /// Applies a whole snapshot: clock, each register in registry order, the
    /// stack gauge, then command history.
    ///
    /// The fixed order only matters for the perceived consistency of one
    /// repaint; there is no atomicity across the underlying element writes,
    /// so a partial repaint is visible if dispatch is interrupted.
    pub fn dispatch(&mut self, snapshot: &Snapshot) -> Result<(), RenderError> {
        let (hours, minutes) = snapshot.clock.display();
        self.write_clock(&hours, &minutes)?;
        for (register, bits) in snapshot.registers.iter().enumerate() {
            self.write_register(register, bits)?;
        }
        self.write_stack(usize::from(snapshot.stack))?;
        self.report_command_history(&snapshot.history)
    }
}
