//! The visual layout contract and the scene registry bound from it.
//!
//! A rendering target implements [`SceneDocument`]; the renderer queries it
//! once at initialization and keeps the resulting [`SceneRegistry`] for the
//! rest of its life. Element ids and class names mirror the panel artwork.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::snapshot::{HISTORY_SLOTS, REGISTER_BITS, REGISTER_COUNT, STACK_CELLS};

/// Id of the left clock text field.
pub const CLOCK_LEFT_ID: &str = "clock-left";
/// Id of the right clock text field.
pub const CLOCK_RIGHT_ID: &str = "clock-right";
/// Class of the stack gauge cells, document order top-to-bottom.
pub const STACK_CELL_CLASS: &str = "stack-cell";
/// Class of the register cell groups, one group per register.
pub const REGISTER_CLASS: &str = "register";
/// Class of the command-history text slots, in position order.
pub const COMMAND_DISPLAY_CLASS: &str = "command-display";

/// A solid fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A text element the renderer writes to.
pub trait TextSlot {
    fn set_text(&mut self, text: &str);
}

/// A fillable cell; `None` clears the fill.
pub trait CellSlot {
    fn set_fill(&mut self, fill: Option<Rgb>);
}

#[derive(Debug, Error)]
pub enum LayoutError {
    /// The visual document does not exist yet (queried before the window
    /// finished loading). Retry once the layout is available.
    #[error("visual layout is not loaded yet")]
    Unavailable,
    /// A required element is absent from the layout.
    #[error("layout element missing: {0}")]
    MissingElement(&'static str),
}

/// The contract a rendering target fulfills so a registry can be bound to
/// it: named lookup of text fields and fillable cells, grouped the way the
/// panel artwork groups them.
pub trait SceneDocument {
    type Text: TextSlot;
    type Cell: CellSlot;

    /// Whether the document is ready to be queried at all.
    fn loaded(&self) -> bool {
        true
    }

    /// Single text element by stable id.
    fn text_by_id(&self, id: &str) -> Option<Self::Text>;

    /// Text elements sharing a class, in document order.
    fn texts_by_class(&self, class: &str) -> Vec<Self::Text>;

    /// Fillable cells sharing a class, in document order.
    fn cells_by_class(&self, class: &str) -> Vec<Self::Cell>;

    /// Cell groups, one entry per group element of `class`, cells in
    /// document order within each group.
    fn cell_groups_by_class(&self, class: &str) -> Vec<Vec<Self::Cell>>;
}

/// The bound set of visual targets a renderer writes to, established once at
/// initialization and owned exclusively by the renderer afterwards.
pub struct SceneRegistry<D: SceneDocument> {
    pub(crate) clock_left: D::Text,
    pub(crate) clock_right: D::Text,
    /// Stack cells in fill order. The document hands them over top-to-bottom
    /// and the gauge fills bottom-up, so the list is reversed once here;
    /// write operations never re-derive the direction.
    pub(crate) stack_cells: Vec<D::Cell>,
    pub(crate) registers: Vec<Vec<D::Cell>>,
    pub(crate) history: Vec<D::Text>,
}

impl<D: SceneDocument> std::fmt::Debug for SceneRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRegistry")
            .field("stack_cells", &self.stack_cells.len())
            .field("registers", &self.registers.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl<D: SceneDocument> SceneRegistry<D> {
    /// Queries `doc` for every element the panel needs.
    pub fn bind(doc: &D) -> Result<Self, LayoutError> {
        if !doc.loaded() {
            return Err(LayoutError::Unavailable);
        }

        let clock_left = doc
            .text_by_id(CLOCK_LEFT_ID)
            .ok_or(LayoutError::MissingElement(CLOCK_LEFT_ID))?;
        let clock_right = doc
            .text_by_id(CLOCK_RIGHT_ID)
            .ok_or(LayoutError::MissingElement(CLOCK_RIGHT_ID))?;

        let mut stack_cells = doc.cells_by_class(STACK_CELL_CLASS);
        if stack_cells.is_empty() {
            return Err(LayoutError::MissingElement(STACK_CELL_CLASS));
        }
        stack_cells.reverse();

        let registers = doc.cell_groups_by_class(REGISTER_CLASS);
        if registers.is_empty() || registers.iter().any(Vec::is_empty) {
            return Err(LayoutError::MissingElement(REGISTER_CLASS));
        }

        let history = doc.texts_by_class(COMMAND_DISPLAY_CLASS);
        if history.is_empty() {
            return Err(LayoutError::MissingElement(COMMAND_DISPLAY_CLASS));
        }

        Ok(Self {
            clock_left,
            clock_right,
            stack_cells,
            registers,
            history,
        })
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn register_width(&self, register: usize) -> usize {
        self.registers[register].len()
    }

    pub fn stack_cell_count(&self) -> usize {
        self.stack_cells.len()
    }

    pub fn history_slot_count(&self) -> usize {
        self.history.len()
    }
}

/// An in-memory [`SceneDocument`].
///
/// Backs the renderer tests and any headless consumer: the full pipeline
/// runs against it, and the read-back accessors expose what a renderer
/// wrote. Cloning shares the underlying buffers, so a clone held by a test
/// observes writes made through handles the registry owns.
#[derive(Clone)]
pub struct MemoryScene {
    loaded: bool,
    clock: Rc<RefCell<Vec<String>>>,
    /// Document order, top-to-bottom (the registry reverses at bind time).
    stack: Rc<RefCell<Vec<Option<Rgb>>>>,
    registers: Vec<Rc<RefCell<Vec<Option<Rgb>>>>>,
    history: Rc<RefCell<Vec<String>>>,
}

impl MemoryScene {
    /// A scene with the panel dimensions from the layout constants.
    pub fn with_default_layout() -> Self {
        Self::with_layout(REGISTER_COUNT, REGISTER_BITS, STACK_CELLS, HISTORY_SLOTS)
    }

    /// A scene with custom dimensions, for exercising mismatched layouts.
    pub fn with_layout(
        registers: usize,
        bits_per_register: usize,
        stack_cells: usize,
        history_slots: usize,
    ) -> Self {
        Self {
            loaded: true,
            clock: Rc::new(RefCell::new(vec![String::new(); 2])),
            stack: Rc::new(RefCell::new(vec![None; stack_cells])),
            registers: (0..registers)
                .map(|_| Rc::new(RefCell::new(vec![None; bits_per_register])))
                .collect(),
            history: Rc::new(RefCell::new(vec![String::new(); history_slots])),
        }
    }

    /// A document that exists but has not finished loading.
    pub fn unloaded() -> Self {
        Self {
            loaded: false,
            ..Self::with_default_layout()
        }
    }

    pub fn clock_text(&self) -> (String, String) {
        let clock = self.clock.borrow();
        (clock[0].clone(), clock[1].clone())
    }

    /// Stack cell fills in fill order (bottom of the gauge first).
    pub fn stack_fills(&self) -> Vec<Option<Rgb>> {
        self.stack.borrow().iter().rev().copied().collect()
    }

    /// Bit cell fills of one register, in bit order.
    pub fn register_fills(&self, register: usize) -> Vec<Option<Rgb>> {
        self.registers[register].borrow().clone()
    }

    pub fn history_lines(&self) -> Vec<String> {
        self.history.borrow().clone()
    }
}

pub struct MemoryText {
    buf: Rc<RefCell<Vec<String>>>,
    index: usize,
}

impl TextSlot for MemoryText {
    fn set_text(&mut self, text: &str) {
        self.buf.borrow_mut()[self.index] = text.to_owned();
    }
}

pub struct MemoryCell {
    buf: Rc<RefCell<Vec<Option<Rgb>>>>,
    index: usize,
}

impl CellSlot for MemoryCell {
    fn set_fill(&mut self, fill: Option<Rgb>) {
        self.buf.borrow_mut()[self.index] = fill;
    }
}

impl SceneDocument for MemoryScene {
    type Text = MemoryText;
    type Cell = MemoryCell;

    fn loaded(&self) -> bool {
        self.loaded
    }

    fn text_by_id(&self, id: &str) -> Option<MemoryText> {
        let index = match id {
            CLOCK_LEFT_ID => 0,
            CLOCK_RIGHT_ID => 1,
            _ => return None,
        };
        Some(MemoryText {
            buf: Rc::clone(&self.clock),
            index,
        })
    }

    fn texts_by_class(&self, class: &str) -> Vec<MemoryText> {
        if class != COMMAND_DISPLAY_CLASS {
            return Vec::new();
        }
        (0..self.history.borrow().len())
            .map(|index| MemoryText {
                buf: Rc::clone(&self.history),
                index,
            })
            .collect()
    }

    fn cells_by_class(&self, class: &str) -> Vec<MemoryCell> {
        if class != STACK_CELL_CLASS {
            return Vec::new();
        }
        (0..self.stack.borrow().len())
            .map(|index| MemoryCell {
                buf: Rc::clone(&self.stack),
                index,
            })
            .collect()
    }

    fn cell_groups_by_class(&self, class: &str) -> Vec<Vec<MemoryCell>> {
        if class != REGISTER_CLASS {
            return Vec::new();
        }
        self.registers
            .iter()
            .map(|register| {
                (0..register.borrow().len())
                    .map(|index| MemoryCell {
                        buf: Rc::clone(register),
                        index,
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_every_panel_element() {
        let scene = MemoryScene::with_default_layout();
        let registry = SceneRegistry::bind(&scene).unwrap();

        assert_eq!(registry.register_count(), REGISTER_COUNT);
        assert_eq!(registry.register_width(0), REGISTER_BITS);
        assert_eq!(registry.stack_cell_count(), STACK_CELLS);
        assert_eq!(registry.history_slot_count(), HISTORY_SLOTS);
    }

    #[test]
    fn unloaded_document_is_rejected() {
        let err = SceneRegistry::bind(&MemoryScene::unloaded()).unwrap_err();
        assert!(matches!(err, LayoutError::Unavailable));
    }

    #[test]
    fn missing_elements_are_rejected() {
        let no_history = MemoryScene::with_layout(REGISTER_COUNT, REGISTER_BITS, STACK_CELLS, 0);
        assert!(matches!(
            SceneRegistry::bind(&no_history).unwrap_err(),
            LayoutError::MissingElement(COMMAND_DISPLAY_CLASS)
        ));

        let no_registers = MemoryScene::with_layout(0, REGISTER_BITS, STACK_CELLS, HISTORY_SLOTS);
        assert!(matches!(
            SceneRegistry::bind(&no_registers).unwrap_err(),
            LayoutError::MissingElement(REGISTER_CLASS)
        ));

        let no_stack = MemoryScene::with_layout(REGISTER_COUNT, REGISTER_BITS, 0, HISTORY_SLOTS);
        assert!(matches!(
            SceneRegistry::bind(&no_stack).unwrap_err(),
            LayoutError::MissingElement(STACK_CELL_CLASS)
        ));
    }

    #[test]
    fn stack_cells_are_reversed_to_fill_order() {
        let scene = MemoryScene::with_layout(1, 1, 3, 1);
        let mut registry = SceneRegistry::bind(&scene).unwrap();

        // First cell in fill order is the document's last (bottom) cell.
        let fill = Rgb::new(1, 2, 3);
        registry.stack_cells[0].set_fill(Some(fill));
        assert_eq!(scene.stack.borrow()[2], Some(fill));
        assert_eq!(scene.stack_fills()[0], Some(fill));
    }
}
