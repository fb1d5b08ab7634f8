//! Observable property cells.

pub mod cell;
pub mod value;

pub use cell::{CellState, CellValue, Requirement};
pub use value::{FromAttrValue, IntoAttrValue};

pub(crate) use cell::{
    CellControl, Change, Completion, Next, PendingWrite, Property, Reply, WriteOutcome,
};
