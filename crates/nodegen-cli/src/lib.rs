//! Library interface for the nodegen CLI

pub mod input;
pub mod report;

pub use input::{load_input, InputDocument, LoadedInput};
pub use report::{render_inspection, render_summary, PlanDocument};
