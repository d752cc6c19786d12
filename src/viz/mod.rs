//! Figure rendering.
//!
//! `PlotSpec` is a pure description of the encoding (which columns map to
//! x, y, error bars, color, facet); `render` turns a derived table plus a
//! spec into a composite multi-panel image. The table fed here is always a
//! means-with-interval table, never the raw observations.

mod figure;

pub use figure::{render, PlotKind, PlotSpec};
