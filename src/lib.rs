//! Raster label-mask editor core.
//!
//! A user paints per-pixel class labels onto an image with brush dabs,
//! tapered line strokes, polygons, flood fill and superpixel regions.
//! [`session::EditorSession`] interprets pointer input, keeps undo/redo
//! history and composites the labelled layers over the image for display.

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod io;
pub mod ops;
pub mod session;

pub use canvas::{BrushPoint, LabelBuffer, Layer, PixelBounds};
pub use components::tools::{PointerEvent, Tool};
pub use session::EditorSession;
