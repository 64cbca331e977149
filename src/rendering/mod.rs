// Rendering layer - Frames, overlays and animation encoding
pub mod activity_graph;
pub mod animation;
pub mod assets;
pub mod canvas;
pub mod frame;
pub mod overlay;
pub mod svg;
pub mod text;
