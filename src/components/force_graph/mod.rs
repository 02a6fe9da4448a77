mod component;
mod render;
mod state;
mod types;

pub use component::ForceGraphCanvas;
pub use types::status_color;
