pub mod queue;
pub mod render;

pub use queue::{ContextFactory, ThumbnailCallback, ThumbnailQueue};
pub use render::{render_thumbnail, RenderContext};
