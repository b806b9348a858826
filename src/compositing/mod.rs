mod pipeline;
mod placement;
mod surface;

pub use pipeline::{CompositingPipeline, SkipReason, TickOutcome, MIN_FRAME_DIMENSION};
pub use placement::{compute_placement, PlacementRect};
pub use surface::{OutputSurface, OverlayCanvas};
