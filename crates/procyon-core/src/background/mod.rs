pub mod local;
pub mod model;
pub mod stats;

pub use local::{subtract_stamp_background, BackgroundKey, BackgroundStat, LocalBackgroundParams, SampleCache};
pub use model::{channel_background_model, subtract_frame_models, TileGrid};
pub use stats::{median, sigma_clipped_stats, ClippedStats};
