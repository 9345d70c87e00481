pub mod icons;
pub mod progress;
pub mod summary;

pub use progress::RunProgress;
pub use summary::{format_duration, render_summary};
