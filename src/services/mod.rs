pub mod density;
pub mod event_store;
pub mod metric_extractor;
pub mod pipeline;
pub mod render;

pub use event_store::*;
pub use metric_extractor::*;
pub use pipeline::*;
