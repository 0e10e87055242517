pub mod analysis;

pub use analysis::{AnalysisOutcome, ClientSettings, DisplaySink, ImageDescriptionClient};
