pub mod aggregate;
pub mod decision;
pub mod detector;
pub mod state;

pub use aggregate::build_minute_summary;
pub use decision::evaluate;
pub use detector::observe_frame;
pub use state::{ActivityState, InterventionLedger};
