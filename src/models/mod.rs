pub mod frame;
pub mod intervention;
pub mod lifecycle;
pub mod summary;

pub use frame::{Emotion, Frame};
pub use intervention::{Intervention, InterventionKind, INTERVENTION_DURATION_MS};
pub use lifecycle::{ActivityEvent, LifecycleMessage};
pub use summary::{EngagementLevel, MinuteSummary};
