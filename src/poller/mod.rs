pub mod model;
pub mod service;

pub use model::{PollError, PollRunSummary, PollerState, TickerOutcome};
pub use service::{PollerConfig, PollerService, Sleeper, TokioSleeper};
