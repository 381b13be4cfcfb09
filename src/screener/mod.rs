pub mod model;
pub mod report;
pub mod service;

pub use model::{CriteriaError, PbAverages, ScreeningCriteria, ScreeningResult, SymbolMetrics};
pub use service::{calculate_avg_pb_ratios, screen_stocks, screen_with_year};
