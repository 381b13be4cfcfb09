pub mod current_ratio;
pub mod ratio_history;

pub use current_ratio::Entity as CurrentRatio;
pub use ratio_history::Entity as RatioHistory;
