pub mod current_ratio_repo;
pub mod ratio_history_repo;

pub use current_ratio_repo::CurrentRatioRepository;
pub use ratio_history_repo::RatioHistoryRepository;
