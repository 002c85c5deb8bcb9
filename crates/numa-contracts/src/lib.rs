pub mod errors;
pub mod events;
pub mod meals;
pub mod profile;
pub mod store;

pub use errors::AnalysisError;
