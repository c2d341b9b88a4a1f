pub mod entailment;
pub mod search;

pub use entailment::HfEntailment;
pub use search::SerperSearch;
