pub mod health;
pub mod stages;
pub mod status;
