pub mod cli;
pub mod lock;
pub mod state;
pub mod validation;
