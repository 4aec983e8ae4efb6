pub mod cli;

pub use cli::OperatorMenu;
