pub mod args;
pub mod output;

pub use args::{Args, Command, OutputFormat, ReviewArgs};
