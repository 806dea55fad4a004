pub use binding::*;
pub use runner::*;

mod binding;
mod runner;
