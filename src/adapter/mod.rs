pub use base::*;

mod base;
