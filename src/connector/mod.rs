pub use base::*;
pub use callback::*;
pub use source::*;

mod base;
mod callback;
mod source;
