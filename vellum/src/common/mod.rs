mod constants;
mod document;
mod util;
mod value;

pub use constants::*;
pub use document::*;
pub use util::*;
pub use value::*;
