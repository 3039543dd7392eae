mod diff;
mod model;

pub use diff::*;
pub use model::*;
