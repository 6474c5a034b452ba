pub mod month;
pub mod validation;

pub use month::*;
pub use validation::*;
