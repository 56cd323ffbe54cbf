mod generate;
mod health;
pub mod sse;

pub use generate::*;
pub use health::*;
