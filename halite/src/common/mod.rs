pub mod constants;
mod serde_impl;
mod sort_order;
mod time;
mod types;
mod value;

pub use constants::*;
pub use sort_order::*;
pub use time::*;
pub use types::*;
pub use value::*;
