pub mod clock;
pub mod tree;
pub mod utils;
