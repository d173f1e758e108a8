// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod construction;
pub mod lifecycle;
pub mod refresh;
pub mod utils;

pub use utils::*;
