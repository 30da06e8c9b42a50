pub mod constraints;
pub mod error;
pub mod model;
pub mod parsers;
mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
