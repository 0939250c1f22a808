pub mod cache;
pub mod candidates;
pub mod creation_key;
pub mod exiftool;
pub mod index;
pub mod matcher;
pub mod record;
pub mod reference;
pub mod run;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testing;
