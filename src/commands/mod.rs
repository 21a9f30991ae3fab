pub mod collect;
pub mod manifest;
pub mod profile;
