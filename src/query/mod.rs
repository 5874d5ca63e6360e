// Submodules for separation of concerns
pub mod filter;
pub mod update;

pub use filter::matches;
pub use update::apply;
