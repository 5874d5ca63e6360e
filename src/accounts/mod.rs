pub mod record;
pub mod repo;

pub use record::{AccountCreate, AccountPatch, AccountRecord, PublicAccount};
pub use repo::AccountRepository;
