pub mod cache;
pub mod class;
pub mod handle;
pub mod object;
pub mod repository;
pub mod session;

pub use cache::{CacheStats, IdentityCache};
pub use class::{DefaultHooks, EntityClass, EntityHooks, HookContext, SavedTarget, fill_log_event};
pub use handle::Entity;
pub use object::PermanentObject;
pub use repository::{LoadInput, Repository};
pub use session::Session;
