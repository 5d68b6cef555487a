//! Database repositories.

pub mod items;
pub mod repository;
pub mod tags;
pub mod users;

pub use items::Items;
pub use repository::Repository;
pub use tags::Tags;
pub use users::Users;
