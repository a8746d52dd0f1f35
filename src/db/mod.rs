pub mod connection;
pub mod schema;
pub mod store;

pub use connection::*;
pub use schema::*;
pub use store::SurrealStore;
