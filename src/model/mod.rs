pub mod context;
pub mod envelope;
pub mod filter;
pub mod query;
pub mod record;
pub mod schema;

pub use context::*;
pub use envelope::*;
pub use filter::*;
pub use query::*;
pub use record::*;
pub use schema::*;
