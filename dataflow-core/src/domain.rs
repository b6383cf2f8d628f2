pub mod schema;
pub mod tabular;
pub mod job;
pub mod task;
pub mod query;
pub mod notification;

pub use schema::*;
pub use tabular::*;
pub use job::*;
pub use task::*;
pub use query::*;
pub use notification::*;
