pub mod query;
pub mod response;

pub use query::{PaginationQuery, SortOrder};
pub use response::{ApiResponse, PaginatedResponse};
