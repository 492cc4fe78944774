//! Response envelopes and pagination shared by the route handlers

pub mod pagination;
pub mod response;

pub use pagination::{Paginated, PaginationParams};
pub use response::{Created, DataResponse, MessageResponse, NoContent};
