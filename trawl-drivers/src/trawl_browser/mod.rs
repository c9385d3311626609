pub mod driver;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod page;
pub mod script;
