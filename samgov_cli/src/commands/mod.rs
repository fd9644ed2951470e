pub mod fetch;
pub mod history;
