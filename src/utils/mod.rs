pub mod auth;
pub mod keyed_mutex;
pub mod money;
pub mod validation;
