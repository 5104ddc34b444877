pub mod domain;
pub mod formatter;
pub mod pipeline;
pub mod traits;
pub mod validator;
