pub mod guards;
pub mod rate_limit;
pub mod robots;
pub mod sanitize;
pub mod token_security;
pub mod url_validator;
