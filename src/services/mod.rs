pub mod audit;
pub mod auth;
pub mod codes;
pub mod email;
pub mod metrics;
pub mod notifications;
pub mod password;
pub mod side_effects;
pub mod token;
