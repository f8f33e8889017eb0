pub mod domain;
pub mod layout;
pub mod record;
