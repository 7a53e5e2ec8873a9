pub mod api;
pub mod models;

/// Name of the group whose members can see every owner's data.
pub const MANAGERS_GROUP: &str = "Managers";
