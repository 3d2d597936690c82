pub mod history;
pub mod presence;
pub mod router;
