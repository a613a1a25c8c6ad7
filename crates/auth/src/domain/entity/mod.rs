pub mod flow;
pub mod profile;
pub mod session;
