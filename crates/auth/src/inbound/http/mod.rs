pub mod authn;
pub mod page;
