pub mod authn;
pub mod roles;
pub mod storage;
