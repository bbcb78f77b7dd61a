//! Random transactional histories for tests, benches and the `generate`
//! command.

pub mod generator;
