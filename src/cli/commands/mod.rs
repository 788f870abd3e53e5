pub mod compile;
pub mod routes;
pub mod serve;
pub mod token;
