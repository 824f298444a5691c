pub mod audit;
pub mod demo;
pub mod inspect;
pub mod policy;
