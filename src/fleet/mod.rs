pub mod collector;
pub mod reconcile;
pub mod resolver;
