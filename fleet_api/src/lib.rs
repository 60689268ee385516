pub mod fetcher;
pub mod pages;
pub mod pushlog;
pub mod queue;
pub mod test_fetcher;

pub use fetcher::{HttpFetcher, JsonFetcher};
pub use pushlog::PushlogClient;
pub use queue::QueueClient;
