pub mod store;

pub use store::MatchStoreClient;
