mod store;

pub use store::Neo4jResultStore;
