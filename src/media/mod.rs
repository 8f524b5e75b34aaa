pub mod filter_graph;
pub mod probe;
pub mod runner;
