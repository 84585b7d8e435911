pub mod interval_cache;
pub mod interval_tree;
