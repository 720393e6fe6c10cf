pub mod config;
pub mod error;
pub mod events;
pub mod gpu;
pub mod slot;
pub mod processing {
    pub mod contrib;
    pub mod filter;
    pub mod geometry;
    pub mod row;
    pub mod tiles;
    pub mod vertical;
}
pub mod render {
    pub mod animator;
}
pub mod tasks {
    pub mod catalog;
    pub mod loader;
    pub mod presenter;
    pub mod producer;
}
