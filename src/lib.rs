pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod geocode;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod sheet;
pub mod storage;
