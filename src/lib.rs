pub mod ask;
pub mod batch;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod frames;
pub mod gate;
pub mod outcome;
pub mod parsers;
pub mod prompt;
pub mod sink;
pub mod work;
