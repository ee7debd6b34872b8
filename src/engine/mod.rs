pub mod fare;
pub mod grouping;
pub mod lifecycle;
pub mod ranking;
pub mod sweeper;
