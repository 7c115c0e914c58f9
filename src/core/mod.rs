pub mod abandoned;
pub mod rate_limit;
pub mod reclaimer;
pub mod scanner;
