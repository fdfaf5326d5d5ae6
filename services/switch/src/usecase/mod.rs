pub mod block;
pub mod code;
pub mod dispatch;
pub mod verification;
