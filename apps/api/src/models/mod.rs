pub mod screening;
pub mod task;
