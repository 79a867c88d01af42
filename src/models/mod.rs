pub mod commit;
pub mod refactoring;
pub mod sample;
pub mod summary;
