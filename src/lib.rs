// Root of the `timetable_engine` crate: class timetable generation with three
// interchangeable strategies, a shared conflict checker and fitness
// evaluator, asynchronous job execution, and a SQLite schedule repository.
pub mod conflict;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod filler;
pub mod fitness;
pub mod genetic;
pub mod jobs;
pub mod repository;
pub mod server;
pub mod timegrid;

pub use server::run_server;
