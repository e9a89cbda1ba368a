pub mod coordinator;
mod workflow;
