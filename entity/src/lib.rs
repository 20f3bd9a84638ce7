pub mod dead_letter;
pub mod publish_log;
pub mod submission;
