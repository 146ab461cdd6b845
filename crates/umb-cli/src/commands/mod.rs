pub mod plan;
pub mod run;
pub mod verify;
