pub mod conversation;
pub mod draft;
pub mod run;
