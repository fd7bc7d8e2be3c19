pub mod colors;
pub mod events;
pub mod history;
pub mod tools;
