pub mod block;
pub mod clock;
pub mod command;
pub mod engine;
pub mod goal;
pub mod grid;
pub mod level;
pub mod program;
pub mod registry;
pub mod view;
