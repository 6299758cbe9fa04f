pub mod bot;
pub mod instrument;
pub mod order;
