pub mod executing;
