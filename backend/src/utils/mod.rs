pub mod loc;
