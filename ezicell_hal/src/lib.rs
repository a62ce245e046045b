pub mod iobus;
