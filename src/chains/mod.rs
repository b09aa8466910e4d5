pub mod fevm;
