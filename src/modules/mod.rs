pub mod job;
pub mod lut;
