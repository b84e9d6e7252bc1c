pub mod hash;
pub mod merkle;
pub mod pow;
pub mod sign;
