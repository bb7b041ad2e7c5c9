pub mod booking;
pub mod car;
pub mod city;
pub mod ride;
pub mod user;
