pub mod capture;
pub mod detection;
pub mod imaging;
pub mod remote;
pub mod scanning;
pub mod shared;
