pub use self::copy::ClearValue;

mod bind;
mod copy;
mod sync;
