mod license;
mod payment;

pub use license::*;
pub use payment::*;
