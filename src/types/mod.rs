pub mod currency;
pub mod series;
pub mod forecast;

pub use currency::*;
pub use series::*;
pub use forecast::*;
