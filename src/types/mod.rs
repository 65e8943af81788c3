pub mod candle;
pub mod option;
pub mod prediction;
pub mod weights;

pub use candle::*;
pub use option::*;
pub use prediction::*;
pub use weights::*;
