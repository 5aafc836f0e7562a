pub mod goals;
pub use self::goals::*;

pub mod project;
pub use self::project::*;
