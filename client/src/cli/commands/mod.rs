mod data_points;
mod listen;
mod scan;

pub use data_points::{get_data_point, set_data_point};
pub use listen::listen;
pub use scan::scan;
