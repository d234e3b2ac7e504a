// Static pages served as-is.
pub const INDEX: &str = include_str!("../templates/index.html");
pub const MAP: &str = include_str!("../templates/map.html");
