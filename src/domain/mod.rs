// Domain layer: report records, dominance results and ports (interfaces).

pub mod model;
pub mod ports;
