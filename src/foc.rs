// FOC (Field Oriented Control) math primitives
// Clarke/Park transforms, sin/cos, SVPWM and the PI controller used by the current and speed loops

pub mod pi_controller;
pub mod svpwm;
pub mod transforms;

// Re-export main types for easier access
pub use pi_controller::PiController;
pub use svpwm::calculate_svpwm;
pub use transforms::{clarke, inverse_park, limit_voltage, park, sin_cos};
