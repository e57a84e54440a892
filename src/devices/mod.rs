pub mod traits;
pub mod velocity;
pub mod plc;

pub use traits::Device;
pub use velocity::{convert, to_float, Twist, Vector3};
pub use plc::{PlcTeleopDevice, TwistReading};
