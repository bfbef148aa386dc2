//! Domain types, pure scoring functions, and the ports through which the
//! engine talks to its external collaborators.

pub mod event;
pub mod features;
pub mod governance;
pub mod ports;
pub mod record;
pub mod risk;
