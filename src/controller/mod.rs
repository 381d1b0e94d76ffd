//! The two cooperating state machines of the acquisition core.
//!
//! [`acquisition::AcquisitionController`] runs in the fast context and owns
//! the producer end of the sample queue. [`host::HostController`] runs in the
//! slow context, owns the consumer end and speaks the byte protocol. They
//! share nothing but the queue, the fill-trigger pulse relay and the reset
//! line.

pub mod acquisition;
pub mod command;
pub mod host;

pub use acquisition::{AcquisitionController, AcquisitionPorts, AcquisitionState, AcquisitionStats};
pub use command::CommandDecoder;
pub use host::{HostController, HostPorts, HostState, HostStats};
