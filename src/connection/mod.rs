//! Signal-path substrate the readers consume.
//!
//! A [`Signal`] fans packets out to one [`ConnectionQueue`] per attached reader. Readers
//! attach either directly to a signal or through an [`InputPort`]; both are captured by
//! [`ReaderSource`].

mod queue;
mod signal;

pub use queue::{ConnectionQueue, QueueSummary};
pub use signal::{InputPort, ReaderSource, Signal};
