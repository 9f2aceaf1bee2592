//! PTY process driver used to host an interactive tool in a real terminal so
//! it prompts, echoes and flushes the way it would for a person.

mod io;
mod osc;
mod pty;


pub use io::{PtyReader, ReadEvent};
pub use pty::{describe_exit, LaunchSpec, ProcessDriver, ProcessExit};
