pub mod lister;
pub mod supervisor;

pub use lister::{find_in_listing, ProcessLister, ProcessTerminator, SystemProcesses};
pub use supervisor::{ProcessHandle, ProcessSupervisor};
