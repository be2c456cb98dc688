mod advanced;
mod daemon;
mod init;
mod phases;

pub use advanced::advanced;
pub use daemon::daemon;
pub use init::init;
pub use phases::phases;
