pub mod page;
pub mod session;

pub use page::PageDriver;
pub use session::{CdpSession, SessionHandle};
