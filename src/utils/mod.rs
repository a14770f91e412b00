pub(crate) mod async_task;
pub(crate) mod cluster;
pub mod file_io;
pub(crate) mod net;
