#[cfg(feature = "javascript")]
mod script;

#[cfg(feature = "javascript")]
pub use script::ScriptBackend;

pub mod python;
mod remote;
mod sql;

#[cfg(feature = "python")]
pub use python::wasi::WasiLoader;
pub use python::{PackageInstaller, PythonBackend};
pub use remote::RemoteBackend;
pub use sql::SqlBackend;
