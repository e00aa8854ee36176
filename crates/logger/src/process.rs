//! Host and process identity stamped onto every record

use std::sync::{Arc, LazyLock};

static CURRENT: LazyLock<ProcessInfo> = LazyLock::new(ProcessInfo::detect);

/// Host name and process id of the logging process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Host name, `localhost` if it cannot be determined
    pub hostname: Arc<str>,
    /// Operating system process id
    pub pid: u32,
}

impl ProcessInfo {
    /// Identity of the current process, detected once.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.clone()
    }

    fn detect() -> Self {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            hostname: hostname.into(),
            pid: std::process::id(),
        }
    }
}
