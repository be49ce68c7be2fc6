use anyhow::{Result, anyhow};
use log::debug;
use std::sync::{Arc, Once};

/// Exit status used when the process is interrupted with Ctrl+C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Runs a cleanup function when dropped or when the process receives Ctrl+C.
pub struct ExitHook {
    func: Arc<dyn Fn() + Send + Sync>,
}

impl ExitHook {
    pub fn new<F: Fn() + Send + Sync + 'static>(f: F) -> Self {
        Self { func: Arc::new(f) }
    }

    /// Registers the hook to run on Ctrl+C.
    ///
    /// Only the first registration in a process takes effect; later calls
    /// return `Ok(false)` and their hook only runs on drop.
    pub fn register(&self) -> Result<bool> {
        static ONCE: Once = Once::new();
        let f = self.func.clone();
        let mut res = Ok(false);
        ONCE.call_once(|| {
            res = ctrlc::set_handler(move || {
                f();
                std::process::exit(INTERRUPTED_EXIT_CODE);
            })
            .map(|_| true)
            .map_err(|e| anyhow!("Ctrl+C handler error: {}", e));
        });
        if matches!(res, Ok(false)) {
            debug!("Ctrl+C hook already registered; this one only runs on drop");
        }
        res
    }
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        (self.func)();
    }
}
