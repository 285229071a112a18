/// What the server does once memory and store can no longer be trusted to agree.
pub trait FatalHandler: std::fmt::Debug + Send {
    fn panic_stop(&self, msg: &str);
}

/// Logs the reason and terminates the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicStop;

impl FatalHandler for PanicStop {
    fn panic_stop(&self, msg: &str) {
        log::error!("Panic shutdown of server: {}", msg);
        std::process::exit(1);
    }
}
