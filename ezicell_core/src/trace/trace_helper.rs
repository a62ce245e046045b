/// # TraceHelper
/// Per component trace handle. Every message carries the
/// component name (e.g. "IO/EziIoManager") as log target,
/// so the sink can tell the sources apart and RUST_LOG can
/// filter them.
#[derive(Clone)]
pub struct TraceHelper
{
    source_mod: String
}

impl TraceHelper
{
    pub fn new(module_name: &str) -> Self
    {
        TraceHelper
        {
            source_mod: module_name.to_string()
        }
    }

    pub fn source(&self) -> &str
    {
        &self.source_mod
    }

    pub fn trace(&self, message: String)
    {
        log::info!(target: self.source_mod.as_str(), "{}", message);
    }

    pub fn trace_str(&self, message: &str)
    {
        log::info!(target: self.source_mod.as_str(), "{}", message);
    }

    pub fn error(&self, message: String)
    {
        log::error!(target: self.source_mod.as_str(), "{}", message);
    }

    pub fn error_str(&self, message: &str)
    {
        log::error!(target: self.source_mod.as_str(), "{}", message);
    }
}
