use crate::{LookupContext, Match};

/// Receives every resolution made by the client: the key, what it resolved to (if anything), and
/// the context it was resolved against.
///
/// Implemented for any `Fn(&str, Option<&Match>, &LookupContext)`. Implementations should return
/// quickly; batching and uploading are up to the sink.
pub trait TelemetrySink: Send + Sync {
    /// Called after every resolution. `result` is `None` when the key resolved to nothing.
    fn report_match(&self, key: &str, result: Option<&Match>, context: &LookupContext);
}

pub(crate) struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn report_match(&self, _key: &str, _result: Option<&Match>, _context: &LookupContext) {}
}

impl<T: Fn(&str, Option<&Match>, &LookupContext) + Send + Sync> TelemetrySink for T {
    fn report_match(&self, key: &str, result: Option<&Match>, context: &LookupContext) {
        self(key, result, context);
    }
}
