use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::StatusDisplay;

/// HTTP transport: the three call shapes the scheduler dispatches.
///
/// Any `Err` is treated as a transport failure by the caller.
pub trait Transport: Send + Sync + 'static {
    /// GET and decode the body as JSON.
    fn get_json(&self, url: &str) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// GET and return the raw body.
    fn get_text(&self, url: &str) -> BoxFuture<'_, Result<String>>;

    /// POST an already-serialized JSON body and decode the JSON response.
    fn post_json(&self, url: &str, body: String) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Visual surface showing the aggregate request status.
pub trait StatusSurface: Send + Sync + 'static {
    /// Called with the aggregator's lock held, so an implementation must
    /// not call back into the aggregator that renders to it; doing so
    /// deadlocks.
    fn render(&self, shown: &StatusDisplay);
}

/// Current-location access used by the project redirect helpers.
pub trait Navigator {
    /// Path of the current page, used as the `next` return target.
    fn pathname(&self) -> String;

    /// Leave the current page for `url`.
    fn navigate(&self, url: &str);
}
