mod webdriver;

pub use webdriver::WebDriver;

use crate::error::FetchError;
use serde_json::Value;

/// The slice of a browser driver the rendered-page strategy relies on.
///
/// A session is scoped to one run: `start` before the first navigation and
/// `quit` once the run is over, on every path.
#[async_trait::async_trait]
pub trait Browser: Send {
    async fn start(&mut self) -> Result<(), FetchError>;
    async fn goto(&mut self, url: &str) -> Result<(), FetchError>;
    /// Evaluates `script` as a function body; `arguments[i]` maps to `args[i]`.
    async fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, FetchError>;
    async fn title(&mut self) -> Result<String, FetchError>;
    async fn current_url(&mut self) -> Result<String, FetchError>;
    async fn page_source(&mut self) -> Result<String, FetchError>;
    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError>;
    async fn quit(&mut self) -> Result<(), FetchError>;
}
