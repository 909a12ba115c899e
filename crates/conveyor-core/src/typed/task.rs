//! Task trait - binds a task name to its typed arguments.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A task type: its registered name, the shape of its arguments and of its
/// result.
///
/// Arguments travel as an ordered JSON array. A struct with named fields
/// decodes from that array positionally, so `["demo"]` becomes
/// `LongRunning { word: "demo" }`.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct LongRunning {
///     word: String,
/// }
///
/// impl Task for LongRunning {
///     const NAME: &'static str = "long_running_task";
///     type Output = String;
/// }
/// ```
pub trait Task: DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;

    type Output: Serialize + Send;
}
