// Protocol data model for the webwire WebDriver client.
// Defines the pieces shared by the scheduler, the wire executor and the
// high-level client: command names and parameter maps, session state,
// the closed error taxonomy with its legacy/W3C decoders, and the wire
// element-reference value helpers.

pub mod command;
pub mod error;
pub mod ids;
pub mod session;
pub mod value;

pub use command::{Command, CommandName};
pub use error::{ErrorKind, WebDriverError};
pub use ids::{FrameId, PromiseId, TaskId};
pub use session::{Capabilities, Session};
pub use value::{Dialect, ELEMENT_KEY_LEGACY, ELEMENT_KEY_W3C};
