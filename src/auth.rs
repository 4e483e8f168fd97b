//! Auth-domain identifiers, scope sets, descriptors, and credential models.

pub mod credential;
pub mod descriptor;
pub mod id;
pub mod scope;
pub mod secret;

pub use credential::*;
pub use descriptor::*;
pub use id::*;
pub use scope::*;
pub use secret::*;
