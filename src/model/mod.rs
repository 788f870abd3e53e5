// Raw endpoint model: fragments, merging and tagged declarations

pub mod decl;
pub mod loader;
pub mod merge;
pub mod method;

pub use decl::{AuthDecl, AuthShortcut, EndpointDecl, HandlerShortcut, RequirementDecl};
pub use merge::{merge, merge_all};
pub use method::{AuthMethod, HttpMethod};
