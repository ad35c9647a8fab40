//! Veneer DOM Host
//!
//! An owned model of the page's node tree together with the interception
//! component that vets nodes on their way in.
//!
//! - `node`: the tree itself and its raw operations
//! - `html`: `innerHTML` parsing and serialization
//! - `dom`: the realm (`Node.prototype`, `document`) as hookable dispatch tables
//! - `intercept`: [`InterceptDom`]

pub mod dom;
pub mod error;
pub mod html;
pub mod intercept;
pub mod node;

pub use dom::Dom;
pub use error::DomError;
pub use intercept::InterceptDom;
pub use node::{NodeKind, NodeRef};
