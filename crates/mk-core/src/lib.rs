pub mod document;
pub mod id;
pub mod model;
pub mod registry;

pub use document::{AnnotationDocument, AnnotationSnapshot};
pub use id::{KindId, MarkerId};
pub use model::*;
pub use registry::{Capability, CapabilitySet, MarkerKind};
