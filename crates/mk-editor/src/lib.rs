pub mod editor;
pub mod history;
pub mod panels;

pub use editor::{EditorMode, EditorSession, EditorState};
pub use history::History;
