//! Editor integration: change notification → validation → markers.
//!
//! The editor itself is external. It hands over its text through
//! `EditorSurface` and renders whatever diagnostics it is given; each pass
//! replaces the previous marker list wholesale.

use tracing::{debug, warn};

use crate::store::{self, KeyValueStore};
use crate::validate::{AttributeValidator, Diagnostic};

/// Skeleton shown when nothing has been saved yet.
pub const DEFAULT_DOCUMENT: &str = "\
<policies>
    <inbound></inbound>
    <backend></backend>
    <outbound></outbound>
    <on-error></on-error>
</policies>";

/// The text editor, as seen from the validator.
pub trait EditorSurface {
    /// Current full document text.
    fn text(&self) -> String;

    /// Replace all markers with `diagnostics`.
    fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>);
}

pub struct EditorSession<'s> {
    validator: AttributeValidator,
    store: &'s dyn KeyValueStore,
    has_errors: bool,
}

impl<'s> EditorSession<'s> {
    pub fn new(validator: AttributeValidator, store: &'s dyn KeyValueStore) -> Self {
        Self {
            validator,
            store,
            has_errors: false,
        }
    }

    /// Document to load into the editor: the saved one, or the skeleton when
    /// nothing (or only whitespace) was saved.
    pub fn initial_document(&self) -> String {
        self.store
            .get(store::EDITOR_CONTENT)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOCUMENT.to_string())
    }

    /// Handle a "content changed" notification. Returns the diagnostic
    /// count pushed to the surface.
    pub fn content_changed(&mut self, surface: &mut dyn EditorSurface) -> usize {
        let snapshot = surface.text();
        let diagnostics = self.validator.validate(&snapshot);
        let count = diagnostics.len();
        self.has_errors = count > 0;
        surface.set_diagnostics(diagnostics);

        if let Err(e) = self.store.set(store::EDITOR_CONTENT, &snapshot) {
            warn!(error = %e, "failed to persist editor content");
        }
        debug!(diagnostics = count, "editor content validated");
        count
    }

    /// Whether the last pass found anything. Drives the "propose fix" action.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Clear the error flag when a chat turn starts.
    pub fn acknowledge_errors(&mut self) {
        self.has_errors = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct FakeEditor {
        text: String,
        markers: Vec<Diagnostic>,
        pushes: usize,
    }

    impl EditorSurface for FakeEditor {
        fn text(&self) -> String {
            self.text.clone()
        }

        fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
            self.markers = diagnostics;
            self.pushes += 1;
        }
    }

    #[test]
    fn initial_document_defaults_to_skeleton() {
        let store = MemoryStore::new();
        let session = EditorSession::new(AttributeValidator::default(), &store);
        assert_eq!(session.initial_document(), DEFAULT_DOCUMENT);

        store.set(store::EDITOR_CONTENT, "<policies/>").unwrap();
        assert_eq!(session.initial_document(), "<policies/>");
    }

    #[test]
    fn emptied_document_reopens_on_skeleton() {
        let store = MemoryStore::new();
        let session = EditorSession::new(AttributeValidator::default(), &store);
        store.set(store::EDITOR_CONTENT, "").unwrap();
        assert_eq!(session.initial_document(), DEFAULT_DOCUMENT);
        store.set(store::EDITOR_CONTENT, "  \n").unwrap();
        assert_eq!(session.initial_document(), DEFAULT_DOCUMENT);
    }

    #[test]
    fn skeleton_is_valid() {
        assert!(AttributeValidator::default().validate(DEFAULT_DOCUMENT).is_empty());
    }

    #[test]
    fn change_replaces_markers_and_persists() {
        let store = MemoryStore::new();
        let mut session = EditorSession::new(AttributeValidator::default(), &store);
        let mut editor = FakeEditor {
            text: r#"<policies><inbound><set-header name="X" bad="y"/></inbound></policies>"#.into(),
            ..FakeEditor::default()
        };

        assert_eq!(session.content_changed(&mut editor), 1);
        assert!(session.has_errors());
        assert_eq!(editor.markers[0].message, "Unknown attribute: bad");
        assert_eq!(store.get(store::EDITOR_CONTENT).as_deref(), Some(editor.text.as_str()));

        editor.text = r#"<policies><inbound><set-header name="X"/></inbound></policies>"#.into();
        assert_eq!(session.content_changed(&mut editor), 0);
        assert!(!session.has_errors());
        assert!(editor.markers.is_empty());
        assert_eq!(editor.pushes, 2);
    }

    #[test]
    fn acknowledge_clears_flag() {
        let store = MemoryStore::new();
        let mut session = EditorSession::new(AttributeValidator::default(), &store);
        let mut editor = FakeEditor {
            text: "<policies>".into(),
            ..FakeEditor::default()
        };
        session.content_changed(&mut editor);
        assert!(session.has_errors());
        session.acknowledge_errors();
        assert!(!session.has_errors());
    }
}
