//! Open documents ("tabs") and the active-document pointer.
//!
//! The tab set always holds at least one document: closing the last tab
//! replaces it with an empty untitled one.

use crate::languages::{Language, BLANK_TEMPLATE};
use serde::{Deserialize, Serialize};

pub type DocumentId = u64;

const WELCOME_CONTENT: &str = "// Welcome to CodeBuddy!\n\
// A beginner-friendly code editor\n\
// Now with C/C++ support and Google Drive integration!\n\
\n\
function greetUser(name) {\n\
  console.log(`Hello, ${name}! Welcome to CodeBuddy!`);\n\
  return `Happy coding, ${name}!`;\n\
}\n\
\n\
// Try running this code\n\
const message = greetUser(\"Developer\");\n\
console.log(message);\n";

/// One open document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub language: Language,
    pub content: String,
    /// True when the content changed since the last save or load.
    pub dirty: bool,
    /// Drive file id once the document has been stored remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Document {
    /// File name used when saving: the display name, with the language
    /// extension appended when the name has none.
    pub fn file_name(&self) -> String {
        if self.name.contains('.') {
            self.name.clone()
        } else {
            format!("{}{}", self.name, self.language.extension())
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.split('\n').count()
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    fn holds_template_content(&self) -> bool {
        self.content == BLANK_TEMPLATE
            || self.content.trim().is_empty()
            || self.content == self.language.template()
    }
}

/// Partial update applied to the active document.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub name: Option<String>,
    pub language: Option<Language>,
    pub content: Option<String>,
}

/// Ordered set of open documents.
#[derive(Debug, Clone)]
pub struct TabSet {
    tabs: Vec<Document>,
    active: DocumentId,
    next_id: DocumentId,
}

impl Default for TabSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TabSet {
    /// A tab set holding the welcome document.
    pub fn new() -> Self {
        Self {
            tabs: vec![Document {
                id: 1,
                name: "welcome.js".into(),
                language: Language::JavaScript,
                content: WELCOME_CONTENT.into(),
                dirty: false,
                remote_id: None,
            }],
            active: 1,
            next_id: 2,
        }
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.tabs.iter()
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn active(&self) -> Option<&Document> {
        self.get(self.active)
    }

    pub fn active_id(&self) -> DocumentId {
        self.active
    }

    /// Make `id` the active document. Returns false when no such tab exists.
    pub fn activate(&mut self, id: DocumentId) -> bool {
        if self.get(id).is_some() {
            self.active = id;
            true
        } else {
            false
        }
    }

    /// Open a fresh JavaScript document and activate it.
    pub fn create(&mut self) -> DocumentId {
        self.create_with_language(Language::JavaScript)
    }

    /// Open a fresh document pre-filled with the language template and activate it.
    pub fn create_with_language(&mut self, language: Language) -> DocumentId {
        let id = self.allocate_id();
        self.tabs.push(Document {
            id,
            name: format!("untitled-{id}{}", language.extension()),
            language,
            content: language.template().to_string(),
            dirty: true,
            remote_id: None,
        });
        self.active = id;
        id
    }

    /// Add a document loaded from storage. The language is detected from the
    /// file name and defaults to JavaScript. The new tab is clean and active.
    pub fn open(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        remote_id: Option<String>,
    ) -> DocumentId {
        let name = name.into();
        let id = self.allocate_id();
        let language = Language::from_file_name(&name).unwrap_or(Language::JavaScript);
        self.tabs.push(Document {
            id,
            name,
            language,
            content: content.into(),
            dirty: false,
            remote_id,
        });
        self.active = id;
        id
    }

    /// Close a tab. Closing the last tab leaves a single empty untitled document.
    /// When the active tab closes, the neighbour at the same position becomes active.
    pub fn close(&mut self, id: DocumentId) -> bool {
        let Some(index) = self.tabs.iter().position(|t| t.id == id) else {
            return false;
        };

        if self.tabs.len() == 1 {
            let language = Language::JavaScript;
            self.tabs = vec![Document {
                id: 1,
                name: format!("untitled{}", language.extension()),
                language,
                content: String::new(),
                dirty: true,
                remote_id: None,
            }];
            self.active = 1;
            if self.next_id < 2 {
                self.next_id = 2;
            }
            return true;
        }

        self.tabs.remove(index);
        if self.active == id {
            let next = index.min(self.tabs.len() - 1);
            self.active = self.tabs[next].id;
        }
        true
    }

    /// Apply an edit to the active document and mark it dirty.
    ///
    /// Switching language swaps in the new language's template when the
    /// document still holds template or blank content, and fixes the
    /// extension of untitled documents.
    pub fn update_active(&mut self, update: DocumentUpdate) -> Option<&Document> {
        let active = self.active;
        let tab = self.tabs.iter_mut().find(|t| t.id == active)?;

        if let Some(language) = update.language {
            if language != tab.language {
                if tab.holds_template_content() {
                    tab.content = language.template().to_string();
                }
                if tab.name.starts_with("untitled-") {
                    let base = tab.name.split('.').next().unwrap_or_default().to_string();
                    tab.name = format!("{base}{}", language.extension());
                }
                tab.language = language;
            }
        }
        if let Some(name) = update.name {
            tab.name = name;
        }
        if let Some(content) = update.content {
            tab.content = content;
        }
        tab.dirty = true;
        Some(tab)
    }

    pub fn rename(&mut self, id: DocumentId, name: impl Into<String>) -> bool {
        match self.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) => {
                tab.name = name.into();
                tab.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Record a successful save. A remote id replaces any previous one.
    pub fn mark_saved(&mut self, id: DocumentId, remote_id: Option<String>) -> bool {
        match self.tabs.iter_mut().find(|t| t.id == id) {
            Some(tab) => {
                tab.dirty = false;
                if remote_id.is_some() {
                    tab.remote_id = remote_id;
                }
                true
            }
            None => false,
        }
    }

    fn allocate_id(&mut self) -> DocumentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
