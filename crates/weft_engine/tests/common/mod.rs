//! Shared fixtures: a whitespace-word syntax tree over `SourceFile`s and a
//! host input type built from a `SourceDb`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_common::ContentHash;
use weft_engine::SyntaxTree;
use weft_source::{FileId, SourceDb, SourceFile, Span};

/// Counts callback invocations.
#[derive(Clone, Default, Debug)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns the count and resets it to zero.
    pub fn take(&self) -> usize {
        self.0.swap(0, Ordering::SeqCst)
    }
}

/// A node of a [`WordTree`]: the file, one of its lines, or one word.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WordNode {
    File,
    Line(Span),
    Word { text: Arc<str>, span: Span },
}

impl WordNode {
    pub fn word(&self) -> Option<&str> {
        match self {
            WordNode::Word { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A file split into lines and whitespace-separated words.
pub struct WordTree {
    pub file: Arc<SourceFile>,
    walks: Counter,
}

impl WordTree {
    pub fn new(file: Arc<SourceFile>, walks: Counter) -> Self {
        Self { file, walks }
    }

    fn words(&self, line: Span) -> Vec<WordNode> {
        let text = self.file.snippet(line.start, line.end);
        let mut words = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            match (c.is_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    words.push(WordNode::Word {
                        text: Arc::from(&text[s..i]),
                        span: Span::new(line.file, line.start + s as u32, line.start + i as u32),
                    });
                    start = None;
                }
                _ => {}
            }
        }
        words
    }
}

impl PartialEq for WordTree {
    fn eq(&self, other: &Self) -> bool {
        self.file.id == other.file.id && self.file.content_hash == other.file.content_hash
    }
}

impl SyntaxTree for WordTree {
    type Node = WordNode;

    fn file(&self) -> FileId {
        self.file.id
    }

    fn version(&self) -> ContentHash {
        self.file.content_hash
    }

    fn root(&self) -> WordNode {
        self.walks.hit();
        WordNode::File
    }

    fn children(&self, node: &WordNode) -> Vec<WordNode> {
        match node {
            WordNode::File => (0..self.file.line_count())
                .filter_map(|index| self.file.line_span(index))
                .map(WordNode::Line)
                .collect(),
            WordNode::Line(span) => self.words(*span),
            WordNode::Word { .. } => Vec::new(),
        }
    }
}

/// Host inputs for the tests: the source files plus a settings string.
#[derive(Default)]
pub struct Host {
    pub db: SourceDb,
    pub settings: String,
    /// Counts tree walks, i.e. calls to `WordTree::root`.
    pub walks: Counter,
}

impl Host {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let mut host = Self::default();
        for (name, text) in files {
            host.db.add_source(*name, *text);
        }
        host
    }

    pub fn trees(&self) -> Vec<Arc<WordTree>> {
        self.db
            .snapshot()
            .into_iter()
            .map(|file| Arc::new(WordTree::new(file, self.walks.clone())))
            .collect()
    }
}

/// The id of the `index`th file added to a [`Host`].
pub fn file(index: u32) -> FileId {
    FileId::from_raw(index)
}

/// Whether a node is a word starting with `@`.
pub fn is_marker(node: &WordNode) -> bool {
    node.word().is_some_and(|word| word.starts_with('@') && word.len() > 1)
}

/// The marker's name, without the `@`.
pub fn marker_name(node: &WordNode) -> String {
    node.word().map(|word| word[1..].to_string()).unwrap_or_default()
}
