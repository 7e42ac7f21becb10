//! Keyword search over the akashic documentation corpus

use super::{error_result, parse_args, text_result, FnHandler, ToolContext, ToolRegistry, ToolRegistryError};
use rmcp::model::JsonObject;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

pub const NO_RESULTS: &str = "No relevant documents found.";

const DOC_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];
const TITLE_WEIGHT: usize = 3;
const SNIPPET_RADIUS: usize = 80;

#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the corpus root
    pub path: String,
    pub title: String,
    pub body: String,
    title_lower: String,
    body_lower: String,
}

impl Document {
    pub fn new(path: impl Into<String>, body: impl Into<String>) -> Self {
        let path = path.into();
        let body = body.into();
        let title = body
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| {
                Path::new(&path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone())
            });

        Self {
            title_lower: title.to_lowercase(),
            body_lower: body.to_lowercase(),
            path,
            title,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub path: String,
    pub snippet: String,
    pub score: usize,
}

/// In-memory corpus loaded once when the shared server is built
#[derive(Debug, Clone, Default)]
pub struct DocsIndex {
    documents: Vec<Document>,
}

impl DocsIndex {
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Loads every text document under `dir`
    ///
    /// A missing directory yields an empty index.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        if !dir.is_dir() {
            tracing::warn!(docs_dir = %dir.display(), "Docs directory not found; search corpus is empty");
            return Ok(Self::default());
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_doc = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| DOC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_doc {
                continue;
            }

            // Legacy encodings are indexed with replacement characters
            let bytes = std::fs::read(entry.path())?;
            let body = String::from_utf8_lossy(&bytes).into_owned();
            documents.push(Document::new(
                super::paths::display_relative(dir, entry.path()),
                body,
            ));
        }

        tracing::info!(docs_dir = %dir.display(), documents = documents.len(), "Docs index loaded");
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Case-insensitive keyword search, best matches first
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let score: usize = terms
                    .iter()
                    .map(|term| {
                        doc.body_lower.matches(term.as_str()).count()
                            + TITLE_WEIGHT * doc.title_lower.matches(term.as_str()).count()
                    })
                    .sum();
                (score > 0).then(|| SearchHit {
                    title: doc.title.clone(),
                    path: doc.path.clone(),
                    snippet: snippet(doc, &terms),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(limit);
        hits
    }
}

fn snippet(doc: &Document, terms: &[String]) -> String {
    let Some(position) = terms
        .iter()
        .filter_map(|term| doc.body_lower.find(term.as_str()))
        .min()
    else {
        return doc.body.lines().next().unwrap_or_default().trim().to_string();
    };

    // Lowercasing can shift byte offsets for some scripts; map back through
    // char counts so slicing stays on boundaries.
    let char_position = doc.body_lower[..position].chars().count();
    let chars: Vec<char> = doc.body.chars().collect();
    let start = char_position.saturating_sub(SNIPPET_RADIUS).min(chars.len());
    let end = (char_position + SNIPPET_RADIUS).min(chars.len());

    let mut text: String = chars[start..end]
        .iter()
        .map(|c| if c.is_whitespace() { ' ' } else { *c })
        .collect();
    text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if start > 0 {
        text.insert_str(0, "...");
    }
    if end < chars.len() {
        text.push_str("...");
    }
    text
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    limit: Option<usize>,
}

async fn search_docs(ctx: ToolContext, args: JsonObject) -> rmcp::model::CallToolResult {
    let args: SearchArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    if args.query.trim().is_empty() {
        return error_result("Query must not be empty.");
    }

    let hits = ctx.docs.search(&args.query, args.limit.unwrap_or(5));
    if hits.is_empty() {
        return text_result(NO_RESULTS);
    }

    let report = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {} ({})\n   {}", i + 1, hit.title, hit.path, hit.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");
    text_result(report)
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolRegistryError> {
    registry.register(
        "search_akashic_docs",
        "Search the akashic engine documentation by keyword",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keywords to look for" },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Maximum number of hits (default 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(search_docs)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{args, context, first_text};
    use crate::tools::command::MockCommandRunner;

    fn corpus() -> DocsIndex {
        DocsIndex::from_documents(vec![
            Document::new(
                "guide/scene.md",
                "# Scene basics\n\nA g.Scene holds entities. Use scene.onLoad to build them.",
            ),
            Document::new(
                "guide/audio.md",
                "# Audio\n\nPlay sounds with g.game.audio. Scene transitions stop audio.",
            ),
            Document::new("notes.txt", "plain text without a heading"),
        ])
    }

    #[test]
    fn test_title_falls_back_to_file_stem() {
        let index = corpus();
        let hits = index.search("plain", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "notes");
    }

    #[test]
    fn test_title_matches_rank_higher() {
        let hits = corpus().search("scene", 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "guide/scene.md");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].snippet.to_lowercase().contains("scene"));
    }

    #[test]
    fn test_limit_truncates() {
        assert_eq!(corpus().search("scene", 1).len(), 1);
        assert!(corpus().search("   ", 5).is_empty());
    }

    #[test]
    fn test_load_reads_markdown_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api")).unwrap();
        std::fs::write(dir.path().join("api/entity.md"), "# Entity\nE.touchable").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let index = DocsIndex::load(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search("touchable", 5)[0].path, "api/entity.md");

        let missing = DocsIndex::load(&dir.path().join("nope")).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_load_tolerates_non_utf8_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.md"), "# Scene\n\nA scene holds entities.\n").unwrap();
        std::fs::write(dir.path().join("legacy.txt"), b"caf\xe9\n").unwrap();

        let index = DocsIndex::load(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.search("scene", 5)[0].path, "good.md");
        assert_eq!(index.search("caf", 5)[0].path, "legacy.txt");
    }

    #[tokio::test]
    async fn test_empty_corpus_reports_exact_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::new(MockCommandRunner::new()));

        let result = search_docs(ctx, args(json!({ "query": "nonexistent-keyword-xyz" }))).await;
        assert_eq!(result.is_error, Some(false));
        assert_eq!(first_text(&result), NO_RESULTS);
    }
}
