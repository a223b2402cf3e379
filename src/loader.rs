//! Document ingestion.
//!
//! A [`DocumentLoader`] owns a registry from file extension to a
//! [`DocumentParser`]. Loading a directory walks the configured extensions in
//! order and parses every matching file; a file that fails to parse is logged
//! and contributes nothing, the rest of the run carries on.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File name of the source document.
    pub source: String,
    /// Path of the source document as enumerated from the documents directory.
    pub file_path: String,
    /// Zero-based page for paged formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// One unit of text produced by a parser, e.g. a PDF page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUnit {
    pub text: String,
    pub page: Option<usize>,
}

impl ParsedUnit {
    fn whole(text: String) -> Self {
        Self { text, page: None }
    }
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>>;
}

pub struct TextParser;

impl DocumentParser for TextParser {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>> {
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| RagError::parse(path, e))?;
        Ok(vec![ParsedUnit::whole(text)])
    }
}

pub struct MarkdownParser;

impl DocumentParser for MarkdownParser {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>> {
        let bytes = fs::read(path)?;
        let source = String::from_utf8(bytes).map_err(|e| RagError::parse(path, e))?;
        Ok(vec![ParsedUnit::whole(strip_markdown(&source))])
    }
}

/// Extracts text with poppler's `pdftotext`, one unit per page.
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>> {
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8"])
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| {
                RagError::parse(path, format!("pdftotext could not be run (is poppler installed?): {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RagError::parse(path, format!("pdftotext failed: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(split_pdf_pages(&text))
    }
}

fn split_pdf_pages(text: &str) -> Vec<ParsedUnit> {
    text.split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(index, page)| ParsedUnit {
            text: page.to_string(),
            page: Some(index),
        })
        .collect()
}

/// Reads the main document part out of a `.docx` container.
pub struct DocxParser;

impl DocumentParser for DocxParser {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| RagError::parse(path, e))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| RagError::parse(path, e))?
            .read_to_string(&mut xml)?;

        let text = strip_markup(&xml);
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ParsedUnit::whole(text)])
    }
}

/// Reads every XHTML content file of an `.epub` container, in archive order.
pub struct EpubParser;

impl DocumentParser for EpubParser {
    fn parse(&self, path: &Path) -> Result<Vec<ParsedUnit>> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| RagError::parse(path, e))?;

        let mut units = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| RagError::parse(path, e))?;
            let name = entry.name().to_lowercase();
            if !(name.ends_with(".xhtml") || name.ends_with(".html") || name.ends_with(".htm")) {
                continue;
            }
            let mut html = String::new();
            entry.read_to_string(&mut html)?;
            let text = strip_markup(&html);
            if !text.is_empty() {
                units.push(ParsedUnit::whole(text));
            }
        }

        if units.is_empty() {
            return Err(RagError::parse(path, "no readable content files in epub"));
        }
        Ok(units)
    }
}

lazy_static! {
    static ref MD_FENCE: Regex = Regex::new(r"(?m)^[ \t]*(```|~~~).*$").unwrap();
    static ref MD_RULE: Regex = Regex::new(r"(?m)^[ \t]*([-*_][ \t]*){3,}$").unwrap();
    static ref MD_HEADING: Regex = Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]*").unwrap();
    static ref MD_QUOTE: Regex = Regex::new(r"(?m)^[ \t]*>[ \t]?").unwrap();
    static ref MD_BULLET: Regex = Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").unwrap();
    static ref MD_IMAGE: Regex = Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap();
    static ref MD_LINK: Regex = Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap();
    static ref MD_STRONG: Regex = Regex::new(r"\*{1,3}([^*\n]+)\*{1,3}").unwrap();
    // Word boundaries keep snake_case identifiers intact.
    static ref MD_UNDERSCORE: Regex = Regex::new(r"\b_{1,3}([^_\n]+?)_{1,3}\b").unwrap();
    static ref MD_STRIKE: Regex = Regex::new(r"~~([^~\n]+)~~").unwrap();
    static ref MD_CODE: Regex = Regex::new(r"`([^`\n]+)`").unwrap();

    static ref ML_INVISIBLE: Regex =
        Regex::new(r"(?is)<(head|script|style)\b.*?</(head|script|style)>").unwrap();
    static ref ML_BLOCK_END: Regex =
        Regex::new(r"(?i)</w:p>|<w:br\s*/>|</p>|<br\s*/?>|</div>|</h[1-6]>|</li>|</tr>").unwrap();
    static ref ML_TAB: Regex = Regex::new(r"<w:tab\s*/>").unwrap();
    static ref ML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref ML_ENTITY: Regex = Regex::new(r"&(#[0-9]+|#x[0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
}

/// Plain text of a Markdown document.
pub fn strip_markdown(source: &str) -> String {
    let text = MD_FENCE.replace_all(source, "");
    let text = MD_RULE.replace_all(&text, "");
    let text = MD_HEADING.replace_all(&text, "");
    let text = MD_QUOTE.replace_all(&text, "");
    let text = MD_BULLET.replace_all(&text, "");
    let text = MD_IMAGE.replace_all(&text, "$1");
    let text = MD_LINK.replace_all(&text, "$1");
    let text = MD_STRONG.replace_all(&text, "$1");
    let text = MD_UNDERSCORE.replace_all(&text, "$1");
    let text = MD_STRIKE.replace_all(&text, "$1");
    let text = MD_CODE.replace_all(&text, "$1");
    text.trim().to_string()
}

/// Plain text of an XML/XHTML fragment: block ends become line breaks, tags
/// are dropped, entities decoded, blank lines removed.
pub fn strip_markup(xml: &str) -> String {
    let text = ML_INVISIBLE.replace_all(xml, "");
    let text = ML_BLOCK_END.replace_all(&text, "\n");
    let text = ML_TAB.replace_all(&text, "\t");
    let text = ML_TAG.replace_all(&text, "");
    let text = ML_ENTITY.replace_all(&text, |caps: &regex::Captures| decode_entity(&caps[1]));

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entity(name: &str) -> String {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };
    decoded.map_or_else(|| format!("&{name};"), String::from)
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') { ext } else { format!(".{ext}") }
}

fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
}

pub struct DocumentLoader {
    extensions: Vec<String>,
    parsers: FxHashMap<String, Box<dyn DocumentParser>>,
}

impl DocumentLoader {
    /// A loader scanning for `extensions`, with the built-in parsers registered.
    pub fn new(extensions: &[String]) -> Self {
        let loader = Self {
            extensions: extensions.iter().map(|ext| normalize_extension(ext)).collect(),
            parsers: FxHashMap::default(),
        };
        loader
            .with_parser(".txt", TextParser)
            .with_parser(".md", MarkdownParser)
            .with_parser(".pdf", PdfParser)
            .with_parser(".docx", DocxParser)
            .with_parser(".epub", EpubParser)
    }

    pub fn with_parser(mut self, ext: &str, parser: impl DocumentParser + 'static) -> Self {
        self.parsers.insert(normalize_extension(ext), Box::new(parser));
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Parses one file. Failures are logged and yield no documents.
    pub fn load_document(&self, path: &Path) -> Vec<RawDocument> {
        match self.try_load_document(path) {
            Ok(docs) => docs,
            Err(e) => {
                error!("Failed to load {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    fn try_load_document(&self, path: &Path) -> Result<Vec<RawDocument>> {
        let Some(ext) = file_extension(path) else {
            return Ok(Vec::new());
        };
        let Some(parser) = self.parsers.get(&ext) else {
            debug!("No parser registered for {}, skipping {}", ext, path.display());
            return Ok(Vec::new());
        };

        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_path = path.to_string_lossy().into_owned();

        let docs = parser
            .parse(path)?
            .into_iter()
            .map(|unit| RawDocument {
                text: unit.text,
                metadata: DocumentMetadata {
                    source: source.clone(),
                    file_path: file_path.clone(),
                    page: unit.page,
                },
            })
            .collect();
        Ok(docs)
    }

    /// Loads every supported file of `dir`, grouped by extension.
    pub fn load_all(&self, dir: &Path) -> Result<Vec<RawDocument>> {
        if !dir.is_dir() {
            return Err(RagError::DocsDirMissing(dir.to_path_buf()));
        }

        let mut documents = Vec::new();
        for ext in &self.extensions {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if !path.is_file() || file_extension(&path).as_deref() != Some(ext.as_str()) {
                    continue;
                }
                info!("Loading: {}", path.file_name().unwrap_or_default().to_string_lossy());
                documents.extend(self.load_document(&path));
            }
        }

        info!("Total documents loaded: {}", documents.len());
        Ok(documents)
    }

    /// Like [`Self::load_all`], but an empty result is an error.
    pub fn load_corpus(&self, dir: &Path) -> Result<Vec<RawDocument>> {
        let documents = self.load_all(dir)?;
        if documents.is_empty() {
            return Err(RagError::EmptyCorpus {
                dir: dir.to_path_buf(),
                kinds: self.extensions.join(", "),
            });
        }
        Ok(documents)
    }
}
