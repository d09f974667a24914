//! Text decoders for the text-bearing containers
//!
//! Every decoder answers `None` when it cannot produce any text; the pipeline
//! turns that into a failed outcome.

use billsort_domain::traits::TextDecoder;
use billsort_domain::FileKind;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pages of a PDF that are read; invoices keep their fields on the first page
pub const DEFAULT_PDF_PAGES: usize = 5;

/// Collect the trimmed text nodes of an XML document
fn xml_text_nodes(content: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut nodes = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let text = e.unescape()?;
                let text = text.trim();
                if !text.is_empty() {
                    nodes.push(text.to_string());
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).trim().to_string();
                if !text.is_empty() {
                    nodes.push(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(nodes)
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Reads the first pages of a PDF
#[derive(Debug, Clone, Copy)]
pub struct PdfDecoder {
    max_pages: usize,
}

impl Default for PdfDecoder {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_PDF_PAGES,
        }
    }
}

impl PdfDecoder {
    /// Read at most `max_pages` pages
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }
}

impl TextDecoder for PdfDecoder {
    fn decode(&self, path: &Path) -> Option<String> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "cannot read PDF");
                return None;
            }
        };

        // pdf-extract panics on some malformed documents
        let pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }));
        let pages = match pages {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!(file = %path.display(), error = %e, "PDF text extraction failed");
                return None;
            }
            Err(_) => {
                warn!(file = %path.display(), "PDF parser panicked");
                return None;
            }
        };

        let text = pages
            .into_iter()
            .take(self.max_pages)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(file = %path.display(), chars = text.chars().count(), "decoded PDF");
        non_empty(text)
    }
}

/// Reads OFD packages: a zip of XML parts
#[derive(Debug, Clone, Copy, Default)]
pub struct OfdDecoder;

impl TextDecoder for OfdDecoder {
    fn decode(&self, path: &Path) -> Option<String> {
        let file = File::open(path)
            .map_err(|e| warn!(file = %path.display(), error = %e, "cannot open OFD"))
            .ok()?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| warn!(file = %path.display(), error = %e, "OFD is not a valid zip"))
            .ok()?;

        let mut parts = Vec::new();
        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(file = %path.display(), index, error = %e, "skipping unreadable OFD entry");
                    continue;
                }
            };
            if !entry.name().to_ascii_lowercase().ends_with(".xml") {
                continue;
            }
            let name = entry.name().to_string();

            let mut content = String::new();
            if entry.read_to_string(&mut content).is_err() {
                debug!(file = %path.display(), entry = %name, "skipping non-UTF-8 OFD entry");
                continue;
            }
            match xml_text_nodes(&content) {
                Ok(nodes) => parts.extend(nodes),
                Err(e) => debug!(file = %path.display(), entry = %name, error = %e, "skipping malformed OFD entry"),
            }
        }

        non_empty(parts.join("\n"))
    }
}

/// Reads structured XML invoices
///
/// Returns the raw document when it is not well-formed XML, so that the
/// extractor still gets a chance at it.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDecoder;

impl TextDecoder for XmlDecoder {
    fn decode(&self, path: &Path) -> Option<String> {
        let content = std::fs::read(path)
            .map_err(|e| warn!(file = %path.display(), error = %e, "cannot read XML"))
            .ok()?;
        let content = String::from_utf8_lossy(&content).into_owned();

        match xml_text_nodes(&content) {
            Ok(nodes) => non_empty(nodes.join("\n")),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "XML did not parse, using raw content");
                non_empty(content)
            }
        }
    }
}

/// Maps each text-bearing [`FileKind`] to its decoder
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<FileKind, Arc<dyn TextDecoder>>,
}

impl DecoderRegistry {
    /// A registry with no decoders
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// PDF, OFD and XML decoders
    pub fn standard() -> Self {
        Self::empty()
            .with(FileKind::Pdf, Arc::new(PdfDecoder::default()))
            .with(FileKind::Ofd, Arc::new(OfdDecoder))
            .with(FileKind::Xml, Arc::new(XmlDecoder))
    }

    /// Register (or replace) the decoder for `kind`
    pub fn with(mut self, kind: FileKind, decoder: Arc<dyn TextDecoder>) -> Self {
        self.decoders.insert(kind, decoder);
        self
    }

    /// Decoder for `kind`, if any
    pub fn get(&self, kind: FileKind) -> Option<&Arc<dyn TextDecoder>> {
        self.decoders.get(&kind)
    }

    /// Decode `path` with the decoder registered for `kind`
    pub fn decode(&self, kind: FileKind, path: &Path) -> Option<String> {
        self.get(kind)?.decode(path)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("kinds", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}
