//! Output files
//!
//! - `interactive_elements.json`: ordered array of element records
//! - `html_structure.json`: `{document: {title, url, body}}`
//! - consolidated HTML with iframe markers, and its Markdown conversion

use jsonfy_browser::PageState;
use jsonfy_dom::{ElementRecord, HtmlStructure};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::JsonfyConfig;
use crate::error::{Result, ToolError};

#[derive(Debug, Clone)]
pub struct Persistence {
    pub elements_path: PathBuf,
    pub structure_path: PathBuf,
    pub consolidated_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// What [`Persistence::save`] wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedFiles {
    pub paths: Vec<PathBuf>,
    /// Iframes the compositor could not place
    pub unmatched_iframes: Vec<String>,
}

impl Persistence {
    pub fn from_config(config: &JsonfyConfig) -> Self {
        Self {
            elements_path: config.output_json_path.clone(),
            structure_path: config.structure_json_path.clone(),
            consolidated_path: config.consolidated_html_path.clone(),
            markdown_path: config.markdown_path.clone(),
        }
    }

    pub fn write_elements(&self, elements: &[ElementRecord]) -> Result<&Path> {
        write_json(&self.elements_path, &elements)?;
        Ok(&self.elements_path)
    }

    pub fn write_structure(&self, structure: &HtmlStructure) -> Result<&Path> {
        write_json(&self.structure_path, structure)?;
        Ok(&self.structure_path)
    }

    pub fn write_consolidated(&self, html: &str) -> Result<&Path> {
        write_file(&self.consolidated_path, html.as_bytes())?;
        Ok(&self.consolidated_path)
    }

    pub fn write_markdown(&self, html: &str) -> Result<&Path> {
        write_file(&self.markdown_path, to_markdown(html).as_bytes())?;
        Ok(&self.markdown_path)
    }

    /// Elements and structure always; consolidated HTML and Markdown on request
    pub fn save(&self, state: &PageState, consolidated: bool, markdown: bool) -> Result<SavedFiles> {
        let mut saved = SavedFiles::default();
        saved.paths.push(self.write_elements(&state.scan.interactive_elements)?.to_path_buf());
        saved.paths.push(self.write_structure(&state.structure)?.to_path_buf());

        if consolidated || markdown {
            let composite = state.composite();
            if !composite.is_complete() {
                warn!("Consolidated HTML is missing iframes: {:?}", composite.unmatched);
            }
            if consolidated {
                saved.paths.push(self.write_consolidated(&composite.html)?.to_path_buf());
            }
            if markdown {
                saved.paths.push(self.write_markdown(&composite.html)?.to_path_buf());
            }
            saved.unmatched_iframes = composite.unmatched;
        }

        info!("Saved {} files", saved.paths.len());
        Ok(saved)
    }
}

pub fn to_markdown(html: &str) -> String {
    html2md::parse_html(html)
}

pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let io = |source| ToolError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, contents).map_err(io)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(path, json.as_bytes())
}
